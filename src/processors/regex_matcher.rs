//! Filters payloads by matching their bytes against a regular expression.

use regex::bytes::Regex;

use crate::error::{PipelineError, PipelineResult};
use crate::payload::BoxedPayload;
use crate::processor::{Emitter, KillSwitch, Processor};

/// Forwards only payloads whose raw bytes match the pattern; everything else
/// is dropped.
#[derive(Debug)]
pub struct RegexMatcher {
    pattern: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> PipelineResult<Self> {
        let pattern = Regex::new(pattern)
            .map_err(|err| PipelineError::fatal(format!("invalid match pattern: {err}")))?;
        Ok(Self { pattern })
    }
}

impl Processor for RegexMatcher {
    fn name(&self) -> &str {
        "RegexMatcher"
    }

    fn process(&self, data: BoxedPayload, out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        if self.pattern.is_match(data.bytes()) {
            out.emit(data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::JsonPayload;

    #[test]
    fn only_matching_payloads_pass() {
        let matcher = RegexMatcher::new(r#""kind":"event""#).unwrap();
        let (out_tx, out_rx) = flume::unbounded();
        let (kill_tx, _kill_rx) = flume::unbounded();
        let out = Emitter::new(out_tx);
        let kill = KillSwitch::new(kill_tx);

        matcher
            .process(
                JsonPayload::from(r#"{"kind":"event","n":1}"#).boxed(),
                &out,
                &kill,
            )
            .unwrap();
        matcher
            .process(
                JsonPayload::from(r#"{"kind":"noise","n":2}"#).boxed(),
                &out,
                &kill,
            )
            .unwrap();

        assert_eq!(
            out_rx.try_recv().unwrap().bytes(),
            br#"{"kind":"event","n":1}"#
        );
        assert!(out_rx.try_recv().is_err());
    }

    #[test]
    fn invalid_pattern_is_reported() {
        assert!(RegexMatcher::new("(unclosed").is_err());
    }
}
