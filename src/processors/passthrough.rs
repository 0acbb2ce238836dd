//! Forwards every payload unchanged.

use crate::error::PipelineResult;
use crate::payload::BoxedPayload;
use crate::processor::{Emitter, KillSwitch, Processor};

/// Sends whatever it receives on to the next stage, untouched. Useful as a
/// placeholder while sketching a layout.
#[derive(Debug, Default)]
pub struct Passthrough;

impl Passthrough {
    pub fn new() -> Self {
        Self
    }
}

impl Processor for Passthrough {
    fn name(&self) -> &str {
        "Passthrough"
    }

    fn process(&self, data: BoxedPayload, out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        out.emit(data)
    }
}
