//! Closure-backed transformer.

use crate::error::PipelineResult;
use crate::payload::BoxedPayload;
use crate::processor::{Emitter, KillSwitch, Processor};

/// Runs an arbitrary closure against each payload.
///
/// The closure returns the payloads to forward: an empty vector filters the
/// input out, an error halts the pipeline. This is the quickest way to drop a
/// one-off transform, source or sink into a layout.
pub struct FuncTransformer<F> {
    name: String,
    concurrency: usize,
    func: F,
}

impl<F> FuncTransformer<F>
where
    F: Fn(BoxedPayload) -> PipelineResult<Vec<BoxedPayload>> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self {
            name: "FuncTransformer".to_string(),
            concurrency: 1,
            func,
        }
    }

    /// Overrides the name shown in logs, stats and layout errors.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Lets the engine run up to `concurrency` calls of the closure at once.
    /// Output order towards the next stage still matches input order.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }
}

impl<F> Processor for FuncTransformer<F>
where
    F: Fn(BoxedPayload) -> PipelineResult<Vec<BoxedPayload>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn process(&self, data: BoxedPayload, out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        for payload in (self.func)(data)? {
            out.emit(payload)?;
        }
        Ok(())
    }

    fn concurrency(&self) -> usize {
        self.concurrency
    }
}
