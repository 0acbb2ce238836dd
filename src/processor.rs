//! The processor capability implemented by user code, and the handles the
//! engine passes into it.

use std::sync::Arc;

use crate::error::{PipelineError, PipelineResult};
use crate::payload::BoxedPayload;

/// Shared handle to a user processor, as stored in layouts.
pub type ProcessorRef = Arc<dyn Processor>;

/// User-supplied computation for one pipeline stage.
///
/// Processors receive payloads from the previous stage, do their work, and
/// emit any number of payloads for the next stage. A processor advertising a
/// `concurrency` level above one is run from several worker threads at once,
/// so stateful processors use interior mutability; output order towards the
/// next stage still matches input order.
pub trait Processor: Send + Sync {
    /// Display name used in logs, stats and layout errors. Defaults to the
    /// implementing type's name.
    fn name(&self) -> &str {
        std::any::type_name_of_val(self)
    }

    /// Called once per payload received from the previous stage.
    ///
    /// Emit results on `out`. Returning an error halts the pipeline, as does
    /// calling `kill.kill(..)` mid-stream.
    fn process(&self, data: BoxedPayload, out: &Emitter, kill: &KillSwitch) -> PipelineResult<()>;

    /// Called exactly once after the previous stage has finished sending and
    /// every `process` call has returned. A chance to flush batched output.
    fn finish(&self, _out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        Ok(())
    }

    /// Number of `process` calls the engine may run at once for this
    /// processor. Values above one opt into the ordered worker pool.
    fn concurrency(&self) -> usize {
        1
    }
}

/// Sending half of a node's output channel, handed to `process` and `finish`.
#[derive(Clone)]
pub struct Emitter {
    tx: flume::Sender<BoxedPayload>,
}

impl Emitter {
    pub(crate) fn new(tx: flume::Sender<BoxedPayload>) -> Self {
        Self { tx }
    }

    /// Sends one payload downstream, blocking while the channel is full.
    /// Fails once the pipeline has torn the channel down.
    pub fn emit(&self, payload: BoxedPayload) -> PipelineResult<()> {
        self.tx
            .send(payload)
            .map_err(|_| PipelineError::OutputClosed)
    }
}

/// Handle for escalating a fatal error to the pipeline.
///
/// The first value to reach the termination channel wins; the channel is
/// sized so that later senders never block.
#[derive(Clone)]
pub struct KillSwitch {
    tx: flume::Sender<PipelineResult<()>>,
}

impl KillSwitch {
    pub(crate) fn new(tx: flume::Sender<PipelineResult<()>>) -> Self {
        Self { tx }
    }

    /// Reports a fatal error to the caller of `Pipeline::run`.
    pub fn kill(&self, err: PipelineError) {
        let _ = self.tx.try_send(Err(err));
    }

    /// Reports successful completion. Only the completion thread calls this.
    pub(crate) fn complete(&self) {
        let _ = self.tx.try_send(Ok(()));
    }
}
