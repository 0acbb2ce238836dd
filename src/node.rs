//! Engine-internal wrapper around a user processor, and the driver loop that
//! runs one node.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::PipelineError;
use crate::payload::BoxedPayload;
use crate::processor::{Emitter, KillSwitch, ProcessorRef};
use crate::stat::ExecutionStat;
use crate::work::WorkPool;

/// One processor's place in a layout: its identity, the processors in the
/// next stage it sends to, and its counters.
///
/// Channel endpoints are allocated by the engine while wiring and moved into
/// the spawned threads; they never live on the node itself.
pub struct StageNode {
    processor: ProcessorRef,
    downstream: Vec<ProcessorRef>,
    concurrency: usize,
    stats: Arc<ExecutionStat>,
}

impl std::fmt::Debug for StageNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageNode")
            .field("processor", &self.processor.name())
            .field(
                "downstream",
                &self
                    .downstream
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>(),
            )
            .field("concurrency", &self.concurrency)
            .finish()
    }
}

impl StageNode {
    /// Wraps a processor for use in a layout.
    pub fn new(processor: ProcessorRef) -> Self {
        let concurrency = processor.concurrency().max(1);
        Self {
            processor,
            downstream: Vec::new(),
            concurrency,
            stats: Arc::new(ExecutionStat::default()),
        }
    }

    /// Declares which processors in the next stage this node sends to.
    pub fn outputs<I>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = ProcessorRef>,
    {
        self.downstream = targets.into_iter().collect();
        self
    }

    /// The processor's display name.
    pub fn name(&self) -> &str {
        self.processor.name()
    }

    /// Counters recorded for this node so far.
    pub fn stat(&self) -> crate::stat::StatSnapshot {
        self.stats.snapshot()
    }

    pub(crate) fn processor(&self) -> &ProcessorRef {
        &self.processor
    }

    pub(crate) fn downstream(&self) -> &[ProcessorRef] {
        &self.downstream
    }

    pub(crate) fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub(crate) fn stats(&self) -> &Arc<ExecutionStat> {
        &self.stats
    }
}

/// Everything a driver thread needs to run one node.
pub(crate) struct NodeRuntime {
    pub processor: ProcessorRef,
    pub concurrency: usize,
    pub stats: Arc<ExecutionStat>,
    pub input_rx: flume::Receiver<BoxedPayload>,
    pub output_tx: flume::Sender<BoxedPayload>,
    pub kill: KillSwitch,
    pub stage_number: usize,
    pub pipeline: String,
    pub print_data: bool,
}

/// The driver loop: consume the input channel, run the processor over every
/// payload, then finish and close the output.
pub(crate) fn drive(rt: NodeRuntime) {
    let NodeRuntime {
        processor,
        concurrency,
        stats,
        input_rx,
        output_tx,
        kill,
        stage_number,
        pipeline,
        print_data,
    } = rt;

    let out = Emitter::new(output_tx.clone());
    info!(
        "{} - stage {} {} waiting to receive data",
        pipeline,
        stage_number,
        processor.name()
    );

    let pool = (concurrency > 1).then(|| {
        WorkPool::new(
            concurrency,
            Arc::clone(&processor),
            output_tx.clone(),
            kill.clone(),
            Arc::clone(&stats),
        )
    });

    for data in input_rx.iter() {
        debug!(
            "{} - stage {} {} received data",
            pipeline,
            stage_number,
            processor.name()
        );
        if print_data {
            debug!(
                "{} - stage {} {} data = {}",
                pipeline,
                stage_number,
                processor.name(),
                String::from_utf8_lossy(data.bytes())
            );
        }
        stats.record_received(data.bytes().len());
        match &pool {
            Some(pool) => pool.dispatch(data),
            None => {
                if let Err(err) = stats.record_execution(|| processor.process(data, &out, &kill)) {
                    kill.kill(err);
                }
            }
        }
    }

    // The input has drained; wait for in-flight concurrent work to flush.
    if let Some(pool) = pool {
        if pool.join() {
            kill.kill(PipelineError::StagePanicked(processor.name().to_string()));
        }
    }

    info!(
        "{} - stage {} {} input closed, calling finish",
        pipeline,
        stage_number,
        processor.name()
    );
    if let Err(err) = processor.finish(&out, &kill) {
        kill.kill(err);
    }
    // Dropping the emitter and sender here closes the output channel.
}
