//! The pipeline engine: channel wiring, per-node scheduling, lifecycle and
//! reporting.

use std::fmt::Write as _;
use std::sync::Arc;
use std::thread;

use tracing::{debug, info};
use uuid::Uuid;

use crate::error::PipelineResult;
use crate::interrupt;
use crate::layout::Layout;
use crate::node::{self, NodeRuntime, StageNode};
use crate::payload::{BoxedPayload, JsonPayload};
use crate::processor::{Emitter, KillSwitch, ProcessorRef};
use crate::stage::Stage;
use crate::stat::{ExecutionStat, Timer};

/// Payload sent to every first-stage node to kick off execution. Sources
/// treat any received payload as the trigger and ignore its content.
pub const START_SIGNAL: &[u8] = b"GO";

/// Default capacity of every payload channel.
pub const DEFAULT_BUFFER_LENGTH: usize = 8;

/// The main construct for running a series of stages within a data pipeline.
pub struct Pipeline {
    layout: Layout,
    id: Uuid,
    name: String,
    buffer_length: usize,
    print_data: bool,
    timer: Timer,
}

/// A node's channel endpoints during the wiring pass. Endpoints are taken out
/// of here as threads claim them.
struct WiredNode {
    processor: ProcessorRef,
    concurrency: usize,
    stats: Arc<ExecutionStat>,
    input_tx: Option<flume::Sender<BoxedPayload>>,
    input_rx: Option<flume::Receiver<BoxedPayload>>,
    output_tx: Option<flume::Sender<BoxedPayload>>,
    output_rx: Option<flume::Receiver<BoxedPayload>>,
    merge_ins: Vec<flume::Receiver<BoxedPayload>>,
}

impl Pipeline {
    /// Creates a linear pipeline: one stage per processor, each sending to
    /// the next. For branching or merging layouts see [`Pipeline::branching`].
    pub fn new<I>(processors: I) -> PipelineResult<Self>
    where
        I: IntoIterator<Item = ProcessorRef>,
    {
        let processors: Vec<ProcessorRef> = processors.into_iter().collect();
        let count = processors.len();
        let stages = processors
            .iter()
            .enumerate()
            .map(|(i, processor)| {
                let mut stage_node = StageNode::new(Arc::clone(processor));
                if i + 1 < count {
                    stage_node = stage_node.outputs([Arc::clone(&processors[i + 1])]);
                }
                Stage::new([stage_node])
            })
            .collect();
        Ok(Self::branching(Layout::new(stages)?))
    }

    /// Creates a pipeline from a pre-built, validated layout.
    pub fn branching(layout: Layout) -> Self {
        Self {
            layout,
            id: Uuid::new_v4(),
            name: "Pipeline".to_string(),
            buffer_length: DEFAULT_BUFFER_LENGTH,
            print_data: false,
            timer: Timer::default(),
        }
    }

    /// Sets the display name used in logs and the stats report.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the capacity of every payload channel.
    pub fn with_buffer_length(mut self, buffer_length: usize) -> Self {
        self.buffer_length = buffer_length;
        self
    }

    /// Logs full payload bytes at each hop, at debug level.
    pub fn with_print_data(mut self, print_data: bool) -> Self {
        self.print_data = print_data;
        self
    }

    /// The pipeline's display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wires the stages together and kicks off execution.
    ///
    /// Returns the termination channel. Exactly one decisive value should be
    /// received from it: `Ok(())` is success, an error is fatal. Any stage
    /// may fail the pipeline at any time; the first value wins, and the
    /// channel never blocks late senders.
    pub fn run(&mut self) -> flume::Receiver<PipelineResult<()>> {
        self.timer.start();
        let (kill_tx, kill_rx) = flume::bounded(self.layout.node_count() + 2);
        let kill = KillSwitch::new(kill_tx.clone());

        info!("{} ({}): connecting stages", self.name, self.id);
        let mut wired = self.connect_stages();
        let handles = self.run_stages(&mut wired, &kill);

        // Kick off the first stage: one trigger payload per source, an
        // immediate finish call, then close the input by dropping its sender.
        // Sources are expected to do all their emission synchronously inside
        // `process`, so the early finish is harmless for them.
        for source in &mut wired[0] {
            debug!(
                "{}: sending start signal to {}",
                self.name,
                source.processor.name()
            );
            let input_tx = source.input_tx.take().expect("first-stage input sender");
            let _ = input_tx.send(Box::new(JsonPayload::from(START_SIGNAL.to_vec())));
            let out = Emitter::new(source.output_tx.take().expect("first-stage output sender"));
            if let Err(err) = source.processor.finish(&out, &kill) {
                kill.kill(err);
            }
        }

        // Once every driver has returned the pipeline is complete.
        let timer = self.timer.clone();
        let completion_kill = kill.clone();
        let name = self.name.clone();
        thread::Builder::new()
            .name(format!("{name}-completion"))
            .spawn(move || {
                let mut panicked: Option<String> = None;
                for handle in handles {
                    let thread_name = handle.thread().name().map(str::to_string);
                    if handle.join().is_err() && panicked.is_none() {
                        panicked = Some(thread_name.unwrap_or_else(|| "unknown".to_string()));
                    }
                }
                timer.stop();
                match panicked {
                    Some(stage) => {
                        completion_kill.kill(crate::error::PipelineError::StagePanicked(stage))
                    }
                    None => {
                        info!("{}: all stages complete", name);
                        completion_kill.complete();
                    }
                }
            })
            .expect("failed to spawn completion thread");

        interrupt::notify_on_interrupt(kill_tx);

        kill_rx
    }

    /// Allocates every channel and starts the branch and merge helpers that
    /// copy and funnel data between stages.
    fn connect_stages(&self) -> Vec<Vec<WiredNode>> {
        debug!("{}: connecting stages", self.name);
        let mut wired: Vec<Vec<WiredNode>> = self
            .layout
            .stages()
            .iter()
            .map(|stage| {
                stage
                    .nodes()
                    .iter()
                    .map(|stage_node| {
                        let (input_tx, input_rx) = flume::bounded(self.buffer_length);
                        let (output_tx, output_rx) = flume::bounded(self.buffer_length);
                        WiredNode {
                            processor: Arc::clone(stage_node.processor()),
                            concurrency: stage_node.concurrency(),
                            stats: Arc::clone(stage_node.stats()),
                            input_tx: Some(input_tx),
                            input_rx: Some(input_rx),
                            output_tx: Some(output_tx),
                            output_rx: Some(output_rx),
                            merge_ins: Vec::new(),
                        }
                    })
                    .collect()
            })
            .collect();

        // Bridge channels between adjacent stages, one per declared output,
        // then a branch thread per sending node that deep-copies each payload
        // to every bridge.
        for s in 0..self.layout.stages().len() {
            let stage_nodes = self.layout.stages()[s].nodes();
            for (i, stage_node) in stage_nodes.iter().enumerate() {
                if stage_node.downstream().is_empty() {
                    // Nothing ever reads a terminal node's output. Drop the
                    // receiver now so a stray emit fails fast with
                    // OutputClosed instead of filling the buffer and
                    // blocking forever.
                    wired[s][i].output_rx = None;
                    continue;
                }
                let mut branch_txs = Vec::with_capacity(stage_node.downstream().len());
                for target in stage_node.downstream() {
                    let (bridge_tx, bridge_rx) = flume::bounded(self.buffer_length);
                    branch_txs.push(bridge_tx);
                    let t = self.layout.stages()[s + 1]
                        .nodes()
                        .iter()
                        .position(|candidate| Arc::ptr_eq(candidate.processor(), target))
                        .expect("validated layout");
                    wired[s + 1][t].merge_ins.push(bridge_rx);
                }

                let output_rx = wired[s][i].output_rx.take().expect("branch output receiver");
                let stats = Arc::clone(&wired[s][i].stats);
                thread::Builder::new()
                    .name(format!("{}-branch", stage_node.name()))
                    .spawn(move || {
                        for payload in output_rx.iter() {
                            for bridge_tx in &branch_txs {
                                // A failed send means the pipeline is being
                                // torn down; keep draining so upstream can
                                // finish.
                                let _ = bridge_tx.send(payload.clone());
                            }
                            stats.record_sent(payload.bytes().len());
                        }
                        // Dropping the bridge senders closes every bridge.
                    })
                    .expect("failed to spawn branch thread");
            }
        }

        // One merge thread per inbound bridge, funneling into the node's
        // input channel. The node's own sender is dropped right away, so the
        // input closes exactly when the last merge thread exits.
        for stage in &mut wired {
            for wired_node in stage.iter_mut() {
                if wired_node.merge_ins.is_empty() {
                    continue;
                }
                let input_tx = wired_node.input_tx.take().expect("merge input sender");
                for (k, bridge_rx) in wired_node.merge_ins.drain(..).enumerate() {
                    let input_tx = input_tx.clone();
                    thread::Builder::new()
                        .name(format!("{}-merge-{}", wired_node.processor.name(), k))
                        .spawn(move || {
                            for payload in bridge_rx.iter() {
                                if input_tx.send(payload).is_err() {
                                    break;
                                }
                            }
                        })
                        .expect("failed to spawn merge thread");
                }
            }
        }

        wired
    }

    /// Spawns one driver thread per node.
    fn run_stages(
        &self,
        wired: &mut [Vec<WiredNode>],
        kill: &KillSwitch,
    ) -> Vec<thread::JoinHandle<()>> {
        let mut handles = Vec::with_capacity(self.layout.node_count());
        for (s, stage) in wired.iter_mut().enumerate() {
            for wired_node in stage.iter_mut() {
                let output_tx = wired_node.output_tx.take().expect("driver output sender");
                if s == 0 {
                    // The start-signal injection still needs a sender for the
                    // early finish call on sources.
                    wired_node.output_tx = Some(output_tx.clone());
                }
                let runtime = NodeRuntime {
                    processor: Arc::clone(&wired_node.processor),
                    concurrency: wired_node.concurrency,
                    stats: Arc::clone(&wired_node.stats),
                    input_rx: wired_node.input_rx.take().expect("driver input receiver"),
                    output_tx,
                    kill: kill.clone(),
                    stage_number: s + 1,
                    pipeline: self.name.clone(),
                    print_data: self.print_data,
                };
                let handle = thread::Builder::new()
                    .name(wired_node.processor.name().to_string())
                    .spawn(move || node::drive(runtime))
                    .expect("failed to spawn driver thread");
                handles.push(handle);
            }
        }
        handles
    }

    /// Formatted report of the stats gathered for each stage executed.
    pub fn stats(&self) -> String {
        let mut report = format!("{}: {}\n", self.name, self.timer);
        for (s, stage) in self.layout.stages().iter().enumerate() {
            let _ = writeln!(report, "Stage {})", s + 1);
            for stage_node in stage.nodes() {
                let snap = stage_node.stats().snapshot();
                let _ = writeln!(report, "  * {}", stage_node.name());
                let _ = writeln!(
                    report,
                    "     - Total/Avg Execution Time = {:.6}/{:.6}s",
                    snap.total_execution.as_secs_f64(),
                    snap.avg_execution.as_secs_f64()
                );
                let _ = writeln!(
                    report,
                    "     - Payloads Sent/Received = {}/{}",
                    snap.payloads_sent, snap.payloads_received
                );
                let _ = writeln!(
                    report,
                    "     - Total/Avg Bytes Sent = {}/{}",
                    snap.total_bytes_sent, snap.avg_bytes_sent
                );
                let _ = writeln!(
                    report,
                    "     - Total/Avg Bytes Received = {}/{}",
                    snap.total_bytes_received, snap.avg_bytes_received
                );
            }
        }
        report
    }
}
