//! Ordered concurrent work execution for nodes that advertise a concurrency
//! level above one.
//!
//! Up to `C` `process` calls run at once. Each call's output is buffered in a
//! sequence-numbered slot and flushed strictly from the head of the slot
//! queue, so downstream observes payloads in the order the node accepted its
//! inputs, not the order the calls happened to complete.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::debug;

use crate::payload::BoxedPayload;
use crate::processor::{Emitter, KillSwitch, ProcessorRef};
use crate::stat::ExecutionStat;

struct Job {
    seq: u64,
    data: BoxedPayload,
}

struct Slot {
    seq: u64,
    done: bool,
    data: Vec<BoxedPayload>,
}

#[derive(Default)]
struct SlotQueue {
    slots: VecDeque<Slot>,
    next_seq: u64,
}

impl SlotQueue {
    fn push(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.push_back(Slot {
            seq,
            done: false,
            data: Vec::new(),
        });
        seq
    }

    fn complete(&mut self, seq: u64, data: Vec<BoxedPayload>) {
        if let Some(slot) = self.slots.iter_mut().find(|slot| slot.seq == seq) {
            slot.data = data;
            slot.done = true;
        }
    }
}

/// Fixed pool of worker threads enforcing a node's concurrency level and the
/// in-order flush of results.
pub(crate) struct WorkPool {
    job_tx: flume::Sender<Job>,
    queue: Arc<Mutex<SlotQueue>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkPool {
    pub(crate) fn new(
        concurrency: usize,
        processor: ProcessorRef,
        out_tx: flume::Sender<BoxedPayload>,
        kill: KillSwitch,
        stats: Arc<ExecutionStat>,
    ) -> Self {
        // Rendezvous channel: dispatch blocks while every worker is busy,
        // which is what bounds in-flight calls to the concurrency level.
        let (job_tx, job_rx) = flume::bounded::<Job>(0);
        let queue = Arc::new(Mutex::new(SlotQueue::default()));
        let workers = (0..concurrency)
            .map(|i| {
                let job_rx = job_rx.clone();
                let queue = Arc::clone(&queue);
                let processor = Arc::clone(&processor);
                let out_tx = out_tx.clone();
                let kill = kill.clone();
                let stats = Arc::clone(&stats);
                thread::Builder::new()
                    .name(format!("{}-worker-{}", processor.name(), i))
                    .spawn(move || {
                        for job in job_rx.iter() {
                            run_job(job, &processor, &queue, &out_tx, &kill, &stats);
                        }
                    })
                    .expect("failed to spawn worker thread")
            })
            .collect();
        Self {
            job_tx,
            queue,
            workers,
        }
    }

    /// Queues one payload, blocking until a worker is free to take it.
    pub(crate) fn dispatch(&self, data: BoxedPayload) {
        let seq = self.queue.lock().unwrap().push();
        let _ = self.job_tx.send(Job { seq, data });
    }

    /// Waits for every in-flight call to complete and flush. Returns true if
    /// a worker panicked inside user code.
    pub(crate) fn join(self) -> bool {
        let Self {
            job_tx,
            queue,
            workers,
        } = self;
        drop(job_tx);
        let mut panicked = false;
        for handle in workers {
            if handle.join().is_err() {
                panicked = true;
            }
        }
        let mut queue = queue.lock().unwrap();
        if panicked {
            // A dead worker leaves its slot behind and blocks the flush of
            // everything queued after it. Nothing more will be emitted.
            queue.slots.clear();
        }
        debug_assert!(queue.slots.is_empty(), "work queue not drained");
        panicked
    }
}

fn run_job(
    job: Job,
    processor: &ProcessorRef,
    queue: &Mutex<SlotQueue>,
    out_tx: &flume::Sender<BoxedPayload>,
    kill: &KillSwitch,
    stats: &ExecutionStat,
) {
    // The call emits into a private channel; its output is held back until
    // every earlier slot has flushed.
    let (capture_tx, capture_rx) = flume::unbounded();
    let emitter = Emitter::new(capture_tx);
    let result = stats.record_execution(|| processor.process(job.data, &emitter, kill));
    drop(emitter);
    if let Err(err) = result {
        kill.kill(err);
    }

    let data: Vec<BoxedPayload> = capture_rx.try_iter().collect();
    let mut queue = queue.lock().unwrap();
    queue.complete(job.seq, data);
    // Flush every leading completed slot in order. Sends may block on
    // back-pressure; holding the lock here is what serializes emission.
    while queue.slots.front().is_some_and(|slot| slot.done) {
        let slot = queue.slots.pop_front().expect("checked front");
        for payload in slot.data {
            if out_tx.send(payload).is_err() {
                debug!("downstream disconnected, dropping buffered output");
                break;
            }
        }
    }
}
