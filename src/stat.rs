//! Execution statistics gathered per stage node.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Lock-free counters recording one node's activity.
///
/// The driver thread, the branch helper and the concurrent workers all record
/// into the same instance, so everything is an atomic.
#[derive(Debug, Default)]
pub struct ExecutionStat {
    executions: AtomicU64,
    execution_nanos: AtomicU64,
    payloads_sent: AtomicU64,
    payloads_received: AtomicU64,
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
}

impl ExecutionStat {
    /// Times one processor call and counts it as an execution.
    pub(crate) fn record_execution<R>(&self, call: impl FnOnce() -> R) -> R {
        self.executions.fetch_add(1, Ordering::Relaxed);
        let started = Instant::now();
        let out = call();
        self.execution_nanos
            .fetch_add(started.elapsed().as_nanos() as u64, Ordering::Relaxed);
        out
    }

    /// Counts one payload sent downstream, sized in bytes.
    pub(crate) fn record_sent(&self, bytes: usize) {
        self.payloads_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Counts one payload received from upstream, sized in bytes.
    pub(crate) fn record_received(&self, bytes: usize) {
        self.payloads_received.fetch_add(1, Ordering::Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    /// Point-in-time view of the counters with derived averages.
    pub fn snapshot(&self) -> StatSnapshot {
        let executions = self.executions.load(Ordering::Relaxed);
        let total_execution = Duration::from_nanos(self.execution_nanos.load(Ordering::Relaxed));
        let payloads_sent = self.payloads_sent.load(Ordering::Relaxed);
        let payloads_received = self.payloads_received.load(Ordering::Relaxed);
        let total_bytes_sent = self.bytes_sent.load(Ordering::Relaxed);
        let total_bytes_received = self.bytes_received.load(Ordering::Relaxed);
        StatSnapshot {
            executions,
            total_execution,
            avg_execution: checked_div_duration(total_execution, executions),
            payloads_sent,
            payloads_received,
            total_bytes_sent,
            avg_bytes_sent: checked_div(total_bytes_sent, payloads_sent),
            total_bytes_received,
            avg_bytes_received: checked_div(total_bytes_received, payloads_received),
        }
    }
}

fn checked_div(total: u64, count: u64) -> u64 {
    if count == 0 {
        0
    } else {
        total / count
    }
}

fn checked_div_duration(total: Duration, count: u64) -> Duration {
    if count == 0 {
        Duration::ZERO
    } else {
        total / count as u32
    }
}

/// A snapshot of one node's counters, averages zero-guarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatSnapshot {
    pub executions: u64,
    pub total_execution: Duration,
    pub avg_execution: Duration,
    pub payloads_sent: u64,
    pub payloads_received: u64,
    pub total_bytes_sent: u64,
    pub avg_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub avg_bytes_received: u64,
}

/// Wall-clock timer for a whole pipeline run. Cloned into the completion
/// thread, which stops it when the last stage finishes.
#[derive(Debug, Clone, Default)]
pub struct Timer {
    inner: Arc<Mutex<TimerInner>>,
}

#[derive(Debug, Default)]
struct TimerInner {
    started: Option<Instant>,
    stopped: Option<Duration>,
}

impl Timer {
    pub(crate) fn start(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.started = Some(Instant::now());
        inner.stopped = None;
    }

    pub(crate) fn stop(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(started) = inner.started {
            inner.stopped = Some(started.elapsed());
        }
    }

    /// Elapsed time: final if stopped, running if not, zero if never started.
    pub fn elapsed(&self) -> Duration {
        let inner = self.inner.lock().unwrap();
        match (inner.stopped, inner.started) {
            (Some(stopped), _) => stopped,
            (None, Some(started)) => started.elapsed(),
            (None, None) => Duration::ZERO,
        }
    }
}

impl fmt::Display for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.elapsed())
    }
}
