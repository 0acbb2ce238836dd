//! End-to-end pipeline scenarios.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use datapipe::processors::Passthrough;
use datapipe::{
    BoxedPayload, Emitter, JsonPayload, KillSwitch, Layout, Pipeline, PipelineError,
    PipelineResult, Processor, ProcessorRef, Stage, StageNode,
};

fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .try_init();
}

/// Source that emits a fixed list of payloads when triggered.
struct Emit {
    payloads: Vec<String>,
}

impl Emit {
    fn new<I>(payloads: I) -> Arc<Self>
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        Arc::new(Self {
            payloads: payloads.into_iter().map(Into::into).collect(),
        })
    }
}

impl Processor for Emit {
    fn name(&self) -> &str {
        "Emit"
    }

    fn process(&self, _trigger: BoxedPayload, out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        for payload in &self.payloads {
            out.emit(JsonPayload::from(payload.as_str()).boxed())?;
        }
        Ok(())
    }
}

/// Sink that records every payload it receives as a string.
struct Record {
    seen: Arc<Mutex<Vec<String>>>,
}

impl Record {
    fn new() -> (Arc<Self>, Arc<Mutex<Vec<String>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        (
            Arc::new(Self {
                seen: Arc::clone(&seen),
            }),
            seen,
        )
    }
}

impl Processor for Record {
    fn name(&self) -> &str {
        "Record"
    }

    fn process(&self, data: BoxedPayload, _out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        self.seen
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(data.bytes()).into_owned());
        Ok(())
    }
}

#[test]
fn linear_passthrough_preserves_order() {
    init_tracing();
    let source = Emit::new(vec![r#"{"A":1}"#, r#"{"A":2}"#, r#"{"A":3}"#]);
    let pass = Arc::new(Passthrough::new());
    let (record, seen) = Record::new();

    let mut pipeline = Pipeline::new([
        source as ProcessorRef,
        pass as ProcessorRef,
        record as ProcessorRef,
    ])
    .unwrap();
    let done = pipeline.run();

    assert!(done.recv().unwrap().is_ok());
    assert_eq!(
        *seen.lock().unwrap(),
        vec![r#"{"A":1}"#, r#"{"A":2}"#, r#"{"A":3}"#]
    );
}

/// Rewrites its branch copy in place; the payload must be this node's alone.
struct Mutate;

impl Processor for Mutate {
    fn name(&self) -> &str {
        "Mutate"
    }

    fn process(&self, mut data: BoxedPayload, _out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        let json = data
            .as_any_mut()
            .downcast_mut::<JsonPayload>()
            .expect("default payload type");
        json.bytes_mut().clear();
        json.bytes_mut().extend_from_slice(br#"{"v":2}"#);
        Ok(())
    }
}

#[test]
fn branch_hands_each_downstream_an_independent_copy() {
    init_tracing();
    let source = Emit::new(vec![r#"{"v":1}"#]);
    let mutate: ProcessorRef = Arc::new(Mutate);
    let (record, seen) = Record::new();
    let record: ProcessorRef = record;

    let layout = Layout::new(vec![
        Stage::new([StageNode::new(source as ProcessorRef)
            .outputs([Arc::clone(&mutate), Arc::clone(&record)])]),
        Stage::new([StageNode::new(mutate), StageNode::new(record)]),
    ])
    .unwrap();
    let mut pipeline = Pipeline::branching(layout);
    let done = pipeline.run();

    assert!(done.recv().unwrap().is_ok());
    assert_eq!(*seen.lock().unwrap(), vec![r#"{"v":1}"#]);
}

/// Echoes its input after a sleep that makes later inputs finish first.
struct StaggeredSleep;

impl Processor for StaggeredSleep {
    fn name(&self) -> &str {
        "StaggeredSleep"
    }

    fn process(&self, data: BoxedPayload, out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        let value: serde_json::Value = data.parse()?;
        let index = value["i"]
            .as_u64()
            .ok_or_else(|| PipelineError::fatal("missing index"))?;
        std::thread::sleep(Duration::from_millis((9 - index) * 10));
        out.emit(data)
    }

    fn concurrency(&self) -> usize {
        4
    }
}

#[test]
fn concurrent_node_emits_in_input_order() {
    init_tracing();
    let source = Emit::new(vec![
        r#"{"i":1}"#,
        r#"{"i":2}"#,
        r#"{"i":3}"#,
        r#"{"i":4}"#,
        r#"{"i":5}"#,
        r#"{"i":6}"#,
        r#"{"i":7}"#,
        r#"{"i":8}"#,
    ]);
    let sleeper = Arc::new(StaggeredSleep);
    let (record, seen) = Record::new();

    let mut pipeline = Pipeline::new([
        source as ProcessorRef,
        sleeper as ProcessorRef,
        record as ProcessorRef,
    ])
    .unwrap();

    let started = Instant::now();
    let done = pipeline.run();
    assert!(done.recv().unwrap().is_ok());
    let elapsed = started.elapsed();

    let expected: Vec<String> = (1..=8).map(|i| format!(r#"{{"i":{i}}}"#)).collect();
    assert_eq!(*seen.lock().unwrap(), expected);
    // Serial execution would sleep for 360ms in total.
    assert!(
        elapsed < Duration::from_millis(250),
        "expected concurrent execution, took {elapsed:?}"
    );
}

#[test]
fn merge_funnels_every_upstream_payload() {
    init_tracing();
    let left = Emit::new(vec![r#"{"s":"a"}"#]);
    let right = Emit::new(vec![r#"{"s":"b"}"#]);
    let (record, seen) = Record::new();
    let record: ProcessorRef = record;

    let layout = Layout::new(vec![
        Stage::new([
            StageNode::new(left as ProcessorRef).outputs([Arc::clone(&record)]),
            StageNode::new(right as ProcessorRef).outputs([Arc::clone(&record)]),
        ]),
        Stage::new([StageNode::new(record)]),
    ])
    .unwrap();
    let mut pipeline = Pipeline::branching(layout);
    let done = pipeline.run();

    assert!(done.recv().unwrap().is_ok());
    let mut observed = seen.lock().unwrap().clone();
    observed.sort();
    assert_eq!(observed, vec![r#"{"s":"a"}"#, r#"{"s":"b"}"#]);
}

/// Fails the pipeline on its third input, forwarding everything else.
struct Boom {
    calls: AtomicU64,
}

impl Processor for Boom {
    fn name(&self) -> &str {
        "Boom"
    }

    fn process(&self, data: BoxedPayload, out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        if self.calls.fetch_add(1, Ordering::Relaxed) + 1 == 3 {
            return Err(PipelineError::fatal("boom"));
        }
        out.emit(data)
    }
}

#[test]
fn processor_error_kills_the_pipeline() {
    init_tracing();
    let source = Emit::new(vec!["1", "2", "3", "4", "5"]);
    let boom = Arc::new(Boom {
        calls: AtomicU64::new(0),
    });
    let (record, _seen) = Record::new();

    let mut pipeline = Pipeline::new([
        source as ProcessorRef,
        boom as ProcessorRef,
        record as ProcessorRef,
    ])
    .unwrap();
    let done = pipeline.run();

    let err = done.recv().unwrap().unwrap_err();
    assert!(err.to_string().contains("boom"), "got: {err}");
}

#[test]
fn invalid_layout_names_processor_and_stage() {
    let reader: ProcessorRef = Arc::new(Passthrough::new());
    let writer: ProcessorRef = Arc::new(Passthrough::new());
    let err = Layout::new(vec![
        Stage::new([StageNode::new(Arc::clone(&reader)).outputs([Arc::clone(&writer)])]),
        Stage::new([StageNode::new(writer).outputs([reader])]),
    ])
    .unwrap_err();
    let message = err.to_string();
    assert!(message.contains("Passthrough"), "got: {message}");
    assert!(message.contains("final stage (stage 2)"), "got: {message}");
}

#[test]
fn run_yields_exactly_one_decisive_value() {
    init_tracing();
    let source = Emit::new(vec!["1"]);
    let (record, _seen) = Record::new();

    let mut pipeline = Pipeline::new([source as ProcessorRef, record as ProcessorRef]).unwrap();
    let done = pipeline.run();

    assert!(done.recv().unwrap().is_ok());
    // Give any stray sender a moment, then confirm nothing else arrived.
    std::thread::sleep(Duration::from_millis(20));
    assert!(done.try_recv().is_err());
}

/// Buffers every input and emits one combined payload from `finish`.
struct Batch {
    items: Mutex<Vec<String>>,
}

impl Processor for Batch {
    fn name(&self) -> &str {
        "Batch"
    }

    fn process(&self, data: BoxedPayload, _out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        self.items
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(data.bytes()).into_owned());
        Ok(())
    }

    fn finish(&self, out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        let combined = format!("[{}]", self.items.lock().unwrap().join(","));
        out.emit(JsonPayload::from(combined).boxed())
    }
}

#[test]
fn finish_flushes_batched_output_after_the_last_process_call() {
    init_tracing();
    let source = Emit::new(vec![r#"{"A":1}"#, r#"{"A":2}"#]);
    let batch = Arc::new(Batch {
        items: Mutex::new(Vec::new()),
    });
    let (record, seen) = Record::new();

    let mut pipeline = Pipeline::new([
        source as ProcessorRef,
        batch as ProcessorRef,
        record as ProcessorRef,
    ])
    .unwrap();
    let done = pipeline.run();

    assert!(done.recv().unwrap().is_ok());
    assert_eq!(*seen.lock().unwrap(), vec![r#"[{"A":1},{"A":2}]"#]);
}

/// Source that emits once from `process` and once from `finish`.
///
/// The engine calls `finish` on a source right after injecting the start
/// signal, and the source's driver calls it again once the input drains, so a
/// source's `finish` runs twice. Well-behaved sources keep it a no-op; this
/// one emits to pin down the behavior.
struct EagerSource;

impl Processor for EagerSource {
    fn name(&self) -> &str {
        "EagerSource"
    }

    fn process(&self, _trigger: BoxedPayload, out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        out.emit(JsonPayload::from(r#""from-process""#).boxed())
    }

    fn finish(&self, out: &Emitter, _kill: &KillSwitch) -> PipelineResult<()> {
        out.emit(JsonPayload::from(r#""from-finish""#).boxed())
    }
}

#[test]
fn early_finish_on_a_source_still_delivers_its_output() {
    init_tracing();
    let source = Arc::new(EagerSource);
    let (record, seen) = Record::new();

    let mut pipeline = Pipeline::new([source as ProcessorRef, record as ProcessorRef]).unwrap();
    let done = pipeline.run();

    assert!(done.recv().unwrap().is_ok());
    let mut observed = seen.lock().unwrap().clone();
    observed.sort();
    assert_eq!(
        observed,
        vec![r#""from-finish""#, r#""from-finish""#, r#""from-process""#]
    );
}

#[test]
fn small_buffers_apply_back_pressure_without_losing_order() {
    init_tracing();
    let payloads: Vec<String> = (0..100).map(|i| format!(r#"{{"n":{i}}}"#)).collect();
    let expected = payloads.clone();

    let source = Emit::new(payloads);
    let pass = Arc::new(Passthrough::new());
    let (record, seen) = Record::new();

    let mut pipeline = Pipeline::new([
        source as ProcessorRef,
        pass as ProcessorRef,
        record as ProcessorRef,
    ])
    .unwrap()
    .with_buffer_length(1);
    let done = pipeline.run();

    assert!(done.recv().unwrap().is_ok());
    assert_eq!(*seen.lock().unwrap(), expected);
}

#[test]
fn single_stage_pipeline_terminates() {
    init_tracing();
    let (record, seen) = Record::new();

    let mut pipeline = Pipeline::new([record as ProcessorRef]).unwrap();
    let done = pipeline.run();

    assert!(done.recv().unwrap().is_ok());
    // The lone node saw exactly the start signal.
    assert_eq!(*seen.lock().unwrap(), vec!["GO"]);
}

#[test]
fn emitting_from_a_terminal_node_fails_fast() {
    init_tracing();
    // A single-stage node has no reader on its output; emitting from it must
    // surface an error instead of blocking the pipeline.
    let source = Emit::new(vec![r#"{"n":1}"#]);

    let mut pipeline = Pipeline::new([source as ProcessorRef]).unwrap();
    let done = pipeline.run();

    let result = done.recv().unwrap();
    assert!(
        matches!(result, Err(PipelineError::OutputClosed)),
        "got: {result:?}"
    );
}

#[test]
fn stats_report_lists_every_stage_and_node() {
    init_tracing();
    let source = Emit::new(vec![r#"{"A":1}"#, r#"{"A":2}"#, r#"{"A":3}"#]);
    let pass = Arc::new(Passthrough::new());
    let (record, _seen) = Record::new();

    let mut pipeline = Pipeline::new([
        source as ProcessorRef,
        pass as ProcessorRef,
        record as ProcessorRef,
    ])
    .unwrap()
    .with_name("stats-pipeline");
    let done = pipeline.run();
    assert!(done.recv().unwrap().is_ok());

    let report = pipeline.stats();
    assert!(report.starts_with("stats-pipeline: "), "got: {report}");
    assert!(report.contains("Stage 1)"));
    assert!(report.contains("Stage 3)"));
    assert!(report.contains("  * Emit"));
    assert!(report.contains("  * Passthrough"));
    assert!(report.contains("  * Record"));
    // The source received only the start signal and sent three payloads.
    assert!(report.contains("Payloads Sent/Received = 3/1"), "got: {report}");
    // The passthrough node forwarded all three.
    assert!(report.contains("Payloads Sent/Received = 3/3"), "got: {report}");
    // The sink sent nothing.
    assert!(report.contains("Payloads Sent/Received = 0/3"), "got: {report}");
}
