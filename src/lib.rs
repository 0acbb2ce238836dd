//! Streaming data pipeline engine.
//!
//! Pipelines are directed acyclic graphs of processing stages exchanging
//! payloads through bounded channels, with every stage running concurrently.
//! A [`Processor`] supplies the compute; the engine validates the topology,
//! wires branching and merging edges with deep-copy semantics, schedules each
//! node on its own thread (with an ordered worker pool for processors that
//! advertise a concurrency level), propagates back-pressure through the
//! bounded channels, and gathers per-node execution stats.
//!
//! A linear pipeline takes a list of processors; the first one is a source,
//! triggered once by the start signal:
//!
//! ```
//! # fn main() -> Result<(), datapipe::PipelineError> {
//! use std::sync::Arc;
//!
//! use datapipe::processors::FuncTransformer;
//! use datapipe::{JsonPayload, Pipeline, ProcessorRef};
//!
//! let source = Arc::new(
//!     FuncTransformer::new(|_trigger| Ok(vec![JsonPayload::from(r#"{"n":1}"#).boxed()]))
//!         .with_name("source"),
//! );
//! let sink = Arc::new(
//!     FuncTransformer::new(|payload| {
//!         println!("{}", String::from_utf8_lossy(payload.bytes()));
//!         Ok(Vec::new())
//!     })
//!     .with_name("sink"),
//! );
//!
//! let mut pipeline = Pipeline::new([source as ProcessorRef, sink as ProcessorRef])?;
//! let done = pipeline.run();
//! done.recv().unwrap()?;
//! # Ok(())
//! # }
//! ```
//!
//! Branching and merging topologies are described with [`Layout`], [`Stage`]
//! and [`StageNode`] and run through [`Pipeline::branching`].

pub mod error;
pub mod layout;
pub mod node;
pub mod payload;
pub mod pipeline;
pub mod processor;
pub mod processors;
pub mod stage;
pub mod stat;

mod interrupt;
mod work;

pub use error::*;
pub use layout::*;
pub use node::*;
pub use payload::*;
pub use pipeline::*;
pub use processor::*;
pub use stage::*;
pub use stat::*;
