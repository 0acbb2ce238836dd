//! Error types for the pipeline engine.

use thiserror::Error;

/// Errors produced by layout validation and pipeline execution.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("pipeline layout must contain at least one stage")]
    EmptyLayout,

    #[error("processor '{processor}' must not declare outputs in the final stage (stage {stage})")]
    OutputsInFinalStage { processor: String, stage: usize },

    #[error("processor '{processor}' must declare at least one output in non-final stage {stage}")]
    MissingOutputs { processor: String, stage: usize },

    #[error("processor '{processor}' in stage {stage} declares an output that is not in the next stage")]
    OutputNotInNextStage { processor: String, stage: usize },

    #[error("processor '{processor}' in stage {stage} is not an output of any processor in the previous stage")]
    UnreachableProcessor { processor: String, stage: usize },

    #[error("output channel closed")]
    OutputClosed,

    #[error("exiting due to interrupt signal")]
    Interrupted,

    #[error("stage thread '{0}' panicked")]
    StagePanicked(String),

    #[error("payload is not an object or an array of objects, found {0}")]
    UnsupportedObjects(&'static str),

    #[error("{0}")]
    Fatal(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Shorthand for a fatal error carrying a plain message, the usual way
    /// for a processor to halt the pipeline.
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Fatal(message.into())
    }
}

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;
