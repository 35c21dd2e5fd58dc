use thiserror::Error;

use crate::sources::Capability;

/// Failures that can surface from a pipeline. All of them originate at the I/O
/// boundary or in configuration; the numeric core itself cannot fail.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No acquisition strategy produced a source. Terminal for that pipeline.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// The source is paused or has ended. Ticks become no-ops until it resumes.
    #[error("source stalled")]
    SourceStalled,

    /// An optional hardware feature is missing. Degraded mode, never fatal.
    #[error("unsupported capability: {0:?}")]
    UnsupportedCapability(Capability),

    #[error(
        "frame is {actual_width}x{actual_height}, pipeline is fixed at {expected_width}x{expected_height}"
    )]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    #[error("sink failed: {0}")]
    Sink(String),

    #[error("{0} pipeline is already running")]
    AlreadyRunning(&'static str),

    /// The pipeline task panicked or was cancelled; its counters are lost.
    #[error("{pipeline} pipeline task failed: {reason}")]
    TaskFailed {
        pipeline: &'static str,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Config(String),
}

pub type PipelineResult<T> = Result<T, PipelineError>;
