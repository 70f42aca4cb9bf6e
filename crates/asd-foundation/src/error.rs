use std::time::Duration;
use thiserror::Error;

/// Top-level error taxonomy for the ASD core. Each per-domain enum owns one
/// failure surface from the component table; this aggregates them the way a
/// caller driving the pipeline needs to see a single type.
#[derive(Error, Debug)]
pub enum AsdError {
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Score(#[from] ScoreError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("component failed health check: {component}")]
    HealthCheckFailed { component: String },

    #[error("shutdown requested")]
    ShutdownRequested,

    #[error("fatal error, cannot recover: {0}")]
    Fatal(String),

    #[error("transient error, will retry: {0}")]
    Transient(String),
}

impl From<tokio::task::JoinError> for AsdError {
    fn from(err: tokio::task::JoinError) -> Self {
        AsdError::Transient(format!("task join failed: {err}"))
    }
}

/// Errors raised by the tracker: cascaded assignment, RLAP dispatch, track
/// lifecycle.
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("RLAP solver received an invalid cost matrix ({rows}x{cols})")]
    RlapInvalidCostMatrix { rows: usize, cols: usize },

    #[error("RLAP solver reported infeasible assignment")]
    RlapInfeasible,

    #[error("RLAP solver failed with unknown exit code {0}")]
    RlapUnknown(i32),

    #[error("detection has no embedding, cannot seed a new track")]
    MissingEmbedding,

    #[error("embedder failed: {0}")]
    EmbedderFailed(String),

    #[error("detector failed: {0}")]
    DetectorFailed(String),
}

/// Errors raised writing a frame into an `AsdBuffer`.
#[derive(Error, Debug)]
pub enum BufferError {
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    #[error("failed to lock buffer pool")]
    LockFailed,

    #[error("crop resize failed: {0}")]
    ResizeFailed(String),

    #[error("grayscale conversion failed: {0}")]
    GrayscaleFailed(String),

    #[error("frame conversion failed: {0}")]
    ConvertFailed(String),

    #[error("invalid video buffer amount: {0}")]
    InvalidVideoBufferAmount(usize),

    #[error("invalid ASD model amount: {0}")]
    InvalidAsdModelAmount(usize),

    #[error("timestamp regressed: previous={previous:?} new={new:?}")]
    RegressingTimestamp { previous: Duration, new: Duration },
}

/// Errors raised by `ScoreStream`/`ScoreSegment` operations. These are
/// recoverable-by-design: callers retry or discard, per spec.md §7.
#[derive(Error, Debug)]
pub enum ScoreError {
    #[error("write targets a segment older than the stream's tail")]
    WriteFailedOutdatedSegment,

    #[error("cannot merge: segments are not adjacent")]
    MergeFailedNoAdjacentScores,

    #[error("cannot intersect: segments do not overlap")]
    IntersectionFailedNoIntersection,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration parsing error: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("validation failed: {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Maps an error to the supervisory action the engine driver should take,
/// mirroring the recovery-strategy table the teacher keeps next to its own
/// error enum.
#[derive(Debug, Clone)]
pub enum RecoveryStrategy {
    Retry { max_attempts: u32, delay: Duration },
    Fallback { to: String },
    Restart,
    Ignore,
    Fatal,
}

impl AsdError {
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            AsdError::Buffer(BufferError::RegressingTimestamp { .. }) => RecoveryStrategy::Fatal,
            AsdError::Buffer(BufferError::InvalidVideoBufferAmount(_))
            | AsdError::Buffer(BufferError::InvalidAsdModelAmount(_)) => RecoveryStrategy::Fatal,
            AsdError::Tracker(TrackerError::RlapInvalidCostMatrix { .. })
            | AsdError::Tracker(TrackerError::RlapInfeasible)
            | AsdError::Tracker(TrackerError::RlapUnknown(_)) => RecoveryStrategy::Ignore,
            AsdError::Tracker(TrackerError::MissingEmbedding) => RecoveryStrategy::Ignore,
            AsdError::Score(_) => RecoveryStrategy::Ignore,
            AsdError::Fatal(_) | AsdError::ShutdownRequested => RecoveryStrategy::Fatal,
            AsdError::Transient(_) => RecoveryStrategy::Retry {
                max_attempts: 3,
                delay: Duration::from_millis(50),
            },
            _ => RecoveryStrategy::Restart,
        }
    }
}
