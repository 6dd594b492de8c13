use thiserror::Error;

use crate::graph::NodeId;

/// Errors raised inside the engine.
///
/// The facade in [`crate::engine`] logs and swallows most of these so a UI
/// event is never rejected; they are surfaced from lower-level APIs so
/// callers that care (tests, the native driver) can inspect them.
#[derive(Debug, Error)]
pub enum RositaError {
    #[error("graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("unknown drum type '{0}'")]
    UnknownDrum(String),

    #[error("unknown effect '{0}'")]
    UnknownEffect(String),

    #[error("unknown parameter '{param}' for {target}")]
    UnknownParam { target: String, param: String },

    #[error("invalid value {value} for {param}")]
    InvalidValue { param: String, value: f64 },

    #[error("pattern slot {slot} out of range (0..{count})")]
    InvalidSlot { slot: usize, count: usize },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("wav export failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("midi export failed: {0}")]
    Midi(#[from] std::io::Error),
}

/// Failures reported by an [`crate::graph::AudioGraph`] implementation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    #[error("node {0:?} does not exist or was released")]
    UnknownNode(NodeId),

    #[error("node {0:?} has no parameter {1}")]
    NoSuchParam(NodeId, &'static str),

    #[error("node {0:?} is not a source")]
    NotASource(NodeId),

    #[error("source {0:?} was already started")]
    AlreadyStarted(NodeId),

    #[error("audio context is closed")]
    Closed,

    #[error("audio context could not be resumed")]
    ResumeFailed,
}

pub type Result<T> = std::result::Result<T, RositaError>;
