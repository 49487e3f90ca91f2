//! Error type shared by readers, controllers and the engine.

use std::path::PathBuf;

use crate::sim::SimTime;

pub type Result<T> = std::result::Result<T, SimError>;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid GraphML in {}: {reason}", path.display())]
    GraphMl { path: PathBuf, reason: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("resource function `{name}` not found in {}", dir.display())]
    ResourceFunctionNotFound { name: String, dir: PathBuf },

    #[error("trace record {index} at {time} precedes previous record at {prev}")]
    TraceOutOfOrder { index: usize, time: f64, prev: f64 },

    /// Invariant violation caused by an algorithm or by the engine itself; aborts the run.
    #[error("protocol violation at {at}: {reason}")]
    Protocol { at: SimTime, reason: String },

    /// Returned by coordinator callbacks; drops the flow being handled.
    #[error("algorithm error: {0}")]
    Algorithm(String),

    #[error("unknown flow `{0}`")]
    UnknownFlow(String),

    #[error("simulator not initialized")]
    NotInitialized,
}

impl SimError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SimError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn protocol(at: SimTime, reason: impl Into<String>) -> Self {
        SimError::Protocol {
            at,
            reason: reason.into(),
        }
    }
}
