//! The closed set of error kinds the engine can surface.

use std::fmt;

/// The status a foreign component returned from a lifecycle call that the engine treats as
/// unrecoverable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForeignStatus {
    Error,
    Fatal,
    SpuriousDiscard,
}

impl fmt::Display for ForeignStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ForeignStatus::Error => write!(f, "error"),
            ForeignStatus::Fatal => write!(f, "fatal"),
            ForeignStatus::SpuriousDiscard => write!(f, "spurious discard"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    ConfigInvalid(String),

    #[error("type mismatch connecting {source} -> {sink}")]
    TypeMismatch { source: String, sink: String },

    #[error("channel {sink} already has a source ({existing}), cannot also connect {new}")]
    MultipleSources {
        sink: String,
        existing: String,
        new: String,
    },

    #[error("unknown variable '{name}' on component '{component}'")]
    UnknownVariable { component: String, name: String },

    #[error("component '{component}' reported {status} during {phase}")]
    ForeignFailure {
        component: String,
        phase: String,
        status: ForeignStatus,
    },

    #[error("component '{component}' exceeded its time budget during {phase}")]
    ForeignTimeout { component: String, phase: String },

    #[error("initialization loop for group {group} failed to converge within {iterations} iterations")]
    InitialLoopDiverged { group: usize, iterations: usize },

    #[error("step loop for group {group} failed to converge at t={time} within {iterations} iterations")]
    StepLoopDiverged {
        group: usize,
        time: f64,
        iterations: usize,
    },

    #[error("non-finite value produced on channel '{channel}' at t={time}")]
    NonFinite { channel: String, time: f64 },

    #[error("run cancelled at t={time}")]
    Cancelled { time: f64 },

    #[error(transparent)]
    IOFailure(#[from] std::io::Error),

    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Schema(#[from] cosim_schema::Error),

    #[error(transparent)]
    LibLoading(#[from] libloading::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
