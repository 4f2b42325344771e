//! Error taxonomy for the engine
//!
//! Per-target failures (`ActionError`) are captured into results and never
//! abort a run. The remaining enums describe caller mistakes or broken
//! internal invariants and are returned as `Err`.

use std::path::PathBuf;
use thiserror::Error;

/// Failure of a single target's action
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    /// The action could not be started (binary missing, permission denied, connect refused)
    #[error("launch failed: {0}")]
    Launch(String),
    /// The action started but exited unsuccessfully or reported an error
    #[error("{0}")]
    Runtime(String),
}

impl ActionError {
    pub fn kind(&self) -> crate::target::FailureKind {
        match self {
            Self::Launch(_) => crate::target::FailureKind::Launch,
            Self::Runtime(_) => crate::target::FailureKind::Runtime,
        }
    }
}

/// Internal-consistency violations raised by the aggregator
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("duplicate result for target {0}")]
    DuplicateResult(String),
    #[error("run not complete: {collected} of {expected} results collected")]
    RunNotComplete { collected: usize, expected: usize },
}

/// Errors returned by the dispatcher before or after a run
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("target id {0} submitted more than once")]
    DuplicateTarget(String),
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
}

/// Errors writing or reading report sinks
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("report I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode report record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("malformed report record on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors building an argv from a command template
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unknown placeholder {{{0}}}")]
    UnknownPlaceholder(String),
    #[error("unterminated placeholder in {0:?}")]
    Unterminated(String),
    #[error("command template is empty")]
    Empty,
    #[error("no {kind} command configured for {platform}")]
    NoEntry { kind: String, platform: String },
    #[error("unknown command kind {0:?}")]
    UnknownKind(String),
}
