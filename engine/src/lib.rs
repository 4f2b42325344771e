//! netsweep engine — concurrent multi-target command execution
//!
//! Runs diagnostic commands or device queries across many targets with a
//! bounded worker pool, per-target timeouts and cooperative cancellation,
//! and aggregates every target's outcome into one run report.

pub mod action;
pub mod aggregator;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod report;
pub mod strategy;
pub mod target;

pub use action::{Action, CommandAction, DeviceConnector, DeviceSession, Running, SessionAction};
pub use aggregator::{Aggregator, RunReport};
pub use dispatcher::{Dispatcher, DEFAULT_MAX_PARALLEL};
pub use error::{ActionError, AggregateError, DispatchError, ReportError, TemplateError};
pub use executor::{Executor, DEFAULT_GRACE};
pub use report::ReportRecord;
pub use strategy::{CommandKind, CommandTable, Platform, TemplateVars};
pub use target::{FailureKind, Status, Target, TargetResult};

pub use tokio_util::sync::CancellationToken;
