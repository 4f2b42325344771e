//! Targets and their terminal results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::action::Action;
use crate::error::ActionError;

/// One unit of orchestrated work: an id, an action and a deadline
#[derive(Clone)]
pub struct Target {
    id: String,
    action: Arc<dyn Action>,
    timeout: Duration,
}

impl Target {
    pub fn new(id: impl Into<String>, action: impl Action + 'static, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            action: Arc::new(action),
            timeout,
        }
    }

    /// Build a target around an action that is already shared
    pub fn from_shared(id: impl Into<String>, action: Arc<dyn Action>, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            action,
            timeout,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn action(&self) -> &dyn Action {
        self.action.as_ref()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Target")
            .field("id", &self.id)
            .field("action", &self.action.describe())
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Terminal status of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Failure,
    TimedOut,
    Cancelled,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::TimedOut => "timed_out",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            "timed_out" => Ok(Self::TimedOut),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown status: {other}")),
        }
    }
}

/// Why a `Failure` happened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Launch,
    Runtime,
}

/// The single terminal result recorded for a target in a run
///
/// Fields are read-only outside the engine: a result is never changed after
/// the executor hands it off.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetResult {
    pub(crate) target_id: String,
    pub(crate) status: Status,
    pub(crate) failure: Option<FailureKind>,
    pub(crate) output: Vec<String>,
    pub(crate) error: Option<String>,
    pub(crate) started_at: DateTime<Utc>,
    pub(crate) ended_at: DateTime<Utc>,
}

impl TargetResult {
    /// Result for a target that was never started because the run was cancelled
    pub fn cancelled_before_start(target_id: &str) -> Self {
        let now = Utc::now();
        Self {
            target_id: target_id.to_string(),
            status: Status::Cancelled,
            failure: None,
            output: Vec::new(),
            error: Some("cancelled before start".to_string()),
            started_at: now,
            ended_at: now,
        }
    }

    /// Result for a target whose executor or worker died without reporting
    pub fn lost(target_id: &str, started_at: DateTime<Utc>, reason: impl Into<String>) -> Self {
        Self {
            target_id: target_id.to_string(),
            status: Status::Failure,
            failure: Some(FailureKind::Runtime),
            output: Vec::new(),
            error: Some(reason.into()),
            started_at,
            ended_at: Utc::now(),
        }
    }

    pub fn target_id(&self) -> &str {
        &self.target_id
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }

    pub fn duration(&self) -> Duration {
        (self.ended_at - self.started_at).to_std().unwrap_or_default()
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// Output captured while a target runs; becomes a `TargetResult` exactly once
pub(crate) struct Capture {
    target_id: String,
    started_at: DateTime<Utc>,
    output: Vec<String>,
}

impl Capture {
    pub(crate) fn begin(target_id: &str) -> Self {
        Self {
            target_id: target_id.to_string(),
            started_at: Utc::now(),
            output: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, line: String) {
        self.output.push(line);
    }

    pub(crate) fn line_count(&self) -> usize {
        self.output.len()
    }

    fn seal(self, status: Status, failure: Option<FailureKind>, error: Option<String>) -> TargetResult {
        TargetResult {
            target_id: self.target_id,
            status,
            failure,
            output: self.output,
            error,
            started_at: self.started_at,
            ended_at: Utc::now(),
        }
    }

    pub(crate) fn succeeded(self) -> TargetResult {
        self.seal(Status::Success, None, None)
    }

    pub(crate) fn failed(self, err: ActionError) -> TargetResult {
        let kind = err.kind();
        self.seal(Status::Failure, Some(kind), Some(err.to_string()))
    }

    pub(crate) fn timed_out(self, after: Duration) -> TargetResult {
        let msg = format!("timed out after {after:?}");
        self.seal(Status::TimedOut, None, Some(msg))
    }

    pub(crate) fn cancelled(self) -> TargetResult {
        self.seal(Status::Cancelled, None, Some("cancelled".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            Status::Success,
            Status::Failure,
            Status::TimedOut,
            Status::Cancelled,
        ] {
            assert_eq!(status.as_str().parse::<Status>().unwrap(), status);
        }
        assert!("done".parse::<Status>().is_err());
    }

    #[test]
    fn test_capture_preserves_line_order() {
        let mut capture = Capture::begin("r1");
        capture.push("first".into());
        capture.push("second".into());
        assert_eq!(capture.line_count(), 2);

        let result = capture.succeeded();
        assert_eq!(result.output(), ["first", "second"]);
        assert_eq!(result.status(), Status::Success);
        assert!(result.error().is_none());
        assert!(result.ended_at() >= result.started_at());
    }

    #[test]
    fn test_launch_failure_keeps_kind_and_message() {
        let result = Capture::begin("r1").failed(ActionError::Launch("nope: not found".into()));
        assert_eq!(result.status(), Status::Failure);
        assert_eq!(result.failure(), Some(FailureKind::Launch));
        assert_eq!(result.error(), Some("launch failed: nope: not found"));
    }

    #[test]
    fn test_cancelled_before_start_has_no_output() {
        let result = TargetResult::cancelled_before_start("r9");
        assert_eq!(result.target_id(), "r9");
        assert_eq!(result.status(), Status::Cancelled);
        assert!(result.output().is_empty());
    }
}
