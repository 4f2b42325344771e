//! Target executor
//!
//! Runs one target to exactly one terminal result. Every wait is a race
//! between cancellation, the target deadline and the action itself:
//! launch → stream lines → wait for exit. Nothing here returns an error;
//! every failure is folded into the result.

use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::action::Running;
use crate::target::{Capture, Target, TargetResult};

/// Default time a terminated action gets before it is killed
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Extra time allowed on top of the grace period for the kill itself
const KILL_ALLOWANCE: Duration = Duration::from_secs(1);

/// Stand-in deadline for timeouts too large to add to the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// What ended one round of waiting
enum Step<T> {
    Cancelled,
    TimedOut,
    Ready(T),
}

/// Runs individual targets
#[derive(Debug, Clone)]
pub struct Executor {
    grace: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_GRACE)
    }
}

impl Executor {
    pub fn new(grace: Duration) -> Self {
        Self { grace }
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Execute a target until it finishes, times out or is cancelled
    pub async fn execute(&self, target: &Target, cancel: &CancellationToken) -> TargetResult {
        let mut capture = Capture::begin(target.id());
        if cancel.is_cancelled() {
            return capture.cancelled();
        }

        let deadline = tokio::time::sleep_until(deadline_after(target.timeout()));
        tokio::pin!(deadline);

        debug!("[{}] launching {}", target.id(), target.action().describe());
        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            _ = &mut deadline => Step::TimedOut,
            started = target.action().start() => Step::Ready(started),
        };
        let mut running = match step {
            Step::Cancelled => return capture.cancelled(),
            Step::TimedOut => return capture.timed_out(target.timeout()),
            Step::Ready(Err(e)) => {
                warn!("[{}] {e}", target.id());
                return capture.failed(e);
            }
            Step::Ready(Ok(running)) => running,
        };

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Cancelled,
                _ = &mut deadline => Step::TimedOut,
                line = running.next_line() => Step::Ready(line),
            };
            match step {
                Step::Cancelled => {
                    self.stop(target, running.as_mut()).await;
                    info!("[{}] cancelled after {} lines", target.id(), capture.line_count());
                    return capture.cancelled();
                }
                Step::TimedOut => {
                    self.stop(target, running.as_mut()).await;
                    warn!("[{}] timed out after {:?}", target.id(), target.timeout());
                    return capture.timed_out(target.timeout());
                }
                Step::Ready(Ok(Some(line))) => capture.push(line),
                Step::Ready(Ok(None)) => break,
                Step::Ready(Err(e)) => {
                    self.stop(target, running.as_mut()).await;
                    return capture.failed(e);
                }
            }
        }

        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => Step::Cancelled,
            _ = &mut deadline => Step::TimedOut,
            outcome = running.wait() => Step::Ready(outcome),
        };
        match step {
            Step::Cancelled => {
                self.stop(target, running.as_mut()).await;
                capture.cancelled()
            }
            Step::TimedOut => {
                self.stop(target, running.as_mut()).await;
                warn!("[{}] timed out waiting for exit", target.id());
                capture.timed_out(target.timeout())
            }
            Step::Ready(Ok(())) => {
                debug!("[{}] succeeded with {} lines", target.id(), capture.line_count());
                capture.succeeded()
            }
            Step::Ready(Err(e)) => {
                debug!("[{}] {e}", target.id());
                capture.failed(e)
            }
        }
    }

    /// Terminate with a bounded wait; a stuck terminate is abandoned and the
    /// handle dropped, which kills what is left
    async fn stop(&self, target: &Target, running: &mut dyn Running) {
        let bound = self.grace + KILL_ALLOWANCE;
        if tokio::time::timeout(bound, running.terminate(self.grace))
            .await
            .is_err()
        {
            warn!("[{}] terminate did not finish within {bound:?}", target.id());
        }
    }
}

fn deadline_after(timeout: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(timeout)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::action::CommandAction;
    use crate::target::{FailureKind, Status};

    fn target(id: &str, script: &str, timeout: Duration) -> Target {
        Target::new(id, CommandAction::new("sh", ["-c", script]), timeout)
    }

    #[tokio::test]
    async fn test_success_captures_output() {
        let exec = Executor::default();
        let result = exec
            .execute(
                &target("t1", "echo a; echo b", Duration::from_secs(5)),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.status(), Status::Success);
        assert_eq!(result.output(), ["a", "b"]);
        assert_eq!(result.target_id(), "t1");
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_runtime_failure_with_output() {
        let exec = Executor::default();
        let result = exec
            .execute(
                &target("t1", "echo unreachable; exit 2", Duration::from_secs(5)),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.status(), Status::Failure);
        assert_eq!(result.failure(), Some(FailureKind::Runtime));
        assert_eq!(result.output(), ["unreachable"]);
        assert!(result.error().unwrap().contains("exit status: 2"));
    }

    #[tokio::test]
    async fn test_huge_timeout_does_not_overflow() {
        let result = Executor::default()
            .execute(
                &target("t1", "echo ok", Duration::from_secs(u64::MAX)),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.status(), Status::Success);
        assert_eq!(result.output(), ["ok"]);
    }

    #[test]
    fn test_deadline_after_saturates() {
        let before = Instant::now();
        assert!(deadline_after(Duration::MAX) > before + Duration::from_secs(86_400 * 365));
        assert!(deadline_after(Duration::from_secs(1)) <= Instant::now() + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_missing_binary_is_launch_failure() {
        let exec = Executor::default();
        let t = Target::new(
            "t1",
            CommandAction::new("netsweep-no-such-tool", ["x"]),
            Duration::from_secs(5),
        );
        let result = exec.execute(&t, &CancellationToken::new()).await;
        assert_eq!(result.status(), Status::Failure);
        assert_eq!(result.failure(), Some(FailureKind::Launch));
        assert!(result.error().unwrap().contains("command not found"));
    }

    #[tokio::test]
    async fn test_timeout_keeps_partial_output() {
        let exec = Executor::new(Duration::from_millis(200));
        let started = std::time::Instant::now();
        let result = exec
            .execute(
                &target("t1", "echo first; sleep 30", Duration::from_millis(300)),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(result.status(), Status::TimedOut);
        assert_eq!(result.output(), ["first"]);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_cancel_before_execute_never_launches() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let script = format!("touch {}", marker.display());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = Executor::default()
            .execute(&target("t1", &script, Duration::from_secs(5)), &cancel)
            .await;
        assert_eq!(result.status(), Status::Cancelled);
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_cancel_mid_stream_preserves_output() {
        let exec = Executor::new(Duration::from_millis(200));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let result = exec
            .execute(&target("t1", "echo up; sleep 30", Duration::from_secs(30)), &cancel)
            .await;
        assert_eq!(result.status(), Status::Cancelled);
        assert_eq!(result.output(), ["up"]);
    }
}
