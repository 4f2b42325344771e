//! Integration tests for the netsweep engine
//!
//! End-to-end runs through the public API: dispatcher → executor →
//! aggregator → report sink, against real child processes.

#![cfg(unix)]

use std::fs;
use std::io::BufReader;
use std::time::{Duration, Instant};

use netsweep_engine::report::{read_report, write_report_file};
use async_trait::async_trait;
use netsweep_engine::{
    ActionError, CommandAction, CommandKind, CommandTable, DeviceConnector, DeviceSession,
    Dispatcher, Executor, FailureKind, Platform, SessionAction, Status, Target, TemplateVars,
};

fn sh(id: &str, script: &str, timeout: Duration) -> Target {
    Target::new(id, CommandAction::new("sh", ["-c", script]), timeout)
}

// ============================================================================
// Partial failure
// ============================================================================

#[tokio::test]
async fn test_launch_failure_is_reported_not_raised() {
    let targets = vec![
        sh("alpha", "echo alpha up", Duration::from_secs(10)),
        Target::new(
            "bravo",
            CommandAction::new("netsweep-missing-diagnostic", ["bravo"]),
            Duration::from_secs(10),
        ),
        sh("charlie", "echo charlie up", Duration::from_secs(10)),
    ];

    let report = Dispatcher::new(Executor::default())
        .with_max_parallel(2)
        .run(targets)
        .await
        .unwrap();

    assert_eq!(report.total(), 3);
    assert_eq!(report.succeeded(), 2);
    assert_eq!(report.failed(), 1);
    let bravo = report.get("bravo").unwrap();
    assert_eq!(bravo.status(), Status::Failure);
    assert_eq!(bravo.failure(), Some(FailureKind::Launch));
    assert!(bravo.error().unwrap().contains("command not found"));
    assert_eq!(report.exit_code(), 1);
}

// ============================================================================
// Timeouts
// ============================================================================

#[tokio::test]
async fn test_hanging_target_times_out_and_others_complete() {
    let grace = Duration::from_millis(500);
    let timeout = Duration::from_secs(2);
    let mut targets: Vec<_> = (0..4)
        .map(|i| sh(&format!("host{i}"), "echo reply", timeout))
        .collect();
    targets.push(sh("hang", "echo waiting; sleep 60", timeout));

    let started = Instant::now();
    let report = Dispatcher::new(Executor::new(grace))
        .run(targets)
        .await
        .unwrap();
    let elapsed = started.elapsed();

    assert_eq!(report.total(), 5);
    assert_eq!(report.succeeded(), 4);
    let hang = report.get("hang").unwrap();
    assert_eq!(hang.status(), Status::TimedOut);
    assert_eq!(hang.output(), ["waiting"]);
    // Deadline plus grace, with slack for a loaded machine
    assert!(elapsed < timeout + grace + Duration::from_secs(2), "{elapsed:?}");
}

#[tokio::test]
async fn test_timed_out_process_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let pidfile = dir.path().join("pid");
    let script = format!("echo $$ > {}; sleep 60", pidfile.display());

    let report = Dispatcher::new(Executor::new(Duration::from_millis(200)))
        .run(vec![sh("stuck", &script, Duration::from_millis(500))])
        .await
        .unwrap();
    assert_eq!(report.get("stuck").unwrap().status(), Status::TimedOut);

    let pid: i32 = fs::read_to_string(&pidfile).unwrap().trim().parse().unwrap();
    let alive = nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None);
    assert_eq!(alive, Err(nix::errno::Errno::ESRCH));
}

// ============================================================================
// Exactly-once accounting
// ============================================================================

#[tokio::test]
async fn test_result_count_matches_submissions() {
    for n in [1usize, 5, 17] {
        let targets: Vec<_> = (0..n)
            .map(|i| {
                let script = if i % 3 == 0 { "exit 1" } else { "echo ok" };
                sh(&format!("t{i}"), script, Duration::from_secs(10))
            })
            .collect();

        let mut observed = 0;
        let report = Dispatcher::new(Executor::default())
            .with_max_parallel(4)
            .run_with_observer(targets, |_| observed += 1)
            .await
            .unwrap();

        assert_eq!(report.total(), n);
        assert_eq!(report.results().len(), n);
        assert_eq!(observed, n);
        assert_eq!(report.succeeded() + report.failed(), n);
    }
}

#[tokio::test]
async fn test_strategy_table_builds_runnable_targets() {
    let mut table = CommandTable::builtin();
    table.insert(
        CommandKind::Ping,
        Platform::Unix,
        vec!["echo".into(), "probe".into(), "{target}".into()],
    );

    let targets: Vec<_> = ["192.0.2.1", "192.0.2.2"]
        .into_iter()
        .map(|host| {
            let vars = TemplateVars::from([("target".to_string(), host.to_string())]);
            let argv = table.argv(CommandKind::Ping, Platform::Unix, &vars).unwrap();
            Target::new(host, CommandAction::from_argv(argv).unwrap(), Duration::from_secs(5))
        })
        .collect();

    let report = Dispatcher::new(Executor::default()).run(targets).await.unwrap();
    assert!(report.all_succeeded());
    assert_eq!(report.get("192.0.2.2").unwrap().output(), ["probe 192.0.2.2"]);
}

// ============================================================================
// Device sessions
// ============================================================================

/// Stands in for a management-protocol client
struct Router {
    host: &'static str,
    reachable: bool,
    stall: bool,
}

struct RouterSession {
    host: &'static str,
    stall: bool,
}

#[async_trait]
impl DeviceConnector for Router {
    async fn connect(&self) -> Result<Box<dyn DeviceSession>, ActionError> {
        if !self.reachable {
            return Err(ActionError::Runtime(format!("{}: connection timed out", self.host)));
        }
        Ok(Box::new(RouterSession {
            host: self.host,
            stall: self.stall,
        }))
    }

    fn address(&self) -> String {
        format!("{}:830", self.host)
    }
}

#[async_trait]
impl DeviceSession for RouterSession {
    async fn retrieve(&mut self) -> Result<Vec<String>, ActionError> {
        if self.stall {
            tokio::time::sleep(Duration::from_secs(60)).await;
        }
        Ok(vec![
            format!("{} peer 192.0.2.1 Established", self.host),
            format!("{} peer 192.0.2.2 Idle", self.host),
        ])
    }

    async fn close(&mut self) {}
}

#[tokio::test]
async fn test_device_sessions_best_effort() {
    let device = |host: &'static str, reachable: bool, stall: bool| {
        Target::new(
            host,
            SessionAction::new(Router {
                host,
                reachable,
                stall,
            }),
            Duration::from_millis(500),
        )
    };
    let report = Dispatcher::new(Executor::new(Duration::from_millis(100)))
        .run(vec![
            device("r1.dc1", true, false),
            device("r2.dc1", false, false),
            device("r3.dc1", true, true),
        ])
        .await
        .unwrap();

    assert_eq!(report.total(), 3);
    let r1 = report.get("r1.dc1").unwrap();
    assert_eq!(r1.status(), Status::Success);
    assert_eq!(r1.output().len(), 2);

    let r2 = report.get("r2.dc1").unwrap();
    assert_eq!(r2.failure(), Some(FailureKind::Launch));
    assert!(r2.error().unwrap().contains("connection timed out"));

    assert_eq!(report.get("r3.dc1").unwrap().status(), Status::TimedOut);
}

// ============================================================================
// Report sink
// ============================================================================

#[tokio::test]
async fn test_report_file_round_trip() {
    let targets = vec![
        sh("ok", "echo fine", Duration::from_secs(10)),
        sh("bad", "echo broken >&2; exit 4", Duration::from_secs(10)),
        sh("slow", "sleep 60", Duration::from_millis(300)),
    ];
    let report = Dispatcher::new(Executor::new(Duration::from_millis(200)))
        .run(targets)
        .await
        .unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("run.jsonl");
    write_report_file(&report, &path).unwrap();

    let records = read_report(BufReader::new(fs::File::open(&path).unwrap())).unwrap();
    let mut written: Vec<_> = records.iter().map(|r| (r.id.as_str(), r.status)).collect();
    written.sort_by_key(|(id, _)| *id);
    assert_eq!(
        written,
        [
            ("bad", Status::Failure),
            ("ok", Status::Success),
            ("slow", Status::TimedOut)
        ]
    );
    let bad = records.iter().find(|r| r.id == "bad").unwrap();
    assert_eq!(bad.lines, 1);
    assert!(bad.error.as_deref().unwrap().contains("exit status: 4"));
}
