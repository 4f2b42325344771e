//! Process-backed action — spawn a command and stream its combined output

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::{Action, Running};
use crate::error::{ActionError, TemplateError};

/// Lines buffered between the pipe readers and the executor
const LINE_BUFFER: usize = 256;

/// An OS command run as a target action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAction {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
}

impl CommandAction {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            envs: Vec::new(),
        }
    }

    /// Build from a full argv (program first)
    pub fn from_argv(argv: Vec<String>) -> Result<Self, TemplateError> {
        let mut parts = argv.into_iter();
        let program = parts.next().ok_or(TemplateError::Empty)?;
        if program.is_empty() {
            return Err(TemplateError::Empty);
        }
        Ok(Self::new(program, parts))
    }

    /// Add an environment variable for the child
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }
}

#[async_trait]
impl Action for CommandAction {
    async fn start(&self) -> Result<Box<dyn Running>, ActionError> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // Own process group so termination reaches anything the command forks
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| launch_error(&self.program, e))?;
        let pgid = child.id();
        debug!("Spawned {} (pid {:?})", self.describe(), pgid);

        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        let mut readers = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            readers.push(spawn_line_reader(stdout, tx.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(spawn_line_reader(stderr, tx.clone()));
        }
        drop(tx);

        Ok(Box::new(RunningCommand {
            program: self.program.clone(),
            child,
            pgid,
            lines: rx,
            readers,
            reaped: false,
        }))
    }

    fn describe(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

fn launch_error(program: &str, err: std::io::Error) -> ActionError {
    let msg = match err.kind() {
        std::io::ErrorKind::NotFound => format!("{program}: command not found"),
        std::io::ErrorKind::PermissionDenied => format!("{program}: permission denied"),
        _ => format!("{program}: {err}"),
    };
    ActionError::Launch(msg)
}

/// Forward one pipe into the merged line channel
fn spawn_line_reader<R>(reader: R, tx: mpsc::Sender<String>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    if tx.send(decode_line(&buf)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!("Output reader stopped: {e}");
                    break;
                }
            }
        }
    })
}

/// Strip the line terminator and decode lossily (whois servers love latin-1)
fn decode_line(raw: &[u8]) -> String {
    let line = raw.strip_suffix(b"\n").unwrap_or(raw);
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}

/// A spawned command, owned by exactly one executor
struct RunningCommand {
    program: String,
    child: Child,
    pgid: Option<u32>,
    lines: mpsc::Receiver<String>,
    readers: Vec<JoinHandle<()>>,
    reaped: bool,
}

impl RunningCommand {
    #[cfg(unix)]
    fn signal_group(&self, signal: nix::sys::signal::Signal) {
        let Some(pgid) = self.pgid else { return };
        let pgid = nix::unistd::Pid::from_raw(pgid as i32);
        match nix::sys::signal::killpg(pgid, signal) {
            Ok(()) | Err(nix::errno::Errno::ESRCH) => {}
            Err(e) => warn!("Failed to send {signal} to {} group: {e}", self.program),
        }
    }

    async fn force_kill(&mut self) {
        #[cfg(unix)]
        self.signal_group(nix::sys::signal::Signal::SIGKILL);
        if !self.reaped {
            if let Err(e) = self.child.kill().await {
                debug!("Kill of {} reported: {e}", self.program);
            }
            self.reaped = true;
        }
        for reader in self.readers.drain(..) {
            reader.abort();
        }
    }
}

#[async_trait]
impl Running for RunningCommand {
    async fn next_line(&mut self) -> Result<Option<String>, ActionError> {
        Ok(self.lines.recv().await)
    }

    async fn wait(&mut self) -> Result<(), ActionError> {
        let status = self
            .child
            .wait()
            .await
            .map_err(|e| ActionError::Runtime(format!("failed to wait for {}: {e}", self.program)))?;
        self.reaped = true;

        // Background jobs left in the group die with the leader
        #[cfg(unix)]
        self.signal_group(nix::sys::signal::Signal::SIGKILL);

        if status.success() {
            Ok(())
        } else {
            Err(ActionError::Runtime(format!("{} exited with {status}", self.program)))
        }
    }

    async fn terminate(&mut self, grace: Duration) {
        if !self.reaped {
            #[cfg(unix)]
            self.signal_group(nix::sys::signal::Signal::SIGTERM);
            #[cfg(not(unix))]
            let _ = self.child.start_kill();

            match tokio::time::timeout(grace, self.child.wait()).await {
                Ok(Ok(status)) => {
                    debug!("{} stopped with {status}", self.program);
                    self.reaped = true;
                }
                Ok(Err(e)) => warn!("Failed to wait for {} after SIGTERM: {e}", self.program),
                Err(_) => warn!(
                    "{} still running {grace:?} after SIGTERM, killing",
                    self.program
                ),
            }
        }
        // Sweep the group even when the leader already exited
        self.force_kill().await;
    }
}

impl Drop for RunningCommand {
    fn drop(&mut self) {
        for reader in &self.readers {
            reader.abort();
        }
        #[cfg(unix)]
        self.signal_group(nix::sys::signal::Signal::SIGKILL);
    }
}
