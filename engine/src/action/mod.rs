//! Action capability — how a target's work is started, streamed and stopped
//!
//! Two instantiations ship with the engine:
//! - [`CommandAction`]: a spawned OS command whose stdout/stderr are read line by line
//! - [`SessionAction`]: a device session opened through an external [`DeviceConnector`]

pub mod command;
pub mod session;

use async_trait::async_trait;
use std::time::Duration;

use crate::error::ActionError;

pub use command::CommandAction;
pub use session::{DeviceConnector, DeviceSession, SessionAction};

/// Something a target can run
#[async_trait]
pub trait Action: Send + Sync {
    /// Start the underlying work. Errors here are launch failures.
    async fn start(&self) -> Result<Box<dyn Running>, ActionError>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

/// A started action owned exclusively by one executor
#[async_trait]
pub trait Running: Send {
    /// Next output line, or `None` once the output stream has closed
    async fn next_line(&mut self) -> Result<Option<String>, ActionError>;

    /// Wait for the action to finish after its output closed
    async fn wait(&mut self) -> Result<(), ActionError>;

    /// Stop early: ask politely, then force after `grace`
    async fn terminate(&mut self, grace: Duration);
}
