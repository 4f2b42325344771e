//! Device-session action — query a network device through an external transport
//!
//! The transport (connection, authentication, vendor RPCs) lives outside the
//! engine behind [`DeviceConnector`]. This adapter only drives the session
//! through connect → retrieve → close and guarantees the close.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::{debug, warn};

use super::{Action, Running};
use crate::error::ActionError;

/// Opens sessions to one device
#[async_trait]
pub trait DeviceConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn DeviceSession>, ActionError>;

    /// Device address for logs
    fn address(&self) -> String;
}

/// An open management session
#[async_trait]
pub trait DeviceSession: Send {
    /// Run the retrieval operation and return its textual output
    async fn retrieve(&mut self) -> Result<Vec<String>, ActionError>;

    async fn close(&mut self);
}

/// Adapts a connector into a target action
pub struct SessionAction<C> {
    connector: C,
}

impl<C: DeviceConnector> SessionAction<C> {
    pub fn new(connector: C) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl<C: DeviceConnector> Action for SessionAction<C> {
    async fn start(&self) -> Result<Box<dyn Running>, ActionError> {
        let session = self.connector.connect().await.map_err(|e| match e {
            ActionError::Runtime(msg) => ActionError::Launch(msg),
            launch => launch,
        })?;
        debug!("Connected to {}", self.connector.address());
        Ok(Box::new(RunningSession {
            address: self.connector.address(),
            session,
            pending: None,
            closed: false,
        }))
    }

    fn describe(&self) -> String {
        format!("session {}", self.connector.address())
    }
}

struct RunningSession {
    address: String,
    session: Box<dyn DeviceSession>,
    pending: Option<VecDeque<String>>,
    closed: bool,
}

#[async_trait]
impl Running for RunningSession {
    async fn next_line(&mut self) -> Result<Option<String>, ActionError> {
        if self.pending.is_none() {
            let lines = self.session.retrieve().await?;
            self.pending = Some(lines.into());
        }
        Ok(self.pending.as_mut().and_then(VecDeque::pop_front))
    }

    async fn wait(&mut self) -> Result<(), ActionError> {
        if !self.closed {
            self.session.close().await;
            self.closed = true;
        }
        Ok(())
    }

    async fn terminate(&mut self, grace: Duration) {
        if self.closed {
            return;
        }
        if tokio::time::timeout(grace, self.session.close()).await.is_err() {
            warn!("Session to {} did not close within {grace:?}, dropping it", self.address);
        }
        self.closed = true;
    }
}

impl Drop for RunningSession {
    fn drop(&mut self) {
        if !self.closed {
            debug!("Dropping unclosed session to {}", self.address);
        }
    }
}
