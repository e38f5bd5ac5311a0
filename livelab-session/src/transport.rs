//! Message transport between a session and the control backend.

mod dummy;
mod websocket;

use std::time::Duration;

use async_trait::async_trait;
use auto_impl::auto_impl;
use tokio::{
    runtime,
    sync::{mpsc, oneshot},
    task::AbortHandle,
    time,
};
use tracing::debug;

pub use self::{dummy::DummyConnector, websocket::WebSocketConnector};
use crate::{
    error::{Error, Result},
    message::{Inbound, Outbound},
};

/// Opens connections to the backend.
#[async_trait]
#[auto_impl(Box, Arc)]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<Connection>;
}

/// Time a connection task gets to finish on its own after a close request
/// before it is aborted.
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// An open connection.
///
/// The inbound side ends when the connection is lost. Closing or dropping
/// the connection stops its background task.
#[derive(Debug)]
pub struct Connection {
    outbound: mpsc::UnboundedSender<Outbound>,
    inbound: mpsc::UnboundedReceiver<Inbound>,
    task: Option<AbortHandle>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Connection {
    pub fn new(
        outbound: mpsc::UnboundedSender<Outbound>,
        inbound: mpsc::UnboundedReceiver<Inbound>,
    ) -> Self {
        Self {
            outbound,
            inbound,
            task: None,
            shutdown: None,
        }
    }

    /// Attaches the task that drives the connection.
    ///
    /// On close, `shutdown` asks the task to finish, so it can say goodbye
    /// to the peer. Without `shutdown`, or if the task is still running after
    /// [`CLOSE_TIMEOUT`], it is aborted.
    pub fn with_task(mut self, task: AbortHandle, shutdown: Option<oneshot::Sender<()>>) -> Self {
        self.task = Some(task);
        self.shutdown = shutdown;
        self
    }

    /// Queues a message without waiting for it to be written.
    pub fn send(&self, message: Outbound) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| Error::transport("connection is closed"))
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<Outbound> {
        self.outbound.clone()
    }

    /// Next message, or `None` once the connection is lost.
    pub async fn recv(&mut self) -> Option<Inbound> {
        self.inbound.recv().await
    }

    pub fn close(&mut self) {
        self.inbound.close();
        let Some(task) = self.task.take() else {
            return;
        };
        debug!("close connection");
        let Some(shutdown) = self.shutdown.take() else {
            task.abort();
            return;
        };
        if shutdown.send(()).is_err() {
            // already finished
            return;
        }
        match runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    time::sleep(CLOSE_TIMEOUT).await;
                    task.abort();
                });
            }
            Err(_) => task.abort(),
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}
