use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::{sync::mpsc, task::AbortHandle};

use super::{Connection, Connector};
use crate::{
    error::{Error, Result},
    message::{Inbound, Outbound, SessionStarted},
};

/// Dummy backend for debug or tests.
///
/// Answers `begin_session` with [`handshake`](Self::handshake) and echoes
/// heartbeats while [`echo_heartbeat`](Self::echo_heartbeat) is set. Clones
/// share the same state.
#[derive(Debug, Clone)]
pub struct DummyConnector {
    /// Refuse new connections.
    pub refuse: Arc<Mutex<bool>>,
    /// Reply to `begin_session`; `None` leaves the handshake unanswered.
    pub handshake: Arc<Mutex<Option<SessionStarted>>>,
    pub echo_heartbeat: Arc<Mutex<bool>>,
    /// Every message received by the backend, in order.
    pub received: Arc<Mutex<Vec<Outbound>>>,
    pub num_connects: Arc<Mutex<usize>>,
    links: Arc<Mutex<Vec<DummyLink>>>,
}

#[derive(Debug)]
struct DummyLink {
    inbound: mpsc::UnboundedSender<Inbound>,
    task: AbortHandle,
}

impl Default for DummyConnector {
    fn default() -> Self {
        Self {
            refuse: Arc::default(),
            handshake: Arc::new(Mutex::new(Some(SessionStarted {
                success: true,
                message: "Teleoperation started".to_owned(),
            }))),
            echo_heartbeat: Arc::new(Mutex::new(true)),
            received: Arc::default(),
            num_connects: Arc::default(),
            links: Arc::default(),
        }
    }
}

impl DummyConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_refuse(&self, refuse: bool) {
        *self.refuse.lock().unwrap() = refuse;
    }

    pub fn set_echo_heartbeat(&self, echo: bool) {
        *self.echo_heartbeat.lock().unwrap() = echo;
    }

    pub fn set_handshake(&self, handshake: Option<SessionStarted>) {
        *self.handshake.lock().unwrap() = handshake;
    }

    /// Sends a message on the newest open connection.
    ///
    /// Returns false if there is no open connection.
    pub fn push(&self, message: Inbound) -> bool {
        self.links
            .lock()
            .unwrap()
            .last()
            .is_some_and(|link| link.inbound.send(message).is_ok())
    }

    /// Drops every open connection from the backend side.
    pub fn disconnect(&self) {
        for link in self.links.lock().unwrap().drain(..) {
            link.task.abort();
        }
    }

    pub fn received(&self) -> Vec<Outbound> {
        self.received.lock().unwrap().clone()
    }

    pub fn num_connects(&self) -> usize {
        *self.num_connects.lock().unwrap()
    }
}

#[async_trait]
impl Connector for DummyConnector {
    async fn connect(&self) -> Result<Connection> {
        *self.num_connects.lock().unwrap() += 1;
        if *self.refuse.lock().unwrap() {
            return Err(Error::transport("connection refused"));
        }
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let backend = self.clone();
        let reply = inbound_tx.clone();
        let task = tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let answer = match &message {
                    Outbound::BeginSession(_) => backend
                        .handshake
                        .lock()
                        .unwrap()
                        .clone()
                        .map(Inbound::SessionStarted),
                    Outbound::Heartbeat if *backend.echo_heartbeat.lock().unwrap() => {
                        Some(Inbound::Heartbeat)
                    }
                    _ => None,
                };
                backend.received.lock().unwrap().push(message);
                if let Some(answer) = answer {
                    if reply.send(answer).is_err() {
                        break;
                    }
                }
            }
        });

        self.links.lock().unwrap().push(DummyLink {
            inbound: inbound_tx,
            task: task.abort_handle(),
        });
        Ok(Connection::new(outbound_tx, inbound_rx).with_task(task.abort_handle(), None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_dummy_handshake_and_heartbeat() {
        let connector = DummyConnector::new();
        let mut connection = connector.connect().await.unwrap();
        connection.send(Outbound::Heartbeat).unwrap();
        assert_eq!(connection.recv().await, Some(Inbound::Heartbeat));
        connection
            .send(Outbound::BeginSession(Default::default()))
            .unwrap();
        assert!(matches!(
            connection.recv().await,
            Some(Inbound::SessionStarted(SessionStarted { success: true, .. }))
        ));
        assert!(connector.push(Inbound::Heartbeat));
        assert_eq!(connection.recv().await, Some(Inbound::Heartbeat));
        assert_eq!(connector.received().len(), 2);
    }

    #[tokio::test]
    async fn test_dummy_disconnect() {
        let connector = DummyConnector::new();
        let mut connection = connector.connect().await.unwrap();
        connector.disconnect();
        assert_eq!(connection.recv().await, None);
        assert!(!connector.push(Inbound::Heartbeat));

        connector.set_refuse(true);
        assert!(connector.connect().await.unwrap_err().is_connection_loss());
        assert_eq!(connector.num_connects(), 2);
    }
}
