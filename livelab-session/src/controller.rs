use std::{fmt, time::Duration};

use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::config::ReconnectConfig;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Active,
    /// Waiting for or running the given reconnect attempt, counting from 1.
    Reconnecting { attempt: u32 },
    Closed,
}

impl ConnectionState {
    /// Pose updates are accepted and commands are sent only in this state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// States in which the frame loop runs.
    pub fn is_rendering(&self) -> bool {
        matches!(self, Self::Active | Self::Reconnecting { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::Active => f.write_str("active"),
            Self::Reconnecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlEvent {
    /// The session was created with valid parameters.
    Start,
    HandshakeSucceeded,
    /// A connection attempt failed or an established connection was lost.
    ConnectionLost { reason: String },
    /// The backend refused the session parameters.
    HandshakeRejected { reason: String },
    /// Explicit teardown.
    Close,
}

/// What the session driver has to do after a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Connect,
    Activate,
    Reconnect { attempt: u32, delay: Duration },
    /// Close after a terminal failure. Emitted at most once per controller.
    Fail { reason: String },
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub action: Action,
}

impl Transition {
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

/// State machine of a session connection.
///
/// Every state change is published on a watch channel.
#[derive(Debug)]
pub struct SessionController {
    state: watch::Sender<ConnectionState>,
    reconnect: ReconnectConfig,
    failure: Option<String>,
}

impl SessionController {
    pub fn new(reconnect: ReconnectConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            state,
            reconnect,
            failure: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    /// Reason of the terminal failure, if the session ended with one.
    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn handle(&mut self, event: ControlEvent) -> Transition {
        use ConnectionState::*;

        let from = self.state();
        let (to, action) = match (from, event) {
            (Closed, _) => (Closed, Action::None),
            (_, ControlEvent::Close) => (Closed, Action::Shutdown),
            (Idle, ControlEvent::Start) => (Connecting, Action::Connect),
            (Connecting | Reconnecting { .. }, ControlEvent::HandshakeSucceeded) => {
                (Active, Action::Activate)
            }
            (Connecting | Active, ControlEvent::ConnectionLost { reason }) => {
                info!("connection lost: {reason}");
                self.retry(1, &reason)
            }
            (Reconnecting { attempt }, ControlEvent::ConnectionLost { reason }) => {
                debug!("reconnect attempt {attempt} failed: {reason}");
                self.retry(attempt + 1, &reason)
            }
            (Connecting | Reconnecting { .. }, ControlEvent::HandshakeRejected { reason }) => {
                self.fail(format!("backend rejected the session: {reason}"))
            }
            (state, event) => {
                debug!("ignore {event:?} in state {state}");
                (state, Action::None)
            }
        };
        if to != from {
            info!("session state {from} -> {to}");
            self.state.send_replace(to);
        }
        Transition { from, to, action }
    }

    fn retry(&mut self, attempt: u32, reason: &str) -> (ConnectionState, Action) {
        if attempt > self.reconnect.max_attempts {
            return self.fail(format!(
                "gave up after {} reconnect attempts: {reason}",
                self.reconnect.max_attempts
            ));
        }
        (
            ConnectionState::Reconnecting { attempt },
            Action::Reconnect {
                attempt,
                delay: self.reconnect.backoff(attempt),
            },
        )
    }

    fn fail(&mut self, reason: String) -> (ConnectionState, Action) {
        if self.failure.is_some() {
            return (ConnectionState::Closed, Action::None);
        }
        error!("session failed: {reason}");
        self.failure = Some(reason.clone());
        (ConnectionState::Closed, Action::Fail { reason })
    }
}
