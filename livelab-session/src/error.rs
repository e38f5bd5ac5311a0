use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error("livelab-session: Transport error : {}", message)]
    Transport { message: String },
    #[error("livelab-session: No message for {:?}", .0)]
    HeartbeatTimeout(Duration),
    #[error("livelab-session: Session setup error : {}", .0)]
    SessionSetup(String),
    #[error("livelab-session: Backend rejected session : {}", .0)]
    SessionRejected(String),
    #[error("livelab-session: Media access denied : {}", .0)]
    MediaAccessDenied(String),
    #[error("livelab-session: Session is closed")]
    SessionClosed,
    #[error("livelab-session: Protocol error : {}", .0)]
    Protocol(String),
    #[error("livelab-session: Backend error : {}", message)]
    Backend { message: String },
}

impl Error {
    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns true for errors that should move an active session to reconnecting.
    pub fn is_connection_loss(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::HeartbeatTimeout(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
