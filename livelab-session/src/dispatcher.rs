use tokio::sync::mpsc;
use tracing::debug;

use crate::{
    error::{Error, Result},
    message::{Command, Outbound},
};

/// Sends operator commands to the backend without waiting for delivery.
///
/// While the session is not active only the most recent command is kept; it
/// is sent once when the session becomes active again.
#[derive(Debug, Default)]
pub struct CommandDispatcher {
    outbound: Option<mpsc::UnboundedSender<Outbound>>,
    pending: Option<Command>,
    closed: bool,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(&mut self, command: Command) -> Result<()> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        let Some(outbound) = &self.outbound else {
            self.hold(command);
            return Ok(());
        };
        if let Err(e) = outbound.send(Outbound::Command { command }) {
            self.outbound = None;
            if let Outbound::Command { command } = e.0 {
                self.hold(command);
            }
            return Err(Error::transport("outbound channel is closed"));
        }
        Ok(())
    }

    fn hold(&mut self, command: Command) {
        if let Some(dropped) = self.pending.replace(command) {
            debug!("drop pending command {dropped:?}");
        }
    }

    /// Starts sending on `outbound` and flushes the pending command, if any.
    pub fn activate(&mut self, outbound: mpsc::UnboundedSender<Outbound>) -> Result<()> {
        if self.closed {
            return Err(Error::SessionClosed);
        }
        self.outbound = Some(outbound);
        match self.pending.take() {
            Some(command) => {
                debug!("flush pending command {command:?}");
                self.send(command)
            }
            None => Ok(()),
        }
    }

    /// Stops sending. Later commands are held until [`activate`](Self::activate).
    pub fn suspend(&mut self) {
        self.outbound = None;
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.outbound = None;
        self.pending = None;
    }

    pub fn pending(&self) -> Option<&Command> {
        self.pending.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.outbound.is_some()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::message::RecordingControl;

    #[test]
    fn test_send_while_active() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.activate(tx).unwrap();
        dispatcher.send(Command::StartTeleoperation).unwrap();
        dispatcher.send(Command::StopTeleoperation).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Command {
                command: Command::StartTeleoperation
            }
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Command {
                command: Command::StopTeleoperation
            }
        );
    }

    #[test]
    fn test_only_latest_pending_command_is_flushed() {
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.send(Command::StartTeleoperation).unwrap();
        let targets = Command::JointTargets {
            joints: BTreeMap::from([("Pitch".to_owned(), 0.2)]),
        };
        dispatcher.send(targets.clone()).unwrap();
        assert_eq!(dispatcher.pending(), Some(&targets));

        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.activate(tx).unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            Outbound::Command { command: targets }
        );
        assert!(rx.try_recv().is_err());
        assert!(dispatcher.pending().is_none());
    }

    #[test]
    fn test_suspend_holds_commands() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.activate(tx.clone()).unwrap();
        dispatcher.suspend();
        assert!(!dispatcher.is_active());
        dispatcher
            .send(Command::Recording {
                control: RecordingControl::ExitEarly,
            })
            .unwrap();
        assert!(rx.try_recv().is_err());
        dispatcher.activate(tx).unwrap();
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_send_failure_is_transport_error() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.activate(tx).unwrap();
        let err = dispatcher.send(Command::StopTeleoperation).unwrap_err();
        assert!(err.is_connection_loss());
        assert_eq!(dispatcher.pending(), Some(&Command::StopTeleoperation));
    }

    #[test]
    fn test_closed_rejects_commands() {
        let mut dispatcher = CommandDispatcher::new();
        dispatcher.send(Command::StartTeleoperation).unwrap();
        dispatcher.close();
        assert!(dispatcher.pending().is_none());
        assert!(matches!(
            dispatcher.send(Command::StopTeleoperation),
            Err(Error::SessionClosed)
        ));
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(dispatcher.activate(tx), Err(Error::SessionClosed)));
    }
}
