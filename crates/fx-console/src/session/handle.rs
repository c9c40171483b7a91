//! Client interface for the session actor.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Channel errors are mapped to `SessionError::ChannelClosed`

use std::time::Duration;

use fx_core::SessionSnapshot;
use fx_protocol::ServerCommand;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

use super::commands::{SessionCommand, SessionError, SessionEvent};

/// Cheap-to-clone handle to the session actor.
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionCommand>,
    event_sender: broadcast::Sender<SessionEvent>,
}

impl SessionHandle {
    pub fn new(
        sender: mpsc::Sender<SessionCommand>,
        event_sender: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            sender,
            event_sender,
        }
    }

    /// Sends `command` to the daemon, applying its state effect.
    ///
    /// Returns as soon as the message is sent; the daemon's answer arrives
    /// later through the reply listener.
    pub async fn execute(&self, command: ServerCommand) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();

        self.sender
            .send(SessionCommand::Execute {
                command,
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;

        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    /// Aborts the open session, waits `delay`, then opens it again.
    ///
    /// The name is captured before `abort` is sent, so the reopen does not
    /// depend on the abort's reply. The wait is fixed: if the daemon needs
    /// longer to close, the `open` races it.
    ///
    /// # Errors
    ///
    /// - `SessionError::NoSession` if no session is open
    /// - `SessionError::Send` if either message fails to send
    /// - `SessionError::ChannelClosed` if the actor has shut down
    pub async fn reload(&self, delay: Duration) -> Result<SessionSnapshot, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::BeginReload { respond_to: tx })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        let name = rx.await.map_err(|_| SessionError::ChannelClosed)??;

        tokio::time::sleep(delay).await;

        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SessionCommand::FinishReload {
                name,
                respond_to: tx,
            })
            .await
            .map_err(|_| SessionError::ChannelClosed)?;
        rx.await.map_err(|_| SessionError::ChannelClosed)?
    }

    /// Current state, or a closed snapshot if the actor is gone.
    pub async fn snapshot(&self) -> SessionSnapshot {
        let (tx, rx) = oneshot::channel();

        if self
            .sender
            .send(SessionCommand::GetSnapshot { respond_to: tx })
            .await
            .is_err()
        {
            return SessionSnapshot::closed();
        }

        rx.await.unwrap_or_else(|_| SessionSnapshot::closed())
    }

    /// Records a reply without waiting; safe to call from a listener handler.
    pub fn record_reply(&self, path: impl Into<String>, message: impl Into<String>) {
        self.try_send(SessionCommand::RecordReply {
            path: path.into(),
            message: message.into(),
        });
    }

    /// Records an error reply without waiting.
    pub fn record_error(&self, path: impl Into<String>, code: i32, message: impl Into<String>) {
        self.try_send(SessionCommand::RecordError {
            path: path.into(),
            code,
            message: message.into(),
        });
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_sender.subscribe()
    }

    fn try_send(&self, cmd: SessionCommand) {
        if let Err(e) = self.sender.try_send(cmd) {
            warn!(error = %e, "Dropping session update");
        }
    }
}
