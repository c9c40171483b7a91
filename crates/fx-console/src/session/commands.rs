//! Session actor commands, errors, and events.

use fx_core::{SessionName, SessionSnapshot};
use fx_protocol::ServerCommand;
use thiserror::Error;
use tokio::sync::oneshot;

// ============================================================================
// Session Commands
// ============================================================================

/// Commands sent to the session actor.
///
/// Request commands carry a oneshot `respond_to`; the reply and error
/// records are fire-and-forget so listener handlers never wait on the actor.
#[derive(Debug)]
pub enum SessionCommand {
    /// Apply a command's state effect and send it to the daemon.
    ///
    /// # Errors
    /// - `SessionError::Send` if the message could not be sent; the state
    ///   change from a `load` command is kept
    Execute {
        command: ServerCommand,
        respond_to: oneshot::Sender<Result<SessionSnapshot, SessionError>>,
    },

    /// First half of a reload: capture the session name and send `abort`.
    ///
    /// # Errors
    /// - `SessionError::NoSession` if nothing is open
    /// - `SessionError::Send` if `abort` could not be sent
    BeginReload {
        respond_to: oneshot::Sender<Result<SessionName, SessionError>>,
    },

    /// Second half of a reload: send `open` for the captured name.
    FinishReload {
        name: SessionName,
        respond_to: oneshot::Sender<Result<SessionSnapshot, SessionError>>,
    },

    /// A `/reply` arrived for `path`.
    RecordReply { path: String, message: String },

    /// An `/error` arrived for `path`.
    RecordError {
        path: String,
        code: i32,
        message: String,
    },

    GetSnapshot {
        respond_to: oneshot::Sender<SessionSnapshot>,
    },
}

// ============================================================================
// Session Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Reload needs an open session.
    #[error("no session is open")]
    NoSession,

    /// The message could not be handed to the transport.
    #[error("failed to send {path}: {reason}")]
    Send { path: String, reason: String },

    /// The actor has shut down.
    #[error("session channel closed")]
    ChannelClosed,
}

// ============================================================================
// Session Events
// ============================================================================

/// Events published by the session actor.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Name or status changed.
    StateChanged { snapshot: SessionSnapshot },

    /// A message went out to the daemon.
    Sent { path: String },

    /// A reply or error matched an outstanding command.
    Answered { path: String, ok: bool },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_error_display() {
        assert_eq!(SessionError::NoSession.to_string(), "no session is open");
        assert_eq!(
            SessionError::Send {
                path: "/nsm/server/open".to_string(),
                reason: "network unreachable".to_string(),
            }
            .to_string(),
            "failed to send /nsm/server/open: network unreachable"
        );
        assert_eq!(
            SessionError::ChannelClosed.to_string(),
            "session channel closed"
        );
    }

    #[tokio::test]
    async fn test_closed_responder_is_detected() {
        let (tx, rx) = oneshot::channel::<Result<SessionSnapshot, SessionError>>();
        drop(tx);
        assert!(rx.await.is_err());
    }
}
