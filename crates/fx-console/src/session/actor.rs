//! Session actor - sole owner of the console's view of the session.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Responder send failures are ignored (the caller went away)
//! - Event publish failures are ignored (no subscribers)

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fx_core::{SessionName, SessionSnapshot, SessionStatus};
use fx_protocol::ServerCommand;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::commands::{SessionCommand, SessionError, SessionEvent};
use crate::transport::MessageSink;

/// Upper bound on remembered outstanding paths; older ones are dropped.
pub const MAX_OUTSTANDING: usize = 64;

/// The session actor.
///
/// State changes happen only here, in the order commands arrive. The
/// daemon's replies carry no request id, so they are matched to
/// outstanding commands by the path they echo.
pub struct SessionActor {
    receiver: mpsc::Receiver<SessionCommand>,
    sink: Arc<dyn MessageSink>,
    namespace: String,

    name: Option<SessionName>,
    status: SessionStatus,
    changed_at: DateTime<Utc>,
    /// Paths of sent commands with no reply yet, oldest first.
    outstanding: VecDeque<String>,

    event_publisher: broadcast::Sender<SessionEvent>,
}

impl SessionActor {
    pub fn new(
        receiver: mpsc::Receiver<SessionCommand>,
        sink: Arc<dyn MessageSink>,
        namespace: impl Into<String>,
        event_publisher: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            receiver,
            sink,
            namespace: namespace.into(),
            name: None,
            status: SessionStatus::Closed,
            changed_at: Utc::now(),
            outstanding: VecDeque::new(),
            event_publisher,
        }
    }

    /// Processes commands until every handle is dropped.
    pub async fn run(mut self) {
        info!(namespace = %self.namespace, "Session actor starting");

        while let Some(cmd) = self.receiver.recv().await {
            self.handle_command(cmd).await;
        }

        info!(
            session = ?self.name.as_ref().map(SessionName::as_str),
            "Session actor stopped"
        );
    }

    async fn handle_command(&mut self, cmd: SessionCommand) {
        match cmd {
            SessionCommand::Execute {
                command,
                respond_to,
            } => {
                let result = self.handle_execute(command).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::BeginReload { respond_to } => {
                let result = self.handle_begin_reload().await;
                let _ = respond_to.send(result);
            }
            SessionCommand::FinishReload { name, respond_to } => {
                let result = self.handle_finish_reload(name).await;
                let _ = respond_to.send(result);
            }
            SessionCommand::RecordReply { path, message } => {
                debug!(path = %path, message = %message, "Reply received");
                self.handle_answer(path, true);
            }
            SessionCommand::RecordError {
                path,
                code,
                message,
            } => {
                warn!(path = %path, code, message = %message, "Daemon reported an error");
                self.handle_answer(path, false);
            }
            SessionCommand::GetSnapshot { respond_to } => {
                let _ = respond_to.send(self.snapshot());
            }
        }
    }

    // ========================================================================
    // Command Handlers
    // ========================================================================

    /// Adopts a `load` target before sending and closes after sending a
    /// `quit` command. Neither is rolled back if the daemon refuses.
    async fn handle_execute(&mut self, command: ServerCommand) -> Result<SessionSnapshot, SessionError> {
        if let Some(target) = command.load_target() {
            self.transition(Some(target.clone()), SessionStatus::Open);
        }

        self.send(&command).await?;

        if command.closes_session() {
            self.transition(None, SessionStatus::Closed);
        }

        Ok(self.snapshot())
    }

    async fn handle_begin_reload(&mut self) -> Result<SessionName, SessionError> {
        let name = match (&self.name, self.status) {
            (Some(name), SessionStatus::Open) => name.clone(),
            _ => return Err(SessionError::NoSession),
        };

        info!(session = %name, "Reloading session");
        self.send(&ServerCommand::Abort).await?;
        self.transition(Some(name.clone()), SessionStatus::Transitioning);
        Ok(name)
    }

    async fn handle_finish_reload(&mut self, name: SessionName) -> Result<SessionSnapshot, SessionError> {
        if self.status != SessionStatus::Transitioning {
            debug!(status = %self.status, "Session changed during reload, reopening anyway");
        }
        self.handle_execute(ServerCommand::Open { project: name }).await
    }

    fn handle_answer(&mut self, path: String, ok: bool) {
        match self.outstanding.iter().position(|p| *p == path) {
            Some(index) => {
                self.outstanding.remove(index);
                let _ = self.event_publisher.send(SessionEvent::Answered { path, ok });
            }
            None => {
                debug!(path = %path, "Answer matches no outstanding command");
            }
        }
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    async fn send(&mut self, command: &ServerCommand) -> Result<(), SessionError> {
        let message = command.to_message(&self.namespace);
        let path = message.path.clone();

        if !self.outstanding.is_empty() {
            debug!(
                path = %path,
                outstanding = self.outstanding.len(),
                "Sending while earlier commands await a reply"
            );
        }

        self.sink.send(message).await.map_err(|e| SessionError::Send {
            path: path.clone(),
            reason: e.to_string(),
        })?;

        if self.outstanding.len() >= MAX_OUTSTANDING {
            self.outstanding.pop_front();
        }
        self.outstanding.push_back(path.clone());
        let _ = self.event_publisher.send(SessionEvent::Sent { path });
        Ok(())
    }

    fn transition(&mut self, name: Option<SessionName>, status: SessionStatus) {
        if self.name == name && self.status == status {
            return;
        }
        self.name = name;
        self.status = status;
        self.changed_at = Utc::now();
        let _ = self.event_publisher.send(SessionEvent::StateChanged {
            snapshot: self.snapshot(),
        });
    }

    fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            name: self.name.clone(),
            status: self.status,
            outstanding: self.outstanding.len(),
            changed_at: self.changed_at,
        }
    }
}
