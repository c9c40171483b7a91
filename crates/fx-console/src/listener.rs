//! Inbound handlers for daemon replies and discovery events.
//!
//! Handlers run on the transport's listener task. They decode, post to
//! the session actor or the notice channel with `try_send`, and return;
//! nothing here waits on the console loop.

use chrono::{DateTime, Utc};
use fx_protocol::{DiscoveryEvent, ErrorReply, OscMessage, Reply, ERROR_PATH, REPLY_PATH};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use crate::session::SessionHandle;
use crate::transport::DispatchTable;

/// Something the console should show the operator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    Reply(Reply),
    Error(ErrorReply),
    Discovery(DiscoveryEvent),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub received_at: DateTime<Utc>,
    pub kind: NoticeKind,
}

impl Notice {
    pub fn new(kind: NoticeKind) -> Self {
        Self {
            received_at: Utc::now(),
            kind,
        }
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let at = self.received_at.format("%H:%M:%S");
        match &self.kind {
            NoticeKind::Reply(reply) => write!(f, "[{at}] {}: {}", reply.path, reply.message),
            NoticeKind::Error(err) => write!(
                f,
                "[{at}] {} failed ({}): {}",
                err.path, err.code, err.message
            ),
            NoticeKind::Discovery(event) => write!(f, "[{at}] {event}"),
        }
    }
}

fn post(notices: &mpsc::Sender<Notice>, kind: NoticeKind) {
    if let Err(e) = notices.try_send(Notice::new(kind)) {
        warn!(error = %e, "Dropping notice");
    }
}

/// Handlers for the console's reply endpoint.
///
/// Replies with an empty message are heartbeats: they still answer the
/// outstanding command, but are not shown.
pub fn reply_table(session: SessionHandle, notices: mpsc::Sender<Notice>) -> DispatchTable {
    let mut table = DispatchTable::new();

    let reply_session = session.clone();
    let reply_notices = notices.clone();
    table.register(REPLY_PATH, move |message: &OscMessage, _| {
        let reply = match Reply::from_message(message) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed reply");
                return;
            }
        };
        reply_session.record_reply(reply.path.clone(), reply.message.clone());
        if reply.is_heartbeat() {
            trace!(path = %reply.path, "Heartbeat");
            return;
        }
        post(&reply_notices, NoticeKind::Reply(reply));
    });

    table.register(ERROR_PATH, move |message: &OscMessage, _| {
        match ErrorReply::from_message(message) {
            Ok(err) => {
                session.record_error(err.path.clone(), err.code, err.message.clone());
                post(&notices, NoticeKind::Error(err));
            }
            Err(e) => warn!(error = %e, "Ignoring malformed error reply"),
        }
    });

    table
}

/// Handlers for the control endpoint where clients announce themselves.
///
/// Discovery events are shown only; they never touch session state.
pub fn discovery_table(namespace: &str, notices: mpsc::Sender<Notice>) -> DispatchTable {
    let mut table = DispatchTable::new();

    for path in [
        DiscoveryEvent::client_path(namespace),
        DiscoveryEvent::method_path(namespace),
    ] {
        let ns = namespace.to_string();
        let notices = notices.clone();
        table.register(path, move |message: &OscMessage, from| {
            match DiscoveryEvent::from_message(message, &ns) {
                Ok(event) => {
                    debug!(%from, event = %event, "Discovery event");
                    post(&notices, NoticeKind::Discovery(event));
                }
                Err(e) => warn!(%from, error = %e, "Ignoring malformed discovery event"),
            }
        });
    }

    table
}
