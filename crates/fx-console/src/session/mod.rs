//! Session controller using the actor pattern.
//!
//! One task owns the session name and status. The console loop sends it
//! commands; listener handlers post replies to it without waiting; anyone
//! can subscribe to its events.
//!
//! ```text
//! ┌──────────────┐  SessionCommand   ┌──────────────┐  OSC   ┌─────────┐
//! │ console loop │──────────────────▶│ SessionActor │───────▶│  nsmd   │
//! └──────────────┘   (mpsc)          └──────┬───────┘        └────┬────┘
//!        ▲                                  │ SessionEvent        │ /reply
//!        │                                  ▼ (broadcast)         ▼
//!        └──────────── subscribers    ┌──────────────┐  try_send ┌──────────┐
//!                                     │   handles    │◀──────────│ listener │
//!                                     └──────────────┘           └──────────┘
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc};

mod actor;
mod commands;
mod handle;

pub use actor::{SessionActor, MAX_OUTSTANDING};
pub use commands::{SessionCommand, SessionError, SessionEvent};
pub use handle::SessionHandle;

use crate::transport::MessageSink;

const COMMAND_BUFFER: usize = 100;
const EVENT_BUFFER: usize = 100;

/// Spawns the session actor and returns a handle to it.
///
/// The actor stops once every handle has been dropped.
pub fn spawn_session(sink: Arc<dyn MessageSink>, namespace: impl Into<String>) -> SessionHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (event_tx, _) = broadcast::channel(EVENT_BUFFER);

    let actor = SessionActor::new(cmd_rx, sink, namespace, event_tx.clone());
    tokio::spawn(actor.run());

    SessionHandle::new(cmd_tx, event_tx)
}
