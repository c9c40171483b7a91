//! SessionFX Console - session control over OSC
//!
//! This crate provides the moving parts behind the `sessionfx` and
//! `fx-patcher` binaries:
//! - `transport` - UDP endpoints, dispatch tables, the daemon link
//! - `listener` - reply, error and discovery handlers
//! - `registry` - console commands and argument resolution
//! - `session` - session controller actor
//! - `supervisor` - session daemon process
//! - `console` - interactive command loop
//! - `patcher` - per-session patchbay client
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        sessionfx                             │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  lines   ┌─────────────┐  OSC   ┌──────────┐  │
//! │  │  Console  │─────────▶│SessionActor │───────▶│   nsmd   │  │
//! │  └─────▲─────┘          └──────▲──────┘        └────┬─────┘  │
//! │        │ notices               │ replies            │        │
//! │  ┌─────┴───────────────────────┴──────┐             │        │
//! │  │        reply / discovery listeners │◀────────────┘        │
//! │  └────────────────────────────────────┘                      │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod config;
pub mod console;
pub mod listener;
pub mod patcher;
pub mod registry;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use config::{ConfigError, ConsoleConfig};
pub use console::{Console, ExitReason, LineSource};
pub use session::{spawn_session, SessionError, SessionEvent, SessionHandle};
pub use transport::{DaemonLink, Endpoint, MessageSink, TransportError};
