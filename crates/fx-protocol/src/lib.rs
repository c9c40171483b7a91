//! SessionFX Protocol - Wire formats
//!
//! This crate provides the OSC message codec and the message shapes
//! exchanged with the session daemon, plus the document format used to
//! move patchbay snapshots between processes.

pub mod message;
pub mod osc;
pub mod patchbay;
pub mod url;

pub use message::{
    announce, ArgKind, ArgSlot, ClientEvent, CommandDescriptor, DiscoveryEvent, ErrorReply,
    MessageError, Reply, ServerCommand, DEFAULT_NAMESPACE, ERROR_PATH, REPLY_PATH,
    SERVER_COMMANDS,
};
pub use osc::{OscArg, OscError, OscMessage};
pub use patchbay::{PatchbayDocument, PatchbayFormatError};
pub use url::{OscUrl, UrlError};
