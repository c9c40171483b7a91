//! SessionFX Core - Shared types for session control and patchbay snapshots
//!
//! This crate provides the domain types shared between the console,
//! the patchbay tools and the patcher client.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod error;
pub mod graph;
pub mod session;

// Re-exports for convenience
pub use error::{DomainError, DomainResult};
pub use graph::{
    parse_connections, parse_enumeration, Alias, AliasMap, Connection, Enumeration, Graph, GraphError,
    Port, PortDirection,
};
pub use session::{PatchbayName, SessionName, SessionSnapshot, SessionStatus};
