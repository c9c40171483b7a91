//! SessionFX JACK - Patchbay grapher
//!
//! Captures the connection graph of a running JACK server by alias and
//! replays it later, through the stock command-line tools.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Tool failures during a batch are collected, never fatal
//!
//! # Features
//!
//! - `testing`: exposes `MemoryJack`, an in-memory server for tests

#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod patchbay;
pub mod tools;

#[cfg(any(test, feature = "testing"))]
pub use memory::MemoryJack;
pub use patchbay::{clear, load, restore, save, snapshot, BatchReport, LinkFailure, PatchbayError};
pub use tools::{CliJackTools, JackError, JackTools};
