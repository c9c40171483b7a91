//! Session entities as seen by the console.
//!
//! The console never owns the session itself (the daemon does); it keeps
//! an optimistic view that is updated when commands are sent.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{DomainError, DomainResult};

// ============================================================================
// Type-Safe Identifiers
// ============================================================================

/// Name of a session project, relative to the daemon's session root.
///
/// Nested projects (`live/set-a`) are valid; the daemon resolves them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionName(String);

impl SessionName {
    /// Creates a new SessionName without validation.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Creates a SessionName from user input, rejecting blank names.
    pub fn parse(name: &str) -> DomainResult<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidSessionName {
                name: name.to_string(),
                reason: "name is empty".to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SessionName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for SessionName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for SessionName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// File name of a saved patchbay inside a client's `patchbays/` directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PatchbayName(String);

impl PatchbayName {
    /// Name used when a client has no patchbay yet.
    pub const DEFAULT: &'static str = "default.pbay";

    /// Validates a patchbay name; it must be a single path component.
    pub fn parse(name: &str) -> DomainResult<Self> {
        let trimmed = name.trim();
        let escapes = trimmed == "." || trimmed == ".." || trimmed.contains(['/', '\\']);
        if trimmed.is_empty() || escapes {
            return Err(DomainError::InvalidPatchbayName {
                name: name.to_string(),
            });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for PatchbayName {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for PatchbayName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for PatchbayName {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PatchbayName> for String {
    fn from(name: PatchbayName) -> Self {
        name.0
    }
}

// ============================================================================
// Session Status
// ============================================================================

/// Lifecycle status of the current session, from the console's view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// No session is open.
    #[default]
    Closed,
    /// A session was opened (optimistically, on send).
    Open,
    /// The session was aborted as part of a reload and is about to reopen.
    Transitioning,
}

impl SessionStatus {
    /// Returns a short label for display.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::Transitioning => "transitioning",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ============================================================================
// Session Snapshot
// ============================================================================

/// Read-only copy of the controller's session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Current project name, `None` when closed.
    pub name: Option<SessionName>,
    pub status: SessionStatus,
    /// Commands sent but not yet answered by a reply or error.
    pub outstanding: usize,
    /// When the status last changed.
    pub changed_at: DateTime<Utc>,
}

impl SessionSnapshot {
    /// A closed session with nothing outstanding.
    pub fn closed() -> Self {
        Self {
            name: None,
            status: SessionStatus::Closed,
            outstanding: 0,
            changed_at: Utc::now(),
        }
    }

    /// Returns true if a session is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == SessionStatus::Open
    }
}

impl fmt::Display for SessionSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.status)?,
            None => write!(f, "no session ({})", self.status)?,
        }
        if self.outstanding > 0 {
            write!(f, ", {} awaiting reply", self.outstanding)?;
        }
        Ok(())
    }
}
