//! Patcher - a session client that keeps one patchbay per session.
//!
//! Inside a session, the daemon tells the patcher where its instance
//! directory is; the patcher restores the current patchbay on open and
//! writes it back on save. Outside a session it runs from a directory in
//! the home folder and takes commands on stdin.
//!
//! All [`Patcher`] operations run the JACK tools and block; the async
//! client moves them onto the blocking pool.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A failed patchbay operation is reported and the client keeps running

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fx_core::{DomainError, PatchbayName};
use fx_jack::{BatchReport, JackTools, PatchbayError};
use fx_protocol::PatchbayFormatError;
use thiserror::Error;
use tracing::{debug, info};

mod client;
mod config;

pub use client::{run_session, run_standalone, CAPABILITIES, CLIENT_NAME};
pub use config::{list_patchbays, patch_path, PatcherConfig, CONFIG_FILE, PATCHBAY_DIR};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum PatcherError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Name(#[from] DomainError),

    #[error(transparent)]
    Patchbay(#[from] PatchbayError),

    /// A command that needs an instance directory arrived before `open`.
    #[error("no session has been opened yet")]
    NotOpen,

    #[error("patchbay {0} does not exist")]
    UnknownPatchbay(PatchbayName),

    #[error("patchbay worker failed: {0}")]
    Worker(String),

    #[error(transparent)]
    Transport(#[from] crate::transport::TransportError),
}

impl PatcherError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<PatchbayFormatError> for PatcherError {
    fn from(e: PatchbayFormatError) -> Self {
        Self::Patchbay(PatchbayError::Format(e))
    }
}

// ============================================================================
// Actions
// ============================================================================

/// Everything the patcher can be asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatcherAction {
    /// Adopt `instance`, clear the graph, restore the current patchbay.
    Open { instance: PathBuf },
    /// Write the live graph into the current patchbay.
    Save,
    /// Save, clear, and start an empty patchbay called `name`.
    New(PatchbayName),
    /// Save, clear, and restore patchbay `name`.
    Load(PatchbayName),
    /// Disconnect everything.
    Clear,
}

/// A line typed in standalone mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandaloneCommand {
    Action(PatcherAction),
    Quit,
}

/// Parses `save`, `new <name>`, `load <name>`, `clear` or `quit`.
///
/// Returns `Ok(None)` for blank or unrecognised lines.
pub fn parse_standalone(line: &str) -> Result<Option<StandaloneCommand>, DomainError> {
    let mut words = line.split_whitespace();
    let command = match (words.next(), words.next()) {
        (Some("save"), None) => StandaloneCommand::Action(PatcherAction::Save),
        (Some("clear"), None) => StandaloneCommand::Action(PatcherAction::Clear),
        (Some("quit"), None) => StandaloneCommand::Quit,
        (Some("new"), Some(name)) => {
            StandaloneCommand::Action(PatcherAction::New(PatchbayName::parse(name)?))
        }
        (Some("load"), Some(name)) => {
            StandaloneCommand::Action(PatcherAction::Load(PatchbayName::parse(name)?))
        }
        _ => return Ok(None),
    };
    if words.next().is_some() {
        return Ok(None);
    }
    Ok(Some(command))
}

// ============================================================================
// Patcher
// ============================================================================

/// Patchbay state for one client instance.
pub struct Patcher {
    tools: Arc<dyn JackTools>,
    instance: Option<PathBuf>,
    config: PatcherConfig,
}

impl Patcher {
    pub fn new(tools: Arc<dyn JackTools>) -> Self {
        Self {
            tools,
            instance: None,
            config: PatcherConfig::default(),
        }
    }

    pub fn instance(&self) -> Option<&Path> {
        self.instance.as_deref()
    }

    pub fn current(&self) -> &PatchbayName {
        &self.config.current
    }

    /// Adopts `instance` without touching the graph.
    ///
    /// A missing directory is created with the default config.
    pub fn attach(&mut self, instance: &Path) -> Result<(), PatcherError> {
        self.config = if instance.exists() {
            PatcherConfig::load(instance)?
        } else {
            let config = PatcherConfig::default();
            config.save(instance)?;
            config
        };
        self.instance = Some(instance.to_path_buf());
        info!(
            instance = %instance.display(),
            current = %self.config.current,
            "Patcher attached"
        );
        Ok(())
    }

    pub fn apply(&mut self, action: PatcherAction) -> Result<BatchReport, PatcherError> {
        debug!(?action, "Applying patcher action");
        match action {
            PatcherAction::Open { instance } => self.open(&instance),
            PatcherAction::Save => {
                self.save_current()?;
                Ok(BatchReport::default())
            }
            PatcherAction::New(name) => self.new_patchbay(name),
            PatcherAction::Load(name) => self.load_patchbay(name),
            PatcherAction::Clear => Ok(fx_jack::clear(self.tools.as_ref())?),
        }
    }

    /// Clears the graph and restores the current patchbay. An instance
    /// without one starts from the empty graph, saved as its first patchbay.
    fn open(&mut self, instance: &Path) -> Result<BatchReport, PatcherError> {
        self.attach(instance)?;
        let path = patch_path(instance, &self.config.current);

        let mut report = fx_jack::clear(self.tools.as_ref())?;
        if !path.exists() {
            self.write_live(&path)?;
            return Ok(report);
        }
        report.merge(self.restore(&path)?);
        Ok(report)
    }

    fn save_current(&self) -> Result<(), PatcherError> {
        let instance = self.instance.as_deref().ok_or(PatcherError::NotOpen)?;
        self.write_live(&patch_path(instance, &self.config.current))?;
        self.config.save(instance)
    }

    fn new_patchbay(&mut self, name: PatchbayName) -> Result<BatchReport, PatcherError> {
        self.save_current()?;
        let instance = self.instance.clone().ok_or(PatcherError::NotOpen)?;

        let report = fx_jack::clear(self.tools.as_ref())?;
        self.write_live(&patch_path(&instance, &name))?;
        self.switch_to(&instance, name)?;
        Ok(report)
    }

    fn load_patchbay(&mut self, name: PatchbayName) -> Result<BatchReport, PatcherError> {
        let instance = self.instance.clone().ok_or(PatcherError::NotOpen)?;
        let path = patch_path(&instance, &name);
        if !path.exists() {
            return Err(PatcherError::UnknownPatchbay(name));
        }
        let contents = fs::read_to_string(&path).map_err(|e| PatcherError::io(&path, e))?;
        fx_protocol::PatchbayDocument::parse(&contents)?;

        self.save_current()?;
        let mut report = fx_jack::clear(self.tools.as_ref())?;
        report.merge(fx_jack::load(self.tools.as_ref(), &contents, false)?);
        self.switch_to(&instance, name)?;
        Ok(report)
    }

    fn switch_to(&mut self, instance: &Path, name: PatchbayName) -> Result<(), PatcherError> {
        info!(from = %self.config.current, to = %name, "Switching patchbay");
        self.config.current = name;
        self.config.save(instance)
    }

    fn write_live(&self, path: &Path) -> Result<(), PatcherError> {
        let document = fx_jack::save(self.tools.as_ref())?;
        let json = document.to_json()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PatcherError::io(parent, e))?;
        }
        fs::write(path, json).map_err(|e| PatcherError::io(path, e))
    }

    fn restore(&self, path: &Path) -> Result<BatchReport, PatcherError> {
        let contents = fs::read_to_string(path).map_err(|e| PatcherError::io(path, e))?;
        Ok(fx_jack::load(self.tools.as_ref(), &contents, false)?)
    }
}
