//! Patcher instance directory.
//!
//! ```text
//! <instance>/
//!   config.cfg          name of the current patchbay
//!   patchbays/<name>    one patchbay document per file
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use fx_core::PatchbayName;
use tracing::debug;

use super::PatcherError;

pub const CONFIG_FILE: &str = "config.cfg";
pub const PATCHBAY_DIR: &str = "patchbays";

/// Which patchbay is current.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PatcherConfig {
    pub current: PatchbayName,
}

impl PatcherConfig {
    /// Reads `config.cfg`; a missing file gives the default config.
    pub fn load(instance: &Path) -> Result<Self, PatcherError> {
        let path = instance.join(CONFIG_FILE);
        if !path.exists() {
            debug!(path = %path.display(), "No patcher config, using default");
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path).map_err(|e| PatcherError::io(&path, e))?;
        let current = PatchbayName::parse(&contents)?;
        Ok(Self { current })
    }

    /// Writes `config.cfg`, creating the directory layout as needed.
    pub fn save(&self, instance: &Path) -> Result<(), PatcherError> {
        let patchbays = instance.join(PATCHBAY_DIR);
        fs::create_dir_all(&patchbays).map_err(|e| PatcherError::io(&patchbays, e))?;

        let path = instance.join(CONFIG_FILE);
        fs::write(&path, format!("{}\n", self.current)).map_err(|e| PatcherError::io(&path, e))
    }
}

/// Location of patchbay `name` inside `instance`.
pub fn patch_path(instance: &Path, name: &PatchbayName) -> PathBuf {
    instance.join(PATCHBAY_DIR).join(name.as_str())
}

/// Saved patchbays, sorted by name.
pub fn list_patchbays(instance: &Path) -> Result<Vec<PatchbayName>, PatcherError> {
    let dir = instance.join(PATCHBAY_DIR);
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    for entry in fs::read_dir(&dir).map_err(|e| PatcherError::io(&dir, e))? {
        let entry = entry.map_err(|e| PatcherError::io(&dir, e))?;
        if let Some(name) = entry.file_name().to_str() {
            if let Ok(name) = PatchbayName::parse(name) {
                names.push(name);
            }
        }
    }
    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    Ok(names)
}
