//! Console configuration.
//!
//! Values come from three layers, later ones winning: built-in defaults,
//! an optional TOML file, and command-line flags (applied by the binary).

use std::path::{Path, PathBuf};
use std::time::Duration;

use fx_core::SessionName;
use fx_protocol::DEFAULT_NAMESPACE;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Port the session daemon listens on unless configured otherwise.
pub const DEFAULT_OSC_PORT: u16 = 10000;

/// Wait between `abort` and `open` during a reload.
pub const DEFAULT_RELOAD_DELAY: Duration = Duration::from_millis(1000);

/// Wait after spawning the daemon before auto-opening a session.
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_millis(2000);

/// Wait after SIGTERM before the daemon is killed.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_millis(3000);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("invalid session in config file {}: {source}", path.display())]
    Session {
        path: PathBuf,
        source: fx_core::DomainError,
    },
}

/// Fully resolved console settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleConfig {
    /// Directory the daemon keeps sessions in.
    pub session_root: PathBuf,
    /// Port of the daemon; the console binds near it.
    pub osc_port: u16,
    /// Host used in URLs handed to the daemon and its clients.
    pub host: String,
    pub namespace: String,
    /// Daemon executable.
    pub daemon_program: PathBuf,
    /// Session to open once the daemon is up.
    pub session: Option<SessionName>,
    /// Read commands from stdin; false keeps the console headless.
    pub interactive: bool,
    pub reload_delay: Duration,
    pub startup_grace: Duration,
    pub terminate_grace: Duration,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            session_root: dirs::home_dir()
                .map(|h| h.join("sessions"))
                .unwrap_or_else(|| PathBuf::from("sessions")),
            osc_port: DEFAULT_OSC_PORT,
            host: "127.0.0.1".to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            daemon_program: PathBuf::from("nsmd"),
            session: None,
            interactive: true,
            reload_delay: DEFAULT_RELOAD_DELAY,
            startup_grace: DEFAULT_STARTUP_GRACE,
            terminate_grace: DEFAULT_TERMINATE_GRACE,
        }
    }
}

/// On-disk form; every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub session_root: Option<String>,
    pub osc_port: Option<u16>,
    pub host: Option<String>,
    pub namespace: Option<String>,
    pub daemon: Option<String>,
    pub session: Option<String>,
    pub reload_delay_ms: Option<u64>,
    pub startup_grace_ms: Option<u64>,
    pub terminate_grace_ms: Option<u64>,
}

impl FileConfig {
    pub fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e: toml::de::Error| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&contents, path)
    }
}

impl ConsoleConfig {
    /// `~/.config/sessionfx/config.toml` on Linux.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("sessionfx").join("config.toml"))
    }

    /// Loads defaults plus a config file.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used if a file is there.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path().filter(|p| p.exists()),
        };

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading config file");
            let file = FileConfig::load(&path)?;
            config.apply(file, &path)?;
        }

        Ok(config)
    }

    /// Overlays the values present in `file`.
    pub fn apply(&mut self, file: FileConfig, path: &Path) -> Result<(), ConfigError> {
        if let Some(root) = file.session_root {
            self.session_root = expand_path(&root);
        }
        if let Some(port) = file.osc_port {
            self.osc_port = port;
        }
        if let Some(host) = file.host {
            self.host = host;
        }
        if let Some(namespace) = file.namespace {
            self.namespace = namespace;
        }
        if let Some(daemon) = file.daemon {
            self.daemon_program = expand_path(&daemon);
        }
        if let Some(session) = file.session {
            let name = SessionName::parse(&session).map_err(|e| ConfigError::Session {
                path: path.to_path_buf(),
                source: e,
            })?;
            self.session = Some(name);
        }
        if let Some(ms) = file.reload_delay_ms {
            self.reload_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = file.startup_grace_ms {
            self.startup_grace = Duration::from_millis(ms);
        }
        if let Some(ms) = file.terminate_grace_ms {
            self.terminate_grace = Duration::from_millis(ms);
        }
        Ok(())
    }
}

/// Expands a leading `~/` to the home directory.
pub fn expand_path(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConsoleConfig::default();
        assert_eq!(config.osc_port, 10000);
        assert_eq!(config.namespace, "nsm");
        assert!(config.interactive);
        assert!(config.session_root.ends_with("sessions"));
    }

    #[test]
    fn test_file_overrides_defaults() {
        let path = Path::new("config.toml");
        let file = FileConfig::parse(
            "osc_port = 11000\nsession = \"demo\"\nreload_delay_ms = 250\n",
            path,
        )
        .unwrap();

        let mut config = ConsoleConfig::default();
        config.apply(file, path).unwrap();
        assert_eq!(config.osc_port, 11000);
        assert_eq!(config.session, Some(SessionName::new("demo")));
        assert_eq!(config.reload_delay, Duration::from_millis(250));
        assert_eq!(config.host, "127.0.0.1");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let err = FileConfig::parse("colour = \"red\"\n", Path::new("x.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_blank_session_is_rejected() {
        let path = Path::new("config.toml");
        let file = FileConfig::parse("session = \"  \"\n", path).unwrap();
        let err = ConsoleConfig::default().apply(file, path).unwrap_err();
        assert!(matches!(err, ConfigError::Session { .. }));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = ConsoleConfig::load(Some(Path::new("/nonexistent/sessionfx.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_expand_path_plain() {
        assert_eq!(expand_path("/srv/sessions"), PathBuf::from("/srv/sessions"));
    }
}
