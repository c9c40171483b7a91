//! Wrappers around the JACK command-line tools.
//!
//! All functions in this module perform blocking I/O and should be
//! called via `spawn_blocking` from async code.

use std::path::{Path, PathBuf};
use std::process::Command;

use thiserror::Error;
use tracing::{debug, trace};

/// Errors that can occur while invoking a JACK tool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JackError {
    /// The tool could not be started at all
    #[error("failed to run {tool}: {message}")]
    Spawn { tool: String, message: String },

    /// The tool ran and reported failure
    #[error("{tool} failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },
}

/// Operations the patchbay needs from the audio server.
pub trait JackTools: Send + Sync {
    /// Port listing with connections (`jack_lsp -c`), plus aliases and
    /// port properties (`-A -p`) when requested.
    fn list_ports(&self, with_aliases: bool) -> Result<String, JackError>;

    /// Connects two ports, by port name or alias.
    fn connect(&self, source: &str, destination: &str) -> Result<(), JackError>;

    /// Disconnects two ports, by port name or alias.
    fn disconnect(&self, source: &str, destination: &str) -> Result<(), JackError>;
}

/// [`JackTools`] backed by `jack_lsp`, `jack_connect` and `jack_disconnect`.
#[derive(Debug, Clone)]
pub struct CliJackTools {
    pub lsp: PathBuf,
    pub connect: PathBuf,
    pub disconnect: PathBuf,
}

impl Default for CliJackTools {
    fn default() -> Self {
        Self {
            lsp: PathBuf::from("jack_lsp"),
            connect: PathBuf::from("jack_connect"),
            disconnect: PathBuf::from("jack_disconnect"),
        }
    }
}

impl CliJackTools {
    /// Checks if `jack_lsp` can be run.
    pub fn is_available(&self) -> bool {
        Command::new(&self.lsp)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn run(&self, program: &Path, args: &[&str]) -> Result<String, JackError> {
        let tool = program.display().to_string();
        trace!(tool = %tool, ?args, "Running JACK tool");

        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| JackError::Spawn {
                tool: tool.clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            // jack_connect reports most problems on stdout
            let detail = if stderr.trim().is_empty() {
                stdout.trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            debug!(tool = %tool, status = %output.status, "JACK tool failed");
            return Err(JackError::ToolFailed {
                tool,
                status: output.status.to_string(),
                stderr: detail,
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl JackTools for CliJackTools {
    fn list_ports(&self, with_aliases: bool) -> Result<String, JackError> {
        if with_aliases {
            self.run(&self.lsp, &["-c", "-A", "-p"])
        } else {
            self.run(&self.lsp, &["-c"])
        }
    }

    fn connect(&self, source: &str, destination: &str) -> Result<(), JackError> {
        self.run(&self.connect, &[source, destination]).map(|_| ())
    }

    fn disconnect(&self, source: &str, destination: &str) -> Result<(), JackError> {
        self.run(&self.disconnect, &[source, destination]).map(|_| ())
    }
}
