//! Session daemon process management.
//!
//! The daemon is started as a child process with the console's endpoint
//! URLs in its environment, and stopped with SIGTERM when the console
//! exits. A daemon that dies on its own is not restarted; commands sent
//! after that get no reply. [`DaemonSupervisor::watch`] logs such an exit
//! once and changes nothing else.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use fx_protocol::OscUrl;
use thiserror::Error;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Daemon URL, read by clients to announce themselves.
pub const NSM_URL_ENV: &str = "NSM_URL";
/// Where the console receives replies.
pub const CONSOLE_URL_ENV: &str = "SESSIONFX_CONSOLE_URL";
/// Where the console receives discovery events.
pub const CONTROL_URL_ENV: &str = "SESSIONFX_CONTROL_URL";

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("failed to start {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to stop daemon: {0}")]
    Stop(#[from] std::io::Error),
}

/// How to start the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnConfig {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub daemon_url: OscUrl,
    pub console_url: OscUrl,
    pub control_url: Option<OscUrl>,
}

impl SpawnConfig {
    /// `nsmd --session-root <root> --osc-port <port>` with the given URLs.
    pub fn nsmd(
        program: impl Into<PathBuf>,
        session_root: &Path,
        daemon_url: OscUrl,
        console_url: OscUrl,
    ) -> Self {
        let args = vec![
            OsString::from("--session-root"),
            session_root.as_os_str().to_os_string(),
            OsString::from("--osc-port"),
            OsString::from(daemon_url.port.to_string()),
        ];
        Self {
            program: program.into(),
            args,
            daemon_url,
            console_url,
            control_url: None,
        }
    }

    pub fn with_control_url(mut self, url: OscUrl) -> Self {
        self.control_url = Some(url);
        self
    }

    /// The command to run, with the URLs set on the child only.
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .env(NSM_URL_ENV, self.daemon_url.to_string())
            .env(CONSOLE_URL_ENV, self.console_url.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(url) = &self.control_url {
            command.env(CONTROL_URL_ENV, url.to_string());
        }
        command
    }
}

/// A running daemon.
#[derive(Debug)]
pub struct DaemonSupervisor {
    child: Child,
    program: PathBuf,
}

impl DaemonSupervisor {
    pub fn start(config: &SpawnConfig) -> Result<Self, SupervisorError> {
        let child = config.command().spawn().map_err(|e| SupervisorError::Spawn {
            program: config.program.clone(),
            source: e,
        })?;

        info!(
            program = %config.program.display(),
            pid = ?child.id(),
            url = %config.daemon_url,
            "Session daemon started"
        );

        Ok(Self {
            child,
            program: config.program.clone(),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// True until the child has exited.
    pub fn is_running(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(program = %self.program.display(), %status, "Daemon has exited");
                false
            }
            Err(e) => {
                warn!(error = %e, "Could not poll daemon");
                false
            }
        }
    }

    /// Polls the daemon every `poll` until it exits or `cancel` fires, then
    /// hands the supervisor back for [`terminate`](Self::terminate).
    ///
    /// An exit is only logged; the console keeps running without a daemon.
    pub async fn watch(mut self, poll: Duration, cancel: CancellationToken) -> Self {
        let mut ticker = tokio::time::interval(poll);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return self,
                _ = ticker.tick() => {
                    if !self.is_running() {
                        warn!(
                            program = %self.program.display(),
                            "Session daemon exited unexpectedly; commands will go unanswered"
                        );
                        return self;
                    }
                }
            }
        }
    }

    /// Sends SIGTERM, waits up to `grace`, then kills.
    pub async fn terminate(mut self, grace: Duration) -> Result<ExitStatus, SupervisorError> {
        if let Ok(Some(status)) = self.child.try_wait() {
            return Ok(status);
        }

        #[cfg(unix)]
        if let Some(pid) = self.child.id().and_then(|pid| i32::try_from(pid).ok()) {
            // SAFETY: plain kill(2) on our own child's pid.
            let result = unsafe { libc::kill(pid, libc::SIGTERM) };
            if result != 0 {
                debug!(pid, "SIGTERM failed");
            }
        }

        match tokio::time::timeout(grace, self.child.wait()).await {
            Ok(status) => {
                let status = status?;
                info!(%status, "Session daemon stopped");
                Ok(status)
            }
            Err(_) => {
                warn!(grace_ms = grace.as_millis() as u64, "Daemon ignored SIGTERM, killing");
                self.child.kill().await?;
                Ok(self.child.wait().await?)
            }
        }
    }
}
