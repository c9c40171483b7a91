//! fx-patcher - per-session patchbay client
//!
//! Started by the session daemon (with `NSM_URL` set) it announces itself
//! and keeps one patchbay per session instance. Started by hand it works
//! from `~/.sessionfx/patcher/` and reads commands from stdin:
//!
//! ```text
//! save          write the live graph into the current patchbay
//! new <name>    save, clear, and start an empty patchbay
//! load <name>   save, clear, and restore a patchbay
//! clear         disconnect everything
//! quit
//! ```

use std::env;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use fx_console::patcher::{run_session, run_standalone};
use fx_console::supervisor::NSM_URL_ENV;
use fx_console::LineSource;
use fx_jack::{CliJackTools, JackTools};
use fx_protocol::{OscUrl, DEFAULT_NAMESPACE};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// SessionFX patcher - keeps JACK connections per session
#[derive(Parser, Debug)]
#[command(name = "fx-patcher", version, about)]
struct Args {
    /// Instance directory for standalone mode
    #[arg(long)]
    dir: Option<PathBuf>,
}

fn standalone_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".sessionfx")
        .join("patcher")
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("fx_patcher=info".parse()?)
                .add_directive("fx_console=info".parse()?)
                .add_directive("fx_jack=info".parse()?),
        )
        .init();

    let args = Args::parse();
    run_patcher(args)
}

#[tokio::main]
async fn run_patcher(args: Args) -> Result<()> {
    let tools = CliJackTools::default();
    if !tools.is_available() {
        warn!("jack_lsp is not runnable; patchbay operations will fail");
    }
    let tools: Arc<dyn JackTools> = Arc::new(tools);

    let cancel = CancellationToken::new();
    let shutdown_token = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    match env::var(NSM_URL_ENV) {
        Ok(url) => {
            let daemon_url: OscUrl = url
                .parse()
                .with_context(|| format!("Invalid {NSM_URL_ENV}: {url}"))?;
            let executable = env::args().next().unwrap_or_else(|| "fx-patcher".to_string());
            run_session(tools, &daemon_url, DEFAULT_NAMESPACE, &executable, cancel)
                .await
                .context("Patcher session failed")?;
        }
        Err(_) => {
            let dir = args.dir.unwrap_or_else(standalone_dir);
            info!(dir = %dir.display(), "No session daemon, running standalone");
            let lines = LineSource::stdin();
            run_standalone(tools, dir, &lines, cancel)
                .await
                .context("Patcher failed")?;
        }
    }

    Ok(())
}

async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
