//! SessionFX - operator console for an NSM session daemon
//!
//! Starts `nsmd` as a child process, binds the endpoints the daemon and
//! its clients answer to, and reads session commands from stdin.
//!
//! # Usage
//!
//! ```bash
//! # Interactive console with sessions under ~/sessions
//! sessionfx
//!
//! # Open a session once the daemon is up, no console
//! sessionfx --root ~/audio --session live --no-cli
//! ```
//!
//! Settings come from `~/.config/sessionfx/config.toml` (or `--config`),
//! overridden by flags.

use std::io;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use fx_console::listener::{discovery_table, reply_table, Notice};
use fx_console::supervisor::{DaemonSupervisor, SpawnConfig};
use fx_console::transport::resolve;
use fx_console::{
    spawn_session, Console, ConsoleConfig, DaemonLink, Endpoint, ExitReason, LineSource,
    SessionHandle,
};
use fx_core::SessionName;
use fx_protocol::{OscUrl, ServerCommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

const NOTICE_BUFFER: usize = 64;

/// How often the daemon process is polled so an unexpected exit gets logged.
const DAEMON_POLL: Duration = Duration::from_secs(1);

/// SessionFX - NSM session console
#[derive(Parser, Debug)]
#[command(name = "sessionfx", version, about)]
struct Args {
    /// Directory the daemon keeps sessions in
    #[arg(long)]
    root: Option<PathBuf>,

    /// Daemon OSC port
    #[arg(long)]
    port: Option<u16>,

    /// Session to open once the daemon is up
    #[arg(long)]
    session: Option<String>,

    /// Run without the interactive console
    #[arg(long)]
    no_cli: bool,

    /// Host used in the URLs handed to the daemon
    #[arg(long)]
    host: Option<String>,

    /// Protocol namespace
    #[arg(long)]
    namespace: Option<String>,

    /// Config file (default: ~/.config/sessionfx/config.toml if present)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn apply_args(config: &mut ConsoleConfig, args: Args) -> Result<()> {
    if let Some(root) = args.root {
        config.session_root = root;
    }
    if let Some(port) = args.port {
        config.osc_port = port;
    }
    if let Some(session) = args.session {
        let name = SessionName::parse(&session).context("Invalid --session")?;
        config.session = Some(name);
    }
    if args.no_cli {
        config.interactive = false;
    }
    if let Some(host) = args.host {
        config.host = host;
    }
    if let Some(namespace) = args.namespace {
        config.namespace = namespace;
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let mut config =
        ConsoleConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    apply_args(&mut config, args)?;

    // Logs go to stderr so they stay out of the console's output.
    let level = if config.interactive { "warn" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("sessionfx={level}").parse()?)
                .add_directive(format!("fx_console={level}").parse()?)
                .add_directive(format!("fx_protocol={level}").parse()?),
        )
        .init();

    run_console(config)
}

#[tokio::main]
async fn run_console(config: ConsoleConfig) -> Result<()> {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        root = %config.session_root.display(),
        port = config.osc_port,
        "SessionFX starting"
    );

    let reply_endpoint = Endpoint::bind(config.osc_port)
        .await
        .context("Failed to bind the reply endpoint")?;
    let control_endpoint = Endpoint::bind(config.osc_port)
        .await
        .context("Failed to bind the control endpoint")?;

    let daemon_url = OscUrl::new(config.host.as_str(), config.osc_port);
    let daemon_addr = resolve(&daemon_url)
        .await
        .with_context(|| format!("Failed to resolve {daemon_url}"))?;

    let link = DaemonLink::new(reply_endpoint.clone(), daemon_addr);
    let session = spawn_session(Arc::new(link), config.namespace.as_str());

    let (notice_tx, notices) = mpsc::channel(NOTICE_BUFFER);
    let listener_token = CancellationToken::new();
    let listeners = [
        reply_endpoint.listen(
            reply_table(session.clone(), notice_tx.clone()),
            listener_token.clone(),
        ),
        control_endpoint.listen(
            discovery_table(&config.namespace, notice_tx),
            listener_token.clone(),
        ),
    ];

    tokio::fs::create_dir_all(&config.session_root)
        .await
        .with_context(|| {
            format!(
                "Failed to create session root {}",
                config.session_root.display()
            )
        })?;

    let spawn = SpawnConfig::nsmd(
        &config.daemon_program,
        &config.session_root,
        daemon_url,
        reply_endpoint.url(&config.host),
    )
    .with_control_url(control_endpoint.url(&config.host));
    let supervisor = DaemonSupervisor::start(&spawn).context("Failed to start the session daemon")?;
    let watch_token = CancellationToken::new();
    let watcher = tokio::spawn(supervisor.watch(DAEMON_POLL, watch_token.clone()));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        signal_token.cancel();
    });

    if let Some(name) = config.session.clone() {
        tokio::spawn(auto_open(
            session.clone(),
            name,
            config.startup_grace,
            shutdown.clone(),
        ));
    }

    let reason = if config.interactive {
        let lines = LineSource::stdin();
        let console = Console::new(session.clone(), config.reload_delay);
        println!("Type 'help' for a list of commands.");
        console.run(&lines, notices, shutdown.clone()).await
    } else {
        headless(notices, shutdown.clone()).await
    };
    info!(?reason, "Console finished");
    shutdown.cancel();

    watch_token.cancel();
    let mut supervisor = watcher.await.context("Daemon watcher panicked")?;

    if reason != ExitReason::Quit && supervisor.is_running() {
        if let Err(e) = session.execute(ServerCommand::Quit).await {
            debug!(error = %e, "Could not ask the daemon to quit");
        }
    }
    match supervisor.terminate(config.terminate_grace).await {
        Ok(status) => debug!(%status, "Daemon reaped"),
        Err(e) => warn!(error = %e, "Failed to stop the session daemon"),
    }

    listener_token.cancel();
    for listener in listeners {
        let _ = listener.await;
    }

    info!("SessionFX stopped");
    Ok(())
}

/// Opens `name` after `grace`, giving the daemon time to start listening.
async fn auto_open(
    session: SessionHandle,
    name: SessionName,
    grace: Duration,
    cancel: CancellationToken,
) {
    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = tokio::time::sleep(grace) => {}
    }

    info!(session = %name, "Opening session");
    if let Err(e) = session.execute(ServerCommand::Open { project: name }).await {
        error!(error = %e, "Failed to open session");
    }
}

/// Prints notices until cancelled.
async fn headless(mut notices: mpsc::Receiver<Notice>, cancel: CancellationToken) -> ExitReason {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return ExitReason::Cancelled,
            notice = notices.recv() => match notice {
                Some(notice) => println!("{notice}"),
                None => {
                    cancel.cancelled().await;
                    return ExitReason::Cancelled;
                }
            },
        }
    }
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
