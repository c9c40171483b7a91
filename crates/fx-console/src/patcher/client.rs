//! Session and standalone front ends for the patcher.

use std::path::PathBuf;
use std::sync::Arc;

use fx_jack::{BatchReport, JackTools};
use fx_protocol::{announce, ClientEvent, ErrorReply, OscMessage, OscUrl, Reply};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{parse_standalone, Patcher, PatcherAction, PatcherError, StandaloneCommand};
use crate::console::LineSource;
use crate::transport::{resolve, DispatchTable, Endpoint};

/// Name announced to the session daemon.
pub const CLIENT_NAME: &str = "SessionFX-Patcher";

/// Optional client features announced to the daemon (none).
pub const CAPABILITIES: &str = ":";

/// Clients bind at this port plus an offset below 1000.
const CLIENT_BASE_PORT: u16 = 8000;

/// Generic failure code in `/error` replies.
const ERR_GENERAL: i32 = -1;

const EVENT_BUFFER: usize = 32;

/// Runs an action on the blocking pool and hands the patcher back.
async fn apply_blocking(
    mut patcher: Patcher,
    action: PatcherAction,
) -> Result<(Patcher, Result<BatchReport, PatcherError>), PatcherError> {
    tokio::task::spawn_blocking(move || {
        let result = patcher.apply(action);
        (patcher, result)
    })
    .await
    .map_err(|e| PatcherError::Worker(e.to_string()))
}

fn log_report(action: &str, report: &BatchReport) {
    if report.is_clean() {
        info!(action, links = report.attempted, "Patchbay updated");
    } else {
        warn!(
            action,
            attempted = report.attempted,
            failed = report.failures.len(),
            "Patchbay updated with failures"
        );
    }
}

// ============================================================================
// Session Mode
// ============================================================================

/// Runs as a client of the session daemon at `daemon_url` until cancelled.
///
/// Announces itself, then answers `open` and `save` from the daemon and the
/// `/patcher/*` requests.
pub async fn run_session(
    tools: Arc<dyn JackTools>,
    daemon_url: &OscUrl,
    namespace: &str,
    executable: &str,
    cancel: CancellationToken,
) -> Result<(), PatcherError> {
    let endpoint = Endpoint::bind_near(CLIENT_BASE_PORT, 0..=999).await?;
    let daemon = resolve(daemon_url).await?;
    info!(daemon = %daemon_url, port = endpoint.port(), "Starting under session daemon");

    let (event_tx, mut events) = mpsc::channel(EVENT_BUFFER);
    let mut table = DispatchTable::new();
    for path in [
        ClientEvent::open_path(namespace),
        ClientEvent::save_path(namespace),
        ClientEvent::NEW_PATCH_PATH.to_string(),
        ClientEvent::LOAD_PATCH_PATH.to_string(),
        ClientEvent::CLEAR_PATH.to_string(),
    ] {
        let ns = namespace.to_string();
        let tx = event_tx.clone();
        table.register(path, move |message: &OscMessage, _| {
            match ClientEvent::from_message(message, &ns) {
                Ok(event) => {
                    if let Err(e) = tx.try_send(event) {
                        warn!(error = %e, "Dropping client event");
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring malformed client event"),
            }
        });
    }
    let listener_token = cancel.child_token();
    let listener = endpoint.listen(table, listener_token.clone());

    let hello = announce(
        namespace,
        CLIENT_NAME,
        CAPABILITIES,
        executable,
        std::process::id(),
    );
    endpoint.send_to(daemon, &hello).await?;

    let mut patcher = Patcher::new(tools);
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let (answer_path, action) = match event {
            ClientEvent::Open { instance_path, display_name, client_id } => {
                info!(
                    instance = %instance_path,
                    name = %display_name,
                    client_id = %client_id,
                    "Open requested"
                );
                (
                    Some(ClientEvent::open_path(namespace)),
                    PatcherAction::Open {
                        instance: PathBuf::from(instance_path),
                    },
                )
            }
            ClientEvent::Save => (Some(ClientEvent::save_path(namespace)), PatcherAction::Save),
            ClientEvent::NewPatch { name } => match fx_core::PatchbayName::parse(&name) {
                Ok(name) => (None, PatcherAction::New(name)),
                Err(e) => {
                    warn!(error = %e, "Rejecting new patchbay");
                    continue;
                }
            },
            ClientEvent::LoadPatch { name } => match fx_core::PatchbayName::parse(&name) {
                Ok(name) => (None, PatcherAction::Load(name)),
                Err(e) => {
                    warn!(error = %e, "Rejecting patchbay load");
                    continue;
                }
            },
            ClientEvent::Clear => (None, PatcherAction::Clear),
        };

        let label = format!("{action:?}");
        let (returned, result) = apply_blocking(patcher, action).await?;
        patcher = returned;

        let answer = match &result {
            Ok(report) => {
                log_report(&label, report);
                answer_path.map(|path| {
                    Reply {
                        path,
                        message: "OK".to_string(),
                    }
                    .to_message()
                })
            }
            Err(e) => {
                error!(action = %label, error = %e, "Patcher action failed");
                answer_path.map(|path| {
                    ErrorReply {
                        path,
                        code: ERR_GENERAL,
                        message: e.to_string(),
                    }
                    .to_message()
                })
            }
        };
        if let Some(answer) = answer {
            if let Err(e) = endpoint.send_to(daemon, &answer).await {
                warn!(error = %e, "Could not answer daemon");
            }
        }
    }

    listener_token.cancel();
    let _ = listener.await;
    info!("Patcher stopped");
    Ok(())
}

// ============================================================================
// Standalone Mode
// ============================================================================

/// Runs from `instance` taking commands from `lines` until `quit`, end of
/// input or cancellation.
pub async fn run_standalone(
    tools: Arc<dyn JackTools>,
    instance: PathBuf,
    lines: &LineSource,
    cancel: CancellationToken,
) -> Result<(), PatcherError> {
    let mut patcher = Patcher::new(tools);
    patcher.attach(&instance)?;
    println!("Ready");

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => match line {
                Some(line) => line,
                None => break,
            },
        };

        let action = match parse_standalone(&line) {
            Ok(Some(StandaloneCommand::Quit)) => break,
            Ok(Some(StandaloneCommand::Action(action))) => action,
            Ok(None) => {
                debug!(line = %line, "Ignoring input");
                continue;
            }
            Err(e) => {
                eprintln!("error: {e}");
                continue;
            }
        };

        let label = format!("{action:?}");
        let (returned, result) = apply_blocking(patcher, action).await?;
        patcher = returned;
        match result {
            Ok(report) => {
                log_report(&label, &report);
                println!(
                    "{} ({} links, {} failed)",
                    patcher.current(),
                    report.attempted,
                    report.failures.len()
                );
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }

    info!("Patcher stopped");
    Ok(())
}
