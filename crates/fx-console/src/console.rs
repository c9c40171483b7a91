//! Interactive command loop.
//!
//! Reads lines from stdin on a dedicated thread and runs them against the
//! session controller, printing notices from the listeners in between.

use std::io::{BufRead, Write};
use std::time::Duration;

use async_trait::async_trait;
use fx_protocol::ServerCommand;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::listener::Notice;
use crate::registry::{split_line, ArgumentSource, CommandRegistry, ConsoleAction, Prompt, ResolveError};
use crate::session::{SessionError, SessionHandle};

const LINE_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// What the loop does after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// `exit`: leave the loop; the caller still asks the daemon to quit.
    Exit,
    /// `quit` was sent; the daemon is shutting down.
    Quit,
}

/// Why [`Console::run`] returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    Exit,
    Quit,
    EndOfInput,
    Cancelled,
}

// ============================================================================
// Line Source
// ============================================================================

/// Lines typed by the operator.
///
/// Serves both the command loop and argument prompts, so a prompt reads
/// the next line the loop would otherwise have read.
pub struct LineSource {
    lines: Mutex<mpsc::Receiver<String>>,
}

impl LineSource {
    /// Starts a thread reading stdin. It ends at EOF or once the source
    /// is dropped.
    pub fn stdin() -> Self {
        let (tx, rx) = mpsc::channel(LINE_BUFFER);
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
            debug!("Stdin reader finished");
        });
        Self::from_receiver(rx)
    }

    pub fn from_receiver(receiver: mpsc::Receiver<String>) -> Self {
        Self {
            lines: Mutex::new(receiver),
        }
    }

    pub async fn next_line(&self) -> Option<String> {
        self.lines.lock().await.recv().await
    }
}

#[async_trait]
impl Prompt for LineSource {
    async fn ask(&self, label: &str) -> Option<String> {
        print!("{label} << ");
        let _ = std::io::stdout().flush();
        self.next_line().await
    }
}

// ============================================================================
// Console
// ============================================================================

pub struct Console {
    registry: CommandRegistry,
    session: SessionHandle,
    reload_delay: Duration,
}

impl Console {
    pub fn new(session: SessionHandle, reload_delay: Duration) -> Self {
        Self {
            registry: CommandRegistry::new(),
            session,
            reload_delay,
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Runs one console line.
    ///
    /// Unknown command names are ignored. Without a prompt, every argument
    /// must be on the line.
    pub async fn execute_line(&self, line: &str, prompt: Option<&dyn Prompt>) -> Result<Flow, ConsoleError> {
        let Some((name, words)) = split_line(line) else {
            return Ok(Flow::Continue);
        };
        let Some(command) = self.registry.lookup(name) else {
            debug!(command = name, "Ignoring unknown command");
            return Ok(Flow::Continue);
        };

        match command.action {
            ConsoleAction::Help => {
                print!("{}", self.registry.help_text());
                Ok(Flow::Continue)
            }
            ConsoleAction::Exit => Ok(Flow::Exit),
            ConsoleAction::Status => {
                println!("{}", self.session.snapshot().await);
                Ok(Flow::Continue)
            }
            ConsoleAction::Reload => {
                let snapshot = self.session.reload(self.reload_delay).await?;
                println!("{snapshot}");
                Ok(Flow::Continue)
            }
            ConsoleAction::Server(descriptor) => {
                let mut source = ArgumentSource::from_words(&words);
                if let Some(prompt) = prompt {
                    source = source.with_prompt(prompt);
                }
                let server_command = source.resolve(descriptor).await?;
                let quitting = server_command == ServerCommand::Quit;

                let snapshot = self.session.execute(server_command).await?;
                debug!(command = descriptor.name, session = %snapshot, "Command sent");

                Ok(if quitting { Flow::Quit } else { Flow::Continue })
            }
        }
    }

    /// Reads and runs lines until `exit`, `quit`, end of input, or
    /// cancellation. Errors are printed and the loop carries on.
    pub async fn run(
        &self,
        lines: &LineSource,
        mut notices: mpsc::Receiver<Notice>,
        cancel: CancellationToken,
    ) -> ExitReason {
        info!("Console ready");
        let mut notices_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return ExitReason::Cancelled,
                notice = notices.recv(), if notices_open => match notice {
                    Some(notice) => println!("{notice}"),
                    None => notices_open = false,
                },
                line = lines.next_line() => {
                    let Some(line) = line else {
                        return ExitReason::EndOfInput;
                    };
                    match self.execute_line(&line, Some(lines as &dyn Prompt)).await {
                        Ok(Flow::Continue) => {}
                        Ok(Flow::Exit) => return ExitReason::Exit,
                        Ok(Flow::Quit) => return ExitReason::Quit,
                        Err(e) => eprintln!("error: {e}"),
                    }
                }
            }
        }
    }
}
