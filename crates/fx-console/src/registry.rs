//! Console commands and argument resolution.
//!
//! The registry holds the daemon's commands plus the console's own
//! (`help`, `exit`, `reload`, `status`). Arguments for a daemon command
//! come from an [`ArgumentSource`]: values typed on the command line
//! first, then the interactive prompt if there is one.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use fx_protocol::{CommandDescriptor, MessageError, ServerCommand, SERVER_COMMANDS};
use thiserror::Error;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// No value was given and nobody can be asked.
    #[error("{command}: missing argument {name}")]
    MissingArgument {
        command: &'static str,
        name: &'static str,
    },

    /// `key=value` with a key the command does not take.
    #[error("{command}: unknown argument {name}")]
    UnknownArgument { command: &'static str, name: String },

    #[error("{command}: too many arguments")]
    TooManyArguments { command: &'static str },

    /// Input ended while prompting.
    #[error("{command}: input closed while asking for {name}")]
    PromptClosed {
        command: &'static str,
        name: &'static str,
    },

    #[error(transparent)]
    Invalid(#[from] MessageError),
}

// ============================================================================
// Registry
// ============================================================================

/// What a console command does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
    Help,
    Exit,
    Reload,
    Status,
    /// Send a command to the daemon.
    Server(&'static CommandDescriptor),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsoleCommand {
    pub name: &'static str,
    pub help: &'static str,
    pub action: ConsoleAction,
}

const BUILTINS: &[ConsoleCommand] = &[
    ConsoleCommand {
        name: "help",
        help: "list commands",
        action: ConsoleAction::Help,
    },
    ConsoleCommand {
        name: "exit",
        help: "leave the console (the daemon is asked to quit on the way out)",
        action: ConsoleAction::Exit,
    },
    ConsoleCommand {
        name: "reload",
        help: "abort the current session and open it again",
        action: ConsoleAction::Reload,
    },
    ConsoleCommand {
        name: "status",
        help: "show the current session",
        action: ConsoleAction::Status,
    },
];

/// Every command the console accepts, by name.
#[derive(Debug, Clone)]
pub struct CommandRegistry {
    commands: BTreeMap<&'static str, ConsoleCommand>,
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandRegistry {
    pub fn new() -> Self {
        let mut commands = BTreeMap::new();
        for builtin in BUILTINS {
            commands.insert(builtin.name, *builtin);
        }
        for descriptor in SERVER_COMMANDS {
            commands.insert(
                descriptor.name,
                ConsoleCommand {
                    name: descriptor.name,
                    help: descriptor.help,
                    action: ConsoleAction::Server(descriptor),
                },
            );
        }
        Self { commands }
    }

    pub fn lookup(&self, name: &str) -> Option<&ConsoleCommand> {
        self.commands.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.commands.keys().copied()
    }

    /// One line per command, with its arguments.
    pub fn help_text(&self) -> String {
        let mut out = String::new();
        for command in self.commands.values() {
            let mut usage = command.name.to_string();
            if let ConsoleAction::Server(descriptor) = command.action {
                for slot in descriptor.slots {
                    usage.push_str(&format!(" <{}>", slot.name));
                }
            }
            out.push_str(&format!("  {usage:<20} {}\n", command.help));
        }
        out
    }
}

// ============================================================================
// Argument Resolution
// ============================================================================

/// Asks the operator for a value.
#[async_trait]
pub trait Prompt: Send + Sync {
    /// Returns `None` if input has ended.
    async fn ask(&self, label: &str) -> Option<String>;
}

/// Splits a console line into a command name and its words.
pub fn split_line(line: &str) -> Option<(&str, Vec<&str>)> {
    let mut words = line.split_whitespace();
    let name = words.next()?;
    Some((name, words.collect()))
}

/// Argument values for one command: typed on the line, else prompted.
pub struct ArgumentSource<'a> {
    named: HashMap<String, String>,
    positional: Vec<String>,
    prompt: Option<&'a dyn Prompt>,
}

impl<'a> ArgumentSource<'a> {
    /// Values supplied up front, with no prompt to fall back on.
    pub fn supplied(named: HashMap<String, String>) -> Self {
        Self {
            named,
            positional: Vec::new(),
            prompt: None,
        }
    }

    /// Reads `key=value` and positional words.
    pub fn from_words(words: &[&str]) -> Self {
        let mut named = HashMap::new();
        let mut positional = Vec::new();
        for word in words {
            match word.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    named.insert(key.to_string(), value.to_string());
                }
                _ => positional.push((*word).to_string()),
            }
        }
        Self {
            named,
            positional,
            prompt: None,
        }
    }

    pub fn with_prompt(mut self, prompt: &'a dyn Prompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    /// Fills every slot of `descriptor` and builds the command.
    ///
    /// Named values win, then positional values in slot order, then the
    /// prompt. Without a prompt a missing value is an error.
    pub async fn resolve(mut self, descriptor: &'static CommandDescriptor) -> Result<ServerCommand, ResolveError> {
        if let Some(unknown) = self
            .named
            .keys()
            .find(|key| !descriptor.slots.iter().any(|slot| slot.name == key.as_str()))
        {
            return Err(ResolveError::UnknownArgument {
                command: descriptor.name,
                name: unknown.clone(),
            });
        }

        let mut positional = std::mem::take(&mut self.positional).into_iter();
        let mut values = Vec::with_capacity(descriptor.slots.len());

        for slot in descriptor.slots {
            if let Some(value) = self.named.remove(slot.name) {
                values.push(value);
                continue;
            }
            if let Some(value) = positional.next() {
                values.push(value);
                continue;
            }
            let Some(prompt) = self.prompt else {
                return Err(ResolveError::MissingArgument {
                    command: descriptor.name,
                    name: slot.name,
                });
            };
            let value = prompt.ask(slot.prompt).await.ok_or(ResolveError::PromptClosed {
                command: descriptor.name,
                name: slot.name,
            })?;
            values.push(value);
        }

        if positional.next().is_some() {
            return Err(ResolveError::TooManyArguments {
                command: descriptor.name,
            });
        }

        Ok(descriptor.build(&values)?)
    }
}
