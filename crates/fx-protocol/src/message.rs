//! Session protocol message types.
//!
//! Server commands go to the daemon at `/<namespace>/server/<name>`.
//! Answers come back asynchronously as `/reply` or `/error`, echoing the
//! path of the command they answer. Clients launched inside a session
//! receive `/<namespace>/client/*` messages.

use fx_core::SessionName;
use thiserror::Error;

use crate::osc::{OscArg, OscMessage};

/// Namespace used by the stock session daemon.
pub const DEFAULT_NAMESPACE: &str = "nsm";

/// Path of generic replies.
pub const REPLY_PATH: &str = "/reply";

/// Path of error replies.
pub const ERROR_PATH: &str = "/error";

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while building or decoding protocol messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MessageError {
    /// No command with this name.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// Wrong number of arguments for a command.
    #[error("{command} takes {expected} argument(s), got {found}")]
    ArgumentCount {
        command: &'static str,
        expected: usize,
        found: usize,
    },

    /// An argument could not be converted to its declared type.
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidArgument {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// Inbound message had the wrong path for the requested decoding.
    #[error("expected message at {expected}, got {found}")]
    WrongPath { expected: String, found: String },

    /// Inbound message arguments did not match the expected type tags.
    #[error("{path}: expected arguments ({expected}), got ({found})")]
    Malformed {
        path: String,
        expected: &'static str,
        found: String,
    },
}

// ============================================================================
// Command Descriptors
// ============================================================================

/// Declared type of a command argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Str,
    Int,
}

impl ArgKind {
    /// Converts raw user input into a typed argument.
    pub fn parse(&self, name: &'static str, value: &str) -> Result<OscArg, MessageError> {
        match self {
            Self::Str => {
                if value.trim().is_empty() {
                    return Err(MessageError::InvalidArgument {
                        name,
                        value: value.to_string(),
                        reason: "must not be empty".to_string(),
                    });
                }
                Ok(OscArg::Str(value.trim().to_string()))
            }
            Self::Int => value
                .trim()
                .parse::<i32>()
                .map(OscArg::Int)
                .map_err(|e| MessageError::InvalidArgument {
                    name,
                    value: value.to_string(),
                    reason: e.to_string(),
                }),
        }
    }
}

/// One declared argument of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSlot {
    pub kind: ArgKind,
    pub name: &'static str,
    /// Label shown when the value has to be asked for.
    pub prompt: &'static str,
}

/// Static description of a server command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandDescriptor {
    pub name: &'static str,
    pub slots: &'static [ArgSlot],
    pub help: &'static str,
    /// Session becomes closed after sending.
    pub quit: bool,
    /// First argument becomes the current session before sending.
    pub load: bool,
}

const CLIENT_SLOT: &[ArgSlot] = &[ArgSlot {
    kind: ArgKind::Str,
    name: "client",
    prompt: "Program",
}];

const PROJECT_SLOT: &[ArgSlot] = &[ArgSlot {
    kind: ArgKind::Str,
    name: "project",
    prompt: "Session",
}];

const NEW_PROJECT_SLOT: &[ArgSlot] = &[ArgSlot {
    kind: ArgKind::Str,
    name: "project",
    prompt: "New Session",
}];

const fn effect_only(name: &'static str, help: &'static str) -> CommandDescriptor {
    CommandDescriptor {
        name,
        slots: &[],
        help,
        quit: false,
        load: false,
    }
}

const fn closing(name: &'static str, help: &'static str) -> CommandDescriptor {
    CommandDescriptor {
        name,
        slots: &[],
        help,
        quit: true,
        load: false,
    }
}

const fn loading(
    name: &'static str,
    slots: &'static [ArgSlot],
    help: &'static str,
) -> CommandDescriptor {
    CommandDescriptor {
        name,
        slots,
        help,
        quit: false,
        load: true,
    }
}

/// Every command the daemon understands.
pub const SERVER_COMMANDS: &[CommandDescriptor] = &[
    CommandDescriptor {
        name: "add",
        slots: CLIENT_SLOT,
        help: "add a program to the current session",
        quit: false,
        load: false,
    },
    effect_only("save", "save the current session"),
    loading("open", PROJECT_SLOT, "open a session"),
    loading("new", NEW_PROJECT_SLOT, "create a new session"),
    loading("duplicate", NEW_PROJECT_SLOT, "duplicate the current session under a new name"),
    closing("close", "save and close the current session"),
    closing("abort", "close the current session without saving"),
    closing("quit", "close the session and stop the daemon"),
    effect_only("list", "list available sessions"),
];

impl CommandDescriptor {
    /// Finds a server command by name.
    pub fn lookup(name: &str) -> Option<&'static CommandDescriptor> {
        SERVER_COMMANDS.iter().find(|d| d.name == name)
    }

    /// Builds a typed command from values given in slot order.
    pub fn build(&self, values: &[String]) -> Result<ServerCommand, MessageError> {
        if values.len() != self.slots.len() {
            return Err(MessageError::ArgumentCount {
                command: self.name,
                expected: self.slots.len(),
                found: values.len(),
            });
        }

        let mut args = Vec::with_capacity(values.len());
        for (slot, value) in self.slots.iter().zip(values) {
            args.push(slot.kind.parse(slot.name, value)?);
        }
        let first = || -> String {
            args.first()
                .and_then(OscArg::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let command = match self.name {
            "add" => ServerCommand::Add { client: first() },
            "save" => ServerCommand::Save,
            "open" => ServerCommand::Open {
                project: SessionName::new(first()),
            },
            "new" => ServerCommand::New {
                project: SessionName::new(first()),
            },
            "duplicate" => ServerCommand::Duplicate {
                project: SessionName::new(first()),
            },
            "close" => ServerCommand::Close,
            "abort" => ServerCommand::Abort,
            "quit" => ServerCommand::Quit,
            "list" => ServerCommand::List,
            other => return Err(MessageError::UnknownCommand(other.to_string())),
        };
        Ok(command)
    }
}

// ============================================================================
// Server Commands
// ============================================================================

/// A fully resolved command for the session daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerCommand {
    Add { client: String },
    Save,
    Open { project: SessionName },
    New { project: SessionName },
    Duplicate { project: SessionName },
    Close,
    Abort,
    Quit,
    List,
}

impl ServerCommand {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Save => "save",
            Self::Open { .. } => "open",
            Self::New { .. } => "new",
            Self::Duplicate { .. } => "duplicate",
            Self::Close => "close",
            Self::Abort => "abort",
            Self::Quit => "quit",
            Self::List => "list",
        }
    }

    /// The static descriptor for this command.
    pub fn descriptor(&self) -> Option<&'static CommandDescriptor> {
        CommandDescriptor::lookup(self.name())
    }

    /// Session to adopt before sending, for load-flagged commands.
    pub fn load_target(&self) -> Option<&SessionName> {
        match self {
            Self::Open { project } | Self::New { project } | Self::Duplicate { project } => {
                Some(project)
            }
            _ => None,
        }
    }

    /// True if the session is closed once this command is sent.
    pub fn closes_session(&self) -> bool {
        matches!(self, Self::Close | Self::Abort | Self::Quit)
    }

    /// Protocol path, e.g. `/nsm/server/open`.
    pub fn path(&self, namespace: &str) -> String {
        format!("/{namespace}/server/{}", self.name())
    }

    fn args(&self) -> Vec<OscArg> {
        match self {
            Self::Add { client } => vec![OscArg::Str(client.clone())],
            Self::Open { project } | Self::New { project } | Self::Duplicate { project } => {
                vec![OscArg::Str(project.as_str().to_string())]
            }
            _ => Vec::new(),
        }
    }

    /// Encodes this command as an OSC message.
    pub fn to_message(&self, namespace: &str) -> OscMessage {
        OscMessage::new(self.path(namespace), self.args())
    }
}

// ============================================================================
// Inbound Messages
// ============================================================================

fn expect_path(message: &OscMessage, expected: &str) -> Result<(), MessageError> {
    if message.path != expected {
        return Err(MessageError::WrongPath {
            expected: expected.to_string(),
            found: message.path.clone(),
        });
    }
    Ok(())
}

fn malformed(message: &OscMessage, expected: &'static str) -> MessageError {
    MessageError::Malformed {
        path: message.path.clone(),
        expected,
        found: message.type_tags(),
    }
}

/// Generic reply: `/reply (originalPath, message)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub path: String,
    pub message: String,
}

impl Reply {
    pub fn from_message(message: &OscMessage) -> Result<Self, MessageError> {
        expect_path(message, REPLY_PATH)?;
        match (message.str_arg(0), message.str_arg(1)) {
            (Some(path), Some(text)) => Ok(Self {
                path: path.to_string(),
                message: text.to_string(),
            }),
            // Some daemons acknowledge with the path alone.
            (Some(path), None) if message.args.len() == 1 => Ok(Self {
                path: path.to_string(),
                message: String::new(),
            }),
            _ => Err(malformed(message, "ss")),
        }
    }

    /// Empty replies are heartbeats and are not shown.
    pub fn is_heartbeat(&self) -> bool {
        self.message.is_empty()
    }

    pub fn to_message(&self) -> OscMessage {
        OscMessage::new(
            REPLY_PATH,
            vec![self.path.as_str().into(), self.message.as_str().into()],
        )
    }
}

/// Error reply: `/error (originalPath, code, message)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorReply {
    pub path: String,
    pub code: i32,
    pub message: String,
}

impl ErrorReply {
    pub fn from_message(message: &OscMessage) -> Result<Self, MessageError> {
        expect_path(message, ERROR_PATH)?;
        match (message.str_arg(0), message.int_arg(1), message.str_arg(2)) {
            (Some(path), Some(code), Some(text)) => Ok(Self {
                path: path.to_string(),
                code,
                message: text.to_string(),
            }),
            _ => Err(malformed(message, "sis")),
        }
    }

    pub fn to_message(&self) -> OscMessage {
        OscMessage::new(
            ERROR_PATH,
            vec![
                self.path.as_str().into(),
                OscArg::Int(self.code),
                self.message.as_str().into(),
            ],
        )
    }
}

/// Registration events published on the control endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// `/<ns>/new/client (clientId, controlPort)`
    ClientRegistered { client_id: String, control_port: i32 },
    /// `/<ns>/new/method (clientId, methodName, paramSpec, description)`
    MethodRegistered {
        client_id: String,
        method: String,
        params: String,
        description: String,
    },
}

impl DiscoveryEvent {
    pub fn client_path(namespace: &str) -> String {
        format!("/{namespace}/new/client")
    }

    pub fn method_path(namespace: &str) -> String {
        format!("/{namespace}/new/method")
    }

    pub fn from_message(message: &OscMessage, namespace: &str) -> Result<Self, MessageError> {
        if message.path == Self::client_path(namespace) {
            return match (message.str_arg(0), message.int_arg(1)) {
                (Some(client_id), Some(control_port)) => Ok(Self::ClientRegistered {
                    client_id: client_id.to_string(),
                    control_port,
                }),
                _ => Err(malformed(message, "si")),
            };
        }
        if message.path == Self::method_path(namespace) {
            return match (
                message.str_arg(0),
                message.str_arg(1),
                message.str_arg(2),
                message.str_arg(3),
            ) {
                (Some(client_id), Some(method), Some(params), Some(description)) => {
                    Ok(Self::MethodRegistered {
                        client_id: client_id.to_string(),
                        method: method.to_string(),
                        params: params.to_string(),
                        description: description.to_string(),
                    })
                }
                _ => Err(malformed(message, "ssss")),
            };
        }
        Err(MessageError::WrongPath {
            expected: format!("/{namespace}/new/*"),
            found: message.path.clone(),
        })
    }
}

impl std::fmt::Display for DiscoveryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientRegistered {
                client_id,
                control_port,
            } => write!(f, "client {client_id} registered on port {control_port}"),
            Self::MethodRegistered {
                client_id,
                method,
                params,
                description,
            } => write!(f, "{client_id} exposes {method}({params}): {description}"),
        }
    }
}

// ============================================================================
// Client Side
// ============================================================================

/// Messages the daemon (or a user) sends to a session client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// `/<ns>/client/open (instancePath, displayName, clientId)`
    Open {
        instance_path: String,
        display_name: String,
        client_id: String,
    },
    /// `/<ns>/client/save`
    Save,
    /// `/patcher/new (name)`
    NewPatch { name: String },
    /// `/patcher/load (name)`
    LoadPatch { name: String },
    /// `/patcher/clear`
    Clear,
}

impl ClientEvent {
    pub const NEW_PATCH_PATH: &'static str = "/patcher/new";
    pub const LOAD_PATCH_PATH: &'static str = "/patcher/load";
    pub const CLEAR_PATH: &'static str = "/patcher/clear";

    pub fn open_path(namespace: &str) -> String {
        format!("/{namespace}/client/open")
    }

    pub fn save_path(namespace: &str) -> String {
        format!("/{namespace}/client/save")
    }

    pub fn from_message(message: &OscMessage, namespace: &str) -> Result<Self, MessageError> {
        let path = message.path.as_str();
        if path == Self::open_path(namespace) {
            return match (message.str_arg(0), message.str_arg(1), message.str_arg(2)) {
                (Some(instance_path), Some(display_name), Some(client_id)) => Ok(Self::Open {
                    instance_path: instance_path.to_string(),
                    display_name: display_name.to_string(),
                    client_id: client_id.to_string(),
                }),
                _ => Err(malformed(message, "sss")),
            };
        }
        if path == Self::save_path(namespace) {
            return Ok(Self::Save);
        }
        match path {
            Self::NEW_PATCH_PATH => message
                .str_arg(0)
                .map(|name| Self::NewPatch {
                    name: name.to_string(),
                })
                .ok_or_else(|| malformed(message, "s")),
            Self::LOAD_PATCH_PATH => message
                .str_arg(0)
                .map(|name| Self::LoadPatch {
                    name: name.to_string(),
                })
                .ok_or_else(|| malformed(message, "s")),
            Self::CLEAR_PATH => Ok(Self::Clear),
            other => Err(MessageError::WrongPath {
                expected: format!("/{namespace}/client/*"),
                found: other.to_string(),
            }),
        }
    }
}

/// Builds the announce a client sends when started inside a session.
pub fn announce(
    namespace: &str,
    client_name: &str,
    capabilities: &str,
    executable: &str,
    pid: u32,
) -> OscMessage {
    OscMessage::new(
        format!("/{namespace}/server/announce"),
        vec![
            client_name.into(),
            capabilities.into(),
            executable.into(),
            OscArg::Int(1),
            OscArg::Int(1),
            OscArg::Int(i32::try_from(pid).unwrap_or(i32::MAX)),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_command_message() {
        let cmd = CommandDescriptor::lookup("open")
            .unwrap()
            .build(&["demo".to_string()])
            .unwrap();
        assert_eq!(cmd.load_target(), Some(&SessionName::new("demo")));
        let msg = cmd.to_message("nsm");
        assert_eq!(msg.path, "/nsm/server/open");
        assert_eq!(msg.args, vec![OscArg::Str("demo".to_string())]);
    }

    #[test]
    fn test_descriptor_flags() {
        for name in ["new", "open", "duplicate"] {
            let d = CommandDescriptor::lookup(name).unwrap();
            assert!(d.load && !d.quit, "{name}");
        }
        for name in ["close", "abort", "quit"] {
            let d = CommandDescriptor::lookup(name).unwrap();
            assert!(d.quit && !d.load, "{name}");
        }
        for name in ["save", "list", "add"] {
            let d = CommandDescriptor::lookup(name).unwrap();
            assert!(!d.quit && !d.load, "{name}");
        }
    }

    #[test]
    fn test_every_descriptor_builds_matching_command() {
        for d in SERVER_COMMANDS {
            let values: Vec<String> = d.slots.iter().map(|_| "x".to_string()).collect();
            let cmd = d.build(&values).unwrap();
            assert_eq!(cmd.name(), d.name);
            assert_eq!(cmd.closes_session(), d.quit);
            assert_eq!(cmd.load_target().is_some(), d.load);
            assert_eq!(cmd.to_message("nsm").args.len(), d.slots.len());
        }
    }

    #[test]
    fn test_build_rejects_wrong_arity() {
        let err = CommandDescriptor::lookup("save")
            .unwrap()
            .build(&["extra".to_string()])
            .unwrap_err();
        assert!(matches!(err, MessageError::ArgumentCount { expected: 0, found: 1, .. }));
    }

    #[test]
    fn test_build_rejects_blank_project() {
        let err = CommandDescriptor::lookup("new")
            .unwrap()
            .build(&["  ".to_string()])
            .unwrap_err();
        assert!(matches!(err, MessageError::InvalidArgument { name: "project", .. }));
    }

    #[test]
    fn test_int_arg_kind() {
        assert_eq!(ArgKind::Int.parse("port", " 42 "), Ok(OscArg::Int(42)));
        assert!(ArgKind::Int.parse("port", "x").is_err());
    }

    #[test]
    fn test_reply_decoding() {
        let msg = OscMessage::new(REPLY_PATH, vec!["/nsm/server/open".into(), "Loaded.".into()]);
        let reply = Reply::from_message(&msg).unwrap();
        assert_eq!(reply.path, "/nsm/server/open");
        assert!(!reply.is_heartbeat());

        let empty = OscMessage::new(REPLY_PATH, vec!["/nsm/server/save".into(), "".into()]);
        assert!(Reply::from_message(&empty).unwrap().is_heartbeat());

        let bad = OscMessage::new(REPLY_PATH, vec![OscArg::Int(3)]);
        assert!(matches!(Reply::from_message(&bad), Err(MessageError::Malformed { .. })));
    }

    #[test]
    fn test_error_reply_decoding() {
        let msg = OscMessage::new(
            ERROR_PATH,
            vec!["/nsm/server/open".into(), OscArg::Int(-9), "No such session".into()],
        );
        let err = ErrorReply::from_message(&msg).unwrap();
        assert_eq!(err.code, -9);
        assert_eq!(err.message, "No such session");
        assert_eq!(err.to_message(), msg);
    }

    #[test]
    fn test_discovery_decoding() {
        let client = OscMessage::new("/nsm/new/client", vec!["synth".into(), OscArg::Int(9000)]);
        assert_eq!(
            DiscoveryEvent::from_message(&client, "nsm").unwrap(),
            DiscoveryEvent::ClientRegistered {
                client_id: "synth".to_string(),
                control_port: 9000
            }
        );

        let method = OscMessage::new(
            "/nsm/new/method",
            vec!["synth".into(), "/gain".into(), "f".into(), "output gain".into()],
        );
        let event = DiscoveryEvent::from_message(&method, "nsm").unwrap();
        assert_eq!(event.to_string(), "synth exposes /gain(f): output gain");

        let other = OscMessage::new("/other", vec![]);
        assert!(DiscoveryEvent::from_message(&other, "nsm").is_err());
    }

    #[test]
    fn test_client_event_decoding() {
        let open = OscMessage::new(
            "/nsm/client/open",
            vec!["/sessions/demo/fx".into(), "FX".into(), "nABCD".into()],
        );
        assert!(matches!(
            ClientEvent::from_message(&open, "nsm").unwrap(),
            ClientEvent::Open { .. }
        ));

        let new = OscMessage::new("/patcher/new", vec!["live.pbay".into()]);
        assert_eq!(
            ClientEvent::from_message(&new, "nsm").unwrap(),
            ClientEvent::NewPatch {
                name: "live.pbay".to_string()
            }
        );

        let save = OscMessage::new("/nsm/client/save", vec![]);
        assert_eq!(ClientEvent::from_message(&save, "nsm").unwrap(), ClientEvent::Save);
    }

    #[test]
    fn test_announce_layout() {
        let msg = announce("nsm", "fx-patcher", ":", "fx-patcher", 1234);
        assert_eq!(msg.path, "/nsm/server/announce");
        assert_eq!(msg.type_tags(), "sssiii");
        assert_eq!(msg.int_arg(5), Some(1234));
    }
}
