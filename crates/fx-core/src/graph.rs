//! Patchbay graph model and the port enumeration parser.
//!
//! The audio server lists ports as non-indented lines. With aliases
//! requested, the first indented line under a port is its alias and every
//! further indented line is a port it is connected to:
//!
//! ```text
//! system:capture_1
//!    portA
//!    system:playback_1
//!    properties: output,physical,terminal,
//! system:playback_1
//!    portB
//!    system:capture_1
//!    properties: input,physical,terminal,
//! ```
//!
//! The server lists a link under both of its ports, so the listing order
//! says nothing about direction. The `properties:` line does: every link is
//! stored from the output port to the input port.
//!
//! Raw port names change between server restarts, so graphs are always
//! stored by alias.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::trace;

// ============================================================================
// Identifiers
// ============================================================================

/// Port name assigned by the audio server. Not stable across restarts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Port(String);

impl Port {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable, human-assigned name of a port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Alias(String);

impl Alias {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Alias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which way signal flows through a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDirection {
    Input,
    Output,
}

impl PortDirection {
    const PROPERTIES: &'static str = "properties:";

    /// Reads a `properties: output,physical,...` line.
    ///
    /// Returns `None` for any other line, and `Some(None)` for a properties
    /// line that names neither direction.
    fn from_properties_line(line: &str) -> Option<Option<Self>> {
        let flags = line.trim().strip_prefix(Self::PROPERTIES)?;
        let direction = flags.split(',').map(str::trim).find_map(|flag| match flag {
            "input" => Some(Self::Input),
            "output" => Some(Self::Output),
            _ => None,
        });
        Some(direction)
    }

    pub fn as_flag(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Output => "output",
        }
    }
}

/// A signal path from `source` to `destination`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Connection<N> {
    pub source: N,
    pub destination: N,
}

impl<N> Connection<N> {
    pub fn new(source: N, destination: N) -> Self {
        Self {
            source,
            destination,
        }
    }
}

impl<N: PartialEq> Connection<N> {
    /// True if both connections join the same two ports, in either direction.
    pub fn same_link(&self, other: &Self) -> bool {
        (self.source == other.source && self.destination == other.destination)
            || (self.source == other.destination && self.destination == other.source)
    }
}

impl<N: fmt::Display> fmt::Display for Connection<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.destination)
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors raised while parsing enumeration output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// An indented line appeared before any port line.
    #[error("line {line}: indented entry {entry:?} has no preceding port")]
    OrphanEntry { line: usize, entry: String },

    /// A port line was not followed by its alias.
    #[error("line {line}: port {port} has no alias")]
    MissingAlias { line: usize, port: Port },

    /// Two ports claimed the same alias.
    #[error("alias {alias} is used by both {first} and {second}")]
    DuplicateAlias {
        alias: Alias,
        first: Port,
        second: Port,
    },

    /// The same port was listed twice.
    #[error("port {0} is listed more than once")]
    DuplicatePort(Port),

    /// A connection names a port that is not in the dump.
    #[error("connection {source_port} -> {destination} references an unlisted port")]
    UnknownPort { source_port: Port, destination: Port },
}

// ============================================================================
// Alias Map
// ============================================================================

/// Bijection between ports and their aliases.
///
/// Kept as two maps so both directions are O(1); enumeration order is
/// remembered so serialized output is stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasMap {
    port_by_alias: HashMap<Alias, Port>,
    alias_by_port: HashMap<Port, Alias>,
    order: Vec<Alias>,
}

impl AliasMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `port` is known as `alias`.
    ///
    /// # Errors
    /// - `GraphError::DuplicatePort` if the port already has an alias
    /// - `GraphError::DuplicateAlias` if another port owns the alias
    pub fn insert(&mut self, port: Port, alias: Alias) -> Result<(), GraphError> {
        if self.alias_by_port.contains_key(&port) {
            return Err(GraphError::DuplicatePort(port));
        }
        if let Some(first) = self.port_by_alias.get(&alias) {
            return Err(GraphError::DuplicateAlias {
                alias,
                first: first.clone(),
                second: port,
            });
        }
        self.port_by_alias.insert(alias.clone(), port.clone());
        self.alias_by_port.insert(port, alias.clone());
        self.order.push(alias);
        Ok(())
    }

    pub fn port_of(&self, alias: &Alias) -> Option<&Port> {
        self.port_by_alias.get(alias)
    }

    pub fn alias_of(&self, port: &Port) -> Option<&Alias> {
        self.alias_by_port.get(port)
    }

    /// Aliases in enumeration order.
    pub fn aliases(&self) -> impl Iterator<Item = &Alias> {
        self.order.iter()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

// ============================================================================
// Graph
// ============================================================================

/// Known ports (by alias) and the connections between them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    ports: Vec<Alias>,
    connections: Vec<Connection<Alias>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from parts, dropping repeated ports and connections.
    pub fn from_parts(
        ports: impl IntoIterator<Item = Alias>,
        connections: impl IntoIterator<Item = Connection<Alias>>,
    ) -> Self {
        let mut graph = Self::new();
        for port in ports {
            graph.add_port(port);
        }
        for connection in connections {
            graph.add_connection(connection);
        }
        graph
    }

    pub fn add_port(&mut self, alias: Alias) {
        if !self.ports.contains(&alias) {
            self.ports.push(alias);
        }
    }

    /// Adds a connection unless the identical pair is already present.
    pub fn add_connection(&mut self, connection: Connection<Alias>) {
        if !self.connections.contains(&connection) {
            self.connections.push(connection);
        }
    }

    pub fn ports(&self) -> &[Alias] {
        &self.ports
    }

    pub fn connections(&self) -> &[Connection<Alias>] {
        &self.connections
    }

    /// Connections as an order-independent set.
    pub fn connection_set(&self) -> BTreeSet<Connection<Alias>> {
        self.connections.iter().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty() && self.connections.is_empty()
    }
}

/// Result of parsing an enumeration that includes aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Enumeration {
    pub aliases: AliasMap,
    pub graph: Graph,
}

// ============================================================================
// Parsers
// ============================================================================

enum ScanState {
    AwaitingPort,
    AwaitingAlias { port: Port, line: usize },
    CollectingConnections { port: Port },
}

fn is_indented(line: &str) -> bool {
    line.starts_with(' ') || line.starts_with('\t')
}

fn first_token(line: &str) -> Option<&str> {
    line.split_whitespace().next()
}

/// Parses `jack_lsp -c -A -p` style output into aliases and an alias graph.
///
/// Links are oriented from the output port to the input port. Without
/// `properties:` lines the listed direction is kept. A link listed under
/// both of its ports is recorded once.
///
/// Nothing is returned on error, so a caller can never act on half a graph.
pub fn parse_enumeration(text: &str) -> Result<Enumeration, GraphError> {
    let mut aliases = AliasMap::new();
    let mut raw: Vec<Connection<Port>> = Vec::new();
    let mut directions: HashMap<Port, PortDirection> = HashMap::new();
    let mut state = ScanState::AwaitingPort;

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let Some(token) = first_token(line) else {
            continue;
        };

        if is_indented(line) {
            if let Some(direction) = PortDirection::from_properties_line(line) {
                match &state {
                    ScanState::AwaitingPort => {
                        return Err(GraphError::OrphanEntry {
                            line: line_no,
                            entry: token.to_string(),
                        });
                    }
                    ScanState::AwaitingAlias { port, line } => {
                        return Err(GraphError::MissingAlias {
                            line: *line,
                            port: port.clone(),
                        });
                    }
                    ScanState::CollectingConnections { port } => {
                        if let Some(direction) = direction {
                            directions.insert(port.clone(), direction);
                        }
                    }
                }
                continue;
            }
        }

        if !is_indented(line) {
            if let ScanState::AwaitingAlias { port, line } = state {
                return Err(GraphError::MissingAlias { line, port });
            }
            state = ScanState::AwaitingAlias {
                port: Port::new(line.trim_end()),
                line: line_no,
            };
            continue;
        }

        state = match state {
            ScanState::AwaitingPort => {
                return Err(GraphError::OrphanEntry {
                    line: line_no,
                    entry: token.to_string(),
                });
            }
            ScanState::AwaitingAlias { port, .. } => {
                aliases.insert(port.clone(), Alias::new(token))?;
                ScanState::CollectingConnections { port }
            }
            ScanState::CollectingConnections { port } => {
                raw.push(Connection::new(port.clone(), Port::new(token)));
                ScanState::CollectingConnections { port }
            }
        };
    }

    if let ScanState::AwaitingAlias { port, line } = state {
        return Err(GraphError::MissingAlias { line, port });
    }

    let mut graph = Graph::from_parts(aliases.aliases().cloned(), std::iter::empty());
    for connection in raw {
        let (Some(source), Some(destination)) = (
            aliases.alias_of(&connection.source),
            aliases.alias_of(&connection.destination),
        ) else {
            return Err(GraphError::UnknownPort {
                source_port: connection.source,
                destination: connection.destination,
            });
        };
        let reversed = matches!(
            (
                directions.get(&connection.source),
                directions.get(&connection.destination)
            ),
            (Some(PortDirection::Input), _) | (_, Some(PortDirection::Output))
        );
        let link = if reversed {
            Connection::new(destination.clone(), source.clone())
        } else {
            Connection::new(source.clone(), destination.clone())
        };
        if !graph.connections.iter().any(|c| c.same_link(&link)) {
            graph.add_connection(link);
        }
    }

    trace!(
        ports = graph.ports().len(),
        connections = graph.connections().len(),
        "Parsed port enumeration"
    );

    Ok(Enumeration { aliases, graph })
}

/// Parses `jack_lsp -c` style output (no aliases) into raw port pairs.
///
/// A link listed under both of its ports is returned once.
pub fn parse_connections(text: &str) -> Result<Vec<Connection<Port>>, GraphError> {
    let mut current: Option<Port> = None;
    let mut pairs: Vec<Connection<Port>> = Vec::new();

    for (idx, line) in text.lines().enumerate() {
        let Some(token) = first_token(line) else {
            continue;
        };

        if !is_indented(line) {
            current = Some(Port::new(line.trim_end()));
            continue;
        }
        if PortDirection::from_properties_line(line).is_some() {
            continue;
        }

        let Some(port) = current.as_ref() else {
            return Err(GraphError::OrphanEntry {
                line: idx + 1,
                entry: token.to_string(),
            });
        };
        let pair = Connection::new(port.clone(), Port::new(token));
        if !pairs.iter().any(|existing| existing.same_link(&pair)) {
            pairs.push(pair);
        }
    }

    Ok(pairs)
}
