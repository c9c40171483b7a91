//! Save, clear and restore the live patchbay.
//!
//! Every operation reads the server's state first and parses it in full
//! before changing anything. Connect and disconnect failures inside a batch
//! are collected into a [`BatchReport`] and do not stop the batch.

use fx_core::{parse_connections, parse_enumeration, Connection, Enumeration, Graph, GraphError};
use fx_protocol::{PatchbayDocument, PatchbayFormatError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::tools::{JackError, JackTools};

/// Errors that abort a patchbay operation before the graph is touched.
#[derive(Debug, Error)]
pub enum PatchbayError {
    #[error("could not read the port list: {0}")]
    Listing(#[from] JackError),

    #[error("could not parse the port list: {0}")]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Format(#[from] PatchbayFormatError),
}

/// One connect or disconnect that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkFailure {
    pub source: String,
    pub destination: String,
    pub error: JackError,
}

/// Outcome of a batch of connect or disconnect calls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub attempted: usize,
    pub failures: Vec<LinkFailure>,
}

impl BatchReport {
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.attempted - self.failures.len()
    }

    fn record(&mut self, source: &str, destination: &str, result: Result<(), JackError>) {
        self.attempted += 1;
        if let Err(error) = result {
            warn!(source, destination, error = %error, "Link operation failed");
            self.failures.push(LinkFailure {
                source: source.to_string(),
                destination: destination.to_string(),
                error,
            });
        }
    }

    /// Folds another report into this one.
    pub fn merge(&mut self, other: BatchReport) {
        self.attempted += other.attempted;
        self.failures.extend(other.failures);
    }
}

/// Reads the live graph with aliases.
pub fn snapshot(tools: &dyn JackTools) -> Result<Enumeration, PatchbayError> {
    let listing = tools.list_ports(true)?;
    Ok(parse_enumeration(&listing)?)
}

/// Captures the live graph as a document.
pub fn save(tools: &dyn JackTools) -> Result<PatchbayDocument, PatchbayError> {
    let enumeration = snapshot(tools)?;
    info!(
        ports = enumeration.graph.ports().len(),
        connections = enumeration.graph.connections().len(),
        "Patchbay captured"
    );
    Ok(PatchbayDocument::from_graph(&enumeration.graph))
}

/// Disconnects every live connection, by port name.
pub fn clear(tools: &dyn JackTools) -> Result<BatchReport, PatchbayError> {
    let listing = tools.list_ports(false)?;
    let pairs = parse_connections(&listing)?;
    debug!(links = pairs.len(), "Clearing patchbay");

    let mut report = BatchReport::default();
    for Connection {
        source,
        destination,
    } in &pairs
    {
        let result = tools.disconnect(source.as_str(), destination.as_str());
        report.record(source.as_str(), destination.as_str(), result);
    }
    Ok(report)
}

/// Connects every connection of `graph`, by alias.
///
/// Ports are not checked beforehand; a missing port shows up as a failure
/// in the report.
pub fn restore(tools: &dyn JackTools, graph: &Graph) -> BatchReport {
    let mut report = BatchReport::default();
    for connection in graph.connections() {
        let result = tools.connect(connection.source.as_str(), connection.destination.as_str());
        report.record(
            connection.source.as_str(),
            connection.destination.as_str(),
            result,
        );
    }
    info!(
        attempted = report.attempted,
        failed = report.failures.len(),
        "Patchbay restored"
    );
    report
}

/// Parses `input`, optionally clears the live graph, then restores.
///
/// A document that does not parse aborts before anything is cleared.
pub fn load(
    tools: &dyn JackTools,
    input: &str,
    clear_first: bool,
) -> Result<BatchReport, PatchbayError> {
    let document = PatchbayDocument::parse(input)?;
    let graph = document.to_graph();

    let mut report = BatchReport::default();
    if clear_first {
        report.merge(clear(tools)?);
    }
    report.merge(restore(tools, &graph));
    Ok(report)
}
