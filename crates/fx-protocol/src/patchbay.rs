//! Patchbay document format.
//!
//! A saved graph is a JSON object with exactly two fields:
//!
//! ```json
//! {"ports": ["portA", "portB"], "graph": [["portA", "portB"]]}
//! ```
//!
//! Input is parsed against this schema and nothing else; unknown fields,
//! non-string entries and pairs that are not exactly two strings are
//! rejected before any connection is attempted.

use fx_core::{Alias, Connection, Graph};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while reading a patchbay document.
#[derive(Debug, Error)]
pub enum PatchbayFormatError {
    /// The input did not match the document schema.
    #[error("invalid patchbay document: {0}")]
    Schema(#[from] serde_json::Error),

    /// A connection uses an alias missing from the port list.
    #[error("connection {source_alias} -> {destination} uses an alias not listed in ports")]
    UnlistedAlias {
        source_alias: String,
        destination: String,
    },
}

/// Serialized form of a [`Graph`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PatchbayDocument {
    /// Port aliases in enumeration order.
    pub ports: Vec<String>,
    /// Connections as `[source, destination]` alias pairs.
    pub graph: Vec<(String, String)>,
}

impl PatchbayDocument {
    /// Builds a document from a graph.
    pub fn from_graph(graph: &Graph) -> Self {
        Self {
            ports: graph.ports().iter().map(|a| a.as_str().to_string()).collect(),
            graph: graph
                .connections()
                .iter()
                .map(|c| (c.source.as_str().to_string(), c.destination.as_str().to_string()))
                .collect(),
        }
    }

    /// Parses and validates a document.
    ///
    /// Every alias used in `graph` must appear in `ports`; a document that
    /// fails any check is rejected as a whole.
    pub fn parse(input: &str) -> Result<Self, PatchbayFormatError> {
        let doc: Self = serde_json::from_str(input)?;
        for (source, destination) in &doc.graph {
            if !doc.ports.contains(source) || !doc.ports.contains(destination) {
                return Err(PatchbayFormatError::UnlistedAlias {
                    source_alias: source.clone(),
                    destination: destination.clone(),
                });
            }
        }
        Ok(doc)
    }

    /// Converts to the graph model.
    pub fn to_graph(&self) -> Graph {
        Graph::from_parts(
            self.ports.iter().map(Alias::new),
            self.graph
                .iter()
                .map(|(s, d)| Connection::new(Alias::new(s), Alias::new(d))),
        )
    }

    /// Renders the document as a single JSON line.
    pub fn to_json(&self) -> Result<String, PatchbayFormatError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_document() {
        let doc = PatchbayDocument::parse(r#"{"ports":["a","b"],"graph":[["a","b"]]}"#).unwrap();
        let graph = doc.to_graph();
        assert_eq!(graph.ports().len(), 2);
        assert_eq!(
            graph.connections(),
            &[Connection::new(Alias::new("a"), Alias::new("b"))]
        );
    }

    #[test]
    fn test_rejects_unknown_fields() {
        let err = PatchbayDocument::parse(r#"{"ports":[],"graph":[],"exec":"rm -rf /"}"#);
        assert!(matches!(err, Err(PatchbayFormatError::Schema(_))));
    }

    #[test]
    fn test_rejects_wrong_pair_shape() {
        for input in [
            r#"{"ports":["a","b","c"],"graph":[["a","b","c"]]}"#,
            r#"{"ports":["a"],"graph":[["a"]]}"#,
            r#"{"ports":["a","b"],"graph":[["a",2]]}"#,
            r#"{"ports":"a","graph":[]}"#,
            r#"{"ports":["a"]}"#,
        ] {
            assert!(PatchbayDocument::parse(input).is_err(), "{input}");
        }
    }

    #[test]
    fn test_rejects_non_json_input() {
        // The format is never evaluated, only parsed.
        let python_literal = "{'ports': ['a'], 'graph': [('a', 'a')]}";
        assert!(PatchbayDocument::parse(python_literal).is_err());
    }

    #[test]
    fn test_rejects_unlisted_alias() {
        let err = PatchbayDocument::parse(r#"{"ports":["a"],"graph":[["a","ghost"]]}"#);
        assert!(matches!(err, Err(PatchbayFormatError::UnlistedAlias { .. })));
    }

    #[test]
    fn test_from_graph_serializes_pairs_as_arrays() {
        let graph = Graph::from_parts(
            vec![Alias::new("a"), Alias::new("b")],
            vec![Connection::new(Alias::new("a"), Alias::new("b"))],
        );
        let json = PatchbayDocument::from_graph(&graph).to_json().unwrap();
        assert_eq!(json, r#"{"ports":["a","b"],"graph":[["a","b"]]}"#);
    }
}
