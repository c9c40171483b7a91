//! In-memory audio server.
//!
//! Behaves like the command-line tools against a fixed set of ports:
//! listings use the same text layout, names resolve by port or alias,
//! and connecting an existing link or disconnecting a missing one fails.

use std::sync::Mutex;

use fx_core::PortDirection;

use crate::tools::{JackError, JackTools};

#[derive(Debug, Clone)]
struct MemoryPort {
    name: String,
    alias: String,
    direction: PortDirection,
}

/// Fixed set of ports, built up with [`MemoryJack::output`] and
/// [`MemoryJack::input`] in listing order.
#[derive(Debug, Default)]
pub struct MemoryJack {
    ports: Vec<MemoryPort>,
    /// `(output, input)` port names
    links: Mutex<Vec<(String, String)>>,
}

impl MemoryJack {
    /// Adds a port that produces signal.
    pub fn output(self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.with_port(name.into(), alias.into(), PortDirection::Output)
    }

    /// Adds a port that consumes signal.
    pub fn input(self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.with_port(name.into(), alias.into(), PortDirection::Input)
    }

    fn with_port(mut self, name: String, alias: String, direction: PortDirection) -> Self {
        self.ports.push(MemoryPort {
            name,
            alias,
            direction,
        });
        self
    }

    /// Current links as `(output, input)` port names.
    pub fn links(&self) -> Vec<(String, String)> {
        self.links.lock().map(|l| l.clone()).unwrap_or_default()
    }

    fn resolve(&self, tool: &str, name: &str) -> Result<&MemoryPort, JackError> {
        self.ports
            .iter()
            .find(|port| port.name == name || port.alias == name)
            .ok_or_else(|| JackError::ToolFailed {
                tool: tool.to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("ERROR {name} not a valid port"),
            })
    }

    /// Resolves both ends and orders them output first, as `jack_connect`
    /// does.
    fn resolve_link(
        &self,
        tool: &str,
        source: &str,
        destination: &str,
    ) -> Result<(String, String), JackError> {
        let src = self.resolve(tool, source)?;
        let dst = self.resolve(tool, destination)?;
        if src.direction == dst.direction {
            return Err(JackError::ToolFailed {
                tool: tool.to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("cannot link two {} ports", src.direction.as_flag()),
            });
        }
        if src.direction == PortDirection::Input {
            Ok((dst.name.clone(), src.name.clone()))
        } else {
            Ok((src.name.clone(), dst.name.clone()))
        }
    }

    fn lock_failed(tool: &str) -> JackError {
        JackError::Spawn {
            tool: tool.to_string(),
            message: "link table poisoned".to_string(),
        }
    }
}

impl JackTools for MemoryJack {
    fn list_ports(&self, with_aliases: bool) -> Result<String, JackError> {
        let links = self.links.lock().map_err(|_| Self::lock_failed("jack_lsp"))?;
        let mut out = String::new();
        for port in &self.ports {
            out.push_str(&port.name);
            out.push('\n');
            if with_aliases {
                out.push_str("   ");
                out.push_str(&port.alias);
                out.push('\n');
            }
            for (src, dst) in links.iter() {
                let other = if *src == port.name {
                    dst
                } else if *dst == port.name {
                    src
                } else {
                    continue;
                };
                out.push_str("   ");
                out.push_str(other);
                out.push('\n');
            }
            if with_aliases {
                out.push_str("   properties: ");
                out.push_str(port.direction.as_flag());
                out.push_str(",\n");
            }
        }
        Ok(out)
    }

    fn connect(&self, source: &str, destination: &str) -> Result<(), JackError> {
        let (src, dst) = self.resolve_link("jack_connect", source, destination)?;
        let mut links = self
            .links
            .lock()
            .map_err(|_| Self::lock_failed("jack_connect"))?;
        let exists = links.iter().any(|(a, b)| *a == src && *b == dst);
        if exists {
            return Err(JackError::ToolFailed {
                tool: "jack_connect".to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("{source} and {destination} are already connected"),
            });
        }
        links.push((src, dst));
        Ok(())
    }

    fn disconnect(&self, source: &str, destination: &str) -> Result<(), JackError> {
        let (src, dst) = self.resolve_link("jack_disconnect", source, destination)?;
        let mut links = self
            .links
            .lock()
            .map_err(|_| Self::lock_failed("jack_disconnect"))?;
        let before = links.len();
        links.retain(|(a, b)| !(*a == src && *b == dst));
        if links.len() == before {
            return Err(JackError::ToolFailed {
                tool: "jack_disconnect".to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("{source} and {destination} are not connected"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listing_matches_tool_layout() {
        let jack = MemoryJack::default()
            .output("system:capture_1", "portA")
            .input("system:playback_1", "portB");
        jack.connect("portA", "system:playback_1").unwrap();

        let with_aliases = jack.list_ports(true).unwrap();
        assert_eq!(
            with_aliases,
            "system:capture_1\n   portA\n   system:playback_1\n   properties: output,\n\
             system:playback_1\n   portB\n   system:capture_1\n   properties: input,\n"
        );

        let plain = jack.list_ports(false).unwrap();
        assert!(!plain.contains("portA"));
        assert!(!plain.contains("properties"));
    }

    #[test]
    fn test_connect_orders_output_first() {
        let jack = MemoryJack::default().input("b", "B").output("a", "A");
        jack.connect("B", "A").unwrap();
        assert_eq!(jack.links(), vec![("a".to_string(), "b".to_string())]);
    }

    #[test]
    fn test_connect_twice_fails() {
        let jack = MemoryJack::default().output("a", "A").input("b", "B");
        jack.connect("A", "B").unwrap();
        assert!(jack.connect("b", "a").is_err());
    }

    #[test]
    fn test_same_direction_fails() {
        let jack = MemoryJack::default().output("a", "A").output("b", "B");
        assert!(jack.connect("A", "B").is_err());
    }

    #[test]
    fn test_unknown_port_fails() {
        let jack = MemoryJack::default().output("a", "A");
        assert!(jack.connect("A", "ghost").is_err());
        assert!(jack.disconnect("A", "ghost").is_err());
    }
}
