//! `osc.udp://host:port/` URLs as exchanged through the environment.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

const SCHEME: &str = "osc.udp://";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlError {
    #[error("unsupported OSC URL (expected osc.udp://host:port/): {0}")]
    Scheme(String),

    #[error("invalid port in OSC URL: {0}")]
    Port(String),
}

/// Host and port of an OSC endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OscUrl {
    pub host: String,
    pub port: u16,
}

impl OscUrl {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host:port`, suitable for address resolution.
    pub fn authority(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for OscUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{SCHEME}{}:{}/", self.host, self.port)
    }
}

impl FromStr for OscUrl {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .trim()
            .strip_prefix(SCHEME)
            .ok_or_else(|| UrlError::Scheme(s.to_string()))?;
        let authority = rest.trim_end_matches('/');
        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| UrlError::Scheme(s.to_string()))?;
        if host.is_empty() {
            return Err(UrlError::Scheme(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| UrlError::Port(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}
