//! Member addresses
//!
//! Every replica set member is identified by a `host:port` pair. Addresses
//! compare by value; two nodes in the same set never share one.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Error parsing a `host:port` string
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddrParseError {
    #[error("invalid address (expected host:port): {0}")]
    MissingPort(String),
    #[error("invalid port in address: {0}")]
    BadPort(String),
    #[error("empty host in address: {0}")]
    EmptyHost(String),
}

/// A `(host, port)` pair with value equality
///
/// The canonical string form is `host:port`, as used in seed lists,
/// `hosts`/`passives` arrays, and status-report member names.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HostAddress {
    host: String,
    port: u16,
}

impl HostAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl fmt::Display for HostAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostAddress {
    type Err = AddrParseError;

    /// Split on the last `:` so hosts containing colons still parse.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| AddrParseError::MissingPort(s.to_string()))?;
        if host.is_empty() {
            return Err(AddrParseError::EmptyHost(s.to_string()));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| AddrParseError::BadPort(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}
