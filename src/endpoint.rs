use std::fmt::Display;

use serde::Serialize;

/// A `host:port` pair, kept as the strings the server hands out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Endpoint {
    /// Host name or address.
    pub host: String,
    /// Port, as a decimal string.
    pub port: String,
}

impl Endpoint {
    /// Create an endpoint from anything string-like.
    pub fn new(host: impl Into<String>, port: impl Into<String>) -> Endpoint {
        Endpoint {
            host: host.into(),
            port: port.into(),
        }
    }
}

impl Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}
