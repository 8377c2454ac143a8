//! Node endpoint descriptors.

use std::fmt;
use std::time::Duration;

use crate::TypesError;

/// Per-node timeout applied when an endpoint does not configure its own.
pub const DEFAULT_NODE_TIMEOUT: Duration = Duration::from_secs(30);

/// Identifies a configured node in diagnostics (`host:port`).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Connection descriptor for one full node.
#[derive(Clone, PartialEq, Eq)]
pub struct NodeEndpoint {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Upper bound on any single call against this node.
    pub timeout: Duration,
}

impl NodeEndpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: String::new(),
            password: String::new(),
            timeout: DEFAULT_NODE_TIMEOUT,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn id(&self) -> NodeId {
        NodeId(format!("{}:{}", self.host, self.port))
    }

    /// Reject descriptors that can never be connected to.
    pub fn validate(&self) -> Result<(), TypesError> {
        if self.host.trim().is_empty() {
            return Err(TypesError::InvalidEndpoint("empty host".into()));
        }
        if self.port == 0 {
            return Err(TypesError::InvalidEndpoint(format!("{}: port 0", self.host)));
        }
        if self.timeout.is_zero() {
            return Err(TypesError::InvalidEndpoint(format!("{}: zero timeout", self.id())));
        }
        Ok(())
    }
}

impl fmt::Debug for NodeEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeEndpoint")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("timeout", &self.timeout)
            .finish()
    }
}
