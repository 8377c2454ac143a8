//! Client configuration with TOML file support.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use multinode_types::NodeEndpoint;

use crate::logging::LogFormat;
use crate::ConfigError;

/// One `[[nodes]]` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    pub host: String,
    pub port: u16,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Overrides `default_timeout_ms` for this node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

/// Configuration for a [`MultiNodeClient`](crate::MultiNodeClient).
///
/// Can be loaded from a TOML file via [`MultiClientConfig::from_toml_file`]
/// or built programmatically (e.g. for tests).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiClientConfig {
    /// Nodes in configuration order; the order decides every tie.
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    /// Per-call timeout for nodes without their own `timeout_ms`.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    /// Budget shared by all nodes for one script verification batch.
    #[serde(default = "default_script_verification_timeout_ms")]
    pub script_verification_timeout_ms: u64,

    /// Hard limit on any single operation, if set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation_deadline_ms: Option<u64>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_script_verification_timeout_ms() -> u64 {
    10_000
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl MultiClientConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("MultiClientConfig is always serializable to TOML")
    }

    /// Validated endpoint descriptors, in configuration order.
    pub fn endpoints(&self) -> Result<Vec<NodeEndpoint>, ConfigError> {
        if self.nodes.is_empty() {
            return Err(ConfigError::Empty);
        }
        self.nodes
            .iter()
            .map(|n| {
                let timeout = Duration::from_millis(n.timeout_ms.unwrap_or(self.default_timeout_ms));
                let endpoint = NodeEndpoint::new(n.host.clone(), n.port)
                    .with_credentials(n.username.clone(), n.password.clone())
                    .with_timeout(timeout);
                endpoint.validate()?;
                Ok(endpoint)
            })
            .collect()
    }

    pub fn script_verification_timeout(&self) -> Duration {
        Duration::from_millis(self.script_verification_timeout_ms)
    }

    pub fn operation_deadline(&self) -> Option<Duration> {
        self.operation_deadline_ms.map(Duration::from_millis)
    }

    pub fn log_format(&self) -> Result<LogFormat, ConfigError> {
        self.log_format.parse()
    }
}

impl Default for MultiClientConfig {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            default_timeout_ms: default_timeout_ms(),
            script_verification_timeout_ms: default_script_verification_timeout_ms(),
            operation_deadline_ms: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const TWO_NODES: &str = r#"
        default_timeout_ms = 5000

        [[nodes]]
        host = "10.0.0.1"
        port = 8332
        username = "rpc"
        password = "secret"

        [[nodes]]
        host = "10.0.0.2"
        port = 8332
        timeout_ms = 1500
    "#;

    #[test]
    fn default_config_round_trips_through_toml() {
        let mut config = MultiClientConfig::default();
        config.nodes.push(NodeConfig {
            host: "localhost".into(),
            port: 18332,
            username: "u".into(),
            password: "p".into(),
            timeout_ms: Some(250),
        });
        let parsed = MultiClientConfig::from_toml_str(&config.to_toml_string()).expect("should parse");
        assert_eq!(parsed, config);
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = MultiClientConfig::from_toml_str("").expect("empty toml should use defaults");
        assert!(config.nodes.is_empty());
        assert_eq!(config.default_timeout_ms, 30_000);
        assert_eq!(config.script_verification_timeout(), Duration::from_secs(10));
        assert_eq!(config.log_format().unwrap(), LogFormat::Human);
        assert_eq!(config.operation_deadline(), None);
    }

    #[test]
    fn node_timeouts_fall_back_to_default() {
        let config = MultiClientConfig::from_toml_str(TWO_NODES).expect("should parse");
        let endpoints = config.endpoints().unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[0].timeout, Duration::from_millis(5000));
        assert_eq!(endpoints[0].username, "rpc");
        assert_eq!(endpoints[1].timeout, Duration::from_millis(1500));
        assert_eq!(endpoints[1].id().as_str(), "10.0.0.2:8332");
    }

    #[test]
    fn no_nodes_is_an_error() {
        let config = MultiClientConfig::default();
        assert!(matches!(config.endpoints(), Err(ConfigError::Empty)));
    }

    #[test]
    fn invalid_node_is_rejected() {
        let config = MultiClientConfig::from_toml_str(
            r#"
            [[nodes]]
            host = ""
            port = 8332
            "#,
        )
        .unwrap();
        assert!(matches!(config.endpoints(), Err(ConfigError::Endpoint(_))));
    }

    #[test]
    fn malformed_toml_is_parse_error() {
        let err = MultiClientConfig::from_toml_str("[[nodes]]\nport = \"x\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(TWO_NODES.as_bytes()).unwrap();
        let config = MultiClientConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.nodes.len(), 2);
    }

    #[test]
    fn missing_file_returns_io_error() {
        let result = MultiClientConfig::from_toml_file("/nonexistent/multinode.toml");
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
