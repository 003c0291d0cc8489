//! # Strand DNS Configuration
//!
//! YAML-based configuration for the Strand listeners.
//!
//! Each of the three listeners (DoH, management API, UI) is configured
//! independently and may be omitted entirely. Sensible defaults apply to
//! every field, so a minimal config only names the listeners it wants.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("File not found: {0}")]
    NotFound(PathBuf),
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main configuration for the Strand DNS server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Server identification.
    pub server: ServerConfig,

    /// DNS-over-HTTPS listener.
    pub doh: Option<ListenerConfig>,

    /// Management API listener.
    pub api: Option<ListenerConfig>,

    /// UI listener.
    pub ui: Option<ListenerConfig>,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads configuration from a file. YAML unless the extension says
    /// JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?,
        };

        Ok(config)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.doh.is_none() && self.api.is_none() && self.ui.is_none() {
            return Err(ConfigError::Validation(
                "no listeners configured".to_string(),
            ));
        }
        for (name, listener) in [("doh", &self.doh), ("api", &self.api), ("ui", &self.ui)] {
            if let Some(listener) = listener {
                listener.validate(name)?;
            }
        }
        self.logging.validate()?;
        Ok(())
    }

    /// Serializes to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name used in logs.
    pub name: String,

    /// Server version string.
    pub version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "strand".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// One network listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Listen address.
    pub listen: SocketAddr,

    /// Number of pooled connection handlers.
    pub concurrency: usize,

    /// Per-read client timeout in milliseconds.
    pub client_timeout_ms: u64,

    /// Client addresses allowed to connect. Empty means no restriction;
    /// localhost is always allowed.
    pub allow: Vec<IpAddr>,

    /// TLS material; plaintext when absent.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:0".parse().unwrap(),
            concurrency: 8,
            client_timeout_ms: 5_000,
            allow: Vec::new(),
            tls: None,
        }
    }
}

impl ListenerConfig {
    /// The client timeout as a [`Duration`].
    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.concurrency == 0 {
            return Err(ConfigError::Validation(format!(
                "{name}: concurrency must be at least 1"
            )));
        }
        if self.client_timeout_ms == 0 {
            return Err(ConfigError::Validation(format!(
                "{name}: client_timeout_ms must be positive"
            )));
        }
        if let Some(tls) = &self.tls {
            if tls.cert.as_os_str().is_empty() || tls.key.as_os_str().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "{name}: tls requires both cert and key paths"
                )));
            }
        }
        Ok(())
    }
}

/// TLS certificate and key paths.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    /// PEM certificate chain path.
    pub cert: PathBuf,

    /// PEM private key path.
    pub key: PathBuf,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    pub level: String,

    /// Log format: text or json.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl LoggingConfig {
    fn validate(&self) -> Result<()> {
        match self.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::Validation(format!(
                    "unknown log level: {other}"
                )))
            }
        }
        match self.format.as_str() {
            "text" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "unknown log format: {other}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_minimal_yaml() {
        let config = Config::from_yaml(
            r#"
doh:
  listen: "0.0.0.0:8443"
  concurrency: 16
  tls:
    cert: /etc/strand/cert.pem
    key: /etc/strand/key.pem
"#,
        )
        .unwrap();
        config.validate().unwrap();

        let doh = config.doh.unwrap();
        assert_eq!(doh.listen.port(), 8443);
        assert_eq!(doh.concurrency, 16);
        assert_eq!(doh.client_timeout(), Duration::from_secs(5));
        assert!(doh.tls.is_some());
        assert!(config.api.is_none());
    }

    #[test]
    fn test_allow_list_parsed() {
        let config = Config::from_yaml(
            r#"
ui:
  listen: "127.0.0.1:8080"
  allow: ["192.0.2.10", "2001:db8::1"]
"#,
        )
        .unwrap();
        let ui = config.ui.unwrap();
        assert_eq!(ui.allow.len(), 2);
        assert_eq!(ui.allow[0], "192.0.2.10".parse::<IpAddr>().unwrap());
    }

    #[test]
    fn test_no_listeners_rejected() {
        let config = Config::from_yaml("server:\n  name: test\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = Config::from_yaml(
            r#"
api:
  listen: "127.0.0.1:8080"
  concurrency: 0
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_bad_log_level_rejected() {
        let config = Config::from_yaml(
            r#"
ui:
  listen: "127.0.0.1:8080"
logging:
  level: loud
"#,
        )
        .unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn test_from_file_round_trip() {
        let mut file = NamedTempFile::with_suffix(".yaml").unwrap();
        file.write_all(b"api:\n  listen: \"127.0.0.1:9001\"\n").unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.api.unwrap().listen.port(), 9001);
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            Config::from_file("/nonexistent/strand.yaml"),
            Err(ConfigError::NotFound(_))
        ));
    }
}
