//! CLI configuration, loaded from the environment at startup.

use std::path::PathBuf;
use std::time::Duration;

use questline_gateway::HttpGatewayConfig;

/// Configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Settings of the `questline` binary.
#[derive(Clone, Debug)]
pub struct CliConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub snapshot_path: PathBuf,
    pub timeout: Duration,
}

impl CliConfig {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_url = var("QUESTLINE_API_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingVar("QUESTLINE_API_URL".to_string()))?;
        if !api_url.starts_with("http://") && !api_url.starts_with("https://") {
            return Err(ConfigError::InvalidValue(
                "QUESTLINE_API_URL".to_string(),
                format!("'{}' is not an http(s) URL", api_url),
            ));
        }

        let token = var("QUESTLINE_TOKEN").filter(|t| !t.is_empty());

        let snapshot_path = var("QUESTLINE_SNAPSHOT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".questline/snapshot.json"));

        let timeout_str = var("QUESTLINE_TIMEOUT_SECS").unwrap_or_else(|| "30".to_string());
        let timeout = timeout_str
            .parse::<u64>()
            .ok()
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .ok_or_else(|| {
                ConfigError::InvalidValue(
                    "QUESTLINE_TIMEOUT_SECS".to_string(),
                    format!("'{}' is not a positive number of seconds", timeout_str),
                )
            })?;

        Ok(Self {
            api_url,
            token,
            snapshot_path,
            timeout,
        })
    }

    /// Gateway settings derived from this config.
    pub fn gateway(&self) -> HttpGatewayConfig {
        HttpGatewayConfig {
            base_url: self.api_url.clone(),
            token: self.token.clone(),
            timeout: self.timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<CliConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CliConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("QUESTLINE_API_URL", "https://api.example.com")]).unwrap();
        assert_eq!(config.snapshot_path, PathBuf::from(".questline/snapshot.json"));
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.token.is_none());
    }

    #[test]
    fn test_missing_url() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingVar(_))));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            load(&[("QUESTLINE_API_URL", "api.example.com")]),
            Err(ConfigError::InvalidValue(..))
        ));
        assert!(matches!(
            load(&[
                ("QUESTLINE_API_URL", "http://localhost:8080"),
                ("QUESTLINE_TIMEOUT_SECS", "soon"),
            ]),
            Err(ConfigError::InvalidValue(..))
        ));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("QUESTLINE_API_URL", "http://localhost:8080"),
            ("QUESTLINE_TOKEN", "secret"),
            ("QUESTLINE_SNAPSHOT", "/tmp/q.json"),
            ("QUESTLINE_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        let gateway = config.gateway();
        assert_eq!(gateway.token.as_deref(), Some("secret"));
        assert_eq!(gateway.timeout, Duration::from_secs(5));
        assert_eq!(config.snapshot_path, PathBuf::from("/tmp/q.json"));
    }
}
