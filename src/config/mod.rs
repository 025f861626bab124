use crate::circuit_breaker::{CircuitBreakerConfig, RetryConfig};
use crate::error::{Result, ServiceError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub const ENV_UI_PORT: &str = "UI_PORT";
pub const ENV_API_BASE_URL: &str = "API_BASE_URL";
pub const ENV_API_TIMEOUT: &str = "API_TIMEOUT";

/// Main UI service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UiConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,
    /// API service client configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public address of the API service used in RSS links; the request's
    /// Host header is used when unset
    #[serde(default)]
    pub external_api_host: Option<String>,
    /// Path under which the API service publishes feeds
    #[serde(default = "default_feeds_path")]
    pub feeds_path: String,
    /// Expose Prometheus metrics on /metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
}

/// API service client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Internal base URL of the API service
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Timeout applied to each attempt, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_feeds_path() -> String {
    "v1/feeds".to_string()
}

fn default_base_url() -> String {
    "http://api-service:8080".to_string()
}

fn default_timeout_ms() -> u64 {
    30_000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            external_api_host: None,
            feeds_path: default_feeds_path(),
            metrics_enabled: default_true(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
            circuit_breaker: CircuitBreakerConfig::default(),
            retry: RetryConfig::default(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl UiConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ServiceError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| ServiceError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Optional YAML file, then environment overrides, then validation
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `UI_PORT`, `API_BASE_URL` and `API_TIMEOUT`. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(port) = lookup(ENV_UI_PORT) {
            self.server.port = port.trim().parse().map_err(|_| {
                ServiceError::Config(format!("{} must be a port number, got '{}'", ENV_UI_PORT, port))
            })?;
        }

        if let Some(base_url) = lookup(ENV_API_BASE_URL) {
            self.api.base_url = base_url.trim().to_string();
        }

        if let Some(timeout) = lookup(ENV_API_TIMEOUT) {
            self.api.timeout_ms = match parse_duration(&timeout) {
                Some(timeout) => timeout.as_millis() as u64,
                None => {
                    warn!(
                        value = %timeout,
                        default_ms = default_timeout_ms(),
                        "Invalid {}, using default timeout",
                        ENV_API_TIMEOUT
                    );
                    default_timeout_ms()
                }
            };
        }

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let base_url = &self.api.base_url;
        if base_url.is_empty() {
            return Err(ServiceError::Config(
                "API base URL cannot be empty".to_string(),
            ));
        }
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ServiceError::Config(format!(
                "API base URL must start with http:// or https://: {}",
                base_url
            )));
        }
        url::Url::parse(base_url)
            .map_err(|e| ServiceError::Config(format!("Invalid API base URL {}: {}", base_url, e)))?;

        if self.api.timeout_ms == 0 {
            return Err(ServiceError::Config(
                "API timeout must be > 0".to_string(),
            ));
        }

        let breaker = &self.api.circuit_breaker;
        if breaker.max_failures == 0 {
            return Err(ServiceError::Config(
                "Circuit breaker max_failures must be > 0".to_string(),
            ));
        }
        if breaker.half_open_max_calls == 0 {
            return Err(ServiceError::Config(
                "Circuit breaker half_open_max_calls must be > 0".to_string(),
            ));
        }

        if self.api.retry.max_delay_ms < self.api.retry.base_delay_ms {
            return Err(ServiceError::Config(
                "Retry max_delay_ms must be >= base_delay_ms".to_string(),
            ));
        }

        if self.server.feeds_path.trim_matches('/').is_empty() {
            return Err(ServiceError::Config(
                "Feeds path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Parse a duration such as `500ms`, `30s`, `1.5s`, `1m30s` or `1h`.
/// A bare number is taken as seconds.
pub fn parse_duration(value: &str) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total = Duration::ZERO;
    let mut rest = value;
    while !rest.is_empty() {
        let amount_end = rest
            .find(|c: char| !c.is_ascii_digit() && c != '.')
            .unwrap_or(rest.len());
        let (amount, tail) = rest.split_at(amount_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_end);

        let amount: f64 = amount.parse().ok()?;
        let unit_nanos = match unit {
            "ns" => 1.0,
            "us" | "µs" => 1e3,
            "ms" => 1e6,
            "s" => 1e9,
            "m" => 60e9,
            "h" => 3600e9,
            _ => return None,
        };
        let nanos = (amount * unit_nanos).round();
        if !nanos.is_finite() || nanos > u64::MAX as f64 {
            return None;
        }
        total = total.checked_add(Duration::from_nanos(nanos as u64))?;
        rest = tail;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_parse_valid_config() {
        let yaml = r#"
server:
  host: "127.0.0.1"
  port: 3001
  external_api_host: "podcasts.example.com"

api:
  base_url: "http://localhost:8080"
  timeout_ms: 5000
  circuit_breaker:
    max_failures: 3
    open_timeout_ms: 1000
  retry:
    max_retries: 2
    base_delay_ms: 100
"#;

        let config = UiConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3001);
        assert_eq!(
            config.server.external_api_host.as_deref(),
            Some("podcasts.example.com")
        );
        assert_eq!(config.api.timeout(), Duration::from_secs(5));
        assert_eq!(config.api.circuit_breaker.max_failures, 3);
        assert_eq!(config.api.circuit_breaker.half_open_max_calls, 3);
        assert_eq!(config.api.retry.max_retries, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let config = UiConfig::from_yaml("server: {}\n").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.server.feeds_path, "v1/feeds");
        assert_eq!(config.api.base_url, "http://api-service:8080");
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
        assert_eq!(config.api.retry.max_retries, 3);
        assert!(config.server.metrics_enabled);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = UiConfig::default();
        config
            .apply_overrides(env(&[
                ("UI_PORT", "4000"),
                ("API_BASE_URL", "http://api:9000"),
                ("API_TIMEOUT", "45s"),
            ]))
            .unwrap();

        assert_eq!(config.server.port, 4000);
        assert_eq!(config.api.base_url, "http://api:9000");
        assert_eq!(config.api.timeout(), Duration::from_secs(45));
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let mut config = UiConfig::default();
        config
            .apply_overrides(env(&[("UI_PORT", ""), ("API_BASE_URL", "  ")]))
            .unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.api.base_url, "http://api-service:8080");
    }

    #[test]
    fn test_invalid_env_values() {
        let mut config = UiConfig::default();
        assert!(config
            .apply_overrides(env(&[("UI_PORT", "not-a-port")]))
            .is_err());
    }

    #[test]
    fn test_invalid_timeout_falls_back_to_default() {
        let mut config = UiConfig::default();
        config.api.timeout_ms = 5_000;
        config
            .apply_overrides(env(&[("API_TIMEOUT", "soon")]))
            .unwrap();
        assert_eq!(config.api.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms"), Some(Duration::from_millis(500)));
        assert_eq!(parse_duration("30s"), Some(Duration::from_secs(30)));
        assert_eq!(parse_duration("2m"), Some(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Some(Duration::from_secs(3600)));
        assert_eq!(parse_duration("15"), Some(Duration::from_secs(15)));
        assert_eq!(parse_duration("1.5s"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_duration("1m30s"), Some(Duration::from_secs(90)));
        assert_eq!(parse_duration("1h2m"), Some(Duration::from_secs(3720)));
        assert_eq!(parse_duration("s"), None);
        assert_eq!(parse_duration("10x"), None);
        assert_eq!(parse_duration("1.2.3s"), None);
        assert_eq!(parse_duration(""), None);
    }

    #[test]
    fn test_validate_invalid_base_url() {
        let mut config = UiConfig::default();
        config.api.base_url = "api-service:8080".to_string();
        assert!(config.validate().is_err());

        config.api.base_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_zero_thresholds() {
        let mut config = UiConfig::default();
        config.api.circuit_breaker.max_failures = 0;
        assert!(config.validate().is_err());

        let mut config = UiConfig::default();
        config.api.circuit_breaker.half_open_max_calls = 0;
        assert!(config.validate().is_err());

        let mut config = UiConfig::default();
        config.api.timeout_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "api:\n  base_url: \"http://localhost:8080\"").unwrap();

        let config = UiConfig::from_file(file.path()).unwrap();
        assert_eq!(config.api.base_url, "http://localhost:8080");
        assert!(UiConfig::from_file("/nonexistent/ui.yaml").is_err());
    }
}
