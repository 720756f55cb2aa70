//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use domain::DispatcherConfig;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `DATABASE_URL`: PostgreSQL connection string; the in-memory event
///   store is used when unset
/// - `COMMAND_MAX_RETRIES`: retries after a version conflict (default: `3`)
/// - `COMMAND_TIMEOUT_MS`: per-command deadline (default: `5000`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub database_url: Option<String>,
    pub command_max_retries: u32,
    pub command_timeout_ms: u64,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    ///
    /// Values that fail to parse fall back to their default as well.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(lookup("PORT")).unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            command_max_retries: parse(lookup("COMMAND_MAX_RETRIES"))
                .unwrap_or(defaults.command_max_retries),
            command_timeout_ms: parse(lookup("COMMAND_TIMEOUT_MS"))
                .unwrap_or(defaults.command_timeout_ms),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig::default()
            .with_max_retries(self.command_max_retries)
            .with_command_timeout(Duration::from_millis(self.command_timeout_ms))
    }
}

fn parse<T: FromStr>(value: Option<String>) -> Option<T> {
    value.and_then(|v| v.parse().ok())
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            database_url: None,
            command_max_retries: 3,
            command_timeout_ms: 5000,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.log_level, "info");
        assert!(config.database_url.is_none());
        assert_eq!(config.command_max_retries, 3);
        assert_eq!(config.command_timeout_ms, 5000);
    }

    #[test]
    fn test_reads_variables() {
        let config = from_pairs(&[
            ("HOST", "127.0.0.1"),
            ("PORT", "8080"),
            ("DATABASE_URL", "postgres://localhost/foodcarts"),
            ("COMMAND_MAX_RETRIES", "5"),
            ("COMMAND_TIMEOUT_MS", "250"),
        ]);

        assert_eq!(config.addr(), "127.0.0.1:8080");
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/foodcarts")
        );

        let dispatcher = config.dispatcher_config();
        assert_eq!(dispatcher.max_retries, 5);
        assert_eq!(dispatcher.command_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = from_pairs(&[
            ("PORT", "not-a-port"),
            ("COMMAND_TIMEOUT_MS", "-1"),
            ("DATABASE_URL", ""),
        ]);

        assert_eq!(config.port, 3000);
        assert_eq!(config.command_timeout_ms, 5000);
        assert!(config.database_url.is_none());
    }

    #[test]
    fn test_addr_default() {
        let config = Config::default();
        assert_eq!(config.addr(), "0.0.0.0:3000");
    }
}
