//! Client configuration.
//!
//! Everything has a compiled-in default, so a config file is optional;
//! when present it is TOML and may set any subset of the fields.

use std::path::Path;

use serde::Deserialize;

use crate::error::{HeliumError, Result};

/// Well-known rendezvous endpoint for the direct IPv6 path.
pub const DEFAULT_RENDEZVOUS: &str = "[fd00:6865:6c69:756d::1]:2169";

/// Port assumed when a proxy address is given without one.
pub const DEFAULT_PROXY_PORT: u16 = 2169;

/// Default subscription capacity per connection.
pub const DEFAULT_MAX_SUBSCRIPTIONS: usize = 256;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Network endpoint traffic targets when no proxy is given.
    pub rendezvous: String,
    /// Port assumed for proxy addresses that omit one.
    pub proxy_port: u16,
    /// Maximum simultaneous subscriptions per connection.
    pub max_subscriptions: usize,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HeliumError::Config(format!("failed to read {:?}: {}", path, e)))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| HeliumError::Config(format!("failed to parse {:?}: {}", path, e)))?;
        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rendezvous: DEFAULT_RENDEZVOUS.to_string(),
            proxy_port: DEFAULT_PROXY_PORT,
            max_subscriptions: DEFAULT_MAX_SUBSCRIPTIONS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_usable() {
        let config = Config::default();
        assert_eq!(config.rendezvous, DEFAULT_RENDEZVOUS);
        assert_eq!(config.proxy_port, 2169);
        assert_eq!(config.max_subscriptions, 256);
        // the default rendezvous must itself parse as a socket address
        assert!(config.rendezvous.parse::<std::net::SocketAddr>().is_ok());
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str("max_subscriptions = 4\n").unwrap();
        assert_eq!(config.max_subscriptions, 4);
        assert_eq!(config.rendezvous, DEFAULT_RENDEZVOUS);
        assert_eq!(config.proxy_port, DEFAULT_PROXY_PORT);
    }

    #[test]
    fn full_toml_overrides_everything() {
        let config: Config = toml::from_str(
            r#"
            rendezvous = "[::1]:9000"
            proxy_port = 7000
            max_subscriptions = 32
            "#,
        )
        .unwrap();
        assert_eq!(config.rendezvous, "[::1]:9000");
        assert_eq!(config.proxy_port, 7000);
        assert_eq!(config.max_subscriptions, 32);
    }
}
