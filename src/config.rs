use std::time::Duration;

use serde::Deserialize;

use crate::protocol::DEFAULT_PORT;
use crate::{Error, Result};

/// Gateway settings as supplied by the host, e.g. from a JSON thing config.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntesisBoxConfig {
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Informational only; the client never uses it.
    #[serde(default)]
    pub mac_address: Option<String>,
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_poll_interval_secs() -> u64 {
    30
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for IntesisBoxConfig {
    fn default() -> Self {
        Self {
            ip_address: None,
            port: default_port(),
            mac_address: None,
            poll_interval_secs: default_poll_interval_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl IntesisBoxConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Returns the host address once everything checks out.
    pub fn validate(&self) -> Result<&str> {
        let host = self
            .ip_address
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| Error::Config("no IP address specified".to_string()))?;
        if self.port == 0 {
            return Err(Error::Config("port must be non-zero".to_string()));
        }
        if self.poll_interval_secs == 0 {
            return Err(Error::Config("poll interval must be non-zero".to_string()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::Config("connect timeout must be non-zero".to_string()));
        }
        Ok(host)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let config = IntesisBoxConfig::from_json(r#"{"ipAddress": "192.168.1.50"}"#).unwrap();
        assert_eq!(config.ip_address.as_deref(), Some("192.168.1.50"));
        assert_eq!(config.port, 3310);
        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.validate().unwrap(), "192.168.1.50");
    }

    #[test]
    fn explicit_values() {
        let config = IntesisBoxConfig::from_json(
            r#"{"ipAddress": "ac.local", "port": 5000, "macAddress": "CC3F1D000001", "pollIntervalSecs": 10}"#,
        )
        .unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.mac_address.as_deref(), Some("CC3F1D000001"));
        assert_eq!(config.poll_interval_secs, 10);
    }

    #[test]
    fn missing_address_is_config_error() {
        let config = IntesisBoxConfig::from_json(r#"{"port": 3310}"#).unwrap();
        assert!(matches!(config.validate(), Err(Error::Config(_))));

        let blank = IntesisBoxConfig {
            ip_address: Some("  ".to_string()),
            ..Default::default()
        };
        assert!(matches!(blank.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn zero_intervals_rejected() {
        let config = IntesisBoxConfig {
            ip_address: Some("10.0.0.2".to_string()),
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn invalid_json_is_json_error() {
        assert!(matches!(
            IntesisBoxConfig::from_json("{not json"),
            Err(Error::Json(_))
        ));
    }
}
