use std::env;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_NAMESPACE: &str = "tesla";
pub const DEFAULT_SUBSYSTEM: &str = "energy_gateway";
pub const DEFAULT_PORT: u16 = 5678;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{name}={value:?} is invalid: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Gateway login details.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Host name or address of the gateway, or a full base URL.
    pub gateway: String,
    pub credentials: Credentials,
    pub namespace: String,
    pub subsystem: String,
    pub port: u16,
    pub poll_interval: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| get(name).ok_or(ConfigError::Missing(name));

        let port = match get("EXPORTER_PORT") {
            Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "EXPORTER_PORT",
                value: raw.clone(),
                reason: e.to_string(),
            })?,
            None => DEFAULT_PORT,
        };

        let poll_interval = match get("POLL_INTERVAL_SECS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => {
                    return Err(ConfigError::Invalid {
                        name: "POLL_INTERVAL_SECS",
                        value: raw,
                        reason: "must be greater than zero".to_string(),
                    })
                }
                Ok(secs) => Duration::from_secs(secs),
                Err(e) => {
                    return Err(ConfigError::Invalid {
                        name: "POLL_INTERVAL_SECS",
                        value: raw,
                        reason: e.to_string(),
                    })
                }
            },
            None => DEFAULT_POLL_INTERVAL,
        };

        Ok(Self {
            gateway: required("POWERWALL_GATEWAY")?,
            credentials: Credentials {
                email: required("POWERWALL_USERNAME")?,
                password: required("POWERWALL_PASSWORD")?,
            },
            namespace: get("PROMETHEUS_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            subsystem: get("PROMETHEUS_SUBSYSTEM").unwrap_or_else(|| DEFAULT_SUBSYSTEM.to_string()),
            port,
            poll_interval,
        })
    }

    pub fn log_summary(&self) {
        info!("Exporter config:");
        info!("  Gateway: {}", self.gateway);
        info!("  User: {}", self.credentials.email);
        info!("  Metric prefix: {}_{}", self.namespace, self.subsystem);
        info!("  Port: {}", self.port);
        info!("  Poll interval: {:?}", self.poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    const REQUIRED: &[(&str, &str)] = &[
        ("POWERWALL_GATEWAY", "192.168.1.20"),
        ("POWERWALL_USERNAME", "owner@example.com"),
        ("POWERWALL_PASSWORD", "hunter2"),
    ];

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(REQUIRED)).unwrap();
        assert_eq!(config.gateway, "192.168.1.20");
        assert_eq!(config.credentials.email, "owner@example.com");
        assert_eq!(config.credentials.password, "hunter2");
        assert_eq!(config.namespace, "tesla");
        assert_eq!(config.subsystem, "energy_gateway");
        assert_eq!(config.port, 5678);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_overrides() {
        let mut vars = REQUIRED.to_vec();
        vars.extend([
            ("PROMETHEUS_NAMESPACE", "home"),
            ("PROMETHEUS_SUBSYSTEM", "powerwall"),
            ("EXPORTER_PORT", " 9100 "),
            ("POLL_INTERVAL_SECS", "30"),
        ]);
        let config = Config::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.namespace, "home");
        assert_eq!(config.subsystem, "powerwall");
        assert_eq!(config.port, 9100);
        assert_eq!(config.poll_interval, Duration::from_secs(30));
    }

    #[test]
    fn test_missing_required() {
        for skip in ["POWERWALL_GATEWAY", "POWERWALL_USERNAME", "POWERWALL_PASSWORD"] {
            let vars: Vec<_> = REQUIRED.iter().copied().filter(|(k, _)| *k != skip).collect();
            assert_eq!(
                Config::from_lookup(lookup(&vars)).unwrap_err(),
                ConfigError::Missing(skip)
            );
        }

        let mut vars = REQUIRED.to_vec();
        vars[2] = ("POWERWALL_PASSWORD", "  ");
        assert_eq!(
            Config::from_lookup(lookup(&vars)).unwrap_err(),
            ConfigError::Missing("POWERWALL_PASSWORD")
        );
    }

    #[test]
    fn test_invalid_values() {
        for (name, value) in [
            ("EXPORTER_PORT", "http"),
            ("EXPORTER_PORT", "70000"),
            ("POLL_INTERVAL_SECS", "0"),
            ("POLL_INTERVAL_SECS", "-5"),
        ] {
            let mut vars = REQUIRED.to_vec();
            vars.push((name, value));
            match Config::from_lookup(lookup(&vars)) {
                Err(ConfigError::Invalid { name: got, value: raw, .. }) => {
                    assert_eq!(got, name);
                    assert_eq!(raw, value);
                }
                other => panic!("expected {name}={value} to be rejected, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_password_not_in_debug_output() {
        let config = Config::from_lookup(lookup(REQUIRED)).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("owner@example.com"));
    }
}
