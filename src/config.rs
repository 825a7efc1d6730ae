//! Configuration structures and parsing.
//!
//! Two configuration surfaces feed the engine:
//!
//! - a YAML file describing the topology (domain, data directory,
//!   name-server control binaries, and the networks to create), loaded
//!   once at startup and validated before anything is written to disk;
//! - environment variables tuning a single rotation actor (`DOMAIN`,
//!   `RECORD_NAME`, `FLUX_INTERVAL`, `FLUX_SELECTOR`), all defaulted and
//!   validated at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use crate::registry::{LbAlgo, NetworkKind, MAX_AGENTS};
use crate::rotate::policy::RotationPolicy;

/// Configuration errors surfaced at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("could not read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid general configuration: {0}")]
    InvalidGeneral(String),

    #[error("invalid network configuration: {0}")]
    InvalidNetwork(String),

    #[error("invalid environment setting {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },
}

/// Top-level simulation configuration.
#[derive(Debug, Serialize, Deserialize)]
pub struct Config {
    pub general: GeneralConfig,
    #[serde(default)]
    pub networks: Vec<NetworkSpec>,
}

/// Shared engine settings.
#[derive(Debug, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Directory holding zone files, agent manifests, cursors, and the
    /// registry snapshot.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// When true, a missing or unusable zone checker blocks publication
    /// instead of being skipped best-effort.
    #[serde(default)]
    pub strict_validation: bool,

    #[serde(default)]
    pub nameserver: NameServerConfig,
}

/// How to reach the external name-server process. Binary paths are
/// explicit; leaving one unset declares the capability absent for this
/// deployment.
#[derive(Debug, Serialize, Deserialize)]
pub struct NameServerConfig {
    #[serde(default = "default_process_name")]
    pub process_name: String,

    #[serde(default)]
    pub rndc_path: Option<PathBuf>,

    #[serde(default)]
    pub checkzone_path: Option<PathBuf>,

    /// Bound on every external call (reload, check, liveness) so a hung
    /// binary fails the tick instead of stalling the loop.
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,
}

impl Default for NameServerConfig {
    fn default() -> Self {
        Self {
            process_name: default_process_name(),
            rndc_path: None,
            checkzone_path: None,
            command_timeout: default_command_timeout(),
        }
    }
}

/// One network to create at startup.
#[derive(Debug, Serialize, Deserialize)]
pub struct NetworkSpec {
    pub name: String,
    pub kind: NetworkKind,
    #[serde(default)]
    pub size: Option<usize>,
    #[serde(default)]
    pub ttl: Option<u32>,
    #[serde(default, with = "humantime_serde::option")]
    pub rotation_interval: Option<Duration>,
    #[serde(default)]
    pub rotation_policy: Option<RotationPolicy>,
    #[serde(default)]
    pub lb_algo: Option<LbAlgo>,
}

fn default_domain() -> String {
    "sim.local".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("dns_config")
}

fn default_process_name() -> String {
    "named".to_string()
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(10)
}

/// Load and validate a YAML configuration file.
pub fn load_config(path: &std::path::Path) -> Result<Config, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&text)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Validate the configuration before any state is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.domain.is_empty() {
            return Err(ConfigError::InvalidGeneral(
                "domain cannot be empty".to_string(),
            ));
        }
        if self.general.nameserver.command_timeout.is_zero() {
            return Err(ConfigError::InvalidGeneral(
                "nameserver command_timeout must be positive".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for spec in &self.networks {
            if spec.name.is_empty()
                || !spec
                    .name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-')
            {
                return Err(ConfigError::InvalidNetwork(format!(
                    "network name '{}' must be a DNS label (letters, digits, hyphens)",
                    spec.name
                )));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::InvalidNetwork(format!(
                    "network '{}' defined more than once",
                    spec.name
                )));
            }
            if let Some(size) = spec.size {
                if size == 0 || size > MAX_AGENTS {
                    return Err(ConfigError::InvalidNetwork(format!(
                        "network '{}': size {} out of range (1..={})",
                        spec.name, size, MAX_AGENTS
                    )));
                }
            }
            if let Some(ttl) = spec.ttl {
                if ttl == 0 {
                    return Err(ConfigError::InvalidNetwork(format!(
                        "network '{}': ttl must be positive",
                        spec.name
                    )));
                }
            }
            // Kind-appropriate attributes: settings that only exist for
            // one kind are rejected rather than silently ignored.
            if spec.lb_algo.is_some() && spec.kind != NetworkKind::Lb {
                return Err(ConfigError::InvalidNetwork(format!(
                    "network '{}': lb_algo is only meaningful for lb networks",
                    spec.name
                )));
            }
            if (spec.rotation_interval.is_some() || spec.rotation_policy.is_some())
                && spec.kind != NetworkKind::Flux
            {
                return Err(ConfigError::InvalidNetwork(format!(
                    "network '{}': rotation settings are only meaningful for flux networks",
                    spec.name
                )));
            }
            if let Some(interval) = spec.rotation_interval {
                if interval < Duration::from_secs(1) {
                    return Err(ConfigError::InvalidNetwork(format!(
                        "network '{}': rotation_interval must be at least 1s",
                        spec.name
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Per-actor rotation settings sourced from the environment, with
/// defaults matching a single-network deployment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RotationSettings {
    pub domain: String,
    pub record_name: String,
    pub interval: Duration,
    pub policy: RotationPolicy,
}

impl RotationSettings {
    /// Read settings from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an injected lookup, so tests never touch the
    /// real environment.
    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let domain = get("DOMAIN").unwrap_or_else(default_domain);
        if domain.is_empty() {
            return Err(ConfigError::InvalidEnv {
                name: "DOMAIN",
                reason: "cannot be empty".to_string(),
            });
        }

        let record_name = get("RECORD_NAME").unwrap_or_else(|| "flux".to_string());
        if record_name.is_empty() {
            return Err(ConfigError::InvalidEnv {
                name: "RECORD_NAME",
                reason: "cannot be empty".to_string(),
            });
        }

        let interval = match get("FLUX_INTERVAL") {
            Some(raw) => {
                let secs: u64 = raw.parse().map_err(|_| ConfigError::InvalidEnv {
                    name: "FLUX_INTERVAL",
                    reason: format!("'{}' is not a number of seconds", raw),
                })?;
                if secs == 0 {
                    return Err(ConfigError::InvalidEnv {
                        name: "FLUX_INTERVAL",
                        reason: "must be at least 1".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(5),
        };

        let policy = match get("FLUX_SELECTOR") {
            Some(raw) => raw.parse().map_err(|e: String| ConfigError::InvalidEnv {
                name: "FLUX_SELECTOR",
                reason: e,
            })?,
            None => RotationPolicy::Random,
        };

        Ok(Self {
            domain,
            record_name,
            interval,
            policy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_config_parsing() {
        let yaml = r#"
general:
  domain: "sim.local"
  data_dir: "dns_config"
  strict_validation: true
  nameserver:
    process_name: "named"
    rndc_path: "/usr/sbin/rndc"
    checkzone_path: "/usr/sbin/named-checkzone"
    command_timeout: "5s"
networks:
  - name: "fluxy"
    kind: flux
    size: 3
    rotation_interval: "10s"
    rotation_policy: round-robin
  - name: "lbnet"
    kind: lb
    lb_algo: ip_hash
  - name: "cdn1"
    kind: cdn
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert!(config.general.strict_validation);
        assert_eq!(config.networks.len(), 3);
        assert_eq!(
            config.networks[0].rotation_policy,
            Some(RotationPolicy::RoundRobin)
        );
        assert_eq!(
            config.general.nameserver.command_timeout,
            Duration::from_secs(5)
        );
    }

    #[test]
    fn test_defaults_fill_in() {
        let yaml = "general: {}\n";
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.general.domain, "sim.local");
        assert_eq!(config.general.data_dir, PathBuf::from("dns_config"));
        assert!(!config.general.strict_validation);
        assert_eq!(config.general.nameserver.process_name, "named");
        assert!(config.general.nameserver.rndc_path.is_none());
    }

    #[test]
    fn test_duplicate_network_names_rejected() {
        let yaml = r#"
general: {}
networks:
  - name: "fluxy"
    kind: flux
  - name: "fluxy"
    kind: normal
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_kind_mismatched_attributes_rejected() {
        let yaml = r#"
general: {}
networks:
  - name: "plain"
    kind: normal
    lb_algo: ip_hash
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());

        let yaml = r#"
general: {}
networks:
  - name: "plain"
    kind: normal
    rotation_policy: random
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_size_bounds_enforced() {
        let yaml = r#"
general: {}
networks:
  - name: "fluxy"
    kind: flux
    size: 11
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_settings_defaults() {
        let settings = RotationSettings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.domain, "sim.local");
        assert_eq!(settings.record_name, "flux");
        assert_eq!(settings.interval, Duration::from_secs(5));
        assert_eq!(settings.policy, RotationPolicy::Random);
    }

    #[test]
    fn test_env_settings_parsed_and_validated() {
        let mut env = HashMap::new();
        env.insert("DOMAIN", "lab.test");
        env.insert("RECORD_NAME", "edge");
        env.insert("FLUX_INTERVAL", "30");
        env.insert("FLUX_SELECTOR", "roundrobin");
        let settings =
            RotationSettings::from_lookup(|name| env.get(name).map(|s| s.to_string())).unwrap();
        assert_eq!(settings.domain, "lab.test");
        assert_eq!(settings.record_name, "edge");
        assert_eq!(settings.interval, Duration::from_secs(30));
        assert_eq!(settings.policy, RotationPolicy::RoundRobin);

        env.insert("FLUX_INTERVAL", "zero");
        assert!(
            RotationSettings::from_lookup(|name| env.get(name).map(|s| s.to_string())).is_err()
        );
    }
}
