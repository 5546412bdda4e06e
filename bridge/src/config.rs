use std::fs;
use std::path::Path;

use brewlink_core::SparkApiConfig;
use serde::Deserialize;

/// Bridge process configuration.
///
/// Resolution order: built-in defaults, then environment, then the TOML
/// file named by `BREWLINK_CONFIG` (default `./brewlink.toml`).
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    pub api: SparkApiConfig,
    /// Spark service ids to synchronize
    pub services: Vec<String>,
    /// Listen address for `topic payload` lines
    pub ingress_addr: String,
    /// REST reconcile period; 0 disables the loop
    pub poll_interval_secs: u64,
    /// Derived-state report period; 0 disables reporting
    pub report_interval_secs: u64,
}

fn parse_services(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            api: SparkApiConfig::from_env(),
            services: std::env::var("BREWLINK_SERVICES")
                .ok()
                .map(|v| parse_services(&v))
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| vec!["spark-one".to_string()]),
            ingress_addr: std::env::var("BREWLINK_INGRESS_ADDR")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "127.0.0.1:1884".to_string()),
            poll_interval_secs: std::env::var("BREWLINK_POLL_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0),
            report_interval_secs: std::env::var("BREWLINK_REPORT_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(60),
        }
    }
}

impl BridgeConfig {
    pub fn load() -> Self {
        let path = std::env::var("BREWLINK_CONFIG").unwrap_or_else(|_| "brewlink.toml".into());
        Self::load_from(&path)
    }

    /// Overlay the TOML file at `path` onto defaults; a missing or invalid
    /// file leaves the defaults in place.
    pub fn load_from(path: &str) -> Self {
        let default = Self::default();
        let p = Path::new(path);
        if !p.exists() {
            tracing::info!(target: "bridge", path = %path, "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(p) {
            Ok(s) => match Self::from_toml_str(&s, default.clone()) {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!(target: "bridge", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "bridge", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    pub fn from_toml_str(s: &str, base: BridgeConfig) -> Result<Self, toml::de::Error> {
        Ok(toml::from_str::<BridgeToml>(s)?.overlay(base))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
struct BridgeToml {
    services: Option<Vec<String>>,
    ingress_addr: Option<String>,
    poll_interval_secs: Option<u64>,
    report_interval_secs: Option<u64>,
    api: Option<ApiToml>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ApiToml {
    base_url: Option<String>,
    timeout_ms: Option<u64>,
    user_agent: Option<String>,
}

impl BridgeToml {
    fn overlay(self, mut base: BridgeConfig) -> BridgeConfig {
        if let Some(services) = self.services {
            base.services = services;
        }
        if let Some(addr) = self.ingress_addr {
            base.ingress_addr = addr;
        }
        if let Some(v) = self.poll_interval_secs {
            base.poll_interval_secs = v;
        }
        if let Some(v) = self.report_interval_secs {
            base.report_interval_secs = v;
        }
        if let Some(api) = self.api {
            api.apply(&mut base.api);
        }
        base
    }
}

impl ApiToml {
    fn apply(self, api: &mut SparkApiConfig) {
        if let Some(v) = self.base_url {
            api.base_url = v;
        }
        if let Some(v) = self.timeout_ms {
            api.timeout_ms = v;
        }
        if let Some(v) = self.user_agent {
            api.user_agent = v;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> BridgeConfig {
        BridgeConfig {
            api: SparkApiConfig::default(),
            services: vec!["spark-one".to_string()],
            ingress_addr: "127.0.0.1:1884".to_string(),
            poll_interval_secs: 0,
            report_interval_secs: 60,
        }
    }

    #[test]
    fn overlay_replaces_only_given_fields() {
        let config = BridgeConfig::from_toml_str(
            r#"
            services = ["spark-one", "spark-two"]
            poll_interval_secs = 30

            [api]
            base_url = "http://brewpi.local/history"
            "#,
            base(),
        )
        .unwrap();

        assert_eq!(config.services, vec!["spark-one", "spark-two"]);
        assert_eq!(config.poll_interval_secs, 30);
        assert_eq!(config.api.base_url, "http://brewpi.local/history");
        assert_eq!(config.api.timeout_ms, SparkApiConfig::default().timeout_ms);
        assert_eq!(config.ingress_addr, "127.0.0.1:1884");
        assert_eq!(config.report_interval_secs, 60);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        assert!(BridgeConfig::from_toml_str("services = 3", base()).is_err());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = BridgeConfig::load_from("/nonexistent/brewlink.toml");
        assert!(!config.services.is_empty());
    }

    #[test]
    fn services_list_is_trimmed() {
        assert_eq!(parse_services(" a, b ,,c"), vec!["a", "b", "c"]);
    }
}
