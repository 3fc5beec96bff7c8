use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::proximity::DEFAULT_NEARBY_RADIUS_KM;

pub const CONFIG_FILE_NAME: &str = "beacon_config.json";
const DEFAULT_SUBSCRIBE_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    pub disable_network: Option<bool>,
    pub nearby_radius_km: Option<f64>,
    pub incidents_url: Option<String>,
    pub location_url: Option<String>,
    pub subscribe_timeout_secs: Option<u64>,
}

impl AppConfig {
    pub fn network_enabled(&self) -> bool {
        self.disable_network != Some(true)
    }

    /// Configured radius; non-finite or negative values fall back to 20 km.
    pub fn nearby_radius_km(&self) -> f64 {
        self.nearby_radius_km
            .filter(|r| r.is_finite() && *r >= 0.0)
            .unwrap_or(DEFAULT_NEARBY_RADIUS_KM)
    }

    pub fn subscribe_timeout(&self) -> Duration {
        Duration::from_secs(
            self.subscribe_timeout_secs
                .filter(|s| *s > 0)
                .unwrap_or(DEFAULT_SUBSCRIBE_TIMEOUT_SECS),
        )
    }

    pub fn incidents_url(&self) -> Option<&str> {
        non_blank(self.incidents_url.as_deref())
    }

    pub fn location_url(&self) -> Option<&str> {
        non_blank(self.location_url.as_deref())
    }

    fn apply_env_overrides(&mut self) {
        if let Some(v) = env_parse::<f64>("BEACON_NEARBY_RADIUS_KM") {
            self.nearby_radius_km = Some(v);
        }
        if let Ok(v) = std::env::var("BEACON_INCIDENTS_URL") {
            self.incidents_url = Some(v);
        }
        if let Ok(v) = std::env::var("BEACON_LOCATION_URL") {
            self.location_url = Some(v);
        }
        if let Some(v) = env_parse::<u64>("BEACON_SUBSCRIBE_TIMEOUT_SECS") {
            self.subscribe_timeout_secs = Some(v);
        }
        if let Ok(v) = std::env::var("BEACON_DISABLE_NETWORK") {
            let t = v.trim();
            self.disable_network = Some(!t.is_empty() && t != "0" && !t.eq_ignore_ascii_case("false"));
        }
    }
}

fn non_blank(v: Option<&str>) -> Option<&str> {
    v.map(str::trim).filter(|s| !s.is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

pub fn read_config_file(path: &Path) -> anyhow::Result<AppConfig> {
    let raw = std::fs::read(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_slice(&raw).with_context(|| format!("parse {}", path.display()))
}

/// Loads `<data_dir>/beacon_config.json`, then applies `BEACON_*` env
/// overrides. A missing or malformed file yields defaults.
pub fn load_app_config(data_dir: &str) -> AppConfig {
    let path = Path::new(data_dir).join(CONFIG_FILE_NAME);
    let mut config = if path.exists() {
        match read_config_file(&path) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %format!("{e:#}"), "ignoring unreadable config");
                AppConfig::default()
            }
        }
    } else {
        AppConfig::default()
    };
    config.apply_env_overrides();
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = read_config_file(&dir.path().join(CONFIG_FILE_NAME));
        assert!(config.is_err());

        let config = AppConfig::default();
        assert!(config.network_enabled());
        assert_eq!(config.nearby_radius_km(), 20.0);
        assert_eq!(config.subscribe_timeout(), Duration::from_secs(15));
        assert_eq!(config.incidents_url(), None);
    }

    #[test]
    fn reads_fields_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"{
                "disable_network": true,
                "nearby_radius_km": 35.5,
                "incidents_url": " https://reports.example.org/api/reports/active ",
                "subscribe_timeout_secs": 3
            }"#,
        )
        .unwrap();
        let config = read_config_file(&path).unwrap();
        assert!(!config.network_enabled());
        assert_eq!(config.nearby_radius_km(), 35.5);
        assert_eq!(
            config.incidents_url(),
            Some("https://reports.example.org/api/reports/active")
        );
        assert_eq!(config.location_url(), None);
        assert_eq!(config.subscribe_timeout(), Duration::from_secs(3));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "{ not json").unwrap();
        let err = read_config_file(&path).unwrap_err();
        assert!(format!("{err:#}").contains("parse"));
    }

    #[test]
    fn invalid_radius_falls_back_to_default() {
        for bad in [f64::NAN, f64::INFINITY, -1.0] {
            let config = AppConfig {
                nearby_radius_km: Some(bad),
                ..AppConfig::default()
            };
            assert_eq!(config.nearby_radius_km(), DEFAULT_NEARBY_RADIUS_KM);
        }
    }
}
