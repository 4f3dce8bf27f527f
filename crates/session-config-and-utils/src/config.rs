//! Configuration management for the session client.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default API base: same-origin `/api`.
pub const DEFAULT_API_BASE_URL: &str = "/api";

/// Origin that relative API bases are resolved against.
pub const DEFAULT_SITE_ORIGIN: &str = "http://localhost:3000";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Lead time before expiry at which the proactive refresh fires.
pub const DEFAULT_REFRESH_LEAD_SECS: u64 = 60;

/// Sessions living longer than this go to durable storage.
pub const DEFAULT_DURABLE_THRESHOLD_HOURS: i64 = 24;

/// Per-request timeout for backend calls.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Lifetime assumed when the backend omits `expiresIn`.
pub const DEFAULT_FALLBACK_SESSION_LIFETIME_SECS: i64 = 900;

const ENV_LOG_LEVEL: &str = "LEARNHUB_LOG_LEVEL";
const ENV_API_URL: &str = "LEARNHUB_API_URL";
const ENV_SITE_ORIGIN: &str = "LEARNHUB_SITE_ORIGIN";

/// Main client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Base API URL, absolute or relative to `site_origin`.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Site origin used to resolve a relative `api_base_url`.
    #[serde(default = "default_site_origin")]
    pub site_origin: String,
    #[serde(default = "default_refresh_lead_secs")]
    pub refresh_lead_secs: u64,
    #[serde(default = "default_durable_threshold_hours")]
    pub durable_threshold_hours: i64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_fallback_session_lifetime_secs")]
    pub fallback_session_lifetime_secs: i64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_site_origin() -> String {
    DEFAULT_SITE_ORIGIN.to_string()
}

fn default_refresh_lead_secs() -> u64 {
    DEFAULT_REFRESH_LEAD_SECS
}

fn default_durable_threshold_hours() -> i64 {
    DEFAULT_DURABLE_THRESHOLD_HOURS
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_fallback_session_lifetime_secs() -> i64 {
    DEFAULT_FALLBACK_SESSION_LIFETIME_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_base_url: default_api_base_url(),
            site_origin: default_site_origin(),
            refresh_lead_secs: DEFAULT_REFRESH_LEAD_SECS,
            durable_threshold_hours: DEFAULT_DURABLE_THRESHOLD_HOURS,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            fallback_session_lifetime_secs: DEFAULT_FALLBACK_SESSION_LIFETIME_SECS,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file (if any), then apply
    /// environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production). Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).and_then(non_empty);

        if let Some(level) = get(ENV_LOG_LEVEL) {
            self.log_level = level;
        }
        if let Some(api_url) = get(ENV_API_URL) {
            self.api_base_url = api_url;
        }
        if let Some(origin) = get(ENV_SITE_ORIGIN) {
            self.site_origin = origin;
        }
    }

    /// Check values that would otherwise fail late at request time.
    pub fn validate(&self) -> CoreResult<()> {
        if self.request_timeout_secs == 0 {
            return Err(CoreError::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.durable_threshold_hours < 0 {
            return Err(CoreError::Config(
                "durable_threshold_hours must not be negative".to_string(),
            ));
        }
        if self.fallback_session_lifetime_secs <= 0 {
            return Err(CoreError::Config(
                "fallback_session_lifetime_secs must be greater than zero".to_string(),
            ));
        }
        self.api_base_url()?;
        Ok(())
    }

    /// Resolve the API base URL. Relative values are joined onto
    /// `site_origin`; the result always ends with `/` so endpoint paths can
    /// be joined onto it.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        let raw = self.api_base_url.trim();
        let mut url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => Url::parse(&self.site_origin)?.join(raw)?,
            Err(e) => return Err(e.into()),
        };

        if url.cannot_be_a_base() {
            return Err(CoreError::Config(format!(
                "API base URL cannot carry paths: {}",
                raw
            )));
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }

        Ok(url)
    }

    pub fn refresh_lead(&self) -> Duration {
        Duration::from_secs(self.refresh_lead_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
        assert_eq!(config.api_base_url, "/api");
        assert_eq!(config.refresh_lead_secs, 60);
        assert_eq!(config.durable_threshold_hours, 24);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_api_base_is_same_origin_api() {
        let config = Config::default();
        let url = config.api_base_url().unwrap();
        assert_eq!(url.as_str(), "http://localhost:3000/api/");
        assert_eq!(
            url.join("auth/login").unwrap().as_str(),
            "http://localhost:3000/api/auth/login"
        );
    }

    #[test]
    fn test_absolute_api_base_is_used_as_is() {
        let mut config = Config::default();
        config.api_base_url = "https://api.learnhub.dev/v2".to_string();
        let url = config.api_base_url().unwrap();
        assert_eq!(url.as_str(), "https://api.learnhub.dev/v2/");
    }

    #[test]
    fn test_relative_api_base_follows_site_origin() {
        let mut config = Config::default();
        config.site_origin = "https://tenant-a.learnhub.dev".to_string();
        let url = config.api_base_url().unwrap();
        assert_eq!(url.as_str(), "https://tenant-a.learnhub.dev/api/");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("LEARNHUB_API_URL", "https://api.example.com"),
            ("LEARNHUB_LOG_LEVEL", "debug"),
        ]));
        assert_eq!(config.api_base_url, "https://api.example.com");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.site_origin, DEFAULT_SITE_ORIGIN);
    }

    #[test]
    fn test_blank_env_values_are_ignored() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[("LEARNHUB_API_URL", "   ")]));
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_config_load_from_file_fills_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        std::fs::write(&config_path, r#"{ "log_level": "debug", "refresh_lead_secs": 30 }"#)
            .unwrap();

        let config = Config::load_from_file(&config_path).unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.refresh_lead_secs, 30);
        assert_eq!(config.durable_threshold_hours, DEFAULT_DURABLE_THRESHOLD_HOURS);
    }

    #[test]
    fn test_config_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let mut config = Config::default();
        config.durable_threshold_hours = 48;
        config.save(&paths).unwrap();

        let loaded = Config::load_from_file(&paths.config_file()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_config_load_nonexistent_uses_defaults() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());

        let config = Config::load(&paths).unwrap();
        assert_eq!(config.refresh_lead_secs, DEFAULT_REFRESH_LEAD_SECS);
    }

    #[test]
    fn test_validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.request_timeout_secs = 0;
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_unresolvable_base() {
        let mut config = Config::default();
        config.site_origin = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
