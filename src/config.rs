use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const PLACEHOLDER_API_KEY: &str = "PLACEHOLDER_GEMINI_API_KEY";

/// Main configuration structure for EarthGuard
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub gemini: GeminiConfig,
    pub conversation: ConversationConfig,
    pub status: StatusConfig,
    pub location: LocationConfig,
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    /// Network-level timeout for a single HTTP attempt.
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationConfig {
    /// Upper bound on one `dispatch`, retries included.
    pub dispatch_deadline_secs: u64,
    pub max_message_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub deadline_secs: u64,
}

/// Stand-in for the host's geolocation capability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocationConfig {
    pub enabled: bool,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub acquire_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Total attempts per backend call; 1 disables retry.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_base: f64,
    pub jitter_factor: f64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "earthguard".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: PLACEHOLDER_API_KEY.to_string(),
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: 20,
        }
    }
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            dispatch_deadline_secs: 30,
            max_message_chars: 4000,
        }
    }
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self { deadline_secs: 15 }
    }
}

impl Default for LocationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            latitude: None,
            longitude: None,
            acquire_timeout_secs: 10,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 200,
            max_delay_ms: 5000,
            backoff_base: 2.0,
            jitter_factor: 0.2,
        }
    }
}

impl Config {
    /// Load configuration from file with environment variable overrides
    /// Missing or unreadable sources fall back to defaults.
    pub fn load() -> Self {
        for path in ["../.env", ".env"] {
            if dotenvy::from_path(path).is_ok() {
                tracing::info!("Loaded .env from: {}", path);
            }
        }

        let config_path =
            env::var("EARTHGUARD_CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());

        let mut config = Self::from_file(&config_path);
        config.apply_env_overrides();

        if let Err(e) = config.validate() {
            tracing::warn!("Config validation warnings: {} - continuing anyway", e);
        }

        config
    }

    fn from_file(config_path: &str) -> Self {
        if !Path::new(config_path).exists() {
            tracing::warn!("Config file not found at {} - using defaults", config_path);
            return Self::default();
        }

        match fs::read_to_string(config_path) {
            Ok(contents) => match serde_yaml::from_str::<Config>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {}", config_path);
                    config
                }
                Err(e) => {
                    tracing::error!(
                        "Failed to parse config file {}: {} - using defaults",
                        config_path,
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                tracing::error!(
                    "Failed to read config file {}: {} - using defaults",
                    config_path,
                    e
                );
                Self::default()
            }
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(
            var: &impl Fn(&str) -> Option<String>,
            key: &str,
        ) -> Option<T> {
            let raw = var(key)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
                    None
                }
            }
        }

        // Gemini overrides
        if let Some(api_key) = var("GEMINI_API_KEY").or_else(|| var("API_KEY")) {
            self.gemini.api_key = api_key;
        }
        if let Some(model) = var("EARTHGUARD_MODEL") {
            self.gemini.model = model;
        }
        if let Some(base_url) = var("EARTHGUARD_BASE_URL") {
            self.gemini.base_url = base_url;
        }
        if let Some(secs) = parsed(&var, "EARTHGUARD_REQUEST_TIMEOUT_SECS") {
            self.gemini.request_timeout_secs = secs;
        }

        // Deadlines
        if let Some(secs) = parsed(&var, "EARTHGUARD_DISPATCH_DEADLINE_SECS") {
            self.conversation.dispatch_deadline_secs = secs;
        }
        if let Some(max) = parsed(&var, "EARTHGUARD_MAX_MESSAGE_CHARS") {
            self.conversation.max_message_chars = max;
        }
        if let Some(secs) = parsed(&var, "EARTHGUARD_STATUS_DEADLINE_SECS") {
            self.status.deadline_secs = secs;
        }

        // Location overrides
        if let Some(enabled) = parsed(&var, "EARTHGUARD_LOCATION_ENABLED") {
            self.location.enabled = enabled;
        }
        if let Some(lat) = parsed(&var, "EARTHGUARD_LATITUDE") {
            self.location.latitude = Some(lat);
        }
        if let Some(lon) = parsed(&var, "EARTHGUARD_LONGITUDE") {
            self.location.longitude = Some(lon);
        }
        if let Some(secs) = parsed(&var, "EARTHGUARD_LOCATION_TIMEOUT_SECS") {
            self.location.acquire_timeout_secs = secs;
        }

        // Retry overrides
        if let Some(attempts) = parsed(&var, "EARTHGUARD_RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = attempts;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        if self.gemini.api_key == PLACEHOLDER_API_KEY || self.gemini.api_key.is_empty() {
            return Err("GEMINI_API_KEY environment variable must be set".into());
        }
        if self.gemini.model.trim().is_empty() {
            return Err("gemini.model cannot be empty".into());
        }
        if self.conversation.dispatch_deadline_secs == 0 {
            return Err("conversation.dispatch_deadline_secs cannot be 0".into());
        }
        if self.conversation.max_message_chars == 0 {
            return Err("conversation.max_message_chars cannot be 0".into());
        }
        if self.status.deadline_secs == 0 {
            return Err("status.deadline_secs cannot be 0".into());
        }
        if self.retry.max_attempts == 0 {
            return Err("retry.max_attempts cannot be 0".into());
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err("Retry jitter factor must be between 0.0 and 1.0".into());
        }
        if let Some(lat) = self.location.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                return Err(format!("location.latitude {lat} must be within [-90, 90]").into());
            }
        }
        if let Some(lon) = self.location.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                return Err(format!("location.longitude {lon} must be within [-180, 180]").into());
            }
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.gemini.request_timeout_secs)
    }

    pub fn dispatch_deadline(&self) -> Duration {
        Duration::from_secs(self.conversation.dispatch_deadline_secs)
    }

    pub fn status_deadline(&self) -> Duration {
        Duration::from_secs(self.status.deadline_secs)
    }

    pub fn location_timeout(&self) -> Duration {
        Duration::from_secs(self.location.acquire_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = Config::default();
        assert_eq!(cfg.gemini.model, "gemini-2.5-flash");
        assert_eq!(cfg.retry.max_attempts, 1);
        assert!(!cfg.location.enabled);
        assert_eq!(cfg.dispatch_deadline(), Duration::from_secs(30));
    }

    #[test]
    fn test_placeholder_key_fails_validation() {
        let cfg = Config::default();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_overrides_apply() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vars(&[
            ("GEMINI_API_KEY", "k-123"),
            ("EARTHGUARD_MODEL", "gemini-2.5-pro"),
            ("EARTHGUARD_LOCATION_ENABLED", "true"),
            ("EARTHGUARD_LATITUDE", "23.81"),
            ("EARTHGUARD_LONGITUDE", "90.41"),
            ("EARTHGUARD_DISPATCH_DEADLINE_SECS", "5"),
        ]));

        assert_eq!(cfg.gemini.api_key, "k-123");
        assert_eq!(cfg.gemini.model, "gemini-2.5-pro");
        assert!(cfg.location.enabled);
        assert_eq!(cfg.location.latitude, Some(23.81));
        assert_eq!(cfg.location.longitude, Some(90.41));
        assert_eq!(cfg.dispatch_deadline(), Duration::from_secs(5));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_legacy_api_key_variable() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vars(&[("API_KEY", "legacy")]));
        assert_eq!(cfg.gemini.api_key, "legacy");

        let mut cfg = Config::default();
        cfg.apply_overrides(vars(&[("API_KEY", "legacy"), ("GEMINI_API_KEY", "primary")]));
        assert_eq!(cfg.gemini.api_key, "primary");
    }

    #[test]
    fn test_unparseable_override_is_ignored() {
        let mut cfg = Config::default();
        cfg.apply_overrides(vars(&[("EARTHGUARD_LATITUDE", "north")]));
        assert_eq!(cfg.location.latitude, None);
    }

    #[test]
    fn test_out_of_range_latitude_fails_validation() {
        let mut cfg = Config::default();
        cfg.gemini.api_key = "k".to_string();
        cfg.location.latitude = Some(123.0);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let cfg: Config = serde_yaml::from_str(
            "gemini:\n  model: gemini-2.0-flash\nlocation:\n  enabled: true\n  latitude: 22.33\n  longitude: 91.83\n",
        )
        .unwrap();
        assert_eq!(cfg.gemini.model, "gemini-2.0-flash");
        assert_eq!(cfg.gemini.base_url, DEFAULT_BASE_URL);
        assert!(cfg.location.enabled);
        assert_eq!(cfg.location.acquire_timeout_secs, 10);
        assert_eq!(cfg.conversation.max_message_chars, 4000);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let cfg = Config::from_file("/nonexistent/earthguard.yaml");
        assert_eq!(cfg.gemini.model, DEFAULT_MODEL);
    }
}
