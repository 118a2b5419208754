//! Client configuration.
//!
//! The caller builds a `ClientConfig` and hands it to `OpsBeaconClient::new`.
//! Nothing here is global. `from_env` and the `Deserialize` impl are
//! conveniences for the usual sources, an environment or a config file.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::error::{OpsBeaconError, Result};

/// Default per-request deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

pub const ENV_API_DOMAIN: &str = "OPSBEACON_API_DOMAIN";
pub const ENV_API_TOKEN: &str = "OPSBEACON_API_TOKEN";
pub const ENV_TIMEOUT: &str = "OPSBEACON_TIMEOUT";
pub const ENV_DEBUG: &str = "OPSBEACON_DEBUG";

/// Connection settings for one `OpsBeaconClient`.
///
/// `timeout` is read as seconds (integer or fractional) when deserialized.
#[derive(Clone, Deserialize)]
pub struct ClientConfig {
    pub api_domain: String,
    pub api_token: String,
    #[serde(default = "default_timeout", deserialize_with = "seconds")]
    pub timeout: Duration,
    #[serde(default)]
    pub debug: bool,
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn seconds<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Duration, D::Error> {
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

impl ClientConfig {
    pub fn new(api_domain: impl Into<String>, api_token: impl Into<String>) -> Self {
        Self {
            api_domain: api_domain.into(),
            api_token: api_token.into(),
            timeout: DEFAULT_TIMEOUT,
            debug: false,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Read `OPSBEACON_API_DOMAIN`, `OPSBEACON_API_TOKEN`, and optionally
    /// `OPSBEACON_TIMEOUT` (seconds) and `OPSBEACON_DEBUG`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let api_domain = lookup(ENV_API_DOMAIN).unwrap_or_default();
        let api_token = lookup(ENV_API_TOKEN).unwrap_or_default();
        let mut config = Self::new(api_domain, api_token);

        if let Some(raw) = lookup(ENV_TIMEOUT) {
            let timeout = raw
                .trim()
                .parse::<f64>()
                .ok()
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
                .ok_or_else(|| {
                    OpsBeaconError::validation(
                        format!("{ENV_TIMEOUT} must be a non-negative number of seconds"),
                        Some("timeout"),
                    )
                })?;
            config.timeout = timeout;
        }
        if let Some(raw) = lookup(ENV_DEBUG) {
            config.debug = matches!(raw.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.api_domain.trim().is_empty() {
            return Err(OpsBeaconError::required("api_domain"));
        }
        if self.api_token.is_empty() {
            return Err(OpsBeaconError::required("api_token"));
        }
        Ok(())
    }

    /// Domain with any trailing slashes removed.
    pub fn normalized_domain(&self) -> &str {
        self.api_domain.trim().trim_end_matches('/')
    }

    /// `https://{domain}`, unless the domain already names a scheme.
    pub fn base_url(&self) -> String {
        let domain = self.normalized_domain();
        if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.to_string()
        } else {
            format!("https://{domain}")
        }
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_domain", &self.api_domain)
            .field("api_token", &"***")
            .field("timeout", &self.timeout)
            .field("debug", &self.debug)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::error::ErrorKind;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn base_url_strips_trailing_slash() {
        let config = ClientConfig::new("api.test.com/", "t");
        assert_eq!(config.normalized_domain(), "api.test.com");
        assert_eq!(config.base_url(), "https://api.test.com");
    }

    #[test]
    fn base_url_keeps_explicit_scheme() {
        let config = ClientConfig::new("http://127.0.0.1:8080/", "t");
        assert_eq!(config.base_url(), "http://127.0.0.1:8080");
    }

    #[test]
    fn validate_rejects_missing_domain() {
        let err = ClientConfig::new("", "t").validate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.to_string(), "api_domain is required");
    }

    #[test]
    fn validate_rejects_missing_token() {
        let err = ClientConfig::new("api.test.com", "").validate().unwrap_err();
        assert_eq!(err.to_string(), "api_token is required");
    }

    #[test]
    fn debug_output_hides_token() {
        let config = ClientConfig::new("api.test.com", "super-secret-token");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("super-secret-token"));
    }

    #[test]
    fn from_lookup_reads_all_settings() {
        let config = ClientConfig::from_lookup(lookup(&[
            (ENV_API_DOMAIN, "api.console.opsbeacon.com"),
            (ENV_API_TOKEN, "tok"),
            (ENV_TIMEOUT, "12.5"),
            (ENV_DEBUG, "true"),
        ]))
        .unwrap();
        assert_eq!(config.api_domain, "api.console.opsbeacon.com");
        assert_eq!(config.timeout, Duration::from_millis(12_500));
        assert!(config.debug);
    }

    #[test]
    fn from_lookup_defaults_optional_settings() {
        let config =
            ClientConfig::from_lookup(lookup(&[(ENV_API_DOMAIN, "d"), (ENV_API_TOKEN, "t")])).unwrap();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(!config.debug);
    }

    #[test]
    fn from_lookup_rejects_bad_timeout() {
        let err = ClientConfig::from_lookup(lookup(&[
            (ENV_API_DOMAIN, "d"),
            (ENV_API_TOKEN, "t"),
            (ENV_TIMEOUT, "soon"),
        ]))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn from_lookup_requires_token() {
        let err = ClientConfig::from_lookup(lookup(&[(ENV_API_DOMAIN, "d")])).unwrap_err();
        assert_eq!(err.to_string(), "api_token is required");
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"api_domain":"d","api_token":"t"}"#).unwrap();
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
        assert!(!config.debug);

        let config: ClientConfig =
            serde_json::from_str(r#"{"api_domain":"d","api_token":"t","timeout":2,"debug":true}"#)
                .unwrap();
        assert_eq!(config.timeout, Duration::from_secs(2));
        assert!(config.debug);
    }
}
