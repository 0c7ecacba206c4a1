// SPDX-License-Identifier: MIT

//! Service configuration - YAML file plus `KINETIC_*` environment overrides

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::adk::error::{KineticError, Result};
use crate::adk::retry::RetryPolicy;

static DEFAULT_SERVICES: Lazy<BTreeMap<String, String>> = Lazy::new(|| {
    [
        ("media", "http://localhost:8001"),
        ("transcription", "http://localhost:8002"),
        ("enhancement", "http://localhost:8003"),
    ]
    .into_iter()
    .map(|(name, url)| (name.to_string(), url.to_string()))
    .collect()
});

/// Environment variables that override a named service's base URL
const SERVICE_ENV: [(&str, &str); 3] = [
    ("media", "KINETIC_MEDIA_URL"),
    ("transcription", "KINETIC_TRANSCRIPTION_URL"),
    ("enhancement", "KINETIC_ENHANCEMENT_URL"),
];

/// Service configuration; keys are camelCase like workflow definitions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Capability name -> base URL
    pub services: BTreeMap<String, String>,
    pub store_ttl_secs: u64,
    pub react_max_iterations: u32,
    pub call_timeout_ms: u64,
    /// Retry policy for ReAct action calls
    pub action_retry: RetryPolicy,
    pub event_capacity: usize,
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            services: DEFAULT_SERVICES.clone(),
            store_ttl_secs: 86_400,
            react_max_iterations: 20,
            call_timeout_ms: 30_000,
            action_retry: RetryPolicy::none(),
            event_capacity: 256,
            port: 3000,
        }
    }
}

impl Config {
    /// Read a YAML config file; missing fields take their defaults
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            KineticError::config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Defaults with environment overrides applied
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Apply `KINETIC_*` overrides on top of the current values
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        for (service, key) in SERVICE_ENV {
            if let Some(url) = lookup(key) {
                self.services.insert(service.to_string(), url);
            }
        }
        if let Some(v) = lookup("KINETIC_STORE_TTL_SECS") {
            self.store_ttl_secs = parse_var("KINETIC_STORE_TTL_SECS", &v)?;
        }
        if let Some(v) = lookup("KINETIC_MAX_ITERATIONS") {
            self.react_max_iterations = parse_var("KINETIC_MAX_ITERATIONS", &v)?;
        }
        if let Some(v) = lookup("KINETIC_CALL_TIMEOUT_MS") {
            self.call_timeout_ms = parse_var("KINETIC_CALL_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("KINETIC_PORT") {
            self.port = parse_var("KINETIC_PORT", &v)?;
        }
        Ok(())
    }

    pub fn store_ttl(&self) -> Duration {
        Duration::from_secs(self.store_ttl_secs)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

fn parse_var<T: FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| KineticError::config(format!("{} has an invalid value '{}'", key, value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::retry::BackoffKind;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.store_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.react_max_iterations, 20);
        assert_eq!(config.port, 3000);
        assert_eq!(
            config.services.get("transcription").map(String::as_str),
            Some("http://localhost:8002")
        );
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            r#"
port: 8080
storeTtlSecs: 600
services:
  media: http://media.internal:9000
actionRetry:
  maxRetries: 3
  backoff: fixed
"#,
        )
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.store_ttl(), Duration::from_secs(600));
        assert_eq!(config.call_timeout_ms, 30_000);
        assert_eq!(config.action_retry.max_retries, 3);
        assert_eq!(config.action_retry.backoff, BackoffKind::Fixed);
        // A services table replaces the default set
        assert_eq!(config.services.len(), 1);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("KINETIC_MEDIA_URL", "http://10.0.0.5:8001"),
            ("KINETIC_MAX_ITERATIONS", "7"),
            ("KINETIC_PORT", "4000"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.services["media"], "http://10.0.0.5:8001");
        assert_eq!(config.react_max_iterations, 7);
        assert_eq!(config.port, 4000);
        assert_eq!(config.store_ttl_secs, 86_400);
    }

    #[test]
    fn test_bad_env_value_is_config_error() {
        let mut config = Config::default();
        let err = config
            .apply_overrides(|k| (k == "KINETIC_PORT").then(|| "not-a-port".to_string()))
            .unwrap_err();
        assert!(matches!(err, KineticError::Config(_)));
    }

    #[test]
    fn test_snake_case_keys_are_ignored() {
        let config = Config::from_yaml("store_ttl_secs: 5\n").unwrap();
        assert_eq!(config.store_ttl_secs, 86_400);
    }

    #[tokio::test]
    async fn test_huge_ttl_is_storable() {
        use crate::adk::store::{MemoryStateStore, StateStore};

        let mut config = Config::default();
        config
            .apply_overrides(|k| {
                (k == "KINETIC_STORE_TTL_SECS").then(|| u64::MAX.to_string())
            })
            .unwrap();

        let store = MemoryStateStore::new();
        store
            .put("k", serde_json::json!(1), config.store_ttl())
            .await
            .unwrap();
        assert!(store.get("k").await.unwrap().is_some());
    }

    #[test]
    fn test_missing_file_is_config_error() {
        assert!(matches!(
            Config::load("/no/such/kinetic.yaml"),
            Err(KineticError::Config(_))
        ));
    }
}
