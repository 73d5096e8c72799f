use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "snake_case")]
pub struct Config {
    /// How long a fetch test waits for its resource timing entry (ms)
    pub resource_timing_timeout_ms: u64,

    /// Timeout applied by the HTTP transport to each request (ms)
    pub request_timeout_ms: u64,

    /// Delay between document readiness and the provider fan-out (ms)
    pub pre_config_start_delay_ms: u64,

    /// Pending beacons the background queue accepts before refusing
    pub beacon_queue_capacity: usize,

    /// Entry types the performance timeline can be observed for
    pub supported_entry_types: Vec<String>,

    /// Session events a slow subscriber can fall behind by
    pub event_backlog: usize,

    /// Run a session's tasks concurrently unless told otherwise
    pub parallel: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            resource_timing_timeout_ms: 5000,
            request_timeout_ms: 30000,
            pre_config_start_delay_ms: 0,
            beacon_queue_capacity: 64,
            supported_entry_types: ["resource", "navigation", "mark", "measure"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            event_backlog: 256,
            parallel: false,
        }
    }
}

impl Config {
    pub fn resource_timing_timeout(&self) -> Duration {
        Duration::from_millis(self.resource_timing_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn pre_config_start_delay(&self) -> Option<Duration> {
        (self.pre_config_start_delay_ms > 0)
            .then(|| Duration::from_millis(self.pre_config_start_delay_ms))
    }

    /// Load configuration from a YAML file, falling back to defaults for missing keys
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.resource_timing_timeout(), Duration::from_millis(5000));
        assert_eq!(config.pre_config_start_delay(), None);
        assert!(config.supported_entry_types.contains(&"resource".to_string()));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml("resource_timing_timeout_ms: 750\npre_config_start_delay_ms: 20\n")
            .unwrap();
        assert_eq!(config.resource_timing_timeout_ms, 750);
        assert_eq!(config.pre_config_start_delay(), Some(Duration::from_millis(20)));
        assert_eq!(config.request_timeout_ms, 30000);
    }

    #[test]
    fn test_parallel_and_event_backlog() {
        let config = Config::from_yaml("parallel: true\nevent_backlog: 16\n").unwrap();
        assert!(config.parallel);
        assert_eq!(config.event_backlog, 16);
        assert!(!Config::default().parallel);
    }

    #[test]
    fn test_empty_yaml() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }
}
