//! Engine configuration
//!
//! Loaded from JSON. Every field is optional; missing fields take the
//! defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::availability::RecoveryPolicy;
use crate::types::PageKind;

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:22332";

/// Identifiers per batched request. Larger payloads were observed to break
/// the userscript transport at around 60 entries.
pub const DEFAULT_BATCH_LIMIT: usize = 50;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Timings for one page kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageTimings {
    /// Delay between scan cycles
    pub scan_interval_ms: u64,
    /// Delay before the first scan
    #[serde(default)]
    pub start_delay_ms: u64,
    /// Cache clear period; `None` keeps the cache for the whole session
    #[serde(default)]
    pub cache_clear_ms: Option<u64>,
}

impl PageTimings {
    const fn new(scan_interval_ms: u64, start_delay_ms: u64, cache_clear_ms: u64) -> Self {
        Self {
            scan_interval_ms,
            start_delay_ms,
            cache_clear_ms: Some(cache_clear_ms),
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_millis(self.scan_interval_ms)
    }

    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    pub fn cache_clear(&self) -> Option<Duration> {
        self.cache_clear_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageTimingTable {
    pub profile: PageTimings,
    pub video: PageTimings,
    pub popular: PageTimings,
    pub home: PageTimings,
}

impl Default for PageTimingTable {
    fn default() -> Self {
        Self {
            profile: PageTimings::new(500, 0, 3_000),
            video: PageTimings::new(500, 0, 3_000),
            // Low churn feed: slow scans, long cache epochs
            popular: PageTimings::new(10_000, 1_000, 60_000),
            home: PageTimings::new(500, 0, 3_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the verification service
    pub server_url: String,
    /// Maximum identifiers per batched request
    pub batch_limit: usize,
    /// Delay before the extra scan that follows a successful block
    pub rescan_delay_ms: u64,
    /// How long a notice stays visible
    pub notice_ms: u64,
    /// Nodes searched for an annotation on right-click, counting the clicked one
    pub context_search_depth: usize,
    pub recovery: RecoveryPolicy,
    pub pages: PageTimingTable,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            batch_limit: DEFAULT_BATCH_LIMIT,
            rescan_delay_ms: 100,
            notice_ms: 1_500,
            context_search_depth: 10,
            recovery: RecoveryPolicy::default(),
            pages: PageTimingTable::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_limit == 0 {
            return Err(ConfigError::Invalid("batch_limit must be at least 1".to_string()));
        }
        if self.context_search_depth == 0 {
            return Err(ConfigError::Invalid(
                "context_search_depth must be at least 1".to_string(),
            ));
        }
        if self.server_url.trim().is_empty() {
            return Err(ConfigError::Invalid("server_url is empty".to_string()));
        }
        for kind in [PageKind::Profile, PageKind::Video, PageKind::Popular, PageKind::Home] {
            let timings = self.timings(kind);
            if timings.scan_interval_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{} scan_interval_ms must be positive",
                    kind.as_str()
                )));
            }
            if timings.cache_clear_ms == Some(0) {
                return Err(ConfigError::Invalid(format!(
                    "{} cache_clear_ms must be positive",
                    kind.as_str()
                )));
            }
        }
        if let RecoveryPolicy::Backoff { initial_ms, max_ms } = self.recovery {
            if initial_ms == 0 || max_ms < initial_ms {
                return Err(ConfigError::Invalid(
                    "recovery backoff needs 0 < initial_ms <= max_ms".to_string(),
                ));
            }
        }
        Ok(())
    }

    pub fn timings(&self, kind: PageKind) -> &PageTimings {
        match kind {
            PageKind::Profile => &self.pages.profile,
            PageKind::Video => &self.pages.video,
            PageKind::Popular => &self.pages.popular,
            PageKind::Home => &self.pages.home,
        }
    }

    pub fn rescan_delay(&self) -> Duration {
        Duration::from_millis(self.rescan_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_is_default() {
        let config = EngineConfig::from_json("{}").expect("empty config should load");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.timings(PageKind::Popular).scan_interval_ms, 10_000);
        assert_eq!(config.timings(PageKind::Home).cache_clear_ms, Some(3_000));
    }

    #[test]
    fn test_partial_override() {
        let config = EngineConfig::from_json(
            r#"{
                "batch_limit": 20,
                "recovery": { "mode": "never" },
                "pages": { "home": { "scan_interval_ms": 250 } }
            }"#,
        )
        .expect("config should load");

        assert_eq!(config.batch_limit, 20);
        assert_eq!(config.recovery, RecoveryPolicy::Never);
        assert_eq!(config.pages.home.scan_interval_ms, 250);
        assert_eq!(config.pages.home.cache_clear_ms, None);
        assert_eq!(config.pages.video, PageTimingTable::default().video);
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{ "batch_limit": 0 }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{ "recovery": { "mode": "backoff", "initial_ms": 10, "max_ms": 5 } }"#),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_json("not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
