//! Browsing configuration.
//!
//! Every key is optional; a missing key takes the default shown on its field.
//!
//! ```toml
//! max_limit = 200
//! default_limit = 100
//! default_cursor_limit = 50
//! max_skip = 100000
//! sample_size = 10
//! allow_sampling = false
//! text_search_max_fields = 10
//! request_timeout_ms = 5000
//! ```

use std::{path::Path, time::Duration};

use serde::Deserialize;

use crate::error::{BrowseError, BrowseResult};

/// Upper bound accepted for `sample_size`.
pub const MAX_SAMPLE_SIZE: usize = 100;

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct BrowseConfig {
    /// Hard ceiling on page size; larger requests are clamped silently. Default 200.
    #[serde(default = "default_max_limit")]
    pub max_limit: usize,
    /// Page size for offset mode when the caller gives none. Default 100.
    #[serde(default = "default_limit")]
    pub default_limit: usize,
    /// Page size for cursor mode when the caller gives none. Default 50.
    #[serde(default = "default_cursor_limit")]
    pub default_cursor_limit: usize,
    /// Ceiling on `skip` in offset mode. Default 100 000.
    #[serde(default = "default_max_skip")]
    pub max_skip: usize,
    /// Documents read by the sampling schema source and by text-search field discovery. Default 10.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// Whether schema inference may fall back to sampling live documents. Default `false`.
    #[serde(default)]
    pub allow_sampling: bool,
    /// How many string fields a free-text query searches. Default 10.
    #[serde(default = "default_text_search_max_fields")]
    pub text_search_max_fields: usize,
    /// Deadline applied to store round trips when the caller supplies none.
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
}

fn default_max_limit() -> usize {
    200
}
fn default_limit() -> usize {
    100
}
fn default_cursor_limit() -> usize {
    50
}
fn default_max_skip() -> usize {
    100_000
}
fn default_sample_size() -> usize {
    10
}
fn default_text_search_max_fields() -> usize {
    10
}

impl Default for BrowseConfig {
    fn default() -> Self {
        Self {
            max_limit: default_max_limit(),
            default_limit: default_limit(),
            default_cursor_limit: default_cursor_limit(),
            max_skip: default_max_skip(),
            sample_size: default_sample_size(),
            allow_sampling: false,
            text_search_max_fields: default_text_search_max_fields(),
            request_timeout_ms: None,
        }
    }
}

impl BrowseConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> BrowseResult<Self> {
        let config: BrowseConfig =
            toml::from_str(source).map_err(|e| BrowseError::Config(e.to_string()))?;
        config.validate()?;

        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn load(path: impl AsRef<Path>) -> BrowseResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| {
            BrowseError::Config(format!("failed to read {}: {e}", path.display()))
        })?;

        Self::from_toml_str(&source)
    }

    /// Checks the relations between limits.
    pub fn validate(&self) -> BrowseResult<()> {
        if self.max_limit == 0 {
            return Err(BrowseError::Config("max_limit must be at least 1".into()));
        }
        if self.default_limit == 0 || self.default_limit > self.max_limit {
            return Err(BrowseError::Config(format!(
                "default_limit must be between 1 and max_limit ({})",
                self.max_limit
            )));
        }
        if self.default_cursor_limit == 0 || self.default_cursor_limit > self.max_limit {
            return Err(BrowseError::Config(format!(
                "default_cursor_limit must be between 1 and max_limit ({})",
                self.max_limit
            )));
        }
        if self.sample_size == 0 || self.sample_size > MAX_SAMPLE_SIZE {
            return Err(BrowseError::Config(format!(
                "sample_size must be between 1 and {MAX_SAMPLE_SIZE}"
            )));
        }
        if self.request_timeout_ms == Some(0) {
            return Err(BrowseError::Config("request_timeout_ms must be positive".into()));
        }

        Ok(())
    }

    /// Clamps a requested page size into `1..=max_limit`.
    pub fn clamp_limit(&self, requested: usize) -> usize {
        requested.clamp(1, self.max_limit)
    }

    /// Clamps a requested skip into `0..=max_skip`.
    pub fn clamp_skip(&self, requested: usize) -> usize {
        requested.min(self.max_skip)
    }

    /// Clamps a requested sample size into `1..=MAX_SAMPLE_SIZE`.
    pub fn clamp_sample_size(&self, requested: usize) -> usize {
        requested.clamp(1, MAX_SAMPLE_SIZE)
    }

    /// The configured default deadline.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = BrowseConfig::from_toml_str("").unwrap();
        assert_eq!(config, BrowseConfig::default());
        assert_eq!(config.max_limit, 200);
        assert!(!config.allow_sampling);
        assert_eq!(config.request_timeout(), None);
    }

    #[test]
    fn overrides_are_applied() {
        let config = BrowseConfig::from_toml_str(
            "max_limit = 50\ndefault_limit = 20\ndefault_cursor_limit = 10\nallow_sampling = true\nrequest_timeout_ms = 250\n",
        )
        .unwrap();

        assert_eq!(config.max_limit, 50);
        assert_eq!(config.default_limit, 20);
        assert!(config.allow_sampling);
        assert_eq!(config.request_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn rejects_inconsistent_limits() {
        let err = BrowseConfig::from_toml_str("max_limit = 10\ndefault_limit = 20\ndefault_cursor_limit = 5")
            .unwrap_err();
        assert!(matches!(err, BrowseError::Config(_)));

        let err = BrowseConfig::from_toml_str("sample_size = 0").unwrap_err();
        assert!(matches!(err, BrowseError::Config(_)));

        let err = BrowseConfig::from_toml_str("unknown_key = 1").unwrap_err();
        assert!(matches!(err, BrowseError::Config(_)));
    }

    #[test]
    fn clamps_requests() {
        let config = BrowseConfig::default();
        assert_eq!(config.clamp_limit(10_000), 200);
        assert_eq!(config.clamp_limit(0), 1);
        assert_eq!(config.clamp_skip(1_000_000), 100_000);
        assert_eq!(config.clamp_sample_size(500), MAX_SAMPLE_SIZE);
    }
}
