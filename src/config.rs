//! Configuration for the mock engine.
//!
//! Covers engine behaviour only. Mock definitions are registered through
//! the API or by an external loader.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Annotated default configuration, printed by `mockcore --print-config`.
pub const DEFAULT_CONFIG: &str = r#"# mockcore engine configuration

settings:
  # Log every request served by a mock
  log_matches: true
  # Log requests no mock matched
  log_unmatched: true
  # Status adapters answer with when no mock matched
  not_matched_status: 418

pipeline:
  # Buffered chunks per channel between two response stages
  channel_capacity: 1
"#;

/// Main configuration for a mock server instance.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,

    /// Response pipeline settings
    #[serde(default)]
    pub pipeline: PipelineSettings,
}

impl EngineConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.settings
            .validate()
            .map_err(|e| anyhow::anyhow!("settings: {}", e))?;
        self.pipeline
            .validate()
            .map_err(|e| anyhow::anyhow!("pipeline: {}", e))?;
        Ok(())
    }

    /// Render the configuration as YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log every matched request
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log requests no mock matched
    #[serde(default = "default_true")]
    pub log_unmatched: bool,

    /// Status code adapters answer with when no mock matched
    #[serde(default = "default_not_matched_status")]
    pub not_matched_status: u16,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_matches: true,
            log_unmatched: true,
            not_matched_status: default_not_matched_status(),
        }
    }
}

impl GlobalSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(100..=599).contains(&self.not_matched_status) {
            anyhow::bail!("Invalid status code: {}", self.not_matched_status);
        }
        Ok(())
    }
}

/// Response pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PipelineSettings {
    /// Buffered chunks per channel between two stages
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl PipelineSettings {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.channel_capacity == 0 {
            anyhow::bail!("channel_capacity must be at least 1");
        }
        Ok(())
    }
}

fn default_true() -> bool {
    true
}

fn default_not_matched_status() -> u16 {
    418
}

fn default_channel_capacity() -> usize {
    1
}
