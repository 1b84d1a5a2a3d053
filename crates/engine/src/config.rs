use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

use conveyor_core::parse_duration;
use exec::steps::{PatternRetryPolicy, DEFAULT_RETRIABLE_PATTERNS};

use crate::error::{EngineError, Result};

/// Engine settings, usually read from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Scrub resolved credentials from build output
    #[serde(default = "default_enable_redaction")]
    pub enable_redaction: bool,
    /// Error messages matching any of these re-run the whole build
    #[serde(default = "default_retriable_patterns")]
    pub retriable_patterns: Vec<String>,
    /// Upper bound on runs of one build, including the first
    #[serde(default = "default_max_build_attempts")]
    pub max_build_attempts: u32,
    /// How long `ensure` hooks may run once a build has been aborted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensure_timeout: Option<String>,
}

fn default_enable_redaction() -> bool {
    true
}

fn default_retriable_patterns() -> Vec<String> {
    DEFAULT_RETRIABLE_PATTERNS
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_max_build_attempts() -> u32 {
    3
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enable_redaction: default_enable_redaction(),
            retriable_patterns: default_retriable_patterns(),
            max_build_attempts: default_max_build_attempts(),
            ensure_timeout: None,
        }
    }
}

impl EngineConfig {
    /// Read config from a JSON file, falling back to defaults
    pub async fn read(config_path: &Path) -> Self {
        if !config_path.exists() {
            debug!(path = %config_path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(config_path).await {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    debug!(path = %config_path.display(), "Config loaded successfully");
                    config
                }
                Err(e) => {
                    warn!(path = %config_path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %config_path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    /// Write config as pretty JSON, creating parent directories
    pub async fn write(&self, config_path: &Path) -> std::io::Result<()> {
        if let Some(dir) = config_path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                fs::create_dir_all(dir).await?;
            }
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        fs::write(config_path, content).await?;
        debug!(path = %config_path.display(), "Config saved successfully");

        Ok(())
    }

    pub fn retry_policy(&self) -> Result<PatternRetryPolicy> {
        PatternRetryPolicy::new(&self.retriable_patterns)
            .map_err(|e| EngineError::Config(format!("invalid retriable pattern: {}", e)))
    }

    pub fn ensure_timeout(&self) -> Result<Option<Duration>> {
        self.ensure_timeout
            .as_deref()
            .map(parse_duration)
            .transpose()
            .map_err(|e| EngineError::Config(format!("invalid ensure_timeout: {}", e)))
    }

    /// Number of runs a build gets, never less than one
    pub fn build_attempts(&self) -> u32 {
        self.max_build_attempts.max(1)
    }
}
