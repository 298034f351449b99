// Copyright 2026 the HwCompat Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Adapter configuration.
//!
//! Loaded from TOML. Every field has a default, so an absent file or an empty
//! table yields a working configuration:
//!
//! ```toml
//! display_name = "panel-0"
//!
//! [vsync]
//! default_period_ns = 16666666
//! start_enabled = false
//!
//! [shutdown]
//! retire_timeout_ms = 1000
//!
//! [client_target]
//! require_for_client_layers = true
//! ```

use core::time::Duration;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Errors from loading an [`AdapterConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid TOML for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(&'static str),
}

/// Vsync settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VsyncConfig {
    /// Period used when the backend reports none, in nanoseconds.
    pub default_period_ns: u64,
    /// Whether callback delivery starts enabled.
    pub start_enabled: bool,
}

impl Default for VsyncConfig {
    fn default() -> Self {
        Self {
            default_period_ns: 1_000_000_000 / 60,
            start_enabled: false,
        }
    }
}

/// Shutdown settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Upper bound for waiting on the last retire fence, in milliseconds.
    pub retire_timeout_ms: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            retire_timeout_ms: 1000,
        }
    }
}

/// Client target settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientTargetConfig {
    /// Present fails when client-composed layers exist without a client
    /// target buffer.
    pub require_for_client_layers: bool,
}

impl Default for ClientTargetConfig {
    fn default() -> Self {
        Self {
            require_for_client_layers: true,
        }
    }
}

/// Top-level adapter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Name reported for the display.
    pub display_name: String,
    /// Vsync settings.
    pub vsync: VsyncConfig,
    /// Shutdown settings.
    pub shutdown: ShutdownConfig,
    /// Client target settings.
    pub client_target: ClientTargetConfig,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            display_name: String::from("hwcompat-0"),
            vsync: VsyncConfig::default(),
            shutdown: ShutdownConfig::default(),
            client_target: ClientTargetConfig::default(),
        }
    }
}

impl AdapterConfig {
    /// Loads and validates a config file; a missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed or
    /// validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            log::info!("no config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on parse or validation failure.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero vsync period.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vsync.default_period_ns == 0 {
            return Err(ConfigError::Invalid("vsync.default_period_ns must be non-zero"));
        }
        Ok(())
    }

    /// Returns the default vsync period.
    #[must_use]
    pub fn default_vsync_period(&self) -> Duration {
        Duration::from_nanos(self.vsync.default_period_ns)
    }

    /// Returns the shutdown drain timeout.
    #[must_use]
    pub fn retire_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown.retire_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{AdapterConfig, ConfigError};

    #[test]
    fn empty_text_yields_defaults() {
        let config = AdapterConfig::from_toml_str("").expect("empty config parses");
        assert_eq!(config, AdapterConfig::default());
        assert_eq!(config.vsync.default_period_ns, 16_666_666);
    }

    #[test]
    fn partial_tables_keep_other_defaults() {
        let config = AdapterConfig::from_toml_str(
            r#"
            display_name = "panel"
            [vsync]
            start_enabled = true
            "#,
        )
        .expect("config parses");
        assert_eq!(config.display_name, "panel");
        assert!(config.vsync.start_enabled, "overridden");
        assert_eq!(config.vsync.default_period_ns, 16_666_666, "kept default");
        assert_eq!(config.shutdown.retire_timeout_ms, 1000);
    }

    #[test]
    fn zero_period_is_rejected() {
        let err = AdapterConfig::from_toml_str("[vsync]\ndefault_period_ns = 0\n");
        assert!(matches!(err, Err(ConfigError::Invalid(_))), "zero period");
    }

    #[test]
    fn malformed_toml_is_a_parse_error() {
        let err = AdapterConfig::from_toml_str("display_name = [");
        assert!(matches!(err, Err(ConfigError::Parse(_))), "bad toml");
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config = AdapterConfig::load(Path::new("/nonexistent/hwcompat.toml")).expect("defaults");
        assert_eq!(config, AdapterConfig::default());
    }
}
