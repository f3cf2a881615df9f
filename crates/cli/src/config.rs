//! CLI configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use usbio::ExchangeSettings;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub device: DeviceSettings,
    /// Timeouts and retry budget for each exchange
    #[serde(default)]
    pub exchange: ExchangeSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Reset the device before opening it
    #[serde(default)]
    pub reset_on_init: bool,
    /// Reset instead of closing on exit; a closed device stays unresponsive
    /// until it is reset or re-plugged
    #[serde(default = "DeviceSettings::default_reset_on_close")]
    pub reset_on_close: bool,
}

impl DeviceSettings {
    fn default_reset_on_close() -> bool {
        true
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            reset_on_init: false,
            reset_on_close: Self::default_reset_on_close(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "LoggingSettings::default_level")]
    pub log_level: String,
}

impl LoggingSettings {
    fn default_level() -> String {
        "warn".to_string()
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            log_level: Self::default_level(),
        }
    }
}

impl CliConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            // Try standard locations in order
            let candidates = vec![Self::default_path(), PathBuf::from("/etc/usbio/usbio.toml")];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: CliConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usbio").join("usbio.toml")
        } else {
            PathBuf::from(".config/usbio/usbio.toml")
        }
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.logging.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.exchange.response_attempts == 0 {
            return Err(anyhow!("exchange.response_attempts must be at least 1"));
        }

        if self.exchange.write_timeout_ms == 0 || self.exchange.read_timeout_ms == 0 {
            return Err(anyhow!("exchange timeouts must be greater than 0"));
        }

        Ok(())
    }
}

/// Load configuration from a path that may start with `~`
pub fn load_config(path: &str) -> Result<CliConfig> {
    let path_buf = PathBuf::from(shellexpand::tilde(path).as_ref());
    CliConfig::load(Some(path_buf))
}
