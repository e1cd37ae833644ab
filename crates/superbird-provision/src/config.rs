//! Tool configuration stored as JSON in the platform config directory

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::env::DEFAULT_REGION_SIZE;
use crate::env_workflow::DEFAULT_SETTLE_INTERVAL;
use crate::images::BundledImages;
use crate::mode::DEFAULT_TRANSITION_WAIT;

const SCHEMA_VERSION: &str = "superbird.config/1";

/// USB transfer speed requested from the helper
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BurnSpeed {
    /// Full speed
    #[default]
    Normal,
    /// Reduced speed for flaky cables or hubs
    Slow,
    /// Lowest speed
    Slower,
}

impl std::fmt::Display for BurnSpeed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BurnSpeed::Normal => write!(f, "normal"),
            BurnSpeed::Slow => write!(f, "slow"),
            BurnSpeed::Slower => write!(f, "slower"),
        }
    }
}

/// External USB helper program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelperConfig {
    /// Program name or path
    pub program: PathBuf,
    /// Transfer speed passed as `--speed`
    pub speed: BurnSpeed,
}

impl Default for HelperConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("superbird-usb"),
            speed: BurnSpeed::Normal,
        }
    }
}

/// Complete tool configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Schema version for migration
    pub schema_version: String,
    /// USB helper settings
    pub helper: HelperConfig,
    /// Directory holding the bundled images
    pub images_dir: PathBuf,
    /// Size of the environment region covered by its CRC
    pub env_region_size: usize,
    /// Delay around the environment erase, in milliseconds
    pub settle_interval_ms: u64,
    /// Wait after staging the secondary loader, in milliseconds
    pub transition_wait_ms: u64,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            helper: HelperConfig::default(),
            images_dir: PathBuf::from("images"),
            env_region_size: DEFAULT_REGION_SIZE,
            settle_interval_ms: duration_ms(DEFAULT_SETTLE_INTERVAL),
            transition_wait_ms: duration_ms(DEFAULT_TRANSITION_WAIT),
        }
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl ToolConfig {
    /// Load configuration from the default location
    pub async fn load() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::load_from_path(&config_path).await
    }

    /// Load configuration from a specific path, creating it with defaults when missing
    pub async fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            info!("Config file not found at {:?}, creating default", path);
            let config = Self::default();
            config.save_to_path(path).await?;
            return Ok(config);
        }
        Self::read_from_path(path).await
    }

    /// Read configuration from the default location without creating it
    pub async fn read() -> Result<Self> {
        let config_path = Self::default_config_path()?;
        Self::read_from_path(&config_path).await
    }

    /// Read configuration from a specific path, using defaults when missing
    ///
    /// Never writes to disk.
    pub async fn read_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        let config: ToolConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        config
            .validate()
            .with_context(|| format!("Invalid config file: {:?}", path))?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a specific path
    pub async fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create config directory")?;
        }

        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;

        tokio::fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Default configuration file path
    pub fn default_config_path() -> Result<PathBuf> {
        let base = dirs::config_dir().context("No platform configuration directory")?;
        Ok(base.join("superbird").join("config.json"))
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            anyhow::bail!("Unsupported config schema version: {}", self.schema_version);
        }
        if self.helper.program.as_os_str().is_empty() {
            anyhow::bail!("Helper program must not be empty");
        }
        // CRC plus the end marker
        if self.env_region_size < 6 {
            anyhow::bail!("Invalid environment region size: {}", self.env_region_size);
        }
        if self.settle_interval_ms == 0 || self.settle_interval_ms > 60_000 {
            anyhow::bail!("Invalid settle interval: {} ms", self.settle_interval_ms);
        }
        if self.transition_wait_ms == 0 || self.transition_wait_ms > 120_000 {
            anyhow::bail!("Invalid transition wait: {} ms", self.transition_wait_ms);
        }
        Ok(())
    }

    /// Bundled images described by this configuration
    pub fn images(&self) -> BundledImages {
        BundledImages::new(&self.images_dir)
    }

    /// Settle interval as a [`Duration`]
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_interval_ms)
    }

    /// Transition wait as a [`Duration`]
    pub fn transition_wait(&self) -> Duration {
        Duration::from_millis(self.transition_wait_ms)
    }
}
