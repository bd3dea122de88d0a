//! Driver configuration
//!
//! Everything the driver needs to know about the wiring of the board and the
//! output gadget lives in a single toml file. Missing fields fall back to the
//! TinyMod4 defaults so a half-written file still works.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const CONFIG_DIR: &str = "tinymod4";
const CONFIG_FILE: &str = "config.toml";
const CONFIG_ENV: &str = "TINYMOD4_CONFIG";

/// Top level configuration file layout.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct DriverConfig {
    pub scanner: ScannerConfig,
    pub output: OutputConfig,
    pub keymap: KeymapConfig,
}

/// Wiring and timing of the key scanner.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    /// BCM numbers of the directly wired switches, bit 0 first
    pub direct_pins: Vec<u8>,

    /// BCM number of the NKRO/keyboard mode switch
    pub mode_select_pin: u8,

    pub i2c_bus: u8,

    /// 7 bit address of the port expander
    pub expander_address: u16,

    /// Wait after the first key goes down before trusting the reading
    pub settle_delay_ms: u64,

    /// Sleep between idle polls, 0 keeps the busy wait
    pub idle_poll_us: u64,

    /// Wait between two connection attempts
    pub reconnect_interval_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            direct_pins: vec![16, 20, 21, 1, 26, 19, 13, 6, 0],
            mode_select_pin: 12,
            i2c_bus: 1,
            expander_address: 0x20,
            settle_delay_ms: 30,
            idle_poll_us: 0,
            reconnect_interval_ms: 500,
        }
    }
}

impl ScannerConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn idle_poll(&self) -> Option<Duration> {
        (self.idle_poll_us > 0).then(|| Duration::from_micros(self.idle_poll_us))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

/// HID gadget output settings.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub device_path: PathBuf,

    /// Attempts to open the device before a batch is dropped
    pub open_attempts: u32,

    pub open_retry_ms: u64,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            device_path: PathBuf::from("/dev/hidg0"),
            open_attempts: 3,
            open_retry_ms: 100,
        }
    }
}

impl OutputConfig {
    pub fn open_retry_delay(&self) -> Duration {
        Duration::from_millis(self.open_retry_ms)
    }
}

/// Physical key name to engine action. An empty table maps every key to
/// its own name.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct KeymapConfig {
    pub mappings: BTreeMap<String, String>,
}

impl DriverConfig {
    /// Checks values the hardware layer cannot cope with.
    pub fn validate(&self) -> Result<()> {
        let pins = self.scanner.direct_pins.len();
        if pins == 0 || pins > 16 {
            return Err(eyre!(
                "scanner.direct_pins must list between 1 and 16 pins, got {}",
                pins
            ));
        }
        if self.scanner.direct_pins.contains(&self.scanner.mode_select_pin) {
            return Err(eyre!(
                "Mode select pin {} is also listed as a key pin",
                self.scanner.mode_select_pin
            ));
        }
        if self.output.open_attempts == 0 {
            return Err(eyre!("output.open_attempts must be at least 1"));
        }
        Ok(())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: DriverConfig =
            toml::from_str(content).map_err(|e| eyre!("Failed to parse config file: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        debug!("Loading driver config from {}", path.display());
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
        Self::from_toml(&content)
    }

    /// Writes the default configuration if `path` does not exist yet.
    pub async fn ensure_default_config(path: &Path) -> Result<()> {
        if tokio::fs::try_exists(path)
            .await
            .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
        {
            return Ok(());
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
        }

        let content = toml::to_string_pretty(&DriverConfig::default())
            .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;
        tokio::fs::write(path, content)
            .await
            .map_err(|e| eyre!("Failed to write default config: {}", e))?;
        info!("Wrote default config to {}", path.display());
        Ok(())
    }
}

/// `$TINYMOD4_CONFIG`, or `<config dir>/tinymod4/config.toml`.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return PathBuf::from(path);
    }

    let base = dirs::config_dir().unwrap_or_else(|| {
        warn!("No config directory found, using the working directory");
        PathBuf::from(".")
    });
    base.join(CONFIG_DIR).join(CONFIG_FILE)
}
