//! Persistent CLI configuration
//!
//! Stored as TOML under the user config directory. Missing files and missing
//! keys fall back to defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use kinect_driver::{MonitorConfig, MonitorFilter, VirtualConfig};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KinectConfig {
    /// Device index used when `--device` is not given
    #[serde(default)]
    pub device: usize,
    /// tracing filter used when neither RUST_LOG nor `--log-level` is set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Number of simulated sensors
    #[serde(default = "default_virtual_devices")]
    pub virtual_devices: usize,
    /// Delay between simulated frames
    #[serde(default = "default_frame_interval_ms")]
    pub frame_interval_ms: u64,
    /// Frames buffered per async subscriber
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
    /// Log driver calls of this category ("all", "lifecycle", "streams", "actuators")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub monitor: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_virtual_devices() -> usize {
    1
}
fn default_frame_interval_ms() -> u64 {
    33
}
fn default_event_capacity() -> usize {
    16
}

impl Default for KinectConfig {
    fn default() -> Self {
        Self {
            device: 0,
            log_level: default_log_level(),
            virtual_devices: default_virtual_devices(),
            frame_interval_ms: default_frame_interval_ms(),
            event_capacity: default_event_capacity(),
            monitor: None,
        }
    }
}

impl KinectConfig {
    /// Get the default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kinect")
            .join("kinect.toml")
    }

    /// Load config from a file, or return default if not found
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to a file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn virtual_config(&self) -> VirtualConfig {
        VirtualConfig::default()
            .with_device_count(self.virtual_devices)
            .with_frame_interval(Duration::from_millis(self.frame_interval_ms))
    }

    /// Monitor settings, if call logging is enabled
    pub fn monitor_config(&self) -> anyhow::Result<Option<MonitorConfig>> {
        let Some(filter) = &self.monitor else {
            return Ok(None);
        };
        let filter: MonitorFilter = filter.parse().map_err(anyhow::Error::msg)?;
        Ok(Some(MonitorConfig::default().with_filter(filter)))
    }
}
