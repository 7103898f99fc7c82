use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefenseConfig {
    #[serde(default)]
    pub detection: DetectionConfig,

    #[serde(default)]
    pub monitor: MonitorConfig,

    #[serde(default)]
    pub radio: RadioConfig,
}

/// Detection thresholds, tuned for real-world responsiveness
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Device-table cap; new transmitters are dropped once reached
    pub max_tracked_devices: usize,
    /// Beacons per second per MAC before the spam rule fires
    pub beacon_spam_threshold: f32,
    /// Deauths per second per MAC before the flood rule fires
    pub deauth_attack_threshold: f32,
    /// Probe requests per second per MAC before the flood rule fires
    pub probe_flood_threshold: f32,
    /// Risk score at which a device is marked malicious
    pub attack_detection_threshold: f32,
    /// Sliding-window length in milliseconds
    pub short_window_ms: u64,
    /// Minimum interval between analyzer passes in milliseconds
    pub min_analysis_interval_ms: u64,
    /// Devices unseen for longer than this are skipped by the analyzer
    /// and become eviction candidates when the table is full
    pub threat_timeout_ms: u64,
    /// Confidence gate for suspicious-network detections from the
    /// passive scan path
    pub portal_confidence_threshold: f32,
    /// Distinct SSIDs a device may answer probes for before the karma
    /// rule fires
    pub karma_ssid_threshold: usize,
    /// Bound on the advertised/responded SSID sets kept per device
    pub max_ssids_per_device: usize,
    /// Cap on the active-threats list; further detections are dropped
    pub max_active_threats: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            max_tracked_devices: 50,
            beacon_spam_threshold: 2.0,
            deauth_attack_threshold: 1.0,
            probe_flood_threshold: 5.0,
            attack_detection_threshold: 2.0,
            short_window_ms: 3000,
            min_analysis_interval_ms: 500,
            threat_timeout_ms: 30_000,
            portal_confidence_threshold: 0.75,
            karma_ssid_threshold: 4,
            max_ssids_per_device: 8,
            max_active_threats: 256,
        }
    }
}

/// Monitor loop pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Display refresh interval in milliseconds
    pub display_refresh_ms: u64,
    /// Sleep between loop iterations in milliseconds
    pub loop_delay_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            display_refresh_ms: 2000,
            loop_delay_ms: 100,
        }
    }
}

/// Radio/capture settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioConfig {
    /// Wireless interface to capture on
    pub interface: String,
    /// Capture buffer size in bytes
    pub buffer_size: usize,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            interface: "wlan0".to_string(),
            buffer_size: 65536,
        }
    }
}

impl DefenseConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: DefenseConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        Ok(config)
    }

    /// Load config from default locations or fall back to defaults
    pub fn load_or_default() -> Result<Self> {
        let paths = [
            PathBuf::from("/etc/airward/config.toml"),
            dirs_next::config_dir()
                .map(|p| p.join("airward/config.toml"))
                .unwrap_or_default(),
            PathBuf::from("airward.toml"),
        ];

        for path in &paths {
            if path.exists() {
                return Self::load(path);
            }
        }

        Ok(Self::default())
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;
        Ok(())
    }
}
