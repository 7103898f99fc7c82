use serde::{Deserialize, Serialize};

use crate::ieee80211::MacAddr;

/// Suspected threat category for a tracked device or emitted detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreatCategory {
    Unknown,
    BeaconSpam,
    EvilTwin,
    Karma,
    DeauthFlood,
    ProbeFlood,
    CaptivePortal,
    RogueAp,
}

impl std::fmt::Display for ThreatCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ThreatCategory::Unknown => write!(f, "unknown"),
            ThreatCategory::BeaconSpam => write!(f, "beacon spam"),
            ThreatCategory::EvilTwin => write!(f, "evil twin"),
            ThreatCategory::Karma => write!(f, "karma attack"),
            ThreatCategory::DeauthFlood => write!(f, "deauth flood"),
            ThreatCategory::ProbeFlood => write!(f, "probe flood"),
            ThreatCategory::CaptivePortal => write!(f, "captive portal"),
            ThreatCategory::RogueAp => write!(f, "rogue AP"),
        }
    }
}

/// What the engine recommends the operator do about a detection.
/// The engine itself stays passive; these are advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecommendedAction {
    Monitor,
    Alert,
    Isolate,
    Counter,
    Report,
}

impl std::fmt::Display for RecommendedAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecommendedAction::Monitor => write!(f, "monitor"),
            RecommendedAction::Alert => write!(f, "alert"),
            RecommendedAction::Isolate => write!(f, "isolate"),
            RecommendedAction::Counter => write!(f, "counter"),
            RecommendedAction::Report => write!(f, "report"),
        }
    }
}

/// An emitted alert. Append-only within a session and never mutated after
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThreatDetection {
    pub source_mac: MacAddr,
    pub category: ThreatCategory,
    /// Confidence in [0, 1]
    pub confidence: f32,
    /// Monotonic milliseconds at detection time
    pub detected_at: u64,
    pub description: String,
    pub recommended_action: RecommendedAction,
    pub active: bool,
}

/// Process-wide aggregate statistics for the current session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefenseStats {
    pub threats_detected: u32,
    pub threats_blocked: u32,
    /// Time spent in the monitor loop (milliseconds)
    pub active_monitor_time_ms: u64,
    pub networks_scanned: u32,
    /// Monotonic milliseconds of the last stats update
    pub last_update_ms: u64,
}

/// End-of-session summary handed to the display adapter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionReport {
    pub devices_tracked: usize,
    pub threats_detected: u32,
    pub beacon_spam: u32,
    pub evil_twins: u32,
    pub deauth_floods: u32,
    pub probe_floods: u32,
    pub karma_attacks: u32,
    pub other_threats: u32,
    pub stats: DefenseStats,
}
