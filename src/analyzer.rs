//! Periodic Threat Analyzer
//!
//! One pass walks every tracked device, recomputes its risk score from
//! the sliding-window rates and promotes devices crossing the detection
//! threshold to the malicious set. Scores are stateless across passes;
//! only the malicious flag is sticky.

use tracing::{debug, warn};

use crate::config::DetectionConfig;
use crate::models::{DefenseStats, RecommendedAction, ThreatCategory, ThreatDetection};
use crate::tracker::{DeviceTable, TrackedDevice};

/// Rule weights
const W_BEACON_SPAM: f32 = 4.0;
const W_BEACON_ONSET: f32 = 3.0;
const W_DEAUTH_FLOOD: f32 = 5.0;
const W_PROBE_FLOOD: f32 = 4.0;
const W_MULTI_SSID: f32 = 3.0;
const W_KARMA: f32 = 3.0;
const W_HIGH_ACTIVITY: f32 = 2.0;
const W_BURST: f32 = 2.0;

/// Instantaneous and lifetime rates for one device at one instant
#[derive(Debug, Clone, Copy)]
struct DeviceRates {
    window_secs: f32,
    beacon: f32,
    probe: f32,
    deauth: f32,
    lifetime_beacon: f32,
}

fn rates(device: &TrackedDevice, now: u64) -> DeviceRates {
    let window_secs = (now.saturating_sub(device.window_start) as f32 / 1000.0).max(0.1);
    let total_secs = (now.saturating_sub(device.first_seen) as f32 / 1000.0).max(0.1);

    DeviceRates {
        window_secs,
        beacon: device.recent_beacons as f32 / window_secs,
        probe: device.recent_probes as f32 / window_secs,
        deauth: device.recent_deauths as f32 / window_secs,
        lifetime_beacon: device.beacon_count as f32 / total_secs,
    }
}

pub struct ThreatAnalyzer {
    config: DetectionConfig,
    /// Completion time of the previous pass; passes are rate-limited
    last_analysis_ms: Option<u64>,
    /// Devices promoted to malicious this session
    total_threats: u32,
}

impl ThreatAnalyzer {
    pub fn new(config: DetectionConfig) -> Self {
        Self {
            config,
            last_analysis_ms: None,
            total_threats: 0,
        }
    }

    /// Run one analysis pass.
    ///
    /// Returns the detections for devices newly promoted to malicious.
    /// Calls arriving sooner than the minimum analysis interval after
    /// the previous pass are no-ops.
    pub fn analyze(
        &mut self,
        table: &mut DeviceTable,
        stats: &mut DefenseStats,
        now: u64,
    ) -> Vec<ThreatDetection> {
        if let Some(last) = self.last_analysis_ms {
            if now.saturating_sub(last) < self.config.min_analysis_interval_ms {
                return Vec::new();
            }
        }
        self.last_analysis_ms = Some(now);

        let mut detections = Vec::new();

        for device in table.devices_mut() {
            device.risk_score = 0.0;
            device.suspected = ThreatCategory::Unknown;

            // Counters of devices gone quiet decay into irrelevance
            if now.saturating_sub(device.last_seen) > self.config.threat_timeout_ms {
                continue;
            }

            let r = rates(device, now);

            // Too little of the window has elapsed to derive a rate
            if r.window_secs < self.config.min_analysis_interval_ms as f32 / 1000.0 {
                continue;
            }

            self.score_device(device, r);

            if device.risk_score > 0.5 || device.recent_beacons > 5 {
                debug!(
                    "{}: b={:.1}/s p={:.1}/s d={:.1}/s window={:.1}s ssids={} risk={:.1}",
                    device.mac,
                    r.beacon,
                    r.probe,
                    r.deauth,
                    r.window_secs,
                    device.advertised_ssids.len(),
                    device.risk_score
                );
            }

            if device.risk_score >= self.config.attack_detection_threshold
                && !device.marked_malicious
            {
                device.marked_malicious = true;
                self.total_threats += 1;
                stats.threats_detected += 1;

                let detection = ThreatDetection {
                    source_mac: device.mac,
                    category: device.suspected,
                    confidence: (device.risk_score / 10.0).min(1.0),
                    detected_at: now,
                    description: format!(
                        "{} from {} (risk {:.1})",
                        device.suspected, device.mac, device.risk_score
                    ),
                    recommended_action: RecommendedAction::Alert,
                    active: true,
                };

                warn!("threat detected: {}", detection.description);
                detections.push(detection);
            }
        }

        table.roll_windows(now);

        detections
    }

    /// Apply the scoring rules in order. The heavy single-indicator
    /// rules assign the category unconditionally; the rest only tag a
    /// device still categorized as unknown.
    fn score_device(&self, device: &mut TrackedDevice, r: DeviceRates) {
        let cfg = &self.config;

        // 1: sustained beacon rate above the spam threshold
        if r.beacon > cfg.beacon_spam_threshold {
            device.risk_score += W_BEACON_SPAM;
            device.suspected = ThreatCategory::BeaconSpam;
        }

        // 2: beacon rate climbing well past the lifetime baseline
        if r.beacon > r.lifetime_beacon * 2.0 && r.beacon > 1.5 {
            device.risk_score += W_BEACON_ONSET;
            if device.suspected == ThreatCategory::Unknown {
                device.suspected = ThreatCategory::BeaconSpam;
            }
        }

        // 3: deauth flood
        if r.deauth > cfg.deauth_attack_threshold {
            device.risk_score += W_DEAUTH_FLOOD;
            device.suspected = ThreatCategory::DeauthFlood;
        }

        // 4: probe request flood
        if r.probe > cfg.probe_flood_threshold {
            device.risk_score += W_PROBE_FLOOD;
            device.suspected = ThreatCategory::ProbeFlood;
        }

        // 5: one transmitter advertising several networks
        if device.advertised_ssids.len() > 2 {
            device.risk_score += W_MULTI_SSID;
            if device.suspected == ThreatCategory::Unknown {
                device.suspected = ThreatCategory::EvilTwin;
            }
        }

        // 5b: answering probes for many distinct SSIDs
        if device.responded_ssids.len() > cfg.karma_ssid_threshold {
            device.risk_score += W_KARMA;
            if device.suspected == ThreatCategory::Unknown {
                device.suspected = ThreatCategory::Karma;
            }
        }

        // 6: very high activity of any kind
        if r.beacon > 10.0 || r.probe > 8.0 || device.recent_beacons > 20 {
            device.risk_score += W_HIGH_ACTIVITY;
        }

        // 7: burst pattern
        if device.recent_total() > 15 {
            device.risk_score += W_BURST;
        }
    }

    pub fn total_threats(&self) -> u32 {
        self.total_threats
    }

    /// Forget per-session analyzer state (pass timer, threat counter)
    pub fn reset(&mut self) {
        self.last_analysis_ms = None;
        self.total_threats = 0;
    }
}
