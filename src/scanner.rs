//! Passive Scan Analyzer
//!
//! On-demand analysis of a blocking access-point scan. Low-confidence
//! detectors only: open networks named like portal bait, the same SSID
//! served from several BSSIDs, and payment-fraud SSID signatures.

use std::collections::HashMap;

use tracing::{debug, info};

use crate::config::DetectionConfig;
use crate::ieee80211::MacAddr;
use crate::models::{DefenseStats, RecommendedAction, ThreatCategory, ThreatDetection};
use crate::radio::ScannedNetwork;

/// SSID substrings typical of rogue open networks
const ROGUE_SSID_PATTERNS: &[&str] = &[
    "free", "wifi", "internet", "guest", "public", "open", "hotspot",
];

/// SSID substrings typical of payment-fraud access points
const SKIMMER_SSID_PATTERNS: &[&str] = &[
    "atm", "visa", "mastercard", "paypal", "bank", "credit", "payment", "pos", "terminal",
];

/// Signal this strong usually means the transmitter is within arm's reach
const STRONG_SIGNAL_DBM: i32 = -35;

/// Confidence assigned to a rogue-pattern match
const ROGUE_PATTERN_CONFIDENCE: f32 = 0.6;

/// Confidence assigned to each member of a duplicated SSID group
const EVIL_TWIN_CONFIDENCE: f32 = 0.7;

pub struct ScanAnalyzer {
    config: DetectionConfig,
}

impl ScanAnalyzer {
    pub fn new(config: DetectionConfig) -> Self {
        Self { config }
    }

    /// Analyze one scan result set. Every returned detection is
    /// low-confidence by construction; the caller appends them to the
    /// active-threats list.
    pub fn analyze(
        &self,
        networks: &[ScannedNetwork],
        stats: &mut DefenseStats,
        now: u64,
    ) -> Vec<ThreatDetection> {
        stats.networks_scanned += networks.len() as u32;
        info!("passive scan returned {} networks", networks.len());

        let mut detections = Vec::new();

        self.detect_rogue_patterns(networks, now, &mut detections);
        self.detect_evil_twins(networks, now, &mut detections);
        self.detect_suspicious_networks(networks, now, &mut detections);

        detections
    }

    /// Open networks whose name matches common portal bait
    fn detect_rogue_patterns(
        &self,
        networks: &[ScannedNetwork],
        now: u64,
        out: &mut Vec<ThreatDetection>,
    ) {
        for net in networks {
            if !net.is_open {
                continue;
            }

            let lower = net.ssid.to_lowercase();
            if ROGUE_SSID_PATTERNS.iter().any(|p| lower.contains(p)) {
                debug!("rogue AP pattern: {} ({})", net.ssid, net.bssid);
                out.push(ThreatDetection {
                    source_mac: net.bssid,
                    category: ThreatCategory::RogueAp,
                    confidence: ROGUE_PATTERN_CONFIDENCE,
                    detected_at: now,
                    description: format!("rogue AP pattern: {}", net.ssid),
                    recommended_action: RecommendedAction::Alert,
                    active: true,
                });
            }
        }
    }

    /// The same SSID served by more than one BSSID. Hidden networks are
    /// skipped; every hidden AP would otherwise pair with every other.
    fn detect_evil_twins(
        &self,
        networks: &[ScannedNetwork],
        now: u64,
        out: &mut Vec<ThreatDetection>,
    ) {
        let mut by_ssid: HashMap<&str, Vec<MacAddr>> = HashMap::new();
        for net in networks {
            if net.ssid.is_empty() {
                continue;
            }
            // BSSIDs are copied by value; scan buffers are not retained
            by_ssid.entry(net.ssid.as_str()).or_default().push(net.bssid);
        }

        for (ssid, bssids) in by_ssid {
            if bssids.len() <= 1 {
                continue;
            }

            debug!("{} access points advertise SSID {:?}", bssids.len(), ssid);
            for bssid in bssids.iter() {
                out.push(ThreatDetection {
                    source_mac: *bssid,
                    category: ThreatCategory::EvilTwin,
                    confidence: EVIL_TWIN_CONFIDENCE,
                    detected_at: now,
                    description: format!("possible evil twin: {}", ssid),
                    recommended_action: RecommendedAction::Alert,
                    active: true,
                });
            }
        }
    }

    /// Score each network on several weak indicators and report those
    /// crossing the portal confidence gate.
    fn detect_suspicious_networks(
        &self,
        networks: &[ScannedNetwork],
        now: u64,
        out: &mut Vec<ThreatDetection>,
    ) {
        for net in networks {
            let confidence = suspicion_score(net);
            if confidence <= self.config.portal_confidence_threshold {
                continue;
            }

            debug!(
                "suspicious network: {} ({}) confidence {:.2}",
                net.ssid, net.bssid, confidence
            );
            out.push(ThreatDetection {
                source_mac: net.bssid,
                category: ThreatCategory::CaptivePortal,
                confidence,
                detected_at: now,
                description: format!("suspicious network: {}", net.ssid),
                recommended_action: RecommendedAction::Report,
                active: true,
            });
        }
    }
}

/// Weak-indicator score for a scanned network, clamped to [0, 1]
fn suspicion_score(net: &ScannedNetwork) -> f32 {
    let lower = net.ssid.to_lowercase();
    let mut score: f32 = 0.0;

    if net.is_open {
        score += 0.4;
    }
    if SKIMMER_SSID_PATTERNS.iter().any(|p| lower.contains(p)) {
        score += 0.4;
    }
    if ROGUE_SSID_PATTERNS.iter().any(|p| lower.contains(p)) {
        score += 0.2;
    }
    if net.rssi >= STRONG_SIGNAL_DBM {
        score += 0.2;
    }

    score.min(1.0)
}
