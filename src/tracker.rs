//! Device Tracking Table
//!
//! Bounded table of observed transmitters with lifetime and
//! sliding-window counters. Mutated by the capture path on every
//! management frame and read/written by the analyzer; the owner is
//! responsible for serializing access (see `monitor`).

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::config::DetectionConfig;
use crate::ieee80211::{FrameKind, MacAddr};
use crate::models::ThreatCategory;

/// One tracked transmitter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedDevice {
    pub mac: MacAddr,
    /// Monotonic milliseconds of first and most recent observation
    pub first_seen: u64,
    pub last_seen: u64,
    /// Lifetime counters, never reset within a session
    pub beacon_count: u32,
    pub probe_count: u32,
    pub deauth_count: u32,
    /// Counters for the current sliding window
    pub recent_beacons: u32,
    pub recent_probes: u32,
    pub recent_deauths: u32,
    /// Start of the current sliding window
    pub window_start: u64,
    /// SSIDs this device has advertised in beacons
    pub advertised_ssids: BTreeSet<String>,
    /// SSIDs this device has answered probe requests for
    pub responded_ssids: BTreeSet<String>,
    pub suspected: ThreatCategory,
    pub risk_score: f32,
    /// Sticky once set; never cleared within a session
    pub marked_malicious: bool,
}

impl TrackedDevice {
    fn new(mac: MacAddr, now: u64) -> Self {
        Self {
            mac,
            first_seen: now,
            last_seen: now,
            beacon_count: 0,
            probe_count: 0,
            deauth_count: 0,
            recent_beacons: 0,
            recent_probes: 0,
            recent_deauths: 0,
            window_start: now,
            advertised_ssids: BTreeSet::new(),
            responded_ssids: BTreeSet::new(),
            suspected: ThreatCategory::Unknown,
            risk_score: 0.0,
            marked_malicious: false,
        }
    }

    /// Zero the window counters and restart the window at `now` if the
    /// current window has run past `window_ms`.
    pub fn roll_window_if_expired(&mut self, now: u64, window_ms: u64) {
        if now.saturating_sub(self.window_start) > window_ms {
            self.recent_beacons = 0;
            self.recent_probes = 0;
            self.recent_deauths = 0;
            self.window_start = now;
        }
    }

    /// Window and lifetime activity combined, for burst checks
    pub fn recent_total(&self) -> u32 {
        self.recent_beacons + self.recent_probes + self.recent_deauths
    }
}

/// Bounded device table keyed by transmitter MAC
#[derive(Debug)]
pub struct DeviceTable {
    devices: HashMap<MacAddr, TrackedDevice>,
    capacity: usize,
    window_ms: u64,
    stale_ttl_ms: u64,
    max_ssids: usize,
    /// Frames dropped because the table was full
    dropped_frames: u64,
}

impl DeviceTable {
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            devices: HashMap::with_capacity(config.max_tracked_devices),
            capacity: config.max_tracked_devices,
            window_ms: config.short_window_ms,
            stale_ttl_ms: config.threat_timeout_ms,
            max_ssids: config.max_ssids_per_device,
            dropped_frames: 0,
        }
    }

    /// Record one demultiplexed frame.
    ///
    /// Finds or creates the entry for `mac`; when the table is full a
    /// single stale entry may be evicted to make room, otherwise the
    /// frame is dropped and only the drop counter changes.
    pub fn observe(&mut self, mac: MacAddr, kind: FrameKind, ssid: Option<&str>, now: u64) {
        if !self.devices.contains_key(&mac) {
            if self.devices.len() >= self.capacity && !self.evict_one_stale(now) {
                self.dropped_frames += 1;
                trace!("device table full, dropping frame from {}", mac);
                return;
            }
            self.devices.insert(mac, TrackedDevice::new(mac, now));
        }

        let max_ssids = self.max_ssids;
        let window_ms = self.window_ms;
        let device = match self.devices.get_mut(&mac) {
            Some(device) => device,
            None => return,
        };

        device.last_seen = now;
        device.roll_window_if_expired(now, window_ms);

        match kind {
            FrameKind::Beacon => {
                device.beacon_count += 1;
                device.recent_beacons += 1;
                if let Some(ssid) = ssid {
                    bounded_insert(&mut device.advertised_ssids, ssid, max_ssids);
                }
            }
            FrameKind::ProbeRequest => {
                device.probe_count += 1;
                device.recent_probes += 1;
            }
            FrameKind::ProbeResponse => {
                // No dedicated counter; the answered SSID set feeds the
                // karma rule.
                if let Some(ssid) = ssid {
                    bounded_insert(&mut device.responded_ssids, ssid, max_ssids);
                }
            }
            FrameKind::Deauth => {
                device.deauth_count += 1;
                device.recent_deauths += 1;
            }
            FrameKind::Other => {}
        }
    }

    /// Post-analysis window rollover across the whole table
    pub fn roll_windows(&mut self, now: u64) {
        for device in self.devices.values_mut() {
            device.roll_window_if_expired(now, self.window_ms);
        }
    }

    /// Remove one entry not seen within the stale TTL. Returns whether a
    /// slot was freed.
    fn evict_one_stale(&mut self, now: u64) -> bool {
        let stale = self
            .devices
            .values()
            .find(|d| now.saturating_sub(d.last_seen) > self.stale_ttl_ms)
            .map(|d| d.mac);

        match stale {
            Some(mac) => {
                self.devices.remove(&mac);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, mac: &MacAddr) -> Option<&TrackedDevice> {
        self.devices.get(mac)
    }

    /// Read-only iteration for the analyzer and display paths
    pub fn devices(&self) -> impl Iterator<Item = &TrackedDevice> {
        self.devices.values()
    }

    pub fn devices_mut(&mut self) -> impl Iterator<Item = &mut TrackedDevice> {
        self.devices.values_mut()
    }

    /// Clone of the current table contents for diagnostic display,
    /// most-recently-seen first
    pub fn snapshot(&self) -> Vec<TrackedDevice> {
        let mut devices: Vec<TrackedDevice> = self.devices.values().cloned().collect();
        devices.sort_by(|a, b| b.last_seen.cmp(&a.last_seen));
        devices
    }

    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    pub fn clear(&mut self) {
        self.devices.clear();
        self.dropped_frames = 0;
    }
}

fn bounded_insert(set: &mut BTreeSet<String>, ssid: &str, max: usize) {
    if set.len() < max || set.contains(ssid) {
        set.insert(ssid.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> DeviceTable {
        DeviceTable::new(&DetectionConfig::default())
    }

    fn mac(last: u8) -> MacAddr {
        MacAddr::new([0x02, 0x00, 0x00, 0x00, 0x00, last])
    }

    #[test]
    fn test_observe_creates_device() {
        let mut t = table();
        t.observe(mac(1), FrameKind::Beacon, Some("Net"), 1000);

        let d = t.get(&mac(1)).unwrap();
        assert_eq!(d.first_seen, 1000);
        assert_eq!(d.last_seen, 1000);
        assert_eq!(d.window_start, 1000);
        assert_eq!(d.beacon_count, 1);
        assert_eq!(d.recent_beacons, 1);
        assert!(d.advertised_ssids.contains("Net"));
        assert_eq!(d.suspected, ThreatCategory::Unknown);
        assert!(!d.marked_malicious);
    }

    #[test]
    fn test_counters_track_frame_kinds() {
        let mut t = table();
        let m = mac(2);
        t.observe(m, FrameKind::Beacon, None, 100);
        t.observe(m, FrameKind::ProbeRequest, None, 200);
        t.observe(m, FrameKind::ProbeRequest, None, 300);
        t.observe(m, FrameKind::Deauth, None, 400);
        t.observe(m, FrameKind::Other, None, 500);

        let d = t.get(&m).unwrap();
        assert_eq!(d.beacon_count, 1);
        assert_eq!(d.probe_count, 2);
        assert_eq!(d.deauth_count, 1);
        assert_eq!(d.recent_total(), 4);
        assert_eq!(d.last_seen, 500);
    }

    #[test]
    fn test_invariants_hold_under_traffic() {
        let mut t = table();
        let m = mac(3);
        for i in 0..100u64 {
            let kind = match i % 3 {
                0 => FrameKind::Beacon,
                1 => FrameKind::ProbeRequest,
                _ => FrameKind::Deauth,
            };
            t.observe(m, kind, None, i * 137);

            let d = t.get(&m).unwrap();
            assert!(d.first_seen <= d.last_seen);
            assert!(d.recent_beacons <= d.beacon_count);
            assert!(d.recent_probes <= d.probe_count);
            assert!(d.recent_deauths <= d.deauth_count);
            assert!(d.risk_score >= 0.0);
        }
    }

    #[test]
    fn test_window_rolls_over_on_observe() {
        let mut t = table();
        let m = mac(4);
        t.observe(m, FrameKind::Beacon, None, 0);
        // Second beacon lands after the 3000 ms window has expired
        t.observe(m, FrameKind::Beacon, None, 3500);

        let d = t.get(&m).unwrap();
        assert_eq!(d.beacon_count, 2);
        assert_eq!(d.recent_beacons, 1);
        assert_eq!(d.window_start, 3500);
    }

    #[test]
    fn test_roll_windows_resets_expired_only() {
        let mut t = table();
        t.observe(mac(5), FrameKind::Beacon, None, 0);
        t.observe(mac(6), FrameKind::Beacon, None, 2500);

        t.roll_windows(3200);

        let old = t.get(&mac(5)).unwrap();
        assert_eq!(old.recent_beacons, 0);
        assert_eq!(old.window_start, 3200);

        let fresh = t.get(&mac(6)).unwrap();
        assert_eq!(fresh.recent_beacons, 1);
        assert_eq!(fresh.window_start, 2500);
    }

    #[test]
    fn test_table_saturation_drops_new_macs() {
        let mut t = table();
        for i in 0..60u8 {
            t.observe(mac(i), FrameKind::Beacon, None, 1000);
        }

        assert_eq!(t.len(), 50);
        assert_eq!(t.dropped_frames(), 10);
        // Existing entries continue to update
        t.observe(mac(0), FrameKind::Beacon, None, 1100);
        assert_eq!(t.get(&mac(0)).unwrap().beacon_count, 2);
        assert_eq!(t.len(), 50);
    }

    #[test]
    fn test_stale_entry_evicted_under_pressure() {
        let mut t = table();
        t.observe(mac(0), FrameKind::Beacon, None, 0);
        for i in 1..50u8 {
            t.observe(mac(i), FrameKind::Beacon, None, 40_000);
        }
        assert_eq!(t.len(), 50);

        // mac(0) is 40 s stale; the newcomer takes its slot
        t.observe(mac(200), FrameKind::Beacon, None, 40_000);
        assert_eq!(t.len(), 50);
        assert!(t.get(&mac(0)).is_none());
        assert!(t.get(&mac(200)).is_some());
        assert_eq!(t.dropped_frames(), 0);
    }

    #[test]
    fn test_ssid_set_is_bounded() {
        let mut t = table();
        let m = mac(7);
        for i in 0..20 {
            t.observe(m, FrameKind::Beacon, Some(&format!("net-{i}")), 100 + i);
        }
        assert_eq!(t.get(&m).unwrap().advertised_ssids.len(), 8);
        // Duplicates never count against the bound
        t.observe(m, FrameKind::Beacon, Some("net-0"), 500);
        assert_eq!(t.get(&m).unwrap().advertised_ssids.len(), 8);
    }

    #[test]
    fn test_probe_response_records_ssid_without_counting() {
        let mut t = table();
        let m = mac(8);
        t.observe(m, FrameKind::ProbeResponse, Some("Victim"), 100);

        let d = t.get(&m).unwrap();
        assert_eq!(d.beacon_count, 0);
        assert_eq!(d.probe_count, 0);
        assert_eq!(d.recent_total(), 0);
        assert!(d.responded_ssids.contains("Victim"));
    }

    #[test]
    fn test_snapshot_orders_by_recency() {
        let mut t = table();
        t.observe(mac(1), FrameKind::Beacon, None, 100);
        t.observe(mac(2), FrameKind::Beacon, None, 300);
        t.observe(mac(3), FrameKind::Beacon, None, 200);

        let snap = t.snapshot();
        assert_eq!(snap[0].mac, mac(2));
        assert_eq!(snap[1].mac, mac(3));
        assert_eq!(snap[2].mac, mac(1));
    }

    #[test]
    fn test_clear_resets_session() {
        let mut t = table();
        t.observe(mac(1), FrameKind::Beacon, None, 100);
        t.clear();
        assert!(t.is_empty());
        assert_eq!(t.dropped_frames(), 0);
    }
}
