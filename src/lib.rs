//! Passive 802.11 threat detection engine.
//!
//! Observes management frames in promiscuous mode, attributes them to
//! transmitters, keeps per-station sliding-window rate statistics and
//! runs a rule-based analyzer that promotes misbehaving stations to a
//! malicious set. Strictly passive: the engine never transmits.

pub mod analyzer;
pub mod config;
pub mod error;
pub mod ieee80211;
pub mod models;
pub mod monitor;
pub mod radio;
pub mod scanner;
pub mod tracker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use analyzer::ThreatAnalyzer;
use config::DefenseConfig;
use error::Result;
use models::{DefenseStats, SessionReport, ThreatCategory, ThreatDetection};
use monitor::{Clock, DisplaySink, InputSource, MonitorView, MonotonicClock, SessionState, StopHandle};
use radio::{FrameConsumer, Radio};
use scanner::ScanAnalyzer;
use tracker::TrackedDevice;

/// Core defense system instance owning one session's state
pub struct DefenseSystem {
    config: DefenseConfig,
    state: Arc<Mutex<SessionState>>,
    analyzer: ThreatAnalyzer,
    scan_analyzer: ScanAnalyzer,
    clock: Arc<dyn Clock>,
    /// True while a monitor loop is running; cleared to request exit
    active: Arc<AtomicBool>,
}

impl DefenseSystem {
    /// Create a new defense system with the production clock
    pub fn new(config: DefenseConfig) -> Self {
        Self::with_clock(config, Arc::new(MonotonicClock::new()))
    }

    /// Create a defense system driven by an external clock
    pub fn with_clock(config: DefenseConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::new(&config.detection))),
            analyzer: ThreatAnalyzer::new(config.detection.clone()),
            scan_analyzer: ScanAnalyzer::new(config.detection.clone()),
            clock,
            active: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Clear all session state: device table, active threats, stats and
    /// the analyzer's pass timer
    pub fn init_session(&mut self) {
        let mut state = self.state.lock();
        state.clear();
        state.stats.last_update_ms = self.clock.now_ms();
        self.analyzer.reset();
        info!("defense session initialized");
    }

    /// Handle that lets another context request the monitor to stop
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(Arc::clone(&self.active))
    }

    /// Run the threat monitor until the escape key is observed or an
    /// external stop request clears the active flag.
    ///
    /// Clears session state, enables promiscuous capture, then drives
    /// periodic analysis and display refreshes. Capture is always
    /// disabled before this returns, on every exit path past a
    /// successful start.
    pub fn run_monitor(
        &mut self,
        radio: &mut dyn Radio,
        display: &mut dyn DisplaySink,
        input: &mut dyn InputSource,
    ) -> Result<SessionReport> {
        self.init_session();
        self.active.store(true, Ordering::SeqCst);

        let consumer: FrameConsumer = {
            let state = Arc::clone(&self.state);
            let clock = Arc::clone(&self.clock);
            Arc::new(move |data: &[u8]| {
                if let Some(frame) = ieee80211::demux(data) {
                    let now = clock.now_ms();
                    state
                        .lock()
                        .table
                        .observe(frame.transmitter, frame.kind, frame.ssid.as_deref(), now);
                }
            })
        };

        if let Err(e) = radio.enable_capture(consumer) {
            self.active.store(false, Ordering::SeqCst);
            warn!("cannot start monitor: {}", e);
            display.status("radio unavailable, monitor not started");
            return Err(e);
        }

        display.status("monitoring, watching for threats");
        let started = self.clock.now_ms();
        let mut last_refresh = started;

        loop {
            if !self.active.load(Ordering::SeqCst) {
                info!("monitor stop requested");
                break;
            }
            if input.escape_pressed() {
                info!("monitor stopped by key press");
                break;
            }

            let now = self.clock.now_ms();

            let fresh = {
                let mut guard = self.state.lock();
                let state = &mut *guard;
                self.analyzer.analyze(&mut state.table, &mut state.stats, now)
            };

            if !fresh.is_empty() {
                let mut state = self.state.lock();
                for detection in &fresh {
                    state.push_threat(detection.clone());
                }
            }
            for detection in &fresh {
                display.alert(detection);
            }

            if now.saturating_sub(last_refresh) >= self.config.monitor.display_refresh_ms {
                let (stats, devices, active_threats) = {
                    let mut state = self.state.lock();
                    state.stats.active_monitor_time_ms = now.saturating_sub(started);
                    state.stats.last_update_ms = now;
                    (
                        state.stats.clone(),
                        state.table.snapshot(),
                        state.active_threats.len(),
                    )
                };
                display.refresh(&MonitorView {
                    stats: &stats,
                    devices: &devices,
                    active_threats,
                    total_threats: self.analyzer.total_threats(),
                });
                last_refresh = now;
            }

            if self.config.monitor.loop_delay_ms > 0 {
                std::thread::sleep(std::time::Duration::from_millis(
                    self.config.monitor.loop_delay_ms,
                ));
            }
        }

        // Capture must be off before we return
        radio.disable_capture();
        self.active.store(false, Ordering::SeqCst);

        {
            let mut state = self.state.lock();
            let now = self.clock.now_ms();
            state.stats.active_monitor_time_ms = now.saturating_sub(started);
            state.stats.last_update_ms = now;
        }

        display.status("monitoring stopped");
        Ok(self.report())
    }

    /// Run one blocking scan and the passive scan analyzer over the
    /// result. A failed scan is indistinguishable from an empty
    /// environment.
    pub fn run_passive_scan(
        &mut self,
        radio: &mut dyn Radio,
        display: &mut dyn DisplaySink,
    ) -> Vec<ThreatDetection> {
        let networks = match radio.scan_networks() {
            Ok(networks) => networks,
            Err(e) => {
                warn!("scan failed: {}", e);
                Vec::new()
            }
        };

        let now = self.clock.now_ms();
        let detections = {
            let mut guard = self.state.lock();
            let state = &mut *guard;
            let detections = self.scan_analyzer.analyze(&networks, &mut state.stats, now);
            for detection in &detections {
                state.push_threat(detection.clone());
            }
            detections
        };

        for detection in &detections {
            display.alert(detection);
        }

        detections
    }

    /// Snapshot of the aggregate statistics
    pub fn stats(&self) -> DefenseStats {
        self.state.lock().stats.clone()
    }

    /// All detections appended this session
    pub fn active_threats(&self) -> Vec<ThreatDetection> {
        self.state.lock().active_threats.clone()
    }

    /// Tracked devices for diagnostic display, most recent first
    pub fn device_snapshot(&self) -> Vec<TrackedDevice> {
        self.state.lock().table.snapshot()
    }

    /// Devices promoted to malicious this session
    pub fn total_threats(&self) -> u32 {
        self.analyzer.total_threats()
    }

    /// Summarize the session: devices tracked, threats found, breakdown
    /// by category
    pub fn report(&self) -> SessionReport {
        let state = self.state.lock();
        let mut report = SessionReport {
            devices_tracked: state.table.len(),
            threats_detected: state.stats.threats_detected,
            stats: state.stats.clone(),
            ..SessionReport::default()
        };

        for device in state.table.devices() {
            if !device.marked_malicious {
                continue;
            }
            match device.suspected {
                ThreatCategory::BeaconSpam => report.beacon_spam += 1,
                ThreatCategory::EvilTwin => report.evil_twins += 1,
                ThreatCategory::DeauthFlood => report.deauth_floods += 1,
                ThreatCategory::ProbeFlood => report.probe_floods += 1,
                ThreatCategory::Karma => report.karma_attacks += 1,
                _ => report.other_threats += 1,
            }
        }

        report
    }

    pub fn config(&self) -> &DefenseConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DefenseError;
    use crate::ieee80211::testutil::beacon_frame;
    use crate::ieee80211::MacAddr;
    use crate::models::RecommendedAction;
    use crate::radio::ScannedNetwork;
    use std::sync::atomic::AtomicU64;

    const SPAMMER: [u8; 6] = [0xaa, 0xbb, 0xcc, 0x11, 0x22, 0x33];

    struct ManualClock(AtomicU64);

    impl ManualClock {
        fn new() -> Arc<Self> {
            Arc::new(Self(AtomicU64::new(0)))
        }

        fn set(&self, ms: u64) {
            self.0.store(ms, Ordering::SeqCst);
        }
    }

    impl Clock for ManualClock {
        fn now_ms(&self) -> u64 {
            self.0.load(Ordering::SeqCst)
        }
    }

    #[derive(Default)]
    struct FakeRadio {
        consumer: Arc<Mutex<Option<FrameConsumer>>>,
        disables: u32,
        fail_capture: bool,
        networks: Vec<ScannedNetwork>,
    }

    impl Radio for FakeRadio {
        fn enable_capture(&mut self, consumer: FrameConsumer) -> Result<()> {
            if self.fail_capture {
                return Err(DefenseError::RadioUnavailable(
                    "promiscuous mode rejected".to_string(),
                ));
            }
            *self.consumer.lock() = Some(consumer);
            Ok(())
        }

        fn disable_capture(&mut self) {
            *self.consumer.lock() = None;
            self.disables += 1;
        }

        fn scan_networks(&mut self) -> Result<Vec<ScannedNetwork>> {
            Ok(self.networks.clone())
        }
    }

    #[derive(Default)]
    struct RecordingDisplay {
        statuses: Vec<String>,
        alerts: Vec<ThreatDetection>,
        refreshes: u32,
    }

    impl DisplaySink for RecordingDisplay {
        fn status(&mut self, line: &str) {
            self.statuses.push(line.to_string());
        }

        fn alert(&mut self, detection: &ThreatDetection) {
            self.alerts.push(detection.clone());
        }

        fn refresh(&mut self, _view: &MonitorView<'_>) {
            self.refreshes += 1;
        }
    }

    /// Drives the spam scenario from inside the loop's key poll: first
    /// poll injects a beacon burst through the registered consumer and
    /// advances the clock, second poll presses escape.
    struct SpamDriver {
        consumer: Arc<Mutex<Option<FrameConsumer>>>,
        clock: Arc<ManualClock>,
        polls: u32,
    }

    impl InputSource for SpamDriver {
        fn escape_pressed(&mut self) -> bool {
            self.polls += 1;
            if self.polls == 1 {
                let consumer = self.consumer.lock().clone().expect("capture enabled");
                for i in 0..30u64 {
                    self.clock.set(i * 100);
                    consumer(&beacon_frame(SPAMMER, "EvilNet"));
                }
                self.clock.set(3100);
                false
            } else {
                true
            }
        }
    }

    fn test_config() -> DefenseConfig {
        let mut config = DefenseConfig::default();
        config.monitor.loop_delay_ms = 0;
        config
    }

    #[test]
    fn test_monitor_detects_beacon_spam_end_to_end() {
        let clock = ManualClock::new();
        let mut system = DefenseSystem::with_clock(test_config(), clock.clone());
        let mut radio = FakeRadio::default();
        let mut display = RecordingDisplay::default();
        let mut input = SpamDriver {
            consumer: Arc::clone(&radio.consumer),
            clock: Arc::clone(&clock),
            polls: 0,
        };

        let report = system
            .run_monitor(&mut radio, &mut display, &mut input)
            .unwrap();

        assert_eq!(display.alerts.len(), 1);
        let alert = &display.alerts[0];
        assert_eq!(alert.category, ThreatCategory::BeaconSpam);
        assert_eq!(alert.source_mac, MacAddr::new(SPAMMER));
        assert!((alert.confidence - 0.8).abs() < 1e-6);
        assert_eq!(alert.recommended_action, RecommendedAction::Alert);

        assert_eq!(report.devices_tracked, 1);
        assert_eq!(report.threats_detected, 1);
        assert_eq!(report.beacon_spam, 1);

        assert_eq!(system.active_threats().len(), 1);
        assert_eq!(system.total_threats(), 1);
        let devices = system.device_snapshot();
        assert!(devices[0].marked_malicious);
        assert!(devices[0].advertised_ssids.contains("EvilNet"));

        // Hard invariant: capture disabled before run_monitor returned
        assert_eq!(radio.disables, 1);
        assert!(radio.consumer.lock().is_none());
        assert!(display.refreshes >= 1);
    }

    #[test]
    fn test_monitor_radio_unavailable() {
        let clock = ManualClock::new();
        let mut system = DefenseSystem::with_clock(test_config(), clock.clone());
        let mut radio = FakeRadio {
            fail_capture: true,
            ..FakeRadio::default()
        };
        let mut display = RecordingDisplay::default();
        let mut input = SpamDriver {
            consumer: Arc::clone(&radio.consumer),
            clock,
            polls: 0,
        };

        let err = system
            .run_monitor(&mut radio, &mut display, &mut input)
            .unwrap_err();

        assert!(matches!(err, DefenseError::RadioUnavailable(_)));
        assert!(display.alerts.is_empty());
        assert_eq!(input.polls, 0, "loop must not run");
        assert!(!system.stop_handle().is_active());
        assert!(system.active_threats().is_empty());
    }

    struct ExternalStopDriver {
        handle: StopHandle,
        polls: u32,
    }

    impl InputSource for ExternalStopDriver {
        fn escape_pressed(&mut self) -> bool {
            self.polls += 1;
            self.handle.stop();
            false
        }
    }

    #[test]
    fn test_external_stop_disables_capture() {
        let clock = ManualClock::new();
        let mut system = DefenseSystem::with_clock(test_config(), clock);
        let handle = system.stop_handle();
        let mut radio = FakeRadio::default();
        let mut display = RecordingDisplay::default();
        let mut input = ExternalStopDriver { handle, polls: 0 };

        let report = system
            .run_monitor(&mut radio, &mut display, &mut input)
            .unwrap();

        assert_eq!(input.polls, 1);
        assert_eq!(radio.disables, 1);
        assert_eq!(report.threats_detected, 0);
    }

    fn scan_network(ssid: &str, bssid: u8, rssi: i32, is_open: bool) -> ScannedNetwork {
        ScannedNetwork {
            ssid: ssid.to_string(),
            bssid: MacAddr::new([0x0c, 0, 0, 0, 0, bssid]),
            rssi,
            is_open,
        }
    }

    #[test]
    fn test_passive_scan_end_to_end() {
        let clock = ManualClock::new();
        clock.set(5000);
        let mut system = DefenseSystem::with_clock(test_config(), clock);
        let mut radio = FakeRadio {
            networks: vec![
                scan_network("Home", 0xa1, -60, false),
                scan_network("Home", 0xb2, -55, false),
                scan_network("FreeWiFi", 0xc3, -70, true),
            ],
            ..FakeRadio::default()
        };
        let mut display = RecordingDisplay::default();

        let detections = system.run_passive_scan(&mut radio, &mut display);

        assert_eq!(detections.len(), 3);
        let twins = detections
            .iter()
            .filter(|d| d.category == ThreatCategory::EvilTwin)
            .count();
        let rogues = detections
            .iter()
            .filter(|d| d.category == ThreatCategory::RogueAp)
            .count();
        assert_eq!(twins, 2);
        assert_eq!(rogues, 1);

        assert_eq!(system.stats().networks_scanned, 3);
        assert_eq!(system.active_threats().len(), 3);
        assert_eq!(display.alerts.len(), 3);
        assert!(detections.iter().all(|d| d.detected_at == 5000));
    }

    #[test]
    fn test_monitor_clears_previous_session() {
        let clock = ManualClock::new();
        let mut system = DefenseSystem::with_clock(test_config(), clock.clone());
        let mut radio = FakeRadio {
            networks: vec![scan_network("FreeWiFi", 1, -70, true)],
            ..FakeRadio::default()
        };
        let mut display = RecordingDisplay::default();

        // A scan detection from before the monitor run
        system.run_passive_scan(&mut radio, &mut display);
        assert_eq!(system.active_threats().len(), 1);

        let mut input = ExternalStopDriver {
            handle: system.stop_handle(),
            polls: 0,
        };
        system
            .run_monitor(&mut radio, &mut display, &mut input)
            .unwrap();

        // Starting the monitor begins a fresh session
        assert!(system.active_threats().is_empty());
        assert_eq!(system.stats().networks_scanned, 0);
    }
}
