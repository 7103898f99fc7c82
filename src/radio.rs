//! Radio Interface
//!
//! Seam between the engine and the 802.11 hardware. The engine only ever
//! asks for three things: promiscuous delivery of management frames to a
//! registered consumer, capture teardown, and a blocking scan of visible
//! access points. `LinuxRadio` implements the seam with pcap on a
//! monitor-mode interface plus `iw` for scanning; tests substitute fakes.

use std::process::Command;
use std::sync::Arc;

use tracing::warn;

use crate::config::RadioConfig;
use crate::error::{DefenseError, Result};
use crate::ieee80211::MacAddr;

/// Frame consumer registered with the radio.
///
/// Invoked from the capture context for every received management frame;
/// it must not block, must not allocate unbounded memory and must not
/// call back into the radio.
pub type FrameConsumer = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// One access point from a blocking scan
#[derive(Debug, Clone)]
pub struct ScannedNetwork {
    pub ssid: String,
    pub bssid: MacAddr,
    /// Signal strength in dBm
    pub rssi: i32,
    /// True when the network advertises no privacy capability
    pub is_open: bool,
}

/// Radio operations the engine depends on
pub trait Radio {
    /// Enter station mode with promiscuous reception enabled and deliver
    /// every management frame to `consumer`. Idempotent; calling twice
    /// replaces the registered consumer.
    fn enable_capture(&mut self, consumer: FrameConsumer) -> Result<()>;

    /// Disable promiscuous reception. Safe to call when inactive.
    fn disable_capture(&mut self);

    /// Blocking scan of currently visible access points.
    fn scan_networks(&mut self) -> Result<Vec<ScannedNetwork>>;
}

/// Monitor-mode radio backed by pcap and the `iw` userland tools
pub struct LinuxRadio {
    interface: String,
    #[allow(dead_code)]
    buffer_size: usize,
    #[cfg(feature = "live-capture")]
    capture: Option<capture::CaptureWorker>,
}

impl LinuxRadio {
    pub fn new(config: &RadioConfig) -> Self {
        Self {
            interface: config.interface.clone(),
            buffer_size: config.buffer_size,
            #[cfg(feature = "live-capture")]
            capture: None,
        }
    }

    /// Best-effort switch of the interface into monitor mode. Capture
    /// still works if the interface was prepared externally, so failures
    /// only log.
    #[cfg(feature = "live-capture")]
    fn prepare_interface(&self) {
        use tracing::debug;

        for args in [
            vec!["link", "set", self.interface.as_str(), "down"],
            vec!["dev", self.interface.as_str(), "set", "type", "monitor"],
            vec!["link", "set", self.interface.as_str(), "up"],
        ] {
            let tool = if args[0] == "dev" { "iw" } else { "ip" };
            match Command::new(tool).args(&args).output() {
                Ok(out) if out.status.success() => {}
                Ok(out) => debug!(
                    "{} {:?} failed: {}",
                    tool,
                    args,
                    String::from_utf8_lossy(&out.stderr).trim()
                ),
                Err(e) => debug!("{} not available: {}", tool, e),
            }
        }
    }
}

impl Radio for LinuxRadio {
    #[cfg(feature = "live-capture")]
    fn enable_capture(&mut self, consumer: FrameConsumer) -> Result<()> {
        self.disable_capture();
        self.prepare_interface();

        let worker = capture::CaptureWorker::spawn(&self.interface, self.buffer_size, consumer)?;
        self.capture = Some(worker);
        Ok(())
    }

    #[cfg(not(feature = "live-capture"))]
    fn enable_capture(&mut self, _consumer: FrameConsumer) -> Result<()> {
        Err(DefenseError::RadioUnavailable(
            "built without the live-capture feature".to_string(),
        ))
    }

    fn disable_capture(&mut self) {
        #[cfg(feature = "live-capture")]
        if let Some(worker) = self.capture.take() {
            worker.stop();
        }
    }

    fn scan_networks(&mut self) -> Result<Vec<ScannedNetwork>> {
        let output = Command::new("iw")
            .args(["dev", &self.interface, "scan"])
            .output()
            .map_err(|e| DefenseError::RadioUnavailable(format!("iw scan: {e}")))?;

        if !output.status.success() {
            warn!(
                "iw scan failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            );
            return Ok(Vec::new());
        }

        Ok(parse_iw_scan(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse `iw dev <iface> scan` output into scan records.
///
/// Unknown lines are skipped; a BSS block without an SSID line yields a
/// hidden (empty-SSID) record.
fn parse_iw_scan(output: &str) -> Vec<ScannedNetwork> {
    let mut networks = Vec::new();
    let mut current: Option<ScannedNetwork> = None;

    for line in output.lines() {
        let trimmed = line.trim();

        if let Some(rest) = trimmed.strip_prefix("BSS ") {
            if let Some(net) = current.take() {
                networks.push(net);
            }
            let mac_str: String = rest.chars().take(17).collect();
            if let Some(bssid) = parse_mac(&mac_str) {
                current = Some(ScannedNetwork {
                    ssid: String::new(),
                    bssid,
                    rssi: -100,
                    is_open: true,
                });
            }
        } else if let Some(net) = current.as_mut() {
            if let Some(rest) = trimmed.strip_prefix("SSID: ") {
                net.ssid = rest.to_string();
            } else if let Some(rest) = trimmed.strip_prefix("signal: ") {
                if let Some(value) = rest.split_whitespace().next() {
                    if let Ok(dbm) = value.parse::<f32>() {
                        net.rssi = dbm as i32;
                    }
                }
            } else if let Some(rest) = trimmed.strip_prefix("capability: ") {
                net.is_open = !rest.contains("Privacy");
            }
        }
    }

    if let Some(net) = current.take() {
        networks.push(net);
    }

    networks
}

fn parse_mac(s: &str) -> Option<MacAddr> {
    let mut bytes = [0u8; 6];
    let mut parts = s.split(':');
    for byte in bytes.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    Some(MacAddr::new(bytes))
}

#[cfg(feature = "live-capture")]
mod capture {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::thread::JoinHandle;

    use tracing::{debug, warn};

    use super::FrameConsumer;
    use crate::error::{DefenseError, Result};

    /// Background pcap reader delivering management frames to the
    /// registered consumer
    pub(super) struct CaptureWorker {
        running: Arc<AtomicBool>,
        handle: JoinHandle<()>,
    }

    impl CaptureWorker {
        pub(super) fn spawn(
            interface: &str,
            buffer_size: usize,
            consumer: FrameConsumer,
        ) -> Result<Self> {
            let mut cap = pcap::Capture::from_device(interface)
                .map_err(|e| DefenseError::RadioUnavailable(e.to_string()))?
                .promisc(true)
                .immediate_mode(true)
                .buffer_size(buffer_size as i32)
                .timeout(200)
                .open()
                .map_err(|e| DefenseError::RadioUnavailable(e.to_string()))?;

            let radiotap = cap.get_datalink() == pcap::Linktype::IEEE802_11_RADIOTAP;
            debug!(
                "capture opened on {} (radiotap: {})",
                interface, radiotap
            );

            let running = Arc::new(AtomicBool::new(true));
            let flag = Arc::clone(&running);

            let handle = std::thread::spawn(move || {
                while flag.load(Ordering::SeqCst) {
                    match cap.next_packet() {
                        Ok(packet) => {
                            let data = if radiotap {
                                match strip_radiotap(packet.data) {
                                    Some(d) => d,
                                    None => continue,
                                }
                            } else {
                                packet.data
                            };

                            // Only management frames reach the consumer
                            if !data.is_empty() && data[0] & 0x0c == 0x00 {
                                consumer(data);
                            }
                        }
                        Err(pcap::Error::TimeoutExpired) => {}
                        Err(e) => {
                            warn!("capture error: {}", e);
                            break;
                        }
                    }
                }
            });

            Ok(Self { running, handle })
        }

        pub(super) fn stop(self) {
            self.running.store(false, Ordering::SeqCst);
            let _ = self.handle.join();
        }
    }

    /// Skip the variable-length radiotap header (length at bytes 2..4,
    /// little endian)
    fn strip_radiotap(data: &[u8]) -> Option<&[u8]> {
        if data.len() < 4 {
            return None;
        }
        let len = u16::from_le_bytes([data[2], data[3]]) as usize;
        if len == 0 || len > data.len() {
            return None;
        }
        Some(&data[len..])
    }
}
