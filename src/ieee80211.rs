//! 802.11 Management Frame Demultiplexer
//!
//! Minimal decode of promiscuously captured management frames: the fixed
//! 24-byte header plus the SSID information element of beacons and probe
//! responses. Everything is byte-mask based, so the layout is portable.

/// MAC address (6 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct MacAddr([u8; 6]);

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff, 0xff, 0xff, 0xff, 0xff, 0xff]);
    pub const ZERO: MacAddr = MacAddr([0, 0, 0, 0, 0, 0]);

    pub fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(data: &[u8]) -> Option<Self> {
        if data.len() >= 6 {
            let mut bytes = [0u8; 6];
            bytes.copy_from_slice(&data[..6]);
            Some(Self(bytes))
        } else {
            None
        }
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.0
    }

    pub fn is_broadcast(&self) -> bool {
        self.0 == [0xff, 0xff, 0xff, 0xff, 0xff, 0xff]
    }

    pub fn is_multicast(&self) -> bool {
        self.0[0] & 0x01 != 0
    }
}

impl std::fmt::Display for MacAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2],
            self.0[3], self.0[4], self.0[5])
    }
}

/// Fixed management header: frame control, duration, addr1-3, sequence control.
pub const MGMT_HEADER_LEN: usize = 24;

/// Transmitter address (addr2) offset within the fixed header.
const ADDR2_OFFSET: usize = 10;

/// Beacon and probe-response bodies start with 12 fixed bytes
/// (timestamp, interval, capability) before the tagged elements.
const FIXED_BEACON_FIELDS: usize = 12;

/// Management frame subtypes the engine cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Beacon,
    ProbeRequest,
    ProbeResponse,
    Deauth,
    Other,
}

impl FrameKind {
    /// Classify the 4-bit management subtype.
    pub fn from_subtype(subtype: u8) -> Self {
        match subtype & 0x0f {
            0x08 => FrameKind::Beacon,
            0x04 => FrameKind::ProbeRequest,
            0x05 => FrameKind::ProbeResponse,
            0x0c => FrameKind::Deauth,
            _ => FrameKind::Other,
        }
    }

    /// True for subtypes that carry a beacon-style body (fixed fields + IEs).
    pub fn has_beacon_body(&self) -> bool {
        matches!(self, FrameKind::Beacon | FrameKind::ProbeResponse)
    }
}

impl std::fmt::Display for FrameKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FrameKind::Beacon => write!(f, "beacon"),
            FrameKind::ProbeRequest => write!(f, "probe-request"),
            FrameKind::ProbeResponse => write!(f, "probe-response"),
            FrameKind::Deauth => write!(f, "deauth"),
            FrameKind::Other => write!(f, "other"),
        }
    }
}

/// A demultiplexed management frame: who sent it, what it was, and the
/// advertised SSID when one could be decoded.
#[derive(Debug, Clone)]
pub struct MgmtFrame {
    pub transmitter: MacAddr,
    pub kind: FrameKind,
    pub ssid: Option<String>,
}

/// Demultiplex one captured frame.
///
/// Returns `None` for anything that is not a well-formed management frame:
/// buffers shorter than the fixed header and frames whose type bits are not
/// 0b00 (management) are dropped silently, per the malformed-frame policy.
pub fn demux(data: &[u8]) -> Option<MgmtFrame> {
    if data.len() < MGMT_HEADER_LEN {
        return None;
    }

    let fc0 = data[0];

    // Type bits (b2-b3): 0b00 is management.
    if fc0 & 0x0c != 0x00 {
        return None;
    }

    let subtype = (fc0 & 0xf0) >> 4;
    let kind = FrameKind::from_subtype(subtype);
    let transmitter = MacAddr::from_slice(&data[ADDR2_OFFSET..])?;

    let ssid = if kind.has_beacon_body() {
        parse_ssid_element(data)
    } else {
        None
    };

    Some(MgmtFrame {
        transmitter,
        kind,
        ssid,
    })
}

/// Extract the SSID information element (tag 0) that follows the fixed
/// beacon fields. Hidden networks advertise a zero-length or null-padded
/// SSID; both decode to `None`.
fn parse_ssid_element(data: &[u8]) -> Option<String> {
    let offset = MGMT_HEADER_LEN + FIXED_BEACON_FIELDS;
    if data.len() < offset + 2 {
        return None;
    }

    let tag = data[offset];
    let len = data[offset + 1] as usize;

    if tag != 0x00 || len == 0 || len > 32 {
        return None;
    }
    if data.len() < offset + 2 + len {
        return None;
    }

    let ssid = String::from_utf8_lossy(&data[offset + 2..offset + 2 + len]).to_string();
    if ssid.bytes().all(|b| b == 0) {
        return None;
    }

    Some(ssid)
}

#[cfg(test)]
pub(crate) mod testutil {
    use super::*;

    /// Build a raw management frame with the given subtype and transmitter.
    pub fn mgmt_frame(subtype: u8, transmitter: [u8; 6]) -> Vec<u8> {
        let mut frame = vec![0u8; MGMT_HEADER_LEN];
        frame[0] = (subtype & 0x0f) << 4; // type bits 0b00 = management
        frame[4..10].copy_from_slice(&[0xff; 6]); // addr1: broadcast
        frame[10..16].copy_from_slice(&transmitter);
        frame
    }

    /// Build a beacon advertising `ssid` from `transmitter`.
    pub fn beacon_frame(transmitter: [u8; 6], ssid: &str) -> Vec<u8> {
        let mut frame = mgmt_frame(0x08, transmitter);
        frame.extend_from_slice(&[0u8; FIXED_BEACON_FIELDS]);
        frame.push(0x00); // SSID element
        frame.push(ssid.len() as u8);
        frame.extend_from_slice(ssid.as_bytes());
        frame
    }

    /// Build a probe response advertising `ssid` from `transmitter`.
    pub fn probe_response_frame(transmitter: [u8; 6], ssid: &str) -> Vec<u8> {
        let mut frame = beacon_frame(transmitter, ssid);
        frame[0] = 0x05 << 4;
        frame
    }
}
