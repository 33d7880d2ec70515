//! E1.31 (sACN) receive side.
//!
//! Only live data packets for the configured universe are passed on. Sync
//! and discovery packets are ignored, as are preview and stream-terminated
//! data.

use anyhow::{Context, Result};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

use crate::error::SacnError;
use crate::frame::FRAME_LEN;

use super::IngestFrame;

pub const SACN_PORT: u16 = 5568;

const ACN_PACKET_IDENTIFIER: [u8; 12] = [
    0x41, 0x53, 0x43, 0x2d, 0x45, 0x31, 0x2e, 0x31, 0x37, 0x00, 0x00, 0x00,
];
const VECTOR_ROOT_E131_DATA: u32 = 0x0000_0004;
const VECTOR_ROOT_E131_EXTENDED: u32 = 0x0000_0008;
const VECTOR_E131_DATA_PACKET: u32 = 0x0000_0002;
const VECTOR_DMP_SET_PROPERTY: u8 = 0x02;
/// Relative addressing, one-byte data, increment 1
const DMP_ADDRESS_DATA_TYPE: u8 = 0xa1;

const OPTION_PREVIEW: u8 = 0x80;
const OPTION_STREAM_TERMINATED: u8 = 0x40;

// Field offsets within a data packet
const ROOT_VECTOR: usize = 18;
const FRAMING_VECTOR: usize = 40;
const SOURCE_NAME: usize = 44;
const PRIORITY: usize = 108;
const SEQUENCE: usize = 111;
const OPTIONS: usize = 112;
const UNIVERSE: usize = 113;
const DMP_VECTOR: usize = 117;
const PROPERTY_COUNT: usize = 123;
/// Start code, followed by channel data
const PROPERTY_VALUES: usize = 125;

const RECV_BUFFER_SIZE: usize = 1144;
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// One E1.31 data packet, borrowing the receive buffer
#[derive(Debug, PartialEq, Eq)]
pub struct DataPacket<'a> {
    pub source_name: String,
    pub priority: u8,
    pub sequence: u8,
    pub universe: u16,
    pub preview: bool,
    pub terminated: bool,
    /// Start code at index 0, channel N at index N
    pub values: &'a [u8],
}

impl DataPacket<'_> {
    /// Whether this packet should drive output for `universe`
    pub fn is_live_for(&self, universe: u16) -> bool {
        self.universe == universe && !self.preview && !self.terminated
    }
}

fn be_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([buf[at], buf[at + 1]])
}

fn be_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_be_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

/// Parse a datagram. `Ok(None)` means a valid E1.31 packet that carries no
/// DMX data (sync or discovery).
pub fn parse_packet(buf: &[u8]) -> Result<Option<DataPacket<'_>>, SacnError> {
    if buf.len() < ROOT_VECTOR + 4 {
        return Err(SacnError::Truncated(buf.len()));
    }
    if buf[4..16] != ACN_PACKET_IDENTIFIER {
        return Err(SacnError::BadIdentifier);
    }

    match be_u32(buf, ROOT_VECTOR) {
        VECTOR_ROOT_E131_DATA => {}
        VECTOR_ROOT_E131_EXTENDED => return Ok(None),
        vector => return Err(SacnError::UnexpectedVector { layer: "root", vector }),
    }

    if buf.len() < PROPERTY_VALUES {
        return Err(SacnError::Truncated(buf.len()));
    }

    let framing_vector = be_u32(buf, FRAMING_VECTOR);
    if framing_vector != VECTOR_E131_DATA_PACKET {
        return Err(SacnError::UnexpectedVector {
            layer: "framing",
            vector: framing_vector,
        });
    }
    if buf[DMP_VECTOR] != VECTOR_DMP_SET_PROPERTY {
        return Err(SacnError::UnexpectedVector {
            layer: "DMP",
            vector: u32::from(buf[DMP_VECTOR]),
        });
    }

    if buf[DMP_VECTOR + 1] != DMP_ADDRESS_DATA_TYPE {
        return Err(SacnError::BadAddressType(buf[DMP_VECTOR + 1]));
    }

    let count = usize::from(be_u16(buf, PROPERTY_COUNT));
    if PROPERTY_VALUES + count > buf.len() {
        return Err(SacnError::BadPropertyCount { count });
    }

    let name = &buf[SOURCE_NAME..PRIORITY];
    let name_len = name.iter().position(|&b| b == 0).unwrap_or(name.len());

    Ok(Some(DataPacket {
        source_name: String::from_utf8_lossy(&name[..name_len]).into_owned(),
        priority: buf[PRIORITY],
        sequence: buf[SEQUENCE],
        universe: be_u16(buf, UNIVERSE),
        preview: buf[OPTIONS] & OPTION_PREVIEW != 0,
        terminated: buf[OPTIONS] & OPTION_STREAM_TERMINATED != 0,
        values: &buf[PROPERTY_VALUES..PROPERTY_VALUES + count],
    }))
}

/// Multicast group carrying `universe`
pub fn multicast_group(universe: u16) -> Ipv4Addr {
    let [hi, lo] = universe.to_be_bytes();
    Ipv4Addr::new(239, 255, hi, lo)
}

/// Listens for one universe and hands each frame to a callback
pub struct SacnReceiver {
    socket: UdpSocket,
    universe: u16,
}

impl SacnReceiver {
    pub fn bind(bind_address: &str, universe: u16) -> Result<Self> {
        let interface: Ipv4Addr = bind_address
            .parse()
            .context(format!("Invalid bind address {}", bind_address))?;
        let addr = SocketAddr::from((interface, SACN_PORT));

        let socket = UdpSocket::bind(addr).context(format!("Failed to bind to {}", addr))?;
        socket
            .join_multicast_v4(&multicast_group(universe), &interface)
            .context(format!("Failed to join multicast group for universe {}", universe))?;
        socket.set_read_timeout(Some(READ_TIMEOUT))?;

        debug!("sACN receiver on {} for universe {}", addr, universe);

        Ok(SacnReceiver { socket, universe })
    }

    /// Receive until `running` goes false.
    ///
    /// `deliver` gets an owned copy of the slot data; the receive buffer is
    /// reused for the next datagram.
    pub fn run<F>(&self, running: &AtomicBool, mut deliver: F)
    where
        F: FnMut(IngestFrame),
    {
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        while running.load(Ordering::Relaxed) {
            let n = match self.socket.recv_from(&mut buf) {
                Ok((n, _)) => n,
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    continue;
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("sACN receive error: {}", e);
                    continue;
                }
            };

            match parse_packet(&buf[..n]) {
                Ok(Some(packet)) if packet.is_live_for(self.universe) => {
                    trace!(
                        "Packet from {}\tu{}\tp{}\ts{}",
                        packet.source_name,
                        packet.universe,
                        packet.priority,
                        packet.sequence
                    );
                    let len = packet.values.len().min(FRAME_LEN);
                    deliver(IngestFrame {
                        received_at: Instant::now(),
                        data: packet.values[..len].to_vec(),
                    });
                }
                Ok(_) => {}
                Err(e) => debug!("Ignoring datagram: {}", e),
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn build_data_packet(
    universe: u16,
    sequence: u8,
    options: u8,
    values: &[u8],
) -> Vec<u8> {
    let mut packet = vec![0u8; PROPERTY_VALUES + values.len()];
    packet[0..2].copy_from_slice(&0x0010u16.to_be_bytes());
    packet[4..16].copy_from_slice(&ACN_PACKET_IDENTIFIER);
    packet[ROOT_VECTOR..ROOT_VECTOR + 4].copy_from_slice(&VECTOR_ROOT_E131_DATA.to_be_bytes());
    packet[FRAMING_VECTOR..FRAMING_VECTOR + 4]
        .copy_from_slice(&VECTOR_E131_DATA_PACKET.to_be_bytes());
    packet[SOURCE_NAME..SOURCE_NAME + 4].copy_from_slice(b"YARG");
    packet[PRIORITY] = 100;
    packet[SEQUENCE] = sequence;
    packet[OPTIONS] = options;
    packet[UNIVERSE..UNIVERSE + 2].copy_from_slice(&universe.to_be_bytes());
    packet[DMP_VECTOR] = VECTOR_DMP_SET_PROPERTY;
    packet[DMP_VECTOR + 1] = DMP_ADDRESS_DATA_TYPE;
    packet[PROPERTY_COUNT..PROPERTY_COUNT + 2]
        .copy_from_slice(&(values.len() as u16).to_be_bytes());
    packet[PROPERTY_VALUES..].copy_from_slice(values);
    packet
}
