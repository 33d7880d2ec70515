use super::open_dmx::MIN_SLOTS;

const START_OF_MESSAGE: u8 = 0x7E;
const END_OF_MESSAGE: u8 = 0xE7;
/// "Output Only Send DMX Packet Request"
const LABEL_SEND_DMX: u8 = 6;

/// Build an Enttec DMX USB Pro "send DMX" message.
///
/// The widget generates break and timing itself; the message carries the start
/// code and slots behind a 4-byte header.
pub fn build_usb_pro_packet(slots: &[u8]) -> Vec<u8> {
    let slot_count = slots.len().max(MIN_SLOTS);
    // Data length includes the start code
    let data_len = (slot_count + 1) as u16;
    let [len_lo, len_hi] = data_len.to_le_bytes();

    let mut packet = Vec::with_capacity(5 + data_len as usize);

    // Header
    packet.extend_from_slice(&[START_OF_MESSAGE, LABEL_SEND_DMX, len_lo, len_hi]);

    // Null start code + slots
    packet.push(0x00);
    packet.extend_from_slice(slots);
    packet.resize(4 + data_len as usize, 0);

    packet.push(END_OF_MESSAGE);

    packet
}
