/// Shortest legal DMX512 packet body
pub const MIN_SLOTS: usize = 24;

/// Build the byte stream sent after the break for an Open DMX (FTDI) dongle.
///
/// The dongle has no framing of its own: the host generates the break and
/// mark-after-break, then writes the null start code followed by the slots.
pub fn build_open_dmx_packet(slots: &[u8]) -> Vec<u8> {
    let slot_count = slots.len().max(MIN_SLOTS);

    let mut packet = Vec::with_capacity(1 + slot_count);

    // Null start code
    packet.push(0x00);

    packet.extend_from_slice(slots);
    packet.resize(1 + slot_count, 0);

    packet
}
