//! Raw status frames as sent by the game's stage-kit lighting output.
//!
//! Slot 0 is the DMX start code, slot N is channel N. The eight banks are laid
//! out eight slots apart starting at slot 1, each carrying red, green, blue and
//! orange indicator bytes. The strobe command lives in slot 6.

use crate::error::DecodeError;

/// Number of slots kept from each received frame
pub const FRAME_LEN: usize = 64;

/// Highest slot read by the mapper is bank 7 orange (slot 60)
pub const MIN_FRAME_LEN: usize = 61;

/// Number of LED banks in the source protocol
pub const BANK_COUNT: usize = 8;

/// Slot carrying the frame-global strobe command
pub const STROBE_SLOT: usize = 6;

const BANK_STRIDE: usize = 8;
const RED_OFFSET: usize = 1;
const GREEN_OFFSET: usize = 2;
const BLUE_OFFSET: usize = 3;
const ORANGE_OFFSET: usize = 4;

/// Which indicator bytes of one bank are lit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BankIndicators {
    pub red: bool,
    pub green: bool,
    pub blue: bool,
    pub orange: bool,
}

/// An owned copy of one received status frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawStatusFrame([u8; FRAME_LEN]);

impl RawStatusFrame {
    /// Copy `data` into an owned frame.
    ///
    /// `data` must start with the null start code and reach at least slot 60.
    /// Slots past the end of a short (but valid) frame read as zero.
    pub fn capture(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < MIN_FRAME_LEN {
            return Err(DecodeError::TooShort {
                len: data.len(),
                min: MIN_FRAME_LEN,
            });
        }
        if data[0] != 0 {
            return Err(DecodeError::UnsupportedStartCode(data[0]));
        }

        let mut slots = [0u8; FRAME_LEN];
        let n = data.len().min(FRAME_LEN);
        slots[..n].copy_from_slice(&data[..n]);
        Ok(RawStatusFrame(slots))
    }

    /// Raw strobe command byte
    pub fn strobe_code(&self) -> u8 {
        self.0[STROBE_SLOT]
    }

    /// Indicator bytes for `bank` (0..8)
    pub fn bank(&self, bank: usize) -> BankIndicators {
        debug_assert!(bank < BANK_COUNT);
        let base = bank * BANK_STRIDE;
        BankIndicators {
            red: self.0[base + RED_OFFSET] != 0,
            green: self.0[base + GREEN_OFFSET] != 0,
            blue: self.0[base + BLUE_OFFSET] != 0,
            orange: self.0[base + ORANGE_OFFSET] != 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8; FRAME_LEN] {
        &self.0
    }
}

/// Which color an indicator byte belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Indicator {
    Red,
    Green,
    Blue,
    Orange,
}

impl Indicator {
    /// Slot of this indicator for `bank`
    pub fn slot(self, bank: usize) -> usize {
        let offset = match self {
            Indicator::Red => RED_OFFSET,
            Indicator::Green => GREEN_OFFSET,
            Indicator::Blue => BLUE_OFFSET,
            Indicator::Orange => ORANGE_OFFSET,
        };
        bank * BANK_STRIDE + offset
    }
}

#[cfg(test)]
pub(crate) fn frame_with(lit: &[(Indicator, usize)], strobe: u8) -> Vec<u8> {
    let mut data = vec![0u8; FRAME_LEN];
    for &(indicator, bank) in lit {
        data[indicator.slot(bank)] = 255;
    }
    data[STROBE_SLOT] = strobe;
    data
}
