//! Error types for decoding, ingest and output
use thiserror::Error;

/// A status frame that cannot be decoded. The previous light state is kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer slots than the highest indicator byte the mapper reads
    #[error("malformed frame: {len} slots, need at least {min}")]
    TooShort { len: usize, min: usize },

    /// Only the null start code carries lighting data
    #[error("malformed frame: unsupported start code {0:#04x}")]
    UnsupportedStartCode(u8),
}

/// Output device errors. None of these are fatal to the render loop.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Device is not open
    #[error("transport unavailable")]
    Unavailable,

    /// Opening the device failed
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        #[source]
        source: serialport::Error,
    },

    /// I/O failure while submitting a frame
    #[error("write failed: {0}")]
    Write(#[from] std::io::Error),

    /// Channel range falls outside the 512-slot universe
    #[error("channel range {start}+{len} outside universe")]
    ChannelRange { start: u16, len: usize },
}

/// E1.31 packet parse failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SacnError {
    #[error("packet too short: {0} bytes")]
    Truncated(usize),

    #[error("not an ACN packet")]
    BadIdentifier,

    #[error("unexpected {layer} vector {vector:#x}")]
    UnexpectedVector { layer: &'static str, vector: u32 },

    #[error("unsupported address/data type {0:#x}")]
    BadAddressType(u8),

    #[error("property count {count} exceeds packet length")]
    BadPropertyCount { count: usize },
}
