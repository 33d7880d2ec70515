use serialport::SerialPort;
use std::io::{self, Write};
use std::thread;
use std::time::Duration;
use tracing::{debug, trace, warn};

use crate::config::{DongleProtocol, OutputConfig};
use crate::error::TransportError;
use crate::protocol::{build_open_dmx_packet, build_usb_pro_packet};

/// Slots in one DMX universe
pub const UNIVERSE_SIZE: usize = 512;

/// DMX512 break must last at least 88us
const BREAK_TIME: Duration = Duration::from_micros(110);
/// Mark-after-break, at least 8us
const MARK_AFTER_BREAK: Duration = Duration::from_micros(16);
/// Keep a stuck write from holding the output loop for long
const WRITE_TIMEOUT: Duration = Duration::from_millis(100);

/// Output side of the bridge, called once per scheduler tick
pub trait Transport {
    /// Try to (re)open the device. Must not sleep.
    fn open(&mut self) -> Result<(), TransportError>;

    fn is_open(&self) -> bool;

    /// Write `values` starting at 1-based `start_channel` and transmit
    fn set_channel_range(
        &mut self,
        start_channel: u16,
        values: &[u8],
    ) -> Result<(), TransportError>;

    fn close(&mut self);

    /// Human readable device name for logs
    fn describe(&self) -> &str;
}

/// DMX over a USB serial dongle
pub struct SerialDmxTransport {
    config: OutputConfig,
    port: Option<Box<dyn SerialPort>>,
    universe: [u8; UNIVERSE_SIZE],
    /// Highest slot written since open
    slots_used: usize,
}

impl SerialDmxTransport {
    pub fn new(config: OutputConfig) -> Self {
        SerialDmxTransport {
            config,
            port: None,
            universe: [0; UNIVERSE_SIZE],
            slots_used: 0,
        }
    }

    fn open_port(config: &OutputConfig) -> Result<Box<dyn SerialPort>, TransportError> {
        let stop_bits = match config.protocol {
            DongleProtocol::OpenDmx => serialport::StopBits::Two,
            DongleProtocol::UsbPro => serialport::StopBits::One,
        };

        let mut port = serialport::new(&config.port, config.baud_rate())
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(stop_bits)
            .flow_control(serialport::FlowControl::None)
            .timeout(WRITE_TIMEOUT)
            .open()
            .map_err(|source| TransportError::Open {
                port: config.port.clone(),
                source,
            })?;

        // FTDI dongles need RTS low before the line driver is enabled
        if config.protocol == DongleProtocol::OpenDmx {
            if let Err(e) = port.write_request_to_send(false) {
                warn!("Failed to clear RTS on {}: {}", config.port, e);
            }
        }
        port.clear(serialport::ClearBuffer::All).ok();

        Ok(port)
    }

    /// Copy `values` into the universe buffer at `start_channel`
    fn write_slots(&mut self, start_channel: u16, values: &[u8]) -> Result<(), TransportError> {
        let start = usize::from(start_channel);
        if start == 0 || start - 1 + values.len() > UNIVERSE_SIZE {
            return Err(TransportError::ChannelRange {
                start: start_channel,
                len: values.len(),
            });
        }

        self.universe[start - 1..start - 1 + values.len()].copy_from_slice(values);
        self.slots_used = self.slots_used.max(start - 1 + values.len());
        Ok(())
    }

    fn transmit(&mut self) -> Result<(), TransportError> {
        let slots = &self.universe[..self.slots_used];
        let port = self.port.as_mut().ok_or(TransportError::Unavailable)?;

        match self.config.protocol {
            DongleProtocol::OpenDmx => {
                let packet = build_open_dmx_packet(slots);
                port.set_break().map_err(io::Error::from)?;
                thread::sleep(BREAK_TIME);
                port.clear_break().map_err(io::Error::from)?;
                thread::sleep(MARK_AFTER_BREAK);
                port.write_all(&packet)?;
                trace!("Sent Open DMX packet: {} bytes", packet.len());
            }
            DongleProtocol::UsbPro => {
                let packet = build_usb_pro_packet(slots);
                port.write_all(&packet)?;
                trace!("Sent USB Pro packet: {} bytes", packet.len());
            }
        }

        port.flush()?;
        Ok(())
    }
}

impl Transport for SerialDmxTransport {
    fn open(&mut self) -> Result<(), TransportError> {
        let port = Self::open_port(&self.config)?;
        self.port = Some(port);
        self.universe = [0; UNIVERSE_SIZE];
        self.slots_used = 0;
        debug!(
            "Opened {} ({:?} @ {} baud)",
            self.config.port,
            self.config.protocol,
            self.config.baud_rate()
        );
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }

    fn set_channel_range(
        &mut self,
        start_channel: u16,
        values: &[u8],
    ) -> Result<(), TransportError> {
        self.write_slots(start_channel, values)?;

        if let Err(e) = self.transmit() {
            // Unplugged devices surface here; drop the handle so the next
            // tick goes through open() again
            self.close();
            return Err(e);
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.port.take().is_some() {
            debug!("Closed {}", self.config.port);
        }
    }

    fn describe(&self) -> &str {
        &self.config.port
    }
}
