use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::topology::Topology;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub sacn: SacnConfig,
    pub output: OutputConfig,
    pub fixtures: FixtureConfig,
    pub ingest: IngestConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SacnConfig {
    /// Local address to listen on
    pub bind_address: String,
    /// Universe the game transmits on
    pub universe: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DongleProtocol {
    /// FTDI-based dongle driven by host-generated break
    OpenDmx,
    /// Enttec DMX USB Pro widget messages
    UsbPro,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    pub port: String,
    pub protocol: DongleProtocol,
    /// Serial speed; picked per protocol when unset
    pub baud_rate: Option<u32>,
    /// Output refresh rate in Hz
    pub refresh_hz: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FixtureConfig {
    pub topology: Topology,
    /// Initial master dimmer
    pub dimming: u8,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Frames buffered between receive and decode before the oldest is dropped
    pub queue_capacity: usize,
}

impl Default for SacnConfig {
    fn default() -> Self {
        SacnConfig {
            bind_address: "0.0.0.0".to_string(),
            universe: 1,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            port: "/dev/ttyUSB0".to_string(),
            protocol: DongleProtocol::OpenDmx,
            baud_rate: None,
            refresh_hz: 60,
        }
    }
}

impl OutputConfig {
    pub fn baud_rate(&self) -> u32 {
        self.baud_rate.unwrap_or(match self.protocol {
            DongleProtocol::OpenDmx => 250_000,
            DongleProtocol::UsbPro => 57_600,
        })
    }

    pub fn refresh_period(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.refresh_hz.max(1)))
    }
}

impl Default for FixtureConfig {
    fn default() -> Self {
        FixtureConfig {
            topology: Topology::default(),
            dimming: 255,
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        IngestConfig { queue_capacity: 64 }
    }
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        if self.sacn.universe == 0 || self.sacn.universe > 63999 {
            bail!(
                "Invalid sACN universe: {} (must be 1-63999)",
                self.sacn.universe
            );
        }
        if self.output.refresh_hz == 0 || self.output.refresh_hz > 1000 {
            bail!(
                "Invalid refresh rate: {} Hz (must be 1-1000)",
                self.output.refresh_hz
            );
        }
        if self.ingest.queue_capacity == 0 {
            bail!("Ingest queue capacity must be at least 1");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.sacn.universe, 1);
        assert_eq!(config.output.protocol, DongleProtocol::OpenDmx);
        assert_eq!(config.output.baud_rate(), 250_000);
        assert_eq!(config.fixtures.topology, Topology::Four);
        assert_eq!(config.fixtures.dimming, 255);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_config() {
        let json = r#"{
            "output": { "port": "COM3", "protocol": "usb-pro" },
            "fixtures": { "topology": 8 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.output.port, "COM3");
        assert_eq!(config.output.protocol, DongleProtocol::UsbPro);
        assert_eq!(config.output.baud_rate(), 57_600);
        assert_eq!(config.output.refresh_hz, 60);
        assert_eq!(config.fixtures.topology, Topology::Eight);
    }

    #[test]
    fn test_refresh_period() {
        let output = OutputConfig::default();
        assert_eq!(output.refresh_period(), Duration::from_micros(16_666));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = Config::default();
        config.sacn.universe = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.output.refresh_hz = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.ingest.queue_capacity = 0;
        assert!(config.validate().is_err());

        assert!(serde_json::from_str::<Config>(r#"{"fixtures":{"topology":3}}"#).is_err());
    }
}
