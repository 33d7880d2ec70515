use serde::{Deserialize, Serialize};
use std::fmt;

use crate::frame::BANK_COUNT;

/// Number of physical fixtures being driven.
///
/// Bank `b` feeds fixture `b % count`, so with two fixtures the even banks
/// light fixture 0 and the odd banks light fixture 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Topology {
    Two,
    Four,
    Eight,
}

/// How pure-green and orange indicators combine on the green channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GreenRule {
    /// Pure green gives full green; orange gives half green only when no
    /// pure green is lit.
    PureGreenFirst,
    /// Orange always lands at half green, even over a lit pure green.
    OrangeOverrides,
}

/// Largest fixture count of any topology
pub const MAX_FIXTURES: usize = 8;

impl Topology {
    pub const ALL: [Topology; 3] = [Topology::Two, Topology::Four, Topology::Eight];

    pub fn fixture_count(self) -> usize {
        match self {
            Topology::Two => 2,
            Topology::Four => 4,
            Topology::Eight => 8,
        }
    }

    /// Next topology in the operator cycle 2 -> 4 -> 8 -> 2
    pub fn next(self) -> Self {
        match self {
            Topology::Two => Topology::Four,
            Topology::Four => Topology::Eight,
            Topology::Eight => Topology::Two,
        }
    }

    /// Banks aggregated into `fixture`
    pub fn banks_for(self, fixture: usize) -> impl Iterator<Item = usize> {
        (fixture..BANK_COUNT).step_by(self.fixture_count())
    }

    pub fn fixture_for_bank(self, bank: usize) -> usize {
        bank % self.fixture_count()
    }

    /// Only the eight-fixture mapping lets orange win the green channel.
    pub fn green_rule(self) -> GreenRule {
        match self {
            Topology::Two | Topology::Four => GreenRule::PureGreenFirst,
            Topology::Eight => GreenRule::OrangeOverrides,
        }
    }
}

impl Default for Topology {
    fn default() -> Self {
        Topology::Four
    }
}

impl TryFrom<u8> for Topology {
    type Error = String;

    fn try_from(count: u8) -> Result<Self, Self::Error> {
        match count {
            2 => Ok(Topology::Two),
            4 => Ok(Topology::Four),
            8 => Ok(Topology::Eight),
            other => Err(format!("unsupported fixture count {} (expected 2, 4 or 8)", other)),
        }
    }
}

impl From<Topology> for u8 {
    fn from(topology: Topology) -> u8 {
        topology.fixture_count() as u8
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} fixtures", self.fixture_count())
    }
}

/// clap value parser for `--topology`
pub fn parse_topology(arg: &str) -> Result<Topology, String> {
    let count: u8 = arg
        .parse()
        .map_err(|_| format!("'{}' is not a fixture count", arg))?;
    Topology::try_from(count)
}
