//! Status frame to fixture color mapping.
//!
//! Every topology runs the same rules; the topology only decides which banks
//! feed which fixture and how orange sits on the green channel:
//!
//! - red is full when any red or orange indicator of the fixture's banks is lit
//! - blue is full when any blue indicator is lit
//! - green is full for pure green and half for orange (see [`GreenRule`])
//! - an active strobe turns every fixture white

use crate::fixture::{FixtureState, Intensity, StrobeLevel};
use crate::frame::RawStatusFrame;
use crate::topology::{GreenRule, Topology};

/// Fixture colors decoded from one frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightFrame {
    pub topology: Topology,
    pub fixtures: Vec<FixtureState>,
    pub strobe: StrobeLevel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// Replace the current lights with these
    Apply(LightFrame),
    /// Strobe byte held an unrecognized code; keep the current lights
    Hold { strobe_code: u8 },
}

/// Map an already captured frame. Never fails.
pub fn map_frame(frame: &RawStatusFrame, topology: Topology) -> DecodeOutcome {
    let strobe_code = frame.strobe_code();
    let Some(strobe) = StrobeLevel::from_code(strobe_code) else {
        return DecodeOutcome::Hold { strobe_code };
    };

    let count = topology.fixture_count();
    let fixtures = if strobe.is_active() {
        vec![FixtureState::WHITE; count]
    } else {
        (0..count)
            .map(|fixture| fixture_color(frame, topology, fixture))
            .collect()
    };

    DecodeOutcome::Apply(LightFrame {
        topology,
        fixtures,
        strobe,
    })
}

fn fixture_color(frame: &RawStatusFrame, topology: Topology, fixture: usize) -> FixtureState {
    let (mut red, mut green, mut blue, mut orange) = (false, false, false, false);

    for bank in topology.banks_for(fixture) {
        let lit = frame.bank(bank);
        red |= lit.red;
        green |= lit.green;
        blue |= lit.blue;
        orange |= lit.orange;
    }

    let green = match (topology.green_rule(), green, orange) {
        (GreenRule::PureGreenFirst, true, _) => Intensity::Full,
        (GreenRule::OrangeOverrides, _, true) => Intensity::Half,
        (_, true, _) => Intensity::Full,
        (_, false, true) => Intensity::Half,
        (_, false, false) => Intensity::Off,
    };

    FixtureState {
        red: Intensity::from_lit(red || orange),
        green,
        blue: Intensity::from_lit(blue),
    }
}
