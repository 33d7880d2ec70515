//! Latest decoded lights, shared between the decode worker and the output
//! scheduler.
//!
//! The whole tuple lives in one immutable [`LightSnapshot`] behind an
//! [`ArcSwap`]. Writers build a new snapshot and swap it in; readers get a
//! consistent `Arc` and never see fields from two different decodes.

use arc_swap::ArcSwap;
use std::sync::Arc;

use crate::decoder::{map_frame, DecodeOutcome, LightFrame};
use crate::fixture::{FixtureState, StrobeLevel};
use crate::frame::RawStatusFrame;
use crate::topology::Topology;

/// Amount one dimming step lowers the master dimmer
pub const DIMMING_STEP: u8 = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LightSnapshot {
    pub topology: Topology,
    /// Always exactly `topology.fixture_count()` entries
    pub fixtures: Vec<FixtureState>,
    pub strobe: StrobeLevel,
    /// Master dimmer written to every fixture
    pub dimming: u8,
    /// Bumped on every applied frame
    pub generation: u64,
    /// Last applied frame, re-mapped when the topology changes
    source: Option<RawStatusFrame>,
}

impl LightSnapshot {
    fn blank(topology: Topology, dimming: u8) -> Self {
        LightSnapshot {
            topology,
            fixtures: vec![FixtureState::OFF; topology.fixture_count()],
            strobe: StrobeLevel::Off,
            dimming,
            generation: 0,
            source: None,
        }
    }

    fn with_lights(&self, lights: LightFrame, source: Option<RawStatusFrame>) -> Self {
        LightSnapshot {
            topology: lights.topology,
            fixtures: lights.fixtures,
            strobe: lights.strobe,
            dimming: self.dimming,
            generation: self.generation + 1,
            source,
        }
    }
}

/// Result of publishing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    Applied { generation: u64 },
    Held { strobe_code: u8 },
}

pub struct LightState {
    current: ArcSwap<LightSnapshot>,
}

impl LightState {
    pub fn new(topology: Topology, dimming: u8) -> Self {
        LightState {
            current: ArcSwap::from_pointee(LightSnapshot::blank(topology, dimming)),
        }
    }

    /// Consistent copy of the current state
    pub fn snapshot(&self) -> Arc<LightSnapshot> {
        self.current.load_full()
    }

    pub fn topology(&self) -> Topology {
        self.current.load().topology
    }

    /// Decode `frame` under the current topology and swap the result in.
    ///
    /// Decoding runs inside the swap so a concurrent topology change can't
    /// leave a fixture array of the wrong length. An unrecognized strobe code
    /// leaves the current state untouched.
    pub fn publish(&self, frame: &RawStatusFrame) -> Published {
        let mut outcome = Published::Held { strobe_code: 0 };

        self.current.rcu(|prev| match map_frame(frame, prev.topology) {
            DecodeOutcome::Apply(lights) => {
                let next = prev.with_lights(lights, Some(*frame));
                outcome = Published::Applied {
                    generation: next.generation,
                };
                Arc::new(next)
            }
            DecodeOutcome::Hold { strobe_code } => {
                outcome = Published::Held { strobe_code };
                Arc::clone(prev)
            }
        });

        outcome
    }

    /// Switch topology, re-mapping the last applied frame for the new fixture
    /// count. Fixtures are blanked when there is nothing to re-map.
    pub fn set_topology(&self, topology: Topology) {
        self.current.rcu(|prev| {
            if prev.topology == topology {
                return Arc::clone(prev);
            }
            let remapped = prev.source.as_ref().and_then(|frame| match map_frame(frame, topology) {
                DecodeOutcome::Apply(lights) => Some(prev.with_lights(lights, Some(*frame))),
                DecodeOutcome::Hold { .. } => None,
            });
            Arc::new(remapped.unwrap_or_else(|| LightSnapshot {
                generation: prev.generation + 1,
                ..LightSnapshot::blank(topology, prev.dimming)
            }))
        });
    }

    /// Advance 2 -> 4 -> 8 -> 2, returning the new topology
    pub fn cycle_topology(&self) -> Topology {
        let next = self.topology().next();
        self.set_topology(next);
        next
    }

    /// Lower the master dimmer by one step, wrapping back to full
    pub fn step_dimming(&self) -> u8 {
        let prev = self.current.rcu(|prev| {
            Arc::new(LightSnapshot {
                dimming: next_dimming(prev.dimming),
                ..LightSnapshot::clone(prev)
            })
        });
        next_dimming(prev.dimming)
    }
}

fn next_dimming(level: u8) -> u8 {
    if level < DIMMING_STEP {
        u8::MAX
    } else {
        level - DIMMING_STEP
    }
}
