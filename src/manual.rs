use std::sync::atomic::{AtomicU8, Ordering};

use crate::fixture::{FixtureState, StrobeLevel};
use crate::topology::Topology;

const NONE: u8 = u8::MAX;

/// Operator single-fixture test mode.
///
/// While set, the scheduler renders the chosen fixture solid blue and every
/// other fixture off, ignoring decoded lights and strobe. The decode path
/// keeps publishing underneath so clearing it resumes normal output at once.
#[derive(Debug)]
pub struct ManualOverride {
    fixture: AtomicU8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toggled {
    On(usize),
    Off,
    /// Index not addressable in the active topology
    Ignored,
}

impl ManualOverride {
    pub fn new() -> Self {
        ManualOverride {
            fixture: AtomicU8::new(NONE),
        }
    }

    pub fn active(&self) -> Option<usize> {
        match self.fixture.load(Ordering::Acquire) {
            NONE => None,
            index => Some(index as usize),
        }
    }

    /// Select `index`, or clear the override if `index` is already selected.
    pub fn toggle(&self, index: usize, topology: Topology) -> Toggled {
        if index >= topology.fixture_count() {
            return Toggled::Ignored;
        }
        let index = index as u8;

        let prev = self
            .fixture
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some(if current == index { NONE } else { index })
            })
            .unwrap_or(NONE);

        if prev == index {
            Toggled::Off
        } else {
            Toggled::On(index as usize)
        }
    }

    pub fn clear(&self) {
        self.fixture.store(NONE, Ordering::Release);
    }

    /// Drop the override when it points past the fixtures of `topology`
    pub fn clamp_to(&self, topology: Topology) {
        let count = topology.fixture_count() as u8;
        let _ = self
            .fixture
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                (current != NONE && current >= count).then_some(NONE)
            });
    }
}

impl Default for ManualOverride {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixture colors shown while the override targets `index`
pub fn override_pattern(index: usize, topology: Topology) -> (Vec<FixtureState>, StrobeLevel) {
    let fixtures = (0..topology.fixture_count())
        .map(|i| if i == index { FixtureState::BLUE } else { FixtureState::OFF })
        .collect();
    (fixtures, StrobeLevel::Off)
}
