//! Fixture colors and the 7-channel fixture layout.
//!
//! Each par can is patched in 7-channel mode at 1, 8, 15, ... :
//! dimmer, red, green, blue, (macro), strobe, (mode).

/// Channels occupied by one fixture
pub const CHANNELS_PER_FIXTURE: usize = 7;

/// Discrete channel intensity. The source signal is one bit per color, so
/// these are the only levels a fixture ever shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Intensity {
    #[default]
    Off,
    Half,
    Full,
}

impl Intensity {
    pub fn value(self) -> u8 {
        match self {
            Intensity::Off => 0,
            Intensity::Half => 128,
            Intensity::Full => 255,
        }
    }

    pub fn from_lit(lit: bool) -> Self {
        if lit {
            Intensity::Full
        } else {
            Intensity::Off
        }
    }
}

/// Color of one fixture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FixtureState {
    pub red: Intensity,
    pub green: Intensity,
    pub blue: Intensity,
}

impl FixtureState {
    pub const OFF: FixtureState = FixtureState {
        red: Intensity::Off,
        green: Intensity::Off,
        blue: Intensity::Off,
    };

    pub const WHITE: FixtureState = FixtureState {
        red: Intensity::Full,
        green: Intensity::Full,
        blue: Intensity::Full,
    };

    /// Manual test pattern color
    pub const BLUE: FixtureState = FixtureState {
        red: Intensity::Off,
        green: Intensity::Off,
        blue: Intensity::Full,
    };

    pub fn rgb(&self) -> (u8, u8, u8) {
        (self.red.value(), self.green.value(), self.blue.value())
    }
}

/// Frame-global strobe setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StrobeLevel {
    #[default]
    Off,
    Slow,
    Fast,
}

impl StrobeLevel {
    /// Map the raw strobe command byte. Unrecognized codes return `None`.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(StrobeLevel::Off),
            64 => Some(StrobeLevel::Slow),
            191 => Some(StrobeLevel::Fast),
            _ => None,
        }
    }

    /// Value written to each fixture's strobe channel
    pub fn value(self) -> u8 {
        match self {
            StrobeLevel::Off => 0,
            StrobeLevel::Slow => 220,
            StrobeLevel::Fast => 240,
        }
    }

    pub fn is_active(self) -> bool {
        self != StrobeLevel::Off
    }
}

/// Render fixtures into wire-ready channel bytes starting at channel 1
pub fn render_channels(fixtures: &[FixtureState], strobe: StrobeLevel, dimmer: u8) -> Vec<u8> {
    let mut frame = Vec::with_capacity(fixtures.len() * CHANNELS_PER_FIXTURE);

    for fixture in fixtures {
        let (r, g, b) = fixture.rgb();
        frame.extend_from_slice(&[dimmer, r, g, b, 0, strobe.value(), 0]);
    }

    frame
}
