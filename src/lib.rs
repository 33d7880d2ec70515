//! Stage kit lighting bridge: decodes the game's 8-bank stage kit status
//! frames and drives 2, 4 or 8 RGB par cans over DMX at a fixed refresh rate.

pub mod bridge;
pub mod config;
pub mod decoder;
pub mod error;
pub mod fixture;
pub mod frame;
pub mod ingest;
pub mod light_state;
pub mod logging;
pub mod manual;
pub mod operator;
pub mod protocol;
pub mod scheduler;
pub mod stats;
pub mod topology;
pub mod transport;
