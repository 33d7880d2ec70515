mod open_dmx;
mod usb_pro;

pub use open_dmx::{build_open_dmx_packet, MIN_SLOTS};
pub use usb_pro::build_usb_pro_packet;
