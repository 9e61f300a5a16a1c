pub mod packet;
pub mod capture;

pub use capture::{CaptureSource, PacketCapture, PcapFileCapture};
pub use packet::RawFrame;
