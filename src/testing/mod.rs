//! Test helpers: a sender-side packet factory, recording sink and resend
//! log, and a network impairment simulator

pub mod capture_sink;
pub mod network_sim;
pub mod packet_factory;
pub mod resend_log;

pub use capture_sink::{CaptureHandle, CaptureSink, Captured};
pub use network_sim::NetworkSimulator;
pub use packet_factory::{PacketFactory, SentPacket, tone};
pub use resend_log::ResendLog;
