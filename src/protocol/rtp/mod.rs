//! RTP/RAOP packet formats consumed and produced by the playout engine

#![allow(missing_docs)]

mod control;
mod packet;
pub mod sequence;

#[cfg(test)]
mod control_tests;

pub use control::{ControlPacket, ResendRequest, SyncPacket};
pub use packet::{AudioPacket, PacketError, PayloadType};
pub use sequence::{SeqNum, SeqRange};
