//! Network side of the receiver: UDP audio and control ports

pub mod resend;
pub mod rtp_receiver;


pub use resend::UdpResendRequester;
pub use rtp_receiver::{ReceiverConfig, RtpReceiver};
