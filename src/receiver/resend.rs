//! Retransmission requests over the control port

use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::player::ResendRequester;
use crate::protocol::rtp::{ResendRequest, SeqRange};

/// Sends `0x55` resend requests to the sender's control port
#[derive(Debug)]
pub struct UdpResendRequester {
    socket: UdpSocket,
    target: Mutex<Option<SocketAddr>>,
    request_seq: AtomicU16,
}

impl UdpResendRequester {
    /// Send from `socket` (normally a clone of our control socket)
    #[must_use]
    pub fn new(socket: UdpSocket, target: Option<SocketAddr>) -> Self {
        Self {
            socket,
            target: Mutex::new(target),
            request_seq: AtomicU16::new(1),
        }
    }

    /// Sender control address, if known
    #[must_use]
    pub fn target(&self) -> Option<SocketAddr> {
        *self.target.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set the sender control address
    pub fn set_target(&self, addr: SocketAddr) {
        *self.target.lock().unwrap_or_else(PoisonError::into_inner) = Some(addr);
    }

    /// Set the address only if none is known yet
    pub fn learn_target(&self, addr: SocketAddr) {
        let mut target = self.target.lock().unwrap_or_else(PoisonError::into_inner);
        if target.is_none() {
            tracing::debug!(%addr, "Learned sender control address");
            *target = Some(addr);
        }
    }
}

impl ResendRequester for UdpResendRequester {
    fn request_resend(&self, range: SeqRange) {
        let Some(target) = self.target() else {
            tracing::debug!(
                first = range.first,
                count = range.count,
                "No sender control address, resend skipped"
            );
            return;
        };

        let seq = self.request_seq.fetch_add(1, Ordering::Relaxed);
        let request = ResendRequest::new(seq, range);
        if let Err(e) = self.socket.send_to(&request.encode(), target) {
            tracing::warn!(%target, error = %e, "Failed to send resend request");
        }
    }
}
