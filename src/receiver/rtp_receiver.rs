//! Blocking UDP receive loops for the audio and control ports
//!
//! Each port gets its own thread. Reads time out periodically so the stop
//! flag is observed without any traffic.

use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use super::resend::UdpResendRequester;
use crate::error::PlayoutError;
use crate::player::PlayoutEngine;
use crate::protocol::rtp::ControlPacket;

/// Maximum UDP packet size
const MAX_PACKET_SIZE: usize = 2048;

/// Network receiver configuration
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Audio port bind address (port 0 = auto-assign)
    pub audio_bind: SocketAddr,

    /// Control port bind address (port 0 = auto-assign)
    pub control_bind: SocketAddr,

    /// Sender control port, if known from SETUP
    ///
    /// When unset it is learned from the first control packet.
    pub sender_control: Option<SocketAddr>,

    /// Socket read timeout; bounds how long `shutdown` waits
    pub read_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            audio_bind: SocketAddr::from(([0, 0, 0, 0], 6000)),
            control_bind: SocketAddr::from(([0, 0, 0, 0], 6001)),
            sender_control: None,
            read_timeout: Duration::from_millis(100),
        }
    }
}

impl ReceiverConfig {
    /// Bind both ports on localhost with auto-assigned ports
    #[must_use]
    pub fn loopback() -> Self {
        Self {
            audio_bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            control_bind: SocketAddr::from(([127, 0, 0, 1], 0)),
            ..Self::default()
        }
    }

    /// Set the sender control address
    #[must_use]
    pub fn sender_control(mut self, addr: SocketAddr) -> Self {
        self.sender_control = Some(addr);
        self
    }

    /// Set the read timeout
    #[must_use]
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

/// Audio and control port receiver feeding a `PlayoutEngine`
#[derive(Debug)]
pub struct RtpReceiver {
    audio_addr: SocketAddr,
    control_addr: SocketAddr,
    requester: Arc<UdpResendRequester>,
    stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl RtpReceiver {
    /// Bind both sockets, install the resend requester and start receiving
    ///
    /// # Errors
    ///
    /// Returns `PlayoutError::Io` if a socket cannot be bound or configured
    /// and `PlayoutError::ThreadSpawn` if a receive thread cannot start.
    pub fn bind(config: &ReceiverConfig, engine: Arc<PlayoutEngine>) -> Result<Self, PlayoutError> {
        let audio = UdpSocket::bind(config.audio_bind)?;
        let control = UdpSocket::bind(config.control_bind)?;
        audio.set_read_timeout(Some(config.read_timeout))?;
        control.set_read_timeout(Some(config.read_timeout))?;

        let audio_addr = audio.local_addr()?;
        let control_addr = control.local_addr()?;

        let requester = Arc::new(UdpResendRequester::new(
            control.try_clone()?,
            config.sender_control,
        ));
        engine.set_resend_requester(requester.clone());

        let stop = Arc::new(AtomicBool::new(false));
        let mut receiver = Self {
            audio_addr,
            control_addr,
            requester: requester.clone(),
            stop: stop.clone(),
            threads: Vec::with_capacity(2),
        };

        let audio_loop = AudioLoop {
            socket: audio,
            engine: engine.clone(),
            stop: stop.clone(),
        };
        receiver.threads.push(
            std::thread::Builder::new()
                .name("raop-audio-rx".into())
                .spawn(move || audio_loop.run())
                .map_err(PlayoutError::ThreadSpawn)?,
        );

        let control_loop = ControlLoop {
            socket: control,
            engine,
            requester,
            stop,
        };
        receiver.threads.push(
            std::thread::Builder::new()
                .name("raop-control-rx".into())
                .spawn(move || control_loop.run())
                .map_err(PlayoutError::ThreadSpawn)?,
        );

        tracing::info!(%audio_addr, %control_addr, "RTP receiver listening");
        Ok(receiver)
    }

    /// Bound audio port address
    #[must_use]
    pub fn audio_addr(&self) -> SocketAddr {
        self.audio_addr
    }

    /// Bound control port address
    #[must_use]
    pub fn control_addr(&self) -> SocketAddr {
        self.control_addr
    }

    /// Set where resend requests go
    pub fn set_sender_control(&self, addr: SocketAddr) {
        self.requester.set_target(addr);
    }

    /// Stop both threads and wait for them
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                tracing::error!("Receive thread panicked");
            }
        }
    }
}

impl Drop for RtpReceiver {
    fn drop(&mut self) {
        self.join();
    }
}

/// Whether a receive error is just the periodic timeout
fn is_timeout(kind: ErrorKind) -> bool {
    matches!(kind, ErrorKind::WouldBlock | ErrorKind::TimedOut)
}

struct AudioLoop {
    socket: UdpSocket,
    engine: Arc<PlayoutEngine>,
    stop: Arc<AtomicBool>,
}

impl AudioLoop {
    fn run(self) {
        let mut buf = [0u8; MAX_PACKET_SIZE];

        while !self.stop.load(Ordering::SeqCst) {
            let len = match self.socket.recv_from(&mut buf) {
                Ok((len, _)) => len,
                Err(e) if is_timeout(e.kind()) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Audio socket error");
                    continue;
                }
            };

            if let Err(e) = self.engine.handle_datagram(&buf[..len]) {
                tracing::debug!(error = %e, len, "Ignoring audio datagram");
            }
        }
        tracing::debug!("Audio receiver stopped");
    }
}

struct ControlLoop {
    socket: UdpSocket,
    engine: Arc<PlayoutEngine>,
    requester: Arc<UdpResendRequester>,
    stop: Arc<AtomicBool>,
}

impl ControlLoop {
    fn run(self) {
        let mut buf = [0u8; MAX_PACKET_SIZE];

        while !self.stop.load(Ordering::SeqCst) {
            let (len, src) = match self.socket.recv_from(&mut buf) {
                Ok(received) => received,
                Err(e) if is_timeout(e.kind()) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "Control socket error");
                    continue;
                }
            };

            match ControlPacket::decode(&buf[..len]) {
                Ok(ControlPacket::Sync(sync)) => {
                    self.requester.learn_target(src);
                    self.engine
                        .set_anchor(sync.rtp_timestamp_at_ntp, self.engine.now());
                }
                Ok(ControlPacket::Resent(datagram)) => {
                    if let Err(e) = self.engine.handle_datagram(datagram) {
                        tracing::debug!(error = %e, "Ignoring malformed resent packet");
                    }
                }
                Err(e) => tracing::debug!(error = %e, len, "Ignoring control datagram"),
            }
        }
        tracing::debug!("Control receiver stopped");
    }
}
