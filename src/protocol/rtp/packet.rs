use thiserror::Error;

/// RTP payload types seen on the RAOP audio and control ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PayloadType {
    /// Sync packet (sender -> receiver, control port)
    Sync = 0x54,
    /// Retransmit request (receiver -> sender, control port)
    RetransmitRequest = 0x55,
    /// Retransmitted audio packet wrapped in a 4-byte prefix
    RetransmitResponse = 0x56,
    /// Audio data (realtime)
    AudioRealtime = 0x60,
    /// Audio data (buffered)
    AudioBuffered = 0x61,
}

impl PayloadType {
    /// Parse from byte value (marker bit ignored)
    #[must_use]
    pub fn from_byte(b: u8) -> Option<Self> {
        match b & 0x7F {
            0x54 => Some(Self::Sync),
            0x55 => Some(Self::RetransmitRequest),
            0x56 => Some(Self::RetransmitResponse),
            0x60 => Some(Self::AudioRealtime),
            0x61 => Some(Self::AudioBuffered),
            _ => None,
        }
    }

    /// Whether the payload carries audio
    #[must_use]
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::AudioRealtime | Self::AudioBuffered)
    }
}

/// RTP decode errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PacketError {
    #[error("buffer too small: need {needed} bytes, have {have}")]
    BufferTooSmall { needed: usize, have: usize },

    #[error("invalid RTP version: {0}")]
    InvalidVersion(u8),

    #[error("unknown payload type: 0x{0:02x}")]
    UnknownPayloadType(u8),
}

/// One audio packet as handed to the jitter buffer
///
/// Borrows the still-encrypted payload from the receive buffer.
#[derive(Debug, Clone, Copy)]
pub struct AudioPacket<'a> {
    /// RTP sequence number
    pub sequence: u16,
    /// RTP timestamp of the first frame in the packet
    pub timestamp: u32,
    /// Synchronization source
    pub ssrc: u32,
    /// Encrypted codec payload
    pub payload: &'a [u8],
}

impl<'a> AudioPacket<'a> {
    /// Fixed RTP header size
    pub const HEADER_SIZE: usize = 12;

    /// Prefix carried by packets relayed in a retransmit response
    pub const RESEND_PREFIX_SIZE: usize = 4;

    /// Parse an audio packet straight off the audio port
    ///
    /// # Errors
    ///
    /// Returns `PacketError` if the datagram is truncated, not RTP version 2,
    /// or does not carry audio.
    pub fn parse(buf: &'a [u8]) -> Result<Self, PacketError> {
        if buf.len() < Self::HEADER_SIZE {
            return Err(PacketError::BufferTooSmall {
                needed: Self::HEADER_SIZE,
                have: buf.len(),
            });
        }

        let version = (buf[0] >> 6) & 0x03;
        if version != 2 {
            return Err(PacketError::InvalidVersion(version));
        }

        match PayloadType::from_byte(buf[1]) {
            Some(pt) if pt.is_audio() => {}
            _ => return Err(PacketError::UnknownPayloadType(buf[1] & 0x7F)),
        }

        Ok(Self {
            sequence: u16::from_be_bytes([buf[2], buf[3]]),
            timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ssrc: u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]]),
            payload: &buf[Self::HEADER_SIZE..],
        })
    }

    /// Parse an audio packet relayed through a retransmit response
    ///
    /// The outer 4 bytes (`0x80 0xD6 seq seq`) are stripped before the
    /// inner packet is parsed.
    ///
    /// # Errors
    ///
    /// Returns `PacketError` if the datagram is truncated or the inner packet
    /// is malformed.
    pub fn parse_resent(buf: &'a [u8]) -> Result<Self, PacketError> {
        let needed = Self::RESEND_PREFIX_SIZE + Self::HEADER_SIZE;
        if buf.len() < needed {
            return Err(PacketError::BufferTooSmall {
                needed,
                have: buf.len(),
            });
        }
        Self::parse(&buf[Self::RESEND_PREFIX_SIZE..])
    }

    /// Build the wire form of an audio packet (used by test senders)
    #[must_use]
    pub fn encode(sequence: u16, timestamp: u32, ssrc: u32, payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::HEADER_SIZE + payload.len());
        buf.push(0x80);
        buf.push(0x80 | PayloadType::AudioRealtime as u8);
        buf.extend_from_slice(&sequence.to_be_bytes());
        buf.extend_from_slice(&timestamp.to_be_bytes());
        buf.extend_from_slice(&ssrc.to_be_bytes());
        buf.extend_from_slice(payload);
        buf
    }

    /// Wrap an encoded audio packet the way a sender answers a resend request
    #[must_use]
    pub fn wrap_resent(sequence: u16, packet: &[u8]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::RESEND_PREFIX_SIZE + packet.len());
        buf.push(0x80);
        buf.push(0x80 | PayloadType::RetransmitResponse as u8);
        buf.extend_from_slice(&sequence.to_be_bytes());
        buf.extend_from_slice(packet);
        buf
    }
}
