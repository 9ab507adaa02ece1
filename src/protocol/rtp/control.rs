use bytes::{BufMut, BytesMut};

use super::packet::{PacketError, PayloadType};
use super::sequence::SeqRange;

/// Retransmit request sent to the sender's control port
///
/// Not a standard RTCP NACK: 8 bytes, `[0x80, 0xD5, our_seq, first, count]`
/// with all 16-bit fields big-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResendRequest {
    /// Our own request counter
    pub request_seq: u16,
    /// First missing sequence number
    pub first: u16,
    /// Number of consecutive packets requested
    pub count: u16,
}

impl ResendRequest {
    /// Encoded size in bytes
    pub const SIZE: usize = 8;

    /// Create a request covering `range`
    #[must_use]
    pub fn new(request_seq: u16, range: SeqRange) -> Self {
        Self {
            request_seq,
            first: range.first,
            count: range.count,
        }
    }

    /// Encode to wire format
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(0x80);
        buf.put_u8(0x80 | PayloadType::RetransmitRequest as u8);
        buf.put_u16(self.request_seq);
        buf.put_u16(self.first);
        buf.put_u16(self.count);

        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(&buf);
        out
    }

    /// Decode from wire format
    ///
    /// # Errors
    ///
    /// Returns `PacketError` if the buffer is short or not a resend request.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < Self::SIZE {
            return Err(PacketError::BufferTooSmall {
                needed: Self::SIZE,
                have: buf.len(),
            });
        }
        if PayloadType::from_byte(buf[1]) != Some(PayloadType::RetransmitRequest) {
            return Err(PacketError::UnknownPayloadType(buf[1] & 0x7F));
        }

        Ok(Self {
            request_seq: u16::from_be_bytes([buf[2], buf[3]]),
            first: u16::from_be_bytes([buf[4], buf[5]]),
            count: u16::from_be_bytes([buf[6], buf[7]]),
        })
    }

    /// The sequence span this request asks for
    #[must_use]
    pub fn range(&self) -> SeqRange {
        SeqRange {
            first: self.first,
            count: self.count,
        }
    }
}

/// Sync packet from the sender's control port
///
/// Ties an RTP timestamp to the sender's NTP clock; the receiver uses it as
/// its reference anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPacket {
    /// Extension bit, set on the first sync after RECORD or FLUSH
    pub extension: bool,
    /// RTP timestamp currently being played, minus the sender latency
    pub rtp_timestamp: u32,
    /// Sender NTP time (32.32 fixed point)
    pub ntp_time: u64,
    /// RTP timestamp playing at `ntp_time`
    pub rtp_timestamp_at_ntp: u32,
}

impl SyncPacket {
    /// Encoded size in bytes
    pub const SIZE: usize = 20;

    /// Decode from wire format
    ///
    /// # Errors
    ///
    /// Returns `PacketError` if the buffer is short or not a sync packet.
    pub fn decode(buf: &[u8]) -> Result<Self, PacketError> {
        if buf.len() < Self::SIZE {
            return Err(PacketError::BufferTooSmall {
                needed: Self::SIZE,
                have: buf.len(),
            });
        }
        if PayloadType::from_byte(buf[1]) != Some(PayloadType::Sync) {
            return Err(PacketError::UnknownPayloadType(buf[1] & 0x7F));
        }

        Ok(Self {
            extension: (buf[0] & 0x10) != 0,
            rtp_timestamp: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            ntp_time: u64::from_be_bytes([
                buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
            ]),
            rtp_timestamp_at_ntp: u32::from_be_bytes([buf[16], buf[17], buf[18], buf[19]]),
        })
    }

    /// Encode to wire format
    #[must_use]
    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = BytesMut::with_capacity(Self::SIZE);
        buf.put_u8(if self.extension { 0x90 } else { 0x80 });
        buf.put_u8(0x80 | PayloadType::Sync as u8);
        buf.put_u16(0x0007);
        buf.put_u32(self.rtp_timestamp);
        buf.put_u64(self.ntp_time);
        buf.put_u32(self.rtp_timestamp_at_ntp);

        let mut out = [0u8; Self::SIZE];
        out.copy_from_slice(&buf);
        out
    }
}

/// Datagram received on the control port
#[derive(Debug, Clone)]
pub enum ControlPacket<'a> {
    /// Timing anchor from the sender
    Sync(SyncPacket),
    /// Audio packet answering one of our resend requests
    Resent(&'a [u8]),
}

impl<'a> ControlPacket<'a> {
    /// Classify a control-port datagram
    ///
    /// # Errors
    ///
    /// Returns `PacketError` for truncated or unrelated packets.
    pub fn decode(buf: &'a [u8]) -> Result<Self, PacketError> {
        if buf.len() < 4 {
            return Err(PacketError::BufferTooSmall {
                needed: 4,
                have: buf.len(),
            });
        }

        match PayloadType::from_byte(buf[1]) {
            Some(PayloadType::Sync) => Ok(Self::Sync(SyncPacket::decode(buf)?)),
            Some(PayloadType::RetransmitResponse) => Ok(Self::Resent(buf)),
            _ => Err(PacketError::UnknownPayloadType(buf[1] & 0x7F)),
        }
    }
}
