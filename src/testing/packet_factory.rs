//! Sender-side packet construction for tests
//!
//! Encodes PCM exactly like a RAOP sender does: codec step (ALAC or L16),
//! AES-128-CBC over whole blocks, then the 12-byte RTP header.

use std::f64::consts::PI;

use crate::audio::format::{AudioCodec, CHANNELS, StreamParameters};
use crate::protocol::crypto::AesCbcCipher;
use crate::protocol::rtp::AudioPacket;

enum Encoder {
    Alac(Box<alac_encoder::AlacEncoder>),
    Pcm,
}

/// Builds encrypted RTP audio packets from PCM frames
pub struct PacketFactory {
    encoder: Encoder,
    cipher: Option<AesCbcCipher>,
    sample_rate: u32,
    frames_per_packet: u32,
    ssrc: u32,
    sequence: u16,
    timestamp: u32,
    scratch: Vec<u8>,
}

/// One packet produced by `PacketFactory::next_packet`
#[derive(Debug, Clone)]
pub struct SentPacket {
    /// RTP sequence number
    pub sequence: u16,
    /// RTP timestamp
    pub timestamp: u32,
    /// PCM the packet encodes
    pub pcm: Vec<i16>,
    /// Full datagram as sent on the audio port
    pub datagram: Vec<u8>,
}

impl PacketFactory {
    /// Create a factory matching the receiver's stream parameters
    #[must_use]
    pub fn new(params: &StreamParameters) -> Self {
        let encoder = match params.codec {
            AudioCodec::Alac(_) => {
                #[allow(clippy::cast_possible_truncation)]
                let format = alac_encoder::FormatDescription::alac(
                    f64::from(params.sample_rate),
                    params.frames_per_packet,
                    CHANNELS as u32,
                );
                Encoder::Alac(Box::new(alac_encoder::AlacEncoder::new(&format)))
            }
            AudioCodec::Pcm => Encoder::Pcm,
        };

        let cipher = match (params.aes_key, params.aes_iv) {
            (Some(key), Some(iv)) => AesCbcCipher::new(&key, &iv).ok(),
            _ => None,
        };

        Self {
            encoder,
            cipher,
            sample_rate: params.sample_rate,
            frames_per_packet: params.frames_per_packet,
            ssrc: 0x1234_5678,
            sequence: 0,
            timestamp: 0,
            scratch: vec![0u8; 8192],
        }
    }

    /// Set the next sequence number and timestamp handed out by `next_packet`
    #[must_use]
    pub fn starting_at(mut self, sequence: u16, timestamp: u32) -> Self {
        self.sequence = sequence;
        self.timestamp = timestamp;
        self
    }

    /// Codec-encode a frame without encrypting it
    pub fn plain_payload(&mut self, pcm: &[i16]) -> Vec<u8> {
        match self.encoder {
            Encoder::Alac(ref mut encoder) => {
                #[allow(clippy::cast_possible_truncation)]
                let input = alac_encoder::FormatDescription::pcm::<i16>(
                    f64::from(self.sample_rate),
                    CHANNELS as u32,
                );
                let bytes: Vec<u8> = pcm.iter().flat_map(|s| s.to_le_bytes()).collect();
                let size = encoder.encode(&input, &bytes, &mut self.scratch);
                self.scratch[..size.min(self.scratch.len())].to_vec()
            }
            Encoder::Pcm => pcm.iter().flat_map(|s| s.to_be_bytes()).collect(),
        }
    }

    /// Codec-encode and encrypt a frame
    pub fn encode_payload(&mut self, pcm: &[i16]) -> Vec<u8> {
        let plain = self.plain_payload(pcm);
        match self.cipher {
            Some(ref cipher) => cipher.encrypt(&plain),
            None => plain,
        }
    }

    /// Build a complete datagram for the given sequence number and timestamp
    pub fn packet(&mut self, sequence: u16, timestamp: u32, pcm: &[i16]) -> Vec<u8> {
        let payload = self.encode_payload(pcm);
        AudioPacket::encode(sequence, timestamp, self.ssrc, &payload)
    }

    /// Build the next packet in sequence from `pcm`
    pub fn next_packet(&mut self, pcm: Vec<i16>) -> SentPacket {
        let sequence = self.sequence;
        let timestamp = self.timestamp;
        let datagram = self.packet(sequence, timestamp, &pcm);

        self.sequence = self.sequence.wrapping_add(1);
        self.timestamp = self.timestamp.wrapping_add(self.frames_per_packet);

        SentPacket {
            sequence,
            timestamp,
            pcm,
            datagram,
        }
    }

    /// Build the next packet carrying a slice of a sine tone
    pub fn next_tone_packet(&mut self, frequency: f64) -> SentPacket {
        let pcm = tone(
            frequency,
            self.sample_rate,
            self.timestamp,
            self.frames_per_packet as usize,
        );
        self.next_packet(pcm)
    }
}

/// Interleaved stereo sine tone starting at sample position `start`
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn tone(frequency: f64, sample_rate: u32, start: u32, frames: usize) -> Vec<i16> {
    let mut out = Vec::with_capacity(frames * CHANNELS);
    for i in 0..frames {
        let t = f64::from(start.wrapping_add(i as u32)) / f64::from(sample_rate);
        let value = ((2.0 * PI * frequency * t).sin() * 12_000.0) as i16;
        out.push(value);
        out.push(value / 2);
    }
    out
}
