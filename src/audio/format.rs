//! Stream and codec parameters handed over by the session layer

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Interleaved channels per frame (stereo only)
pub const CHANNELS: usize = 2;

/// Bits per output sample
pub const BITS_PER_SAMPLE: u8 = 16;

/// Errors in negotiated stream parameters
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    /// `a=fmtp` line could not be parsed
    #[error("invalid fmtp line: {0}")]
    InvalidFmtp(String),

    /// Parameters outside what the engine plays
    #[error("unsupported stream format: {0}")]
    Unsupported(String),
}

/// ALAC decoder configuration (`ALACSpecificConfig`)
///
/// Carried in the SDP `a=fmtp` line of the ANNOUNCE, e.g.
/// `96 352 0 16 40 10 14 2 255 0 0 44100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlacConfig {
    /// Frames per packet
    pub frame_length: u32,
    /// Compatible version (always 0)
    pub compatible_version: u8,
    /// Bit depth
    pub bit_depth: u8,
    /// Rice history mult
    pub pb: u8,
    /// Rice initial history
    pub mb: u8,
    /// Rice parameter limit
    pub kb: u8,
    /// Channel count
    pub channels: u8,
    /// Maximum run
    pub max_run: u16,
    /// Maximum coded frame size (0 = unknown)
    pub max_frame_bytes: u32,
    /// Average bit rate (0 = unknown)
    pub avg_bit_rate: u32,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl AlacConfig {
    /// Size of the serialized magic cookie
    pub const COOKIE_SIZE: usize = 24;

    /// Standard 16-bit stereo configuration
    #[must_use]
    pub fn new(frame_length: u32, sample_rate: u32) -> Self {
        Self {
            frame_length,
            compatible_version: 0,
            bit_depth: BITS_PER_SAMPLE,
            pb: 40,
            mb: 10,
            kb: 14,
            #[allow(clippy::cast_possible_truncation)]
            channels: CHANNELS as u8,
            max_run: 255,
            max_frame_bytes: 0,
            avg_bit_rate: 0,
            sample_rate,
        }
    }

    /// Parse the `a=fmtp` attribute value
    ///
    /// Accepts the value with or without the leading payload type.
    ///
    /// # Errors
    ///
    /// Returns `FormatError::InvalidFmtp` if the field count is wrong or a
    /// field is not a number in range.
    pub fn from_fmtp(fmtp: &str) -> Result<Self, FormatError> {
        let fields: Vec<&str> = fmtp.split_whitespace().collect();
        let fields = match fields.len() {
            12 => &fields[1..],
            11 => &fields[..],
            n => {
                return Err(FormatError::InvalidFmtp(format!(
                    "expected 11 or 12 fields, got {n}"
                )));
            }
        };

        fn field<T: std::str::FromStr>(fields: &[&str], idx: usize) -> Result<T, FormatError> {
            fields[idx]
                .parse()
                .map_err(|_| FormatError::InvalidFmtp(format!("bad field {idx}: {}", fields[idx])))
        }

        Ok(Self {
            frame_length: field(fields, 0)?,
            compatible_version: field(fields, 1)?,
            bit_depth: field(fields, 2)?,
            pb: field(fields, 3)?,
            mb: field(fields, 4)?,
            kb: field(fields, 5)?,
            channels: field(fields, 6)?,
            max_run: field(fields, 7)?,
            max_frame_bytes: field(fields, 8)?,
            avg_bit_rate: field(fields, 9)?,
            sample_rate: field(fields, 10)?,
        })
    }

    /// Serialize as the 24-byte big-endian magic cookie decoders expect
    #[must_use]
    pub fn magic_cookie(&self) -> Vec<u8> {
        let mut cookie = Vec::with_capacity(Self::COOKIE_SIZE);
        cookie.extend_from_slice(&self.frame_length.to_be_bytes());
        cookie.push(self.compatible_version);
        cookie.push(self.bit_depth);
        cookie.push(self.pb);
        cookie.push(self.mb);
        cookie.push(self.kb);
        cookie.push(self.channels);
        cookie.extend_from_slice(&self.max_run.to_be_bytes());
        cookie.extend_from_slice(&self.max_frame_bytes.to_be_bytes());
        cookie.extend_from_slice(&self.avg_bit_rate.to_be_bytes());
        cookie.extend_from_slice(&self.sample_rate.to_be_bytes());
        cookie
    }
}

/// Audio codec of the incoming stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AudioCodec {
    /// Apple Lossless
    Alac(AlacConfig),
    /// Big-endian linear PCM (L16)
    Pcm,
}

/// Stream parameters parsed from ANNOUNCE SDP
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamParameters {
    /// Audio codec
    pub codec: AudioCodec,
    /// Sample rate (typically 44100)
    pub sample_rate: u32,
    /// Samples per RTP packet (typically 352)
    pub frames_per_packet: u32,
    /// AES key (decrypted from RSA, if encryption used)
    pub aes_key: Option<[u8; 16]>,
    /// AES IV (if encryption used)
    pub aes_iv: Option<[u8; 16]>,
}

impl StreamParameters {
    /// ALAC stream described by an fmtp configuration
    #[must_use]
    pub fn alac(config: AlacConfig) -> Self {
        Self {
            codec: AudioCodec::Alac(config),
            sample_rate: config.sample_rate,
            frames_per_packet: config.frame_length,
            aes_key: None,
            aes_iv: None,
        }
    }

    /// Uncompressed L16 stream
    #[must_use]
    pub fn pcm(frames_per_packet: u32, sample_rate: u32) -> Self {
        Self {
            codec: AudioCodec::Pcm,
            sample_rate,
            frames_per_packet,
            aes_key: None,
            aes_iv: None,
        }
    }

    /// Set the AES session key and IV
    #[must_use]
    pub fn with_encryption(mut self, key: [u8; 16], iv: [u8; 16]) -> Self {
        self.aes_key = Some(key);
        self.aes_iv = Some(iv);
        self
    }

    /// Whether payloads arrive encrypted
    #[must_use]
    pub fn is_encrypted(&self) -> bool {
        self.aes_key.is_some() && self.aes_iv.is_some()
    }

    /// Interleaved samples in one decoded packet
    #[must_use]
    pub fn frame_samples(&self) -> usize {
        self.frames_per_packet as usize * CHANNELS
    }

    /// Wall-clock duration of one packet
    #[must_use]
    pub fn packet_duration(&self) -> Duration {
        Duration::from_secs_f64(f64::from(self.frames_per_packet) / f64::from(self.sample_rate))
    }

    /// Check the parameters describe a stream the engine can play
    ///
    /// # Errors
    ///
    /// Returns `FormatError::Unsupported` for zero rates or sizes, or any
    /// format other than 16-bit stereo.
    pub fn validate(&self) -> Result<(), FormatError> {
        if self.sample_rate == 0 {
            return Err(FormatError::Unsupported("sample rate is zero".into()));
        }
        if self.frames_per_packet < 2 {
            return Err(FormatError::Unsupported(format!(
                "{} frames per packet",
                self.frames_per_packet
            )));
        }
        if self.aes_key.is_some() != self.aes_iv.is_some() {
            return Err(FormatError::Unsupported(
                "AES key and IV must be supplied together".into(),
            ));
        }
        if let AudioCodec::Alac(config) = self.codec {
            if config.bit_depth != BITS_PER_SAMPLE || usize::from(config.channels) != CHANNELS {
                return Err(FormatError::Unsupported(format!(
                    "{}-bit {}-channel ALAC",
                    config.bit_depth, config.channels
                )));
            }
            if config.frame_length != self.frames_per_packet {
                return Err(FormatError::Unsupported(format!(
                    "ALAC frame length {} does not match {} frames per packet",
                    config.frame_length, self.frames_per_packet
                )));
            }
        }
        Ok(())
    }
}

impl Default for StreamParameters {
    fn default() -> Self {
        Self::alac(AlacConfig::new(352, 44_100))
    }
}

impl std::fmt::Debug for StreamParameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamParameters")
            .field("codec", &self.codec)
            .field("sample_rate", &self.sample_rate)
            .field("frames_per_packet", &self.frames_per_packet)
            .field("encrypted", &self.is_encrypted())
            .finish()
    }
}
