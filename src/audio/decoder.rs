//! Packet payload decoding: AES-CBC decryption followed by the codec step

use symphonia::core::audio::{Channels, SampleBuffer};
use symphonia::core::codecs::{CODEC_TYPE_ALAC, CodecParameters, DecoderOptions};
use symphonia::core::formats::Packet;

use super::format::{AlacConfig, AudioCodec, CHANNELS, StreamParameters};
use crate::protocol::crypto::{AesCbcCipher, CryptoError};

/// Errors decoding one packet
///
/// None of these are fatal to a stream: the caller substitutes silence for
/// the affected frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// Cipher could not be set up
    #[error("decryption error: {0}")]
    Crypto(#[from] CryptoError),

    /// Codec rejected the payload
    #[error("codec error: {0}")]
    Codec(String),

    /// Decoded frame has the wrong number of samples
    #[error("unexpected decoded size: expected {expected} samples, got {actual}")]
    UnexpectedOutputSize {
        /// Interleaved samples per frame
        expected: usize,
        /// Interleaved samples produced
        actual: usize,
    },

    /// Codec cannot be instantiated for these parameters
    #[error("unsupported codec configuration: {0}")]
    Unsupported(String),
}

/// Codec stage of the payload pipeline
///
/// Implementations are chosen per session from the negotiated `AudioCodec`.
pub trait Decoder: Send {
    /// Decode one plaintext codec frame, appending interleaved samples to `out`
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Codec` if the payload is malformed.
    fn decode(&mut self, data: &[u8], out: &mut Vec<i16>) -> Result<(), DecodeError>;

    /// Short codec name for logs
    fn name(&self) -> &'static str;
}

/// Apple Lossless decoder backed by symphonia
pub struct AlacDecoder {
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    frame_length: u32,
    samples: Option<SampleBuffer<i16>>,
}

impl AlacDecoder {
    /// Create a decoder from the session's ALAC configuration
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Unsupported` if symphonia rejects the magic cookie.
    pub fn new(config: &AlacConfig) -> Result<Self, DecodeError> {
        let mut params = CodecParameters::new();
        params
            .for_codec(CODEC_TYPE_ALAC)
            .with_sample_rate(config.sample_rate)
            .with_channels(Channels::FRONT_LEFT | Channels::FRONT_RIGHT)
            .with_max_frames_per_packet(u64::from(config.frame_length))
            .with_extra_data(config.magic_cookie().into_boxed_slice());

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Unsupported(e.to_string()))?;

        Ok(Self {
            decoder,
            frame_length: config.frame_length,
            samples: None,
        })
    }
}

impl Decoder for AlacDecoder {
    fn decode(&mut self, data: &[u8], out: &mut Vec<i16>) -> Result<(), DecodeError> {
        let packet = Packet::new_from_slice(0, 0, u64::from(self.frame_length), data);
        let decoded = self
            .decoder
            .decode(&packet)
            .map_err(|e| DecodeError::Codec(e.to_string()))?;

        let spec = *decoded.spec();
        let needed = decoded.frames() * spec.channels.count();
        let samples = match self.samples.take() {
            Some(buf) if buf.capacity() >= needed => self.samples.insert(buf),
            _ => self
                .samples
                .insert(SampleBuffer::new(decoded.capacity() as u64, spec)),
        };
        samples.copy_interleaved_ref(decoded);
        out.extend_from_slice(samples.samples());
        Ok(())
    }

    fn name(&self) -> &'static str {
        "alac"
    }
}

/// Big-endian 16-bit linear PCM (L16)
#[derive(Debug, Default)]
pub struct PcmDecoder;

impl Decoder for PcmDecoder {
    fn decode(&mut self, data: &[u8], out: &mut Vec<i16>) -> Result<(), DecodeError> {
        if data.len() % 2 != 0 {
            return Err(DecodeError::Codec(format!(
                "odd L16 payload length {}",
                data.len()
            )));
        }
        out.extend(
            data.chunks_exact(2)
                .map(|pair| i16::from_be_bytes([pair[0], pair[1]])),
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "l16"
    }
}

/// Turns one encrypted packet payload into one frame of PCM
pub struct FrameDecoder {
    cipher: Option<AesCbcCipher>,
    codec: Box<dyn Decoder>,
    frame_samples: usize,
    plaintext: Vec<u8>,
}

impl FrameDecoder {
    /// Build the decrypt-and-decode pipeline for a session
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the cipher or the codec cannot be initialized.
    pub fn new(params: &StreamParameters) -> Result<Self, DecodeError> {
        let codec: Box<dyn Decoder> = match params.codec {
            AudioCodec::Alac(ref config) => Box::new(AlacDecoder::new(config)?),
            AudioCodec::Pcm => Box::new(PcmDecoder),
        };
        Self::with_decoder(params, codec)
    }

    /// Build the pipeline around a caller-supplied codec
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::Crypto` if the session key material is invalid.
    pub fn with_decoder(
        params: &StreamParameters,
        codec: Box<dyn Decoder>,
    ) -> Result<Self, DecodeError> {
        let cipher = match (params.aes_key, params.aes_iv) {
            (Some(key), Some(iv)) => Some(AesCbcCipher::new(&key, &iv)?),
            _ => None,
        };

        tracing::debug!(
            codec = codec.name(),
            encrypted = cipher.is_some(),
            frames = params.frames_per_packet,
            "Frame decoder ready"
        );

        Ok(Self {
            cipher,
            codec,
            frame_samples: params.frames_per_packet as usize * CHANNELS,
            plaintext: Vec::new(),
        })
    }

    /// Interleaved samples in one frame
    #[must_use]
    pub fn frame_samples(&self) -> usize {
        self.frame_samples
    }

    /// Decrypt and decode one packet payload
    ///
    /// # Errors
    ///
    /// Returns `DecodeError` if the codec fails or produces anything other
    /// than exactly one frame.
    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<i16>, DecodeError> {
        let data = match self.cipher {
            Some(ref cipher) => {
                cipher.decrypt_into(payload, &mut self.plaintext);
                self.plaintext.as_slice()
            }
            None => payload,
        };

        let mut pcm = Vec::with_capacity(self.frame_samples);
        self.codec.decode(data, &mut pcm)?;

        if pcm.len() != self.frame_samples {
            return Err(DecodeError::UnexpectedOutputSize {
                expected: self.frame_samples,
                actual: pcm.len(),
            });
        }
        Ok(pcm)
    }
}

impl std::fmt::Debug for FrameDecoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameDecoder")
            .field("codec", &self.codec.name())
            .field("encrypted", &self.cipher.is_some())
            .field("frame_samples", &self.frame_samples)
            .finish()
    }
}
