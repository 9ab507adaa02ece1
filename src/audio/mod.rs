//! Audio handling module

pub mod decoder;
pub mod format;
pub mod output_cpal;
pub mod sink;


pub use decoder::{AlacDecoder, DecodeError, Decoder, FrameDecoder, PcmDecoder};
pub use format::{AlacConfig, AudioCodec, CHANNELS, FormatError, StreamParameters};
#[cfg(feature = "audio-cpal")]
pub use output_cpal::CpalSink;
pub use sink::{AudioSink, NullSink, SinkError, WriterSink};
