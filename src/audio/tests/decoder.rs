use crate::audio::decoder::*;
use crate::audio::format::{AlacConfig, StreamParameters};
use crate::protocol::crypto::CryptoError;
use crate::testing::PacketFactory;

fn ramp(frames: usize) -> Vec<i16> {
    (0..frames * 2)
        .map(|i| i16::try_from(i * 37 % 20000).unwrap() - 10000)
        .collect()
}

#[test]
fn test_pcm_decoder_big_endian() {
    let mut out = Vec::new();
    PcmDecoder.decode(&[0x01, 0x02, 0xFF, 0xFE], &mut out).unwrap();
    assert_eq!(out, vec![0x0102, -2]);
}

#[test]
fn test_pcm_decoder_odd_length() {
    let mut out = Vec::new();
    assert!(matches!(
        PcmDecoder.decode(&[1, 2, 3], &mut out),
        Err(DecodeError::Codec(_))
    ));
}

#[test]
fn test_frame_decoder_pcm_encrypted() {
    let params = StreamParameters::pcm(352, 44100).with_encryption([3; 16], [4; 16]);
    let mut factory = PacketFactory::new(&params);
    let pcm = ramp(352);

    let payload = factory.encode_payload(&pcm);
    assert_ne!(payload[..16], factory.plain_payload(&pcm)[..16]);

    let mut decoder = FrameDecoder::new(&params).unwrap();
    assert_eq!(decoder.decode(&payload).unwrap(), pcm);
}

#[test]
fn test_frame_decoder_alac_roundtrip() {
    let params = StreamParameters::alac(AlacConfig::new(352, 44100));
    let mut factory = PacketFactory::new(&params);
    let pcm = ramp(352);

    let payload = factory.encode_payload(&pcm);
    let mut decoder = FrameDecoder::new(&params).unwrap();

    assert_eq!(decoder.decode(&payload).unwrap(), pcm);
}

#[test]
fn test_frame_decoder_alac_encrypted() {
    let params =
        StreamParameters::alac(AlacConfig::new(352, 44100)).with_encryption([9; 16], [1; 16]);
    let mut factory = PacketFactory::new(&params);
    let mut decoder = FrameDecoder::new(&params).unwrap();

    for n in 0..4 {
        let pcm: Vec<i16> = ramp(352).iter().map(|s| s / (n + 1)).collect();
        let payload = factory.encode_payload(&pcm);
        assert_eq!(decoder.decode(&payload).unwrap(), pcm);
    }
}

#[test]
fn test_frame_decoder_size_mismatch() {
    let params = StreamParameters::pcm(352, 44100);
    let mut decoder = FrameDecoder::new(&params).unwrap();

    let short = vec![0u8; 100 * 4];
    assert_eq!(
        decoder.decode(&short).unwrap_err(),
        DecodeError::UnexpectedOutputSize {
            expected: 704,
            actual: 200
        }
    );
}


#[test]
fn test_cipher_error_survives_clone() {
    let err = DecodeError::from(CryptoError::InvalidIvLength {
        expected: 16,
        actual: 8,
    });
    let copy = err.clone();

    assert_eq!(copy, err);
    assert!(matches!(copy, DecodeError::Crypto(CryptoError::InvalidIvLength { .. })));
    assert_eq!(
        copy.to_string(),
        "decryption error: invalid AES IV length: expected 16, got 8"
    );
}
