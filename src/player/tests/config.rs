use crate::audio::format::{AlacConfig, StreamParameters};
use crate::error::PlayoutError;
use crate::player::config::*;

#[test]
fn test_defaults() {
    let config = PlayoutConfig::default();
    assert_eq!(config.buffer_capacity, 512);
    assert_eq!(config.start_fill, 220);
    assert_eq!(config.default_latency, 88_200);
    assert_eq!(config.rate_correction, RateCorrection::Stuffing);
    assert!(config.validate().is_ok());
}

#[test]
fn test_builder() {
    let config = PlayoutConfig::default()
        .buffer_capacity(1024)
        .start_fill(300)
        .default_latency(11_025)
        .rate_correction(RateCorrection::Disabled)
        .max_resend_span(64)
        .initial_volume_db(-20.0);

    assert_eq!(config.buffer_capacity, 1024);
    assert_eq!(config.start_fill, 300);
    assert_eq!(config.default_latency, 11_025);
    assert_eq!(config.rate_correction, RateCorrection::Disabled);
    assert_eq!(config.max_resend_span, 64);
    assert!((config.initial_volume_db + 20.0).abs() < f64::EPSILON);
    assert!(config.validate().is_ok());
}

#[test]
fn test_validate_rejects_bad_capacity() {
    let err = PlayoutConfig::default().buffer_capacity(500).validate();
    assert!(matches!(err, Err(PlayoutError::InvalidConfig(_))));

    let err = PlayoutConfig::default()
        .buffer_capacity(65_536)
        .validate();
    assert!(matches!(err, Err(PlayoutError::InvalidConfig(_))));
}

#[test]
fn test_validate_rejects_bad_start_fill() {
    assert!(PlayoutConfig::default().start_fill(512).validate().is_err());
    assert!(PlayoutConfig::default().start_fill(0).validate().is_err());
}

#[test]
fn test_validate_rejects_zero_resend_span() {
    assert!(PlayoutConfig::default().max_resend_span(0).validate().is_err());
}

#[test]
fn test_serde_round_trip() {
    let config = PlayoutConfig::default()
        .rate_correction(RateCorrection::Disabled)
        .initial_volume_db(-6.0);
    let json = serde_json::to_string(&config).unwrap();
    assert!(json.contains("\"rate_correction\":\"disabled\""));

    let parsed: PlayoutConfig = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, config);
}

#[test]
fn test_serde_partial_uses_defaults() {
    let parsed: PlayoutConfig = serde_json::from_str(r#"{"start_fill": 100}"#).unwrap();
    assert_eq!(parsed.start_fill, 100);
    assert_eq!(parsed.buffer_capacity, 512);
}

#[test]
fn test_session_config() {
    let session = SessionConfig::new(StreamParameters::alac(AlacConfig::new(352, 44_100)));
    assert_eq!(session.latency, None);
    assert!(session.validate().is_ok());

    let session = session.with_latency(22_050);
    assert_eq!(session.latency, Some(22_050));
}

#[test]
fn test_session_config_rejects_unplayable_stream() {
    let session = SessionConfig::new(StreamParameters::pcm(352, 0));
    assert!(matches!(
        session.validate(),
        Err(PlayoutError::InvalidConfig(_))
    ));

    let session = SessionConfig::new(StreamParameters::pcm(2, 44_100));
    assert!(session.validate().is_err());
}
