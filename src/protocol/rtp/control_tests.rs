use super::control::*;
use super::packet::{AudioPacket, PacketError};
use super::sequence::SeqRange;

#[test]
fn test_resend_request_wire_format() {
    let request = ResendRequest::new(1, SeqRange { first: 1005, count: 1 });
    assert_eq!(
        request.encode(),
        [0x80, 0xD5, 0x00, 0x01, 0x03, 0xED, 0x00, 0x01]
    );
}

#[test]
fn test_resend_request_decode() {
    let bytes = [0x80, 0xD5, 0x00, 0x09, 0xFF, 0xFF, 0x00, 0x03];
    let request = ResendRequest::decode(&bytes).unwrap();

    assert_eq!(request.request_seq, 9);
    assert_eq!(request.first, 65535);
    assert_eq!(request.count, 3);
    assert_eq!(request.range().last(), 1);
}

#[test]
fn test_resend_request_rejects_other_types() {
    let bytes = [0x80, 0xD4, 0, 0, 0, 0, 0, 0];
    assert_eq!(
        ResendRequest::decode(&bytes).unwrap_err(),
        PacketError::UnknownPayloadType(0x54)
    );
}

#[test]
fn test_sync_packet_decode() {
    let sync = SyncPacket {
        extension: true,
        rtp_timestamp: 88_200,
        ntp_time: 0x0000_0001_8000_0000,
        rtp_timestamp_at_ntp: 176_400,
    };
    let bytes = sync.encode();

    assert_eq!(bytes[0], 0x90);
    assert_eq!(bytes[1], 0xD4);
    assert_eq!(SyncPacket::decode(&bytes).unwrap(), sync);
}

#[test]
fn test_sync_packet_too_short() {
    assert!(matches!(
        SyncPacket::decode(&[0x80, 0xD4, 0, 7]),
        Err(PacketError::BufferTooSmall { needed: 20, have: 4 })
    ));
}

#[test]
fn test_control_packet_classification() {
    let sync = SyncPacket {
        extension: false,
        rtp_timestamp: 1,
        ntp_time: 2,
        rtp_timestamp_at_ntp: 3,
    }
    .encode();
    assert!(matches!(
        ControlPacket::decode(&sync),
        Ok(ControlPacket::Sync(SyncPacket { rtp_timestamp_at_ntp: 3, .. }))
    ));

    let resent = AudioPacket::wrap_resent(1, &AudioPacket::encode(10, 0, 0, &[1; 4]));
    match ControlPacket::decode(&resent).unwrap() {
        ControlPacket::Resent(data) => {
            assert_eq!(AudioPacket::parse_resent(data).unwrap().sequence, 10);
        }
        other => panic!("unexpected packet {other:?}"),
    }

    assert!(ControlPacket::decode(&[0x80, 0xD5, 0, 0, 0, 0, 0, 0]).is_err());
}
