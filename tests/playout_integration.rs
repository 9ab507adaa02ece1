//! End-to-end playout: encrypted ALAC packets in, PCM out of the sink

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use raop_playout::audio::{AlacConfig, StreamParameters};
use raop_playout::player::clock::{Clock, FIXED_ONE_SECOND};
use raop_playout::player::{
    ManualClock, PlayoutConfig, PlayoutEngine, PlayoutState, PutOutcome, SessionConfig,
};
use raop_playout::protocol::rtp::AudioPacket;
use raop_playout::testing::{
    CaptureHandle, CaptureSink, NetworkSimulator, PacketFactory, ResendLog, SentPacket,
};

const FRAME: u32 = 352;
const RATE: u32 = 44_100;
const LATENCY: u32 = FRAME * 2;
const KEY: [u8; 16] = [
    0x14, 0x49, 0x7d, 0xcc, 0x98, 0xe1, 0x37, 0xa8, 0x55, 0xc1, 0x45, 0x5a, 0x6b, 0xc0, 0xc9, 0x79,
];
const IV: [u8; 16] = [
    0x78, 0xf4, 0x41, 0x2c, 0x8d, 0x17, 0x37, 0x90, 0x2b, 0x15, 0xa6, 0xb3, 0xee, 0x77, 0x0d, 0x67,
];

fn alac_stream() -> StreamParameters {
    StreamParameters::alac(AlacConfig::new(FRAME, RATE)).with_encryption(KEY, IV)
}

fn setup() -> (Arc<PlayoutEngine>, CaptureHandle, ManualClock) {
    let (sink, handle) = CaptureSink::new();
    let clock = ManualClock::new(1_000 * FIXED_ONE_SECOND);
    let engine = PlayoutEngine::with_clock(
        PlayoutConfig::default(),
        Box::new(sink),
        Arc::new(clock.clone()),
    );
    (Arc::new(engine), handle, clock)
}

fn tone_packets(start_seq: u16, count: usize) -> Vec<SentPacket> {
    let mut factory = PacketFactory::new(&alac_stream()).starting_at(start_seq, 88_200);
    (0..count).map(|_| factory.next_tone_packet(523.25)).collect()
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

#[test]
fn test_lost_packet_requested_once_and_played_as_silence() {
    let (engine, handle, clock) = setup();
    let log = Arc::new(ResendLog::new());
    engine.set_resend_requester(log.clone());
    engine
        .start(SessionConfig::new(alac_stream()).with_latency(LATENCY))
        .unwrap();

    let sent = tone_packets(1000, 11);
    for packet in sent.iter().filter(|p| p.sequence != 1005) {
        engine.handle_datagram(&packet.datagram).unwrap();
    }
    assert_eq!(log.count_for(1005), 1);
    assert_eq!(log.requests().len(), 1);

    engine.set_anchor(sent[0].timestamp, clock.now());
    assert!(wait_until(|| engine.stats().frames_played == 11));

    let stats = engine.stats();
    assert_eq!(stats.state, Some(PlayoutState::Playing));
    assert_eq!(stats.frames_missing, 1);
    assert_eq!(stats.decode_failures, 0);
    assert_eq!(log.count_for(1005), 1);

    let captured = handle.snapshot();
    let played = &captured.chunks[captured.chunks.len() - 11..];
    for (chunk, packet) in played.iter().zip(&sent) {
        if packet.sequence == 1005 {
            assert!(chunk.iter().all(|&s| s == 0));
            assert_eq!(chunk.len(), packet.pcm.len());
        } else {
            assert_eq!(*chunk, packet.pcm, "seq {}", packet.sequence);
        }
    }

    engine.stop().unwrap();
}

#[test]
fn test_resent_packet_fills_hole_before_playout() {
    let (engine, handle, clock) = setup();
    let log = Arc::new(ResendLog::new());
    engine.set_resend_requester(log.clone());
    engine
        .start(SessionConfig::new(alac_stream()).with_latency(LATENCY))
        .unwrap();

    let sent = tone_packets(65_530, 10);
    for packet in sent.iter().filter(|p| p.sequence != 65_534) {
        engine.handle_datagram(&packet.datagram).unwrap();
    }
    assert_eq!(log.count_for(65_534), 1);

    let resent = AudioPacket::wrap_resent(7, &sent[4].datagram);
    assert_eq!(
        engine.handle_datagram(&resent).unwrap(),
        Some(PutOutcome::Late)
    );

    engine.set_anchor(sent[0].timestamp, clock.now());
    assert!(wait_until(|| engine.stats().frames_played == 10));

    let stats = engine.stats();
    assert_eq!(stats.frames_missing, 0);
    assert_eq!(stats.packets_late, 1);

    let captured = handle.snapshot();
    let played = &captured.chunks[captured.chunks.len() - 10..];
    for (chunk, packet) in played.iter().zip(&sent) {
        assert_eq!(*chunk, packet.pcm);
    }
    engine.stop().unwrap();
}

#[test]
fn test_lossy_network_keeps_timeline() {
    let (engine, handle, clock) = setup();
    let log = Arc::new(ResendLog::new());
    engine.set_resend_requester(log.clone());
    engine
        .start(SessionConfig::new(alac_stream()).with_latency(LATENCY))
        .unwrap();

    let sent = tone_packets(20, 60);
    let mut network = NetworkSimulator::new(0.1, 0.0, 7);
    // Keep the first packet so the buffer syncs where the stream starts.
    let (first, rest) = sent.split_first().unwrap();
    let (delivered, lost) = network.transmit(rest.to_vec());

    engine.handle_datagram(&first.datagram).unwrap();
    for packet in &delivered {
        engine.handle_datagram(&packet.datagram).unwrap();
    }
    let last_delivered = delivered.last().map_or(first.sequence, |p| p.sequence);
    let expected_frames = usize::from(last_delivered - first.sequence) + 1;

    for packet in lost.iter().filter(|p| p.sequence < last_delivered) {
        assert!(log.count_for(packet.sequence) >= 1, "seq {}", packet.sequence);
    }

    engine.set_anchor(first.timestamp, clock.now());
    assert!(wait_until(
        || engine.stats().frames_played == expected_frames as u64
    ));

    let captured = handle.snapshot();
    let played = &captured.chunks[captured.chunks.len() - expected_frames..];
    let mut expected = sent[..expected_frames].iter();
    for chunk in played {
        let packet = expected.next().unwrap();
        if lost.iter().any(|l| l.sequence == packet.sequence) {
            assert!(chunk.iter().all(|&s| s == 0));
        } else {
            assert_eq!(*chunk, packet.pcm);
        }
    }
    assert_eq!(
        engine.stats().frames_missing,
        lost.iter().filter(|p| p.sequence < last_delivered).count() as u64
    );
    engine.stop().unwrap();
}

#[test]
fn test_concurrent_producers_and_flush() {
    let (engine, _handle, clock) = setup();
    engine
        .start(SessionConfig::new(alac_stream()).with_latency(LATENCY))
        .unwrap();

    let sent = Arc::new(tone_packets(0, 64));
    engine.set_anchor(sent[0].timestamp, clock.now());

    let producers: Vec<_> = (0..4)
        .map(|lane| {
            let engine = engine.clone();
            let sent = sent.clone();
            thread::spawn(move || {
                for packet in sent.iter().skip(lane).step_by(4) {
                    engine.handle_datagram(&packet.datagram).unwrap();
                }
            })
        })
        .collect();

    let flusher = {
        let engine = engine.clone();
        thread::spawn(move || {
            for _ in 0..10 {
                engine.flush(None);
                engine.set_volume(-12.0);
                let _ = engine.stats();
                thread::sleep(Duration::from_millis(1));
            }
        })
    };

    for producer in producers {
        producer.join().unwrap();
    }
    flusher.join().unwrap();

    let stats = engine.stats();
    assert!(stats.buffer_fill <= engine.config().buffer_capacity);
    assert!(engine.is_running());
    engine.stop().unwrap();
    assert!(!engine.is_running());
}
