//! Performance benchmarks for the playout hot path

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use raop_playout::audio::{AlacConfig, FrameDecoder, StreamParameters};
use raop_playout::player::{DriftController, JitterBuffer, RateCorrector, Stuffer};
use raop_playout::protocol::rtp::AudioPacket;
use raop_playout::testing::{PacketFactory, tone};

const FRAME: u32 = 352;
const RATE: u32 = 44_100;

fn alac_decode(c: &mut Criterion) {
    let params =
        StreamParameters::alac(AlacConfig::new(FRAME, RATE)).with_encryption([1; 16], [2; 16]);
    let mut factory = PacketFactory::new(&params);
    let packet = factory.next_tone_packet(440.0);
    let payload = AudioPacket::parse(&packet.datagram).unwrap().payload.to_vec();
    let mut decoder = FrameDecoder::new(&params).unwrap();

    c.bench_function("alac_decrypt_decode", |b| {
        b.iter(|| {
            let _ = black_box(decoder.decode(black_box(&payload)));
        });
    });
}

fn jitter_put_get(c: &mut Criterion) {
    c.bench_function("jitter_put_get", |b| {
        let mut buffer = JitterBuffer::new(512, FRAME, FRAME as usize * 2, 220, 128);
        buffer.set_buffering(false);
        let pcm = vec![0i16; FRAME as usize * 2];
        let mut seq = 0u16;

        b.iter(|| {
            let ts = u32::from(seq).wrapping_mul(FRAME);
            black_box(buffer.put(seq, ts, &pcm));
            black_box(buffer.get());
            seq = seq.wrapping_add(1);
        });
    });
}

fn stuffer_apply(c: &mut Criterion) {
    let frame = tone(440.0, RATE, 0, FRAME as usize);
    let mut out = Vec::with_capacity(frame.len() + 2);

    let mut group = c.benchmark_group("stuffer");
    for (name, stuff, volume) in [
        ("copy_unity", 0, 0x10000),
        ("insert_unity", 1, 0x10000),
        ("delete_dither", -1, 0x8000),
    ] {
        let mut stuffer = Stuffer::with_seed(42);
        group.bench_function(name, |b| {
            b.iter(|| {
                stuffer.apply_into(black_box(&frame), stuff, volume, &mut out);
                black_box(out.len());
            });
        });
    }
    group.finish();
}

fn drift_update(c: &mut Criterion) {
    c.bench_function("drift_correction", |b| {
        let mut controller = DriftController::with_seed(FRAME, RATE, 7);
        let mut fill = 220usize;
        b.iter(|| {
            fill = if fill > 230 { 210 } else { fill + 1 };
            black_box(controller.correction(black_box(fill)));
        });
    });
}

criterion_group!(benches, alac_decode, jitter_put_get, stuffer_apply, drift_update);
criterion_main!(benches);
