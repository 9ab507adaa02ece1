use crate::player::drift::*;

const FRAME: u32 = 352;
const RATE: u32 = 44_100;

#[test]
fn test_biquad_passes_dc() {
    let mut lpf = Biquad::low_pass(1.0 / 10.0, 0.25, FRAME, RATE);
    let mut out = 0.0;
    for _ in 0..20_000 {
        out = lpf.filter(1.0);
    }
    assert!((out - 1.0).abs() < 1e-6, "settled at {out}");

    lpf.reset();
    assert!(lpf.filter(0.0).abs() < f64::EPSILON);
}

#[test]
fn test_stuff_probability() {
    assert!(stuff_probability(1.0, FRAME).abs() < f64::EPSILON);
    let fast = stuff_probability(1.0 + 1e-4, FRAME);
    let slow = stuff_probability(1.0 - 1e-4, FRAME);
    assert!((fast - slow).abs() < 1e-12);
    assert!(fast > 0.03 && fast < 0.04);
}

#[test]
fn test_stuff_direction() {
    assert_eq!(stuff_for_draw(1.001, FRAME, 0.0), -1);
    assert_eq!(stuff_for_draw(0.999, FRAME, 0.0), 1);
    assert_eq!(stuff_for_draw(1.001, FRAME, 0.999_999), 0);
    assert_eq!(stuff_for_draw(1.0, FRAME, 0.0), 0);
}

#[test]
fn test_warmup_applies_no_correction() {
    let mut controller = DriftController::with_seed(FRAME, RATE, 7);
    for i in 0..WARMUP_FRAMES {
        let fill = if i % 2 == 0 { 10 } else { 30 };
        assert_eq!(controller.correction(fill), 0);
        assert!((controller.playback_rate() - 1.0).abs() < f64::EPSILON);
    }
    assert!(controller.is_warmed_up());
    assert!((controller.desired_fill() - 20.0).abs() < 1e-9);
}

#[test]
fn test_rate_follows_fill_error_sign() {
    let mut high = DriftController::with_seed(FRAME, RATE, 1);
    let mut low = DriftController::with_seed(FRAME, RATE, 1);
    for _ in 0..WARMUP_FRAMES {
        high.update(20);
        low.update(20);
    }
    for _ in 0..200 {
        high.update(30);
        low.update(10);
    }
    assert!(high.playback_rate() > 1.0);
    assert!(low.playback_rate() < 1.0);
}

#[test]
fn test_reset_restarts_warmup() {
    let mut controller = DriftController::with_seed(FRAME, RATE, 3);
    for _ in 0..WARMUP_FRAMES + 50 {
        controller.update(40);
    }
    controller.update(80);
    assert!(controller.playback_rate() > 1.0);

    controller.reset();
    assert!(!controller.is_warmed_up());
    assert!((controller.playback_rate() - 1.0).abs() < f64::EPSILON);
    assert!(controller.desired_fill().abs() < f64::EPSILON);
}

#[test]
fn test_fixed_rate_never_stuffs() {
    let mut fixed = FixedRate;
    for fill in [0, 10, 1000] {
        assert_eq!(fixed.correction(fill), 0);
    }
    assert!((fixed.playback_rate() - 1.0).abs() < f64::EPSILON);
}

/// Buffer modelled in samples: each iteration the consumer takes one frame
/// and the sender delivers one frame, plus `extra(i)` samples, plus
/// whatever the stuffer changed. Returns the mean absolute fill error per
/// 500-frame window after warm-up and the final playback rate.
fn simulate(
    seed: u64,
    iterations: usize,
    mut extra: impl FnMut(usize) -> i64,
) -> (Vec<f64>, f64) {
    let fs = i64::from(FRAME);
    let mut controller = DriftController::with_seed(FRAME, RATE, seed);
    let mut held = 20 * fs;
    let mut errors = Vec::new();

    for i in 0..iterations {
        held += extra(i);
        held -= fs;
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let fill = (held / fs) as usize;
        let stuff = controller.correction(fill);
        held += fs + i64::from(stuff);

        if i >= 1000 {
            #[allow(clippy::cast_precision_loss)]
            errors.push((fill as f64 - controller.desired_fill()).abs());
        }
    }

    #[allow(clippy::cast_precision_loss)]
    let averages = errors
        .chunks(500)
        .map(|w| w.iter().sum::<f64>() / w.len() as f64)
        .collect();
    (averages, controller.playback_rate())
}

/// One surplus sample every `period` frames once warm-up is over
fn surplus_every(period: usize) -> impl FnMut(usize) -> i64 {
    move |i| i64::from(i >= 1000 && i % period == 0)
}

#[test]
fn test_drift_converges_after_burst() {
    let burst = i64::from(FRAME) * 8;
    for seed in 1..=3 {
        let (averages, rate) = simulate(seed, 7000, |i| if i == 1000 { burst } else { 0 });

        for pair in averages.windows(2) {
            assert!(
                pair[1] <= pair[0] + 0.1,
                "seed {seed}: error grew {averages:?}"
            );
        }
        let first = averages[0];
        let last = averages[averages.len() - 1];
        assert!(last < first - 1.5, "seed {seed}: {first} -> {last}");
        assert!(rate > 1.0, "seed {seed}: rate {rate}");
    }
}

#[test]
fn test_small_constant_surplus_stays_near_target() {
    // one sample in 50 frames of 352, about 57 ppm
    for seed in 1..=2 {
        let (averages, rate) = simulate(seed, 20_000, surplus_every(50));
        assert!(
            averages.iter().all(|&e| e < 1.5),
            "seed {seed}: {averages:?}"
        );
        assert!(rate > 1.0, "seed {seed}: rate {rate}");
    }
}

#[test]
fn test_large_constant_surplus_plateaus() {
    // one sample in 3 frames of 352, about 950 ppm
    for seed in 1..=2 {
        let (averages, rate) = simulate(seed, 20_000, surplus_every(3));

        let tail = &averages[averages.len() - 10..];
        assert!(
            tail.iter().all(|&e| e < 12.0),
            "seed {seed}: error kept growing {tail:?}"
        );
        let spread = tail.iter().copied().fold(f64::MIN, f64::max)
            - tail.iter().copied().fold(f64::MAX, f64::min);
        assert!(spread < 3.0, "seed {seed}: no plateau {tail:?}");
        assert!(rate > 1.0005 && rate < 1.002, "seed {seed}: rate {rate}");
    }
}
