//! Single-sample stuffing with dithered volume scaling

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::audio::format::CHANNELS;
use crate::player::volume::UNITY_GAIN;

/// Applies a stuffing decision and the software volume to one frame
#[derive(Debug, Clone)]
pub struct Stuffer {
    rng: StdRng,
    lcg: u32,
    dither_a: i64,
    dither_b: i64,
}

impl Stuffer {
    /// Stuffer with an entropy-seeded split point generator
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(StdRng::from_entropy())
    }

    /// Stuffer with reproducible split points and dither
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(StdRng::seed_from_u64(seed))
    }

    fn from_rng(mut rng: StdRng) -> Self {
        let lcg = rng.r#gen();
        Self {
            rng,
            lcg,
            dither_a: 0,
            dither_b: 0,
        }
    }

    fn next_dither(&mut self) -> i64 {
        self.lcg = self.lcg.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        i64::from(self.lcg >> 16) & 0xffff
    }

    /// Scale one sample by a 16.16 gain
    ///
    /// Below unity, two-tap noise (the difference of consecutive LCG draws)
    /// is added before truncation so low volumes do not bias towards zero.
    #[allow(clippy::cast_possible_truncation)]
    fn scale(&mut self, sample: i32, volume: i32) -> i16 {
        let mut out = i64::from(sample) * i64::from(volume);
        if volume < UNITY_GAIN {
            self.dither_b = self.dither_a;
            self.dither_a = self.next_dither();
            out -= self.dither_a;
            out += self.dither_b;
        }
        (out >> 16).clamp(i64::from(i16::MIN), i64::from(i16::MAX)) as i16
    }

    fn copy_pairs(&mut self, pairs: &[i16], volume: i32, out: &mut Vec<i16>) {
        for &sample in pairs {
            let scaled = self.scale(i32::from(sample), volume);
            out.push(scaled);
        }
    }

    /// Apply `stuff` (-1, 0 or +1 sample pairs) and `volume` to a frame
    ///
    /// The edit lands at a random pair boundary away from both ends. An
    /// inserted pair is the per-channel average of its neighbours.
    pub fn apply_into(&mut self, frame: &[i16], stuff: i8, volume: i32, out: &mut Vec<i16>) {
        out.clear();
        let pairs = frame.len() / CHANNELS;
        out.reserve(frame.len() + CHANNELS);

        if stuff == 0 || pairs < 3 {
            self.copy_pairs(frame, volume, out);
            return;
        }

        let split = self.rng.gen_range(1..pairs - 1);
        let at = split * CHANNELS;
        self.copy_pairs(&frame[..at], volume, out);

        if stuff > 0 {
            for ch in 0..CHANNELS {
                let mid = (i32::from(frame[at - CHANNELS + ch]) + i32::from(frame[at + ch])) >> 1;
                let scaled = self.scale(mid, volume);
                out.push(scaled);
            }
            self.copy_pairs(&frame[at..], volume, out);
        } else {
            self.copy_pairs(&frame[at + CHANNELS..], volume, out);
        }
    }

    /// Allocating form of `apply_into`
    pub fn apply(&mut self, frame: &[i16], stuff: i8, volume: i32) -> Vec<i16> {
        let mut out = Vec::with_capacity(frame.len() + CHANNELS);
        self.apply_into(frame, stuff, volume, &mut out);
        out
    }
}

impl Default for Stuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(pairs: usize) -> Vec<i16> {
        (0..pairs)
            .flat_map(|i| {
                let v = i16::try_from(i * 10).unwrap();
                [v, -v]
            })
            .collect()
    }

    fn left_steps(out: &[i16]) -> Vec<i16> {
        out.chunks(2)
            .zip(out.chunks(2).skip(1))
            .map(|(a, b)| b[0] - a[0])
            .collect()
    }

    #[test]
    fn test_unity_volume_is_exact_copy() {
        let mut stuffer = Stuffer::with_seed(1);
        let frame = ramp(352);
        assert_eq!(stuffer.apply(&frame, 0, UNITY_GAIN), frame);
    }

    #[test]
    fn test_insert_adds_averaged_pair() {
        let mut stuffer = Stuffer::with_seed(2);
        let frame = ramp(352);
        let out = stuffer.apply(&frame, 1, UNITY_GAIN);

        assert_eq!(out.len(), frame.len() + 2);
        // The ramp steps by 10, so the inserted pair is the only step of 5.
        assert_eq!(left_steps(&out).iter().filter(|&&s| s == 5).count(), 2);
        assert_eq!(out[0], frame[0]);
        assert_eq!(out[out.len() - 2], frame[frame.len() - 2]);
    }

    #[test]
    fn test_delete_removes_one_pair() {
        let mut stuffer = Stuffer::with_seed(3);
        let frame = ramp(352);
        let out = stuffer.apply(&frame, -1, UNITY_GAIN);

        assert_eq!(out.len(), frame.len() - 2);
        assert_eq!(left_steps(&out).iter().filter(|&&s| s == 20).count(), 1);
        assert_eq!(out[0], frame[0]);
        assert_eq!(out[out.len() - 2], frame[frame.len() - 2]);
    }

    #[test]
    fn test_split_never_at_edges() {
        let mut stuffer = Stuffer::with_seed(4);
        let frame = ramp(4);
        for _ in 0..200 {
            let out = stuffer.apply(&frame, -1, UNITY_GAIN);
            assert_eq!(out[0], frame[0]);
            assert_eq!(out[out.len() - 2], frame[frame.len() - 2]);
        }
    }

    #[test]
    fn test_zero_volume_is_near_silent() {
        let mut stuffer = Stuffer::with_seed(5);
        let frame = vec![i16::MAX; 704];
        let out = stuffer.apply(&frame, 0, 0);
        assert!(out.iter().all(|&s| s == 0 || s == -1));
    }

    #[test]
    fn test_half_volume_scales() {
        let mut stuffer = Stuffer::with_seed(6);
        let frame = vec![10_000i16; 704];
        let out = stuffer.apply(&frame, 0, UNITY_GAIN / 2);
        assert!(out.iter().all(|&s| (4_999..=5_000).contains(&s)));
    }

    #[test]
    fn test_extremes_do_not_overflow() {
        let mut stuffer = Stuffer::with_seed(7);
        let frame = vec![i16::MIN; 704];
        let out = stuffer.apply(&frame, 1, UNITY_GAIN - 1);
        assert!(out.iter().all(|&s| s <= -32_767));
    }
}
