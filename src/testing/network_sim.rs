//! Network condition simulation for testing

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Packet loss and reordering simulator
///
/// Seeded so that a given test always sees the same impairments.
#[derive(Debug)]
pub struct NetworkSimulator {
    /// Packet loss probability (0.0 to 1.0)
    pub loss_rate: f64,
    /// Probability of swapping a packet with its successor
    pub reorder_rate: f64,
    rng: StdRng,
}

impl NetworkSimulator {
    /// Perfect network (no issues)
    #[must_use]
    pub fn perfect(seed: u64) -> Self {
        Self::new(0.0, 0.0, seed)
    }

    /// Moderate `WiFi` conditions
    #[must_use]
    pub fn moderate_wifi(seed: u64) -> Self {
        Self::new(0.01, 0.01, seed)
    }

    /// Poor `WiFi` conditions
    #[must_use]
    pub fn poor_wifi(seed: u64) -> Self {
        Self::new(0.05, 0.05, seed)
    }

    /// Custom conditions
    #[must_use]
    pub fn new(loss_rate: f64, reorder_rate: f64, seed: u64) -> Self {
        Self {
            loss_rate,
            reorder_rate,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Should this packet be dropped?
    pub fn should_drop(&mut self) -> bool {
        self.loss_rate > 0.0 && self.rng.gen_bool(self.loss_rate)
    }

    /// Should this packet be swapped with the next one?
    pub fn should_reorder(&mut self) -> bool {
        self.reorder_rate > 0.0 && self.rng.gen_bool(self.reorder_rate)
    }

    /// Apply loss and reordering to a batch, returning what arrives and what was lost
    pub fn transmit<T>(&mut self, packets: Vec<T>) -> (Vec<T>, Vec<T>) {
        let mut delivered = Vec::with_capacity(packets.len());
        let mut lost = Vec::new();

        for packet in packets {
            if self.should_drop() {
                lost.push(packet);
            } else {
                delivered.push(packet);
            }
        }

        let mut i = 0;
        while i + 1 < delivered.len() {
            if self.should_reorder() {
                delivered.swap(i, i + 1);
                i += 2;
            } else {
                i += 1;
            }
        }

        (delivered, lost)
    }
}
