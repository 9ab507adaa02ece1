//! Volume mapping and the live software gain

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Sentinel dB value meaning mute
pub const VOLUME_MUTE_DB: f64 = -144.0;

/// Quietest audible setting
pub const VOLUME_MIN_DB: f64 = -30.0;

/// Full volume
pub const VOLUME_MAX_DB: f64 = 0.0;

/// Unity gain in 16.16 fixed point
pub const UNITY_GAIN: i32 = 0x1_0000;

/// Convert a sender volume in dB to linear gain (0.0 to 1.0)
///
/// Anything at or below the mute sentinel is silence; other values are
/// clamped to the -30..0 dB range first.
#[must_use]
pub fn db_to_linear(db: f64) -> f64 {
    if db.is_nan() || db <= VOLUME_MUTE_DB {
        return 0.0;
    }
    let db = db.clamp(VOLUME_MIN_DB, VOLUME_MAX_DB);
    10.0_f64.powf(db / 20.0)
}

/// Linear gain as 16.16 fixed point
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn linear_to_fixed(linear: f64) -> i32 {
    (f64::from(UNITY_GAIN) * linear.clamp(0.0, 1.0)) as i32
}

#[derive(Debug, Clone, Copy)]
struct VolumeState {
    db: f64,
    linear: f64,
    fixed: i32,
    hardware: bool,
    pending_hardware: Option<f64>,
}

/// Current volume, shared between the control plane and the playout thread
///
/// Guarded by its own lock so a volume change never waits on the buffer.
#[derive(Debug)]
pub struct VolumeControl {
    inner: Mutex<VolumeState>,
}

impl VolumeControl {
    /// Software volume starting at `db`
    #[must_use]
    pub fn new(db: f64) -> Self {
        let linear = db_to_linear(db);
        Self {
            inner: Mutex::new(VolumeState {
                db,
                linear,
                fixed: linear_to_fixed(linear),
                hardware: false,
                pending_hardware: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VolumeState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a volume change from the sender
    pub fn set_db(&self, db: f64) {
        let mut state = self.lock();
        state.db = db;
        if state.hardware {
            state.pending_hardware = Some(db);
        } else {
            state.linear = db_to_linear(db);
            state.fixed = linear_to_fixed(state.linear);
        }
        tracing::debug!(db, linear = state.linear, hardware = state.hardware, "Volume changed");
    }

    /// Switch between software gain and forwarding to a hardware mixer
    ///
    /// With a hardware mixer the software gain is unity and the current dB
    /// value is queued for the sink.
    pub fn set_hardware(&self, hardware: bool) {
        let mut state = self.lock();
        state.hardware = hardware;
        if hardware {
            state.linear = 1.0;
            state.fixed = UNITY_GAIN;
            state.pending_hardware = Some(state.db);
        } else {
            state.linear = db_to_linear(state.db);
            state.fixed = linear_to_fixed(state.linear);
            state.pending_hardware = None;
        }
    }

    /// Software gain in 16.16 fixed point
    #[must_use]
    pub fn fixed(&self) -> i32 {
        self.lock().fixed
    }

    /// Software gain as a linear factor
    #[must_use]
    pub fn linear(&self) -> f64 {
        self.lock().linear
    }

    /// Last volume set, in dB
    #[must_use]
    pub fn db(&self) -> f64 {
        self.lock().db
    }

    /// Take a dB value waiting to be forwarded to the hardware mixer
    pub fn take_hardware_update(&self) -> Option<f64> {
        self.lock().pending_hardware.take()
    }
}

impl Default for VolumeControl {
    fn default() -> Self {
        Self::new(VOLUME_MAX_DB)
    }
}
