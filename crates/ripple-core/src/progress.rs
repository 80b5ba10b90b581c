//! Cooperative progress and cancellation channel.
//!
//! [`Progress`] is the only piece of engine state documented safe to share
//! with a thread other than the one driving the graph traversal: a UI or
//! worker thread may poll the fraction and request cancellation while the
//! traversal runs. It is outbound telemetry and inbound cancellation only,
//! never a data path for parameters.
//!
//! Cancellation is cooperative. A driver that ignores the flag runs to
//! completion; the scheduler checks it between vertices.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// Shared progress/cancellation handle. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct Progress {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    // Completion fraction, stored as f32 bits.
    fraction: AtomicU32,
}

impl Progress {
    /// Creates a fresh handle: not cancelled, fraction 0.
    pub fn new() -> Self {
        Progress::default()
    }

    /// Requests cancellation. Sticky until [`Progress::reset`].
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Relaxed);
    }

    /// Returns `true` once cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Relaxed)
    }

    /// Publishes a completion fraction in `[0, 1]`.
    pub fn set_fraction(&self, fraction: f32) {
        let clamped = fraction.clamp(0.0, 1.0);
        self.inner.fraction.store(clamped.to_bits(), Ordering::Relaxed);
    }

    /// Returns the last published completion fraction.
    pub fn fraction(&self) -> f32 {
        f32::from_bits(self.inner.fraction.load(Ordering::Relaxed))
    }

    /// Clears cancellation and fraction for the next session.
    pub fn reset(&self) {
        self.inner.cancelled.store(false, Ordering::Relaxed);
        self.inner.fraction.store(0f32.to_bits(), Ordering::Relaxed);
    }
}
