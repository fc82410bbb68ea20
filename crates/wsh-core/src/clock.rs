//! Monotonic and wall-clock time, plus a deterministic fixed-clock variant.

use parking_lot::Mutex;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// A source of monotonic and wall-clock time, and an async sleep primitive.
///
/// Implementors must guarantee `now_monotonic` never decreases across calls.
#[async_trait::async_trait]
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Milliseconds on a monotonic clock that never goes backwards.
    fn now_monotonic(&self) -> u64;

    /// Milliseconds since the Unix epoch.
    fn now_wall(&self) -> u64;

    /// Suspends until at least `ms` milliseconds of real time have elapsed.
    async fn sleep(&self, ms: u64);
}

/// The default clock, backed by [`std::time::Instant`] and
/// [`std::time::SystemTime`].
#[derive(Debug, Default)]
pub struct SystemClock {
    start: once_cell_lite::OnceInstant,
}

impl SystemClock {
    /// Creates a new system clock, anchored to the moment of construction.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl Clock for SystemClock {
    fn now_monotonic(&self) -> u64 {
        self.start.get().elapsed().as_millis() as u64
    }

    fn now_wall(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64
    }

    async fn sleep(&self, ms: u64) {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }
}

/// A deterministic clock for testing: `now_monotonic`/`now_wall` return
/// preset values that only advance when [`FixedClock::sleep`] is called.
#[derive(Debug)]
pub struct FixedClock {
    inner: Mutex<FixedState>,
}

#[derive(Debug)]
struct FixedState {
    monotonic: u64,
    wall: u64,
}

impl FixedClock {
    /// Creates a fixed clock starting at the given monotonic/wall values.
    pub fn new(monotonic: u64, wall: u64) -> Self {
        Self {
            inner: Mutex::new(FixedState { monotonic, wall }),
        }
    }

    /// Advances both monotonic and wall time by `ms` without suspending.
    pub fn advance(&self, ms: u64) {
        let mut state = self.inner.lock();
        state.monotonic += ms;
        state.wall += ms;
    }
}

#[async_trait::async_trait]
impl Clock for FixedClock {
    fn now_monotonic(&self) -> u64 {
        self.inner.lock().monotonic
    }

    fn now_wall(&self) -> u64 {
        self.inner.lock().wall
    }

    async fn sleep(&self, ms: u64) {
        self.advance(ms);
    }
}

/// Tiny helper so `SystemClock` can lazily anchor its `Instant` without
/// pulling in `once_cell` for a single field.
mod once_cell_lite {
    use std::sync::OnceLock;
    use std::time::Instant;

    #[derive(Debug, Default)]
    pub struct OnceInstant(OnceLock<Instant>);

    impl OnceInstant {
        pub fn get(&self) -> Instant {
            *self.0.get_or_init(Instant::now)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_clock_monotonic_never_decreases() {
        let clock = SystemClock::new();
        let a = clock.now_monotonic();
        let b = clock.now_monotonic();
        assert!(b >= a);
    }

    #[tokio::test]
    async fn fixed_clock_sleep_advances_both() {
        let clock = FixedClock::new(0, 1_000);
        clock.sleep(50).await;
        assert_eq!(clock.now_monotonic(), 50);
        assert_eq!(clock.now_wall(), 1_050);
    }
}
