use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

// Time source for the admission controller, in ms since the unix epoch
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

// Wall-clock reading taken once at startup, advanced by a monotonic
// Instant so NTP steps cannot move windows backwards
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    started: Instant,
    epoch_ms_at_start: u64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            // clamp pre-epoch clocks to zero instead of wrapping
            epoch_ms_at_start: chrono::Utc::now().timestamp_millis().max(0) as u64,
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        let elapsed = u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.epoch_ms_at_start.saturating_add(elapsed)
    }
}

// clock that only moves when told to, so tests can step across window
// boundaries without sleeping
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_on_request() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);
        clock.set(42);
        assert_eq!(clock.now_ms(), 42);
    }

    #[test]
    fn system_clock_is_after_2020() {
        // 2020-01-01T00:00:00Z
        assert!(SystemClock::new().now_ms() > 1_577_836_800_000);
    }

    #[test]
    fn system_clock_never_goes_backwards() {
        let clock = SystemClock::new();
        let mut last = clock.now_ms();
        for _ in 0..1_000 {
            let now = clock.now_ms();
            assert!(now >= last);
            last = now;
        }
        std::thread::sleep(std::time::Duration::from_millis(20));
        assert!(clock.now_ms() >= last + 20);
    }
}
