// src/clock.rs - Monotonic time source behind a trait so jobs can run
// against real time or a simulated clock.
use std::cell::Cell;
use std::time::{Duration, Instant};

/// Time interface used by the stepping loop and the settle delays.
///
/// `now_micros` must be monotonic; the dual-channel stepping loop compares
/// it against per-axis next-fire deadlines on every iteration.
pub trait Clock: Send {
    fn now_micros(&self) -> u64;
    fn sleep_ms(&self, ms: u64);
}

/// Wall-time clock for driving real hardware.
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_micros(&self) -> u64 {
        self.epoch.elapsed().as_micros() as u64
    }

    fn sleep_ms(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// Clock that only advances when polled, by a fixed quantum per poll.
///
/// Simulated jobs complete at full speed with the exact same interleaving
/// the busy-wait loop would produce in real time, which also makes timing
/// tests deterministic.
pub struct SimClock {
    now: Cell<u64>,
    quantum_us: u64,
}

impl SimClock {
    pub fn new(quantum_us: u64) -> Self {
        Self {
            now: Cell::new(0),
            quantum_us,
        }
    }

    /// Current simulated time without advancing it.
    pub fn elapsed_us(&self) -> u64 {
        self.now.get()
    }
}

impl Clock for SimClock {
    fn now_micros(&self) -> u64 {
        let t = self.now.get();
        self.now.set(t + self.quantum_us);
        t
    }

    fn sleep_ms(&self, ms: u64) {
        self.now.set(self.now.get() + ms * 1000);
    }
}
