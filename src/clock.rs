//! Virtual time for a simulation run.
//!
//! Plays the role of `now` in the emulated contract. Only the driver advances
//! it, and only forward.

#[derive(Debug, Clone, Copy, Default)]
pub struct Clock {
    now_s: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current virtual time in seconds.
    pub fn now(&self) -> u64 {
        self.now_s
    }

    /// Jump to `t`. Attempts to move backwards are ignored.
    pub fn set(&mut self, t: u64) {
        debug_assert!(t >= self.now_s, "clock moved backwards: {t} < {}", self.now_s);
        if t > self.now_s {
            self.now_s = t;
        }
    }

    pub fn add(&mut self, dt: u64) {
        self.now_s += dt;
    }
}
