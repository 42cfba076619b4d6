//! Transport: the mapping between engine ticks and host-clock seconds.

use serde::{Deserialize, Serialize};

/// Engine ticks per beat. A global constant, never persisted.
pub const TICKS_PER_BEAT: f64 = 4.0;

/// Tick <-> seconds mapping state. `bpm` is persisted with the project;
/// `origin_sec` is the host-clock time of tick 0 and is set when the
/// transport (re)starts.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transport {
    pub bpm: f64,
    pub ticks_per_beat: f64,
    pub origin_sec: f64,
}

impl Transport {
    pub fn new(bpm: f64) -> Self {
        Self {
            bpm,
            ticks_per_beat: TICKS_PER_BEAT,
            origin_sec: 0.0,
        }
    }

    pub fn seconds_per_tick(&self) -> f64 {
        60.0 / (self.bpm * self.ticks_per_beat)
    }

    pub fn tick_to_seconds(&self, tick: f64) -> f64 {
        self.origin_sec + tick * self.seconds_per_tick()
    }

    pub fn seconds_to_tick(&self, sec: f64) -> f64 {
        (sec - self.origin_sec) / self.seconds_per_tick()
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new(120.0)
    }
}
