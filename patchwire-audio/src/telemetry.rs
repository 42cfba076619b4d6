//! Warning telemetry: per-window aggregation instead of per-event spam.
//!
//! Runtime and bridge warnings are counted by stable code in a fixed-size
//! table (no allocation in the hot path) and emitted as one summary line
//! per code at window boundaries.

/// Distinct warning codes tracked per window.
const WARNING_SLOTS: usize = 16;

/// Allocation-free per-window warning counter.
pub struct WarningAggregator {
    slots: [(Option<&'static str>, u64); WARNING_SLOTS],
    /// Codes that did not fit in the table.
    overflowed: u64,
}

impl WarningAggregator {
    pub fn new() -> Self {
        Self {
            slots: [(None, 0); WARNING_SLOTS],
            overflowed: 0,
        }
    }

    /// Count one occurrence of a warning code.
    pub fn record(&mut self, code: &'static str) {
        for slot in &mut self.slots {
            match slot.0 {
                Some(existing) if existing == code => {
                    slot.1 += 1;
                    return;
                }
                None => {
                    *slot = (Some(code), 1);
                    return;
                }
                _ => {}
            }
        }
        self.overflowed += 1;
    }

    /// Total count recorded for one code in the current window.
    pub fn count(&self, code: &str) -> u64 {
        self.slots
            .iter()
            .find(|(c, _)| *c == Some(code))
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }

    /// Drain the window: returns `(code, count)` pairs and resets.
    pub fn take_summary(&mut self) -> Vec<(&'static str, u64)> {
        let mut out = Vec::new();
        for slot in &mut self.slots {
            if let (Some(code), n) = *slot {
                out.push((code, n));
            }
            *slot = (None, 0);
        }
        self.overflowed = 0;
        out
    }

    /// Emit one `log::warn!` line per code and reset the window.
    pub fn flush_log(&mut self, target: &str) {
        for (code, n) in self.take_summary() {
            log::warn!(target: target, "{} x{}", code, n);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(|(c, _)| c.is_none()) && self.overflowed == 0
    }
}

impl Default for WarningAggregator {
    fn default() -> Self {
        Self::new()
    }
}
