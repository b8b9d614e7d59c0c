//! Edge Detection and Pulse Timing
//!
//! Every button and trigger input goes through a [`SchmittTrigger`]; every gate
//! output is held high by a [`PulseGenerator`] for a fixed duration.

/// Schmitt-style rising edge detector
///
/// Fires exactly once when the signal rises above the high threshold, then stays
/// quiet until the signal falls back to the low threshold.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SchmittTrigger {
    high: bool,
}

impl SchmittTrigger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one sample; returns true on the frame of a rising edge
    pub fn process(&mut self, signal: f64, low: f64, high: f64) -> bool {
        if self.high {
            if signal <= low {
                self.high = false;
            }
            false
        } else if signal >= high {
            self.high = true;
            true
        } else {
            false
        }
    }

    /// Whether the detector currently considers its input high
    pub fn is_high(&self) -> bool {
        self.high
    }

    pub fn reset(&mut self) {
        self.high = false;
    }
}

/// Latching pulse that expires after a requested duration
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PulseGenerator {
    remaining: f64,
}

impl PulseGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start or refresh the pulse. A shorter request never cuts a longer pulse.
    pub fn trigger(&mut self, duration: f64) {
        if duration > self.remaining {
            self.remaining = duration;
        }
    }

    /// Advance by `delta` seconds; returns whether the pulse was high for this frame
    pub fn process(&mut self, delta: f64) -> bool {
        if self.remaining > 0.0 {
            self.remaining -= delta;
            true
        } else {
            false
        }
    }

    /// Time left before the pulse expires
    pub fn remaining(&self) -> f64 {
        self.remaining.max(0.0)
    }

    pub fn reset(&mut self) {
        self.remaining = 0.0;
    }
}
