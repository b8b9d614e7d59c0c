//! Tempo Resolution
//!
//! The active tempo can come from four places: the tempo knob, the period of an
//! external clock, the period between two taps, and CV modulation. The
//! [`TempoArbiter`] decides every frame which of them wins.

use crate::serialize::{read_f64, StateError};
use serde::{Deserialize, Serialize};

/// Tempo every field starts from
pub const DEFAULT_BPM: f64 = 115.0;

/// Longest period accepted from a clock or tap input (seconds)
pub const MAX_INTERVAL: f64 = 60.0;

/// Shortest period accepted from the external clock input (seconds)
pub const MIN_CLOCK_INTERVAL: f64 = 0.001;

/// Shortest period accepted from the tap button (seconds)
pub const MIN_TAP_INTERVAL: f64 = 0.01;

/// Elapsed time saturates here; anything above [`MAX_INTERVAL`] is rejected anyway
const ELAPSED_CEILING: f64 = MAX_INTERVAL + 10.0;

/// Outcome of a single edge fed into a [`ClockMeasurement`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    /// No usable reference edge yet; this edge becomes the reference
    Armed,
    /// Period between this edge and the reference, in seconds
    Accepted(f64),
    /// Period below the plausible window (switch bounce, double trigger)
    TooShort(f64),
    /// Period above the plausible window
    TooLong(f64),
}

impl Measurement {
    pub fn accepted(self) -> Option<f64> {
        match self {
            Measurement::Accepted(interval) => Some(interval),
            _ => None,
        }
    }
}

/// Period meter between consecutive edges of a pulse input
///
/// The meter runs continuously: an accepted edge is also the reference for the
/// next period, so a steady clock yields a measurement on every edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockMeasurement {
    elapsed: f64,
    has_reference: bool,
    min_interval: f64,
}

impl ClockMeasurement {
    pub fn new(min_interval: f64) -> Self {
        Self {
            elapsed: 0.0,
            has_reference: false,
            min_interval,
        }
    }

    /// Meter for the external clock input
    pub fn clock() -> Self {
        Self::new(MIN_CLOCK_INTERVAL)
    }

    /// Meter for the tap tempo button
    pub fn tap() -> Self {
        Self::new(MIN_TAP_INTERVAL)
    }

    /// Register an edge at the current frame
    pub fn edge(&mut self) -> Measurement {
        if !self.has_reference {
            self.has_reference = true;
            self.elapsed = 0.0;
            return Measurement::Armed;
        }

        let interval = self.elapsed;
        if interval > MAX_INTERVAL {
            self.rearm();
            Measurement::TooLong(interval)
        } else if interval < self.min_interval {
            self.rearm();
            Measurement::TooShort(interval)
        } else {
            // This edge is the reference for the next period
            self.elapsed = 0.0;
            Measurement::Accepted(interval)
        }
    }

    /// Let `delta` seconds pass
    pub fn advance(&mut self, delta: f64) {
        self.elapsed = (self.elapsed + delta).min(ELAPSED_CEILING);
    }

    /// Seconds since the reference edge
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn has_reference(&self) -> bool {
        self.has_reference
    }

    pub fn reset(&mut self) {
        self.rearm();
    }

    fn rearm(&mut self) {
        self.has_reference = false;
        self.elapsed = 0.0;
    }
}

/// Tempo bookkeeping that survives resets and is persisted with the module
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TempoState {
    /// Knob reading of the current frame
    #[serde(skip)]
    pub knob_bpm: f64,

    /// Knob reading of the previous frame, used to detect knob movement
    #[serde(rename = "lastKnobBPM")]
    pub last_knob_bpm: f64,

    /// Tempo driving the divider
    #[serde(rename = "bpm")]
    pub active_bpm: f64,

    /// Last tempo taken from a real source; the base for CV modulation
    #[serde(rename = "lastGoodBPM")]
    pub last_good_bpm: f64,

    /// Last knob or tap tempo; takes over when the clock input is unpatched
    #[serde(rename = "clockOutFallbackBPM")]
    pub fallback_bpm: f64,
}

impl TempoState {
    pub fn new(bpm: f64) -> Self {
        Self {
            knob_bpm: bpm,
            last_knob_bpm: bpm,
            active_bpm: bpm,
            last_good_bpm: bpm,
            fallback_bpm: bpm,
        }
    }

    /// Restore persisted fields from a state document.
    ///
    /// Missing or malformed keys keep their current value.
    pub fn load(&mut self, state: &serde_json::Value) -> Result<(), StateError> {
        let obj = state.as_object().ok_or(StateError::NotAnObject)?;

        if let Some(v) = read_f64(obj, "lastKnobBPM") {
            self.last_knob_bpm = v;
        }
        if let Some(v) = read_f64(obj, "bpm") {
            self.active_bpm = v;
        }
        if let Some(v) = read_f64(obj, "lastGoodBPM") {
            self.last_good_bpm = v;
        }
        if let Some(v) = read_f64(obj, "clockOutFallbackBPM") {
            self.fallback_bpm = v;
        }
        Ok(())
    }
}

impl Default for TempoState {
    fn default() -> Self {
        Self::new(DEFAULT_BPM)
    }
}

/// Per-frame view of everything that can influence the tempo
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TempoInputs {
    /// Tempo knob position in BPM
    pub knob_bpm: f64,
    /// Rising edge on the external clock input this frame
    pub clock_edge: bool,
    /// Rising edge on the tap button this frame
    pub tap_edge: bool,
    /// Whether a cable is patched into the external clock input
    pub clock_connected: bool,
    /// Attenuated modulation CV, `None` when the mod input is unpatched
    pub modulation: Option<f64>,
}

/// Resolves the active BPM from knob, clock, tap and modulation
#[derive(Debug, Clone)]
pub struct TempoArbiter {
    clock: ClockMeasurement,
    tap: ClockMeasurement,
    max_bpm: f64,
}

impl TempoArbiter {
    pub fn new(max_bpm: f64) -> Self {
        Self {
            clock: ClockMeasurement::clock(),
            tap: ClockMeasurement::tap(),
            max_bpm,
        }
    }

    /// Run one frame of tempo resolution and return the resolved BPM.
    ///
    /// Later rules override earlier ones: clock, tap, knob, clock unpatched,
    /// then modulation. `delta` is the frame duration in seconds.
    pub fn resolve(&mut self, state: &mut TempoState, inputs: &TempoInputs, delta: f64) -> f64 {
        if inputs.clock_edge {
            let measured = self.clock.edge();
            log_measurement("clock", measured);
            if let Some(interval) = measured.accepted() {
                state.active_bpm = 60.0 / interval;
                state.last_good_bpm = state.active_bpm;
            }
        }
        self.clock.advance(delta);

        if inputs.tap_edge {
            let measured = self.tap.edge();
            log_measurement("tap", measured);
            if let Some(interval) = measured.accepted() {
                state.active_bpm = 60.0 / interval;
                state.last_good_bpm = state.active_bpm;
                state.fallback_bpm = state.active_bpm;
            }
        }
        self.tap.advance(delta);

        state.knob_bpm = inputs.knob_bpm;
        if state.knob_bpm != state.last_knob_bpm {
            state.active_bpm = state.knob_bpm;
            state.last_good_bpm = state.knob_bpm;
            state.fallback_bpm = state.knob_bpm;
            state.last_knob_bpm = state.knob_bpm;
        }

        if !inputs.clock_connected {
            state.active_bpm = state.fallback_bpm;
        }

        if let Some(modulation) = inputs.modulation {
            let base = if inputs.clock_connected {
                state.last_good_bpm
            } else {
                state.fallback_bpm
            };
            state.active_bpm = self.modulate(base, modulation);
        }

        state.active_bpm
    }

    /// Scale `base` by a signed modulation amount.
    ///
    /// Positive values multiply by `1 + m`, negative values divide by `1 - m`,
    /// so equal positive and negative amounts are symmetric in tempo ratio.
    pub fn modulate(&self, base: f64, modulation: f64) -> f64 {
        let bpm = if modulation > 0.0 {
            base * (1.0 + modulation)
        } else if modulation < 0.0 {
            base / (1.0 - modulation)
        } else {
            base
        };
        bpm.clamp(0.0, self.max_bpm)
    }

    pub fn clock_measurement(&self) -> &ClockMeasurement {
        &self.clock
    }

    pub fn tap_measurement(&self) -> &ClockMeasurement {
        &self.tap
    }
}

fn log_measurement(source: &str, measured: Measurement) {
    match measured {
        Measurement::Armed => {}
        Measurement::Accepted(interval) => log::debug!(
            target: "pulsegrid::tempo",
            "{} period {:.4}s -> {:.2} BPM",
            source,
            interval,
            60.0 / interval
        ),
        Measurement::TooShort(interval) | Measurement::TooLong(interval) => log::debug!(
            target: "pulsegrid::tempo",
            "{} period {:.4}s outside plausible window, re-arming",
            source,
            interval
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const DT: f64 = 0.001;

    fn run(meter: &mut ClockMeasurement, seconds: f64) {
        let frames = (seconds / DT).round() as usize;
        for _ in 0..frames {
            meter.advance(DT);
        }
    }

    #[test]
    fn test_first_edge_only_arms() {
        let mut meter = ClockMeasurement::clock();
        assert_eq!(meter.edge(), Measurement::Armed);
        assert!(meter.has_reference());
    }

    #[test]
    fn test_measures_every_edge_of_steady_clock() {
        let mut meter = ClockMeasurement::clock();
        meter.edge();
        for _ in 0..4 {
            run(&mut meter, 0.5);
            let interval = meter.edge().accepted().unwrap();
            assert_relative_eq!(interval, 0.5, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_too_short_rearms() {
        let mut meter = ClockMeasurement::tap();
        meter.edge();
        run(&mut meter, 0.005);
        assert!(matches!(meter.edge(), Measurement::TooShort(_)));
        assert!(!meter.has_reference());

        // The next edge starts a fresh measurement
        assert_eq!(meter.edge(), Measurement::Armed);
    }

    #[test]
    fn test_clock_accepts_shorter_periods_than_tap() {
        let mut clock = ClockMeasurement::clock();
        let mut tap = ClockMeasurement::tap();
        clock.edge();
        tap.edge();
        run(&mut clock, 0.005);
        run(&mut tap, 0.005);
        assert!(clock.edge().accepted().is_some());
        assert!(tap.edge().accepted().is_none());
    }

    #[test]
    fn test_too_long_rearms_and_elapsed_saturates() {
        let mut meter = ClockMeasurement::clock();
        meter.edge();
        for _ in 0..100 {
            meter.advance(1.0);
        }
        assert!(meter.elapsed() <= ELAPSED_CEILING);
        assert!(matches!(meter.edge(), Measurement::TooLong(_)));
        assert!(!meter.has_reference());
    }

    #[test]
    fn test_tempo_state_defaults() {
        let state = TempoState::default();
        assert_eq!(state.active_bpm, DEFAULT_BPM);
        assert_eq!(state.last_good_bpm, DEFAULT_BPM);
        assert_eq!(state.fallback_bpm, DEFAULT_BPM);
        assert_eq!(state.last_knob_bpm, DEFAULT_BPM);
    }

    #[test]
    fn test_tempo_state_serializes_with_persisted_keys() {
        let state = TempoState::new(90.0);
        let value = serde_json::to_value(state).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 4);
        assert_eq!(obj["lastKnobBPM"], 90.0);
        assert_eq!(obj["bpm"], 90.0);
        assert_eq!(obj["lastGoodBPM"], 90.0);
        assert_eq!(obj["clockOutFallbackBPM"], 90.0);
    }

    #[test]
    fn test_tempo_state_load_is_per_key() {
        let mut state = TempoState::default();
        let doc = serde_json::json!({
            "bpm": 140.0,
            "lastGoodBPM": "fast",
        });
        state.load(&doc).unwrap();
        assert_eq!(state.active_bpm, 140.0);
        assert_eq!(state.last_good_bpm, DEFAULT_BPM);
        assert_eq!(state.fallback_bpm, DEFAULT_BPM);
    }

    #[test]
    fn test_tempo_state_load_rejects_non_object() {
        let mut state = TempoState::default();
        let result = state.load(&serde_json::json!([1, 2, 3]));
        assert!(matches!(result, Err(StateError::NotAnObject)));
        assert_eq!(state, TempoState::default());
    }

    #[test]
    fn test_knob_change_wins() {
        let mut arbiter = TempoArbiter::new(1_000_000.0);
        let mut state = TempoState::default();
        let inputs = TempoInputs {
            knob_bpm: 90.0,
            ..Default::default()
        };
        assert_eq!(arbiter.resolve(&mut state, &inputs, DT), 90.0);
        assert_eq!(state.fallback_bpm, 90.0);
        assert_eq!(state.last_good_bpm, 90.0);
        assert_eq!(state.last_knob_bpm, 90.0);
    }

    #[test]
    fn test_tap_sets_fallback() {
        let mut arbiter = TempoArbiter::new(1_000_000.0);
        let mut state = TempoState::default();
        let mut inputs = TempoInputs {
            knob_bpm: DEFAULT_BPM,
            tap_edge: true,
            ..Default::default()
        };
        arbiter.resolve(&mut state, &inputs, DT);

        inputs.tap_edge = false;
        for _ in 0..999 {
            arbiter.resolve(&mut state, &inputs, DT);
        }
        inputs.tap_edge = true;
        let bpm = arbiter.resolve(&mut state, &inputs, DT);

        // Taps one second apart
        assert_relative_eq!(bpm, 60.0, epsilon = 1e-6);
        assert_relative_eq!(state.fallback_bpm, 60.0, epsilon = 1e-6);
    }

    #[test]
    fn test_clock_does_not_touch_fallback() {
        let mut arbiter = TempoArbiter::new(1_000_000.0);
        let mut state = TempoState::default();
        let mut inputs = TempoInputs {
            knob_bpm: DEFAULT_BPM,
            clock_connected: true,
            clock_edge: true,
            ..Default::default()
        };
        arbiter.resolve(&mut state, &inputs, DT);
        inputs.clock_edge = false;
        for _ in 0..249 {
            arbiter.resolve(&mut state, &inputs, DT);
        }
        inputs.clock_edge = true;
        let bpm = arbiter.resolve(&mut state, &inputs, DT);

        assert_relative_eq!(bpm, 240.0, epsilon = 1e-6);
        assert_relative_eq!(state.last_good_bpm, 240.0, epsilon = 1e-6);
        assert_eq!(state.fallback_bpm, DEFAULT_BPM);

        // Unpatching the clock falls back immediately
        inputs.clock_edge = false;
        inputs.clock_connected = false;
        assert_eq!(arbiter.resolve(&mut state, &inputs, DT), DEFAULT_BPM);
    }

    #[test]
    fn test_modulation_scales_base_tempo() {
        let arbiter = TempoArbiter::new(1_000_000.0);
        assert_relative_eq!(arbiter.modulate(120.0, 1.0), 240.0);
        assert_relative_eq!(arbiter.modulate(120.0, -1.0), 60.0);
        assert_relative_eq!(arbiter.modulate(120.0, 0.0), 120.0);
        assert_eq!(arbiter.modulate(120.0, 1e9), 1_000_000.0);
        assert_eq!(arbiter.modulate(-5.0, 0.5), 0.0);
    }

    #[test]
    fn test_modulation_does_not_compound() {
        let mut arbiter = TempoArbiter::new(1_000_000.0);
        let mut state = TempoState::default();
        let inputs = TempoInputs {
            knob_bpm: DEFAULT_BPM,
            modulation: Some(1.0),
            ..Default::default()
        };
        for _ in 0..10 {
            arbiter.resolve(&mut state, &inputs, DT);
        }
        assert_relative_eq!(state.active_bpm, DEFAULT_BPM * 2.0);
        assert_eq!(state.fallback_bpm, DEFAULT_BPM);
    }

    #[test]
    fn test_modulation_uses_last_good_when_clocked() {
        let mut arbiter = TempoArbiter::new(1_000_000.0);
        let mut state = TempoState::default();
        state.last_good_bpm = 100.0;
        state.fallback_bpm = 80.0;
        let inputs = TempoInputs {
            knob_bpm: DEFAULT_BPM,
            clock_connected: true,
            modulation: Some(0.5),
            ..Default::default()
        };
        assert_relative_eq!(arbiter.resolve(&mut state, &inputs, DT), 150.0);
    }
}
