//! Trigger Clock
//!
//! A tempo clock with fourteen phase-locked trigger outputs: sixteenths,
//! eighth and quarter triplets, straight and offbeat eighths, quarters and
//! halves, whole notes, and 3/4, 5/4, 6/4, 7/4 polymeter tracks.
//!
//! The tempo comes from the knob, an external clock, tap tempo or CV
//! modulation (see [`TempoArbiter`]). Each call to [`TriggerClock::process`]
//! runs one sample frame in a fixed order:
//!
//! ```text
//! edge detection -> tempo resolution -> reset -> bypass -> divider -> LED
//! ```
//!
//! A reset wipes the divider but never the tempo memory.

use crate::divider::{DividerEngine, GateOutput, GATE_COUNT};
use crate::port::{
    GraphModule, ParamDef, ParamId, PortDef, PortSpec, PortValues, SignalKind, TRIGGER_HIGH,
    TRIGGER_LOW,
};
use crate::serialize::StateError;
use crate::tempo::{TempoArbiter, TempoInputs, TempoState, DEFAULT_BPM};
use crate::trigger::SchmittTrigger;
use serde::{Deserialize, Serialize};

/// Input port ids
pub const TEMPO_MOD_INPUT: u32 = 0;
pub const RESET_INPUT: u32 = 1;
pub const CLOCK_INPUT: u32 = 2;

/// First output port id; gate `g` lives at `FIRST_GATE_OUTPUT + g.index()`
pub const FIRST_GATE_OUTPUT: u32 = 10;

/// Beat LED level, brightness scaled to the gate voltage
pub const BEAT_LIGHT_OUTPUT: u32 = FIRST_GATE_OUTPUT + GATE_COUNT as u32;

/// Parameter ids
pub const TEMPO_MOD_ATTEN_PARAM: ParamId = 0;
pub const TEMPO_PARAM: ParamId = 1;
pub const RESET_BUTTON_PARAM: ParamId = 2;
pub const TAP_BUTTON_PARAM: ParamId = 3;

/// Timing and level constants of the clock
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Length of every output pulse in seconds
    pub pulse_width: f64,
    /// Voltage of a high output
    pub gate_voltage: f64,
    /// On-time of the beat LED in seconds
    pub led_duration: f64,
    /// Schmitt low threshold for clock, tap and reset
    pub trigger_low: f64,
    /// Schmitt high threshold for clock, tap and reset
    pub trigger_high: f64,
    /// Starting tempo
    pub default_bpm: f64,
    /// Ceiling for modulated tempo
    pub max_bpm: f64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            pulse_width: 0.001,
            gate_voltage: 10.0,
            led_duration: 0.050,
            trigger_low: TRIGGER_LOW,
            trigger_high: TRIGGER_HIGH,
            default_bpm: DEFAULT_BPM,
            max_bpm: 1_000_000.0,
        }
    }
}

/// Panel controls and jacks for one frame. `None` means the jack is unpatched.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockInputs {
    /// Tempo knob, 0–300 BPM
    pub tempo_knob: f64,
    /// Tempo modulation attenuator, 0–1
    pub tempo_mod_atten: f64,
    /// Reset button, 0–2
    pub reset_button: f64,
    /// Tap tempo button, 0–2
    pub tap_button: f64,
    pub tempo_mod_cv: Option<f64>,
    pub reset_cv: Option<f64>,
    pub clock_cv: Option<f64>,
}

impl Default for ClockInputs {
    fn default() -> Self {
        Self {
            tempo_knob: DEFAULT_BPM,
            tempo_mod_atten: 0.0,
            reset_button: 0.0,
            tap_button: 0.0,
            tempo_mod_cv: None,
            reset_cv: None,
            clock_cv: None,
        }
    }
}

/// Output voltages and beat LED brightness for one frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClockOutputs {
    pub gates: [f64; GATE_COUNT],
    pub beat_light: f64,
}

impl ClockOutputs {
    pub fn gate(&self, output: GateOutput) -> f64 {
        self.gates[output.index()]
    }

    /// True when every gate and the LED are at zero
    pub fn is_silent(&self) -> bool {
        self.beat_light == 0.0 && self.gates.iter().all(|&v| v == 0.0)
    }
}

/// Beat indicator with its own decay timer
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct BeatLight {
    on: bool,
    remaining: f64,
}

impl BeatLight {
    fn arm(&mut self, duration: f64) {
        self.on = true;
        self.remaining = duration;
    }

    fn process(&mut self, delta: f64) -> bool {
        if self.on {
            self.remaining -= delta;
            if self.remaining <= 0.0 {
                self.on = false;
            }
        }
        self.on
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// The clock module
pub struct TriggerClock {
    config: ClockConfig,
    sample_rate: f64,
    tempo: TempoState,
    arbiter: TempoArbiter,
    divider: DividerEngine,
    clock_trigger: SchmittTrigger,
    tap_trigger: SchmittTrigger,
    reset_trigger: SchmittTrigger,
    light: BeatLight,
    bypassed: bool,
    panel: ClockInputs,
    last_outputs: ClockOutputs,
    spec: PortSpec,
    param_defs: Vec<ParamDef>,
}

impl TriggerClock {
    pub fn new(sample_rate: f64) -> Self {
        Self::with_config(sample_rate, ClockConfig::default())
    }

    pub fn with_config(sample_rate: f64, config: ClockConfig) -> Self {
        let mut outputs = Vec::with_capacity(GATE_COUNT + 1);
        for gate in GateOutput::ALL {
            outputs.push(PortDef::new(
                FIRST_GATE_OUTPUT + gate.index() as u32,
                gate.name(),
                SignalKind::Trigger,
            ));
        }
        outputs.push(PortDef::new(BEAT_LIGHT_OUTPUT, "beat_light", SignalKind::CvUnipolar));

        let panel = ClockInputs {
            tempo_knob: config.default_bpm,
            ..ClockInputs::default()
        };

        Self {
            config,
            sample_rate,
            tempo: TempoState::new(config.default_bpm),
            arbiter: TempoArbiter::new(config.max_bpm),
            divider: DividerEngine::new(),
            clock_trigger: SchmittTrigger::new(),
            tap_trigger: SchmittTrigger::new(),
            reset_trigger: SchmittTrigger::new(),
            light: BeatLight::default(),
            bypassed: false,
            panel,
            last_outputs: ClockOutputs::default(),
            spec: PortSpec {
                inputs: vec![
                    PortDef::new(TEMPO_MOD_INPUT, "tempo_mod", SignalKind::CvBipolar)
                        .with_attenuator(),
                    PortDef::new(RESET_INPUT, "reset", SignalKind::Trigger),
                    PortDef::new(CLOCK_INPUT, "clock", SignalKind::Clock),
                ],
                outputs,
            },
            param_defs: vec![
                ParamDef::linear(TEMPO_MOD_ATTEN_PARAM, "tempo_mod_atten", 0.0, 1.0, 0.0),
                ParamDef::linear(TEMPO_PARAM, "tempo", 0.0, 300.0, config.default_bpm),
                ParamDef::linear(RESET_BUTTON_PARAM, "reset_button", 0.0, 2.0, 0.0),
                ParamDef::linear(TAP_BUTTON_PARAM, "tap_button", 0.0, 2.0, 0.0),
            ],
        }
    }

    /// Run one sample frame of `frame_duration` seconds
    pub fn process(&mut self, frame_duration: f64, inputs: &ClockInputs) -> ClockOutputs {
        let (low, high) = (self.config.trigger_low, self.config.trigger_high);

        let clock_edge = self
            .clock_trigger
            .process(inputs.clock_cv.unwrap_or(0.0), low, high);
        let tap_edge = self.tap_trigger.process(inputs.tap_button, low, high);

        // Button and jack share one detector
        let reset_held =
            inputs.reset_button > high || inputs.reset_cv.unwrap_or(0.0) > high;
        let reset_level = if reset_held { high + 0.1 } else { 0.0 };
        let reset_edge = self.reset_trigger.process(reset_level, low, high);

        let tempo_inputs = TempoInputs {
            knob_bpm: inputs.tempo_knob,
            clock_edge,
            tap_edge,
            clock_connected: inputs.clock_cv.is_some(),
            modulation: inputs
                .tempo_mod_cv
                .map(|cv| cv * inputs.tempo_mod_atten),
        };
        let bpm = self
            .arbiter
            .resolve(&mut self.tempo, &tempo_inputs, frame_duration);

        if reset_edge {
            log::debug!(target: "pulsegrid::clock", "reset");
            self.reset();
            return self.emit(ClockOutputs::default());
        }

        if bpm <= 0.0 {
            if !self.bypassed {
                log::debug!(target: "pulsegrid::clock", "tempo {} BPM, bypassing", bpm);
                self.bypassed = true;
            }
            self.divider.silence();
            self.light.reset();
            return self.emit(ClockOutputs::default());
        }
        if self.bypassed {
            log::debug!(target: "pulsegrid::clock", "tempo restored to {:.2} BPM", bpm);
            self.bypassed = false;
        }

        let frame = self
            .divider
            .process(bpm, frame_duration, self.config.pulse_width);

        if frame.fired(GateOutput::Quarter) {
            self.light.arm(self.config.led_duration);
        }
        let light_on = self.light.process(frame_duration);

        let mut outputs = ClockOutputs {
            beat_light: if light_on { 1.0 } else { 0.0 },
            ..ClockOutputs::default()
        };
        for (voltage, &on) in outputs.gates.iter_mut().zip(frame.gates.iter()) {
            *voltage = if on { self.config.gate_voltage } else { 0.0 };
        }
        self.emit(outputs)
    }

    fn emit(&mut self, outputs: ClockOutputs) -> ClockOutputs {
        self.last_outputs = outputs;
        outputs
    }

    /// Tempo currently driving the divider
    pub fn bpm(&self) -> f64 {
        self.tempo.active_bpm
    }

    pub fn tempo(&self) -> &TempoState {
        &self.tempo
    }

    pub fn divider(&self) -> &DividerEngine {
        &self.divider
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn is_bypassed(&self) -> bool {
        self.bypassed
    }

    /// Beat LED brightness of the last frame
    pub fn beat_light(&self) -> f64 {
        self.last_outputs.beat_light
    }

    /// Outputs of the last frame
    pub fn last_outputs(&self) -> &ClockOutputs {
        &self.last_outputs
    }

    /// Panel state used when driven through [`GraphModule::tick`]
    pub fn panel(&self) -> &ClockInputs {
        &self.panel
    }

    /// Persisted tempo memory
    pub fn save_state(&self) -> serde_json::Value {
        serde_json::to_value(self.tempo).unwrap_or(serde_json::Value::Null)
    }

    /// Restore tempo memory; missing or malformed keys keep their value.
    ///
    /// The panel knob is moved to the restored knob position so the next
    /// [`GraphModule::tick`] does not read it as a knob turn.
    pub fn load_state(&mut self, state: &serde_json::Value) -> Result<(), StateError> {
        self.tempo.load(state)?;
        self.panel.tempo_knob = self.tempo.last_knob_bpm;
        log::debug!(
            target: "pulsegrid::state",
            "restored tempo {:.2} BPM (fallback {:.2})",
            self.tempo.active_bpm,
            self.tempo.fallback_bpm
        );
        Ok(())
    }
}

impl Default for TriggerClock {
    fn default() -> Self {
        Self::new(44100.0)
    }
}

impl GraphModule for TriggerClock {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let frame_inputs = ClockInputs {
            tempo_mod_cv: inputs.get(TEMPO_MOD_INPUT),
            reset_cv: inputs.get(RESET_INPUT),
            clock_cv: inputs.get(CLOCK_INPUT),
            ..self.panel
        };
        let frame = self.process(1.0 / self.sample_rate, &frame_inputs);

        for gate in GateOutput::ALL {
            outputs.set(FIRST_GATE_OUTPUT + gate.index() as u32, frame.gate(gate));
        }
        outputs.set(BEAT_LIGHT_OUTPUT, frame.beat_light * self.config.gate_voltage);
    }

    /// Zero the divider, pulses and LED. Tempo memory is kept.
    fn reset(&mut self) {
        self.divider.reset();
        self.light.reset();
        self.last_outputs = ClockOutputs::default();
    }

    fn set_sample_rate(&mut self, sample_rate: f64) {
        self.sample_rate = sample_rate;
    }

    fn params(&self) -> &[ParamDef] {
        &self.param_defs
    }

    fn get_param(&self, id: ParamId) -> Option<f64> {
        match id {
            TEMPO_MOD_ATTEN_PARAM => Some(self.panel.tempo_mod_atten),
            TEMPO_PARAM => Some(self.panel.tempo_knob),
            RESET_BUTTON_PARAM => Some(self.panel.reset_button),
            TAP_BUTTON_PARAM => Some(self.panel.tap_button),
            _ => None,
        }
    }

    fn set_param(&mut self, id: ParamId, value: f64) {
        let Some(def) = self.param_defs.iter().find(|p| p.id == id) else {
            return;
        };
        let value = def.range.clamp(value);
        match id {
            TEMPO_MOD_ATTEN_PARAM => self.panel.tempo_mod_atten = value,
            TEMPO_PARAM => self.panel.tempo_knob = value,
            RESET_BUTTON_PARAM => self.panel.reset_button = value,
            TAP_BUTTON_PARAM => self.panel.tap_button = value,
            _ => {}
        }
    }

    fn type_id(&self) -> &'static str {
        "trigger_clock"
    }

    fn serialize_state(&self) -> Option<serde_json::Value> {
        Some(self.save_state())
    }

    fn deserialize_state(&mut self, state: &serde_json::Value) -> Result<(), StateError> {
        self.load_state(state)
    }
}
