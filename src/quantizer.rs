//! Pitch Quantizer
//!
//! Sums V/Oct input, coarse and fine tuning and an octave offset, then snaps the
//! result to a musical scale transposed to a root note.

use crate::port::{GraphModule, ParamDef, ParamId, PortDef, PortSpec, PortValues, SignalKind};
use crate::serialize::{read_i64, StateError};
use crate::trigger::SchmittTrigger;

pub const VOCT_INPUT: u32 = 0;
pub const PITCH_OUTPUT: u32 = 10;

pub const SCALE_PARAM: ParamId = 0;
pub const ROOT_PARAM: ParamId = 1;
pub const COARSE_PARAM: ParamId = 2;
pub const FINE_PARAM: ParamId = 3;
pub const OCTAVE_UP_PARAM: ParamId = 4;
pub const OCTAVE_DOWN_PARAM: ParamId = 5;

/// Octave offset limit in either direction
pub const MAX_OCTAVE_OFFSET: i32 = 5;

const PITCH_LIMIT: f64 = 5.0;

/// Musical scales for quantization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scale {
    Chromatic,
    Major,
    Minor,
    PentatonicMajor,
    PentatonicMinor,
    Dorian,
    Mixolydian,
    Blues,
}

impl Scale {
    pub const ALL: [Scale; 8] = [
        Scale::Chromatic,
        Scale::Major,
        Scale::Minor,
        Scale::PentatonicMajor,
        Scale::PentatonicMinor,
        Scale::Dorian,
        Scale::Mixolydian,
        Scale::Blues,
    ];

    /// Scale for a selector position; position 0 means quantizer off
    pub fn from_selector(position: usize) -> Option<Scale> {
        position.checked_sub(1).and_then(|i| Self::ALL.get(i).copied())
    }

    /// Returns the semitone offsets for this scale (relative to root)
    pub fn semitones(&self) -> &'static [i32] {
        match self {
            Scale::Chromatic => &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11],
            Scale::Major => &[0, 2, 4, 5, 7, 9, 11],
            Scale::Minor => &[0, 2, 3, 5, 7, 8, 10],
            Scale::PentatonicMajor => &[0, 2, 4, 7, 9],
            Scale::PentatonicMinor => &[0, 3, 5, 7, 10],
            Scale::Dorian => &[0, 2, 3, 5, 7, 9, 10],
            Scale::Mixolydian => &[0, 2, 4, 5, 7, 9, 10],
            Scale::Blues => &[0, 3, 5, 6, 7, 10],
        }
    }
}

/// Snap a V/Oct voltage to the nearest degree of `scale` transposed by `root` semitones
pub fn quantize(voltage: f64, scale: Scale, root: i32) -> f64 {
    let relative = voltage * 12.0 - root as f64;

    let octave = libm::floor(relative / 12.0);
    let within_octave = relative - octave * 12.0;

    // Nearest degree in this octave or the first of the next
    let mut nearest = scale.semitones()[0];
    let mut min_dist = f64::MAX;
    for &semi in scale.semitones() {
        for candidate in [semi, semi + 12] {
            let dist = (within_octave - candidate as f64).abs();
            if dist < min_dist {
                min_dist = dist;
                nearest = candidate;
            }
        }
    }

    (octave * 12.0 + (nearest + root) as f64) / 12.0
}

/// Pitch summing and scale quantizer module
pub struct PitchQuantizer {
    scale: Option<Scale>,
    root: i32,
    coarse: f64,
    fine: f64,
    octave_offset: i32,
    octave_up: f64,
    octave_down: f64,
    up_trigger: SchmittTrigger,
    down_trigger: SchmittTrigger,
    current_note: Option<usize>,
    spec: PortSpec,
    param_defs: Vec<ParamDef>,
}

impl PitchQuantizer {
    pub fn new() -> Self {
        Self {
            scale: None,
            root: 0,
            coarse: 0.0,
            fine: 0.0,
            octave_offset: 0,
            octave_up: 0.0,
            octave_down: 0.0,
            up_trigger: SchmittTrigger::new(),
            down_trigger: SchmittTrigger::new(),
            current_note: None,
            spec: PortSpec {
                inputs: vec![PortDef::new(VOCT_INPUT, "voct", SignalKind::VoltPerOctave)],
                outputs: vec![PortDef::new(PITCH_OUTPUT, "out", SignalKind::VoltPerOctave)],
            },
            param_defs: vec![
                ParamDef::stepped(SCALE_PARAM, "scale", 0, Scale::ALL.len() as i32, 0),
                ParamDef::stepped(ROOT_PARAM, "root", 0, 11, 0),
                ParamDef::linear(COARSE_PARAM, "coarse", -5.0, 5.0, 0.0),
                ParamDef::linear(FINE_PARAM, "fine", -1.0, 1.0, 0.0),
                ParamDef::linear(OCTAVE_UP_PARAM, "octave_up", 0.0, 1.0, 0.0),
                ParamDef::linear(OCTAVE_DOWN_PARAM, "octave_down", 0.0, 1.0, 0.0),
            ],
        }
    }

    pub fn with_scale(mut self, scale: Scale, root: i32) -> Self {
        self.scale = Some(scale);
        self.root = root.rem_euclid(12);
        self
    }

    pub fn set_scale(&mut self, scale: Option<Scale>) {
        self.scale = scale;
    }

    pub fn scale(&self) -> Option<Scale> {
        self.scale
    }

    pub fn octave_offset(&self) -> i32 {
        self.octave_offset
    }

    /// Summed, clamped and (when a scale is selected) quantized pitch
    pub fn process(&mut self, voct: f64) -> f64 {
        if self.up_trigger.process(self.octave_up, 0.1, 1.0) {
            self.octave_offset = (self.octave_offset + 1).min(MAX_OCTAVE_OFFSET);
        }
        if self.down_trigger.process(self.octave_down, 0.1, 1.0) {
            self.octave_offset = (self.octave_offset - 1).max(-MAX_OCTAVE_OFFSET);
        }

        let pitch = (voct + self.coarse + self.octave_offset as f64 + self.fine / 12.0)
            .clamp(-PITCH_LIMIT, PITCH_LIMIT);

        match self.scale {
            Some(scale) => {
                let quantized = quantize(pitch, scale, self.root);
                let semitone = (quantized * 12.0).round() as i64;
                self.current_note = Some(semitone.rem_euclid(12) as usize);
                quantized
            }
            None => {
                self.current_note = None;
                pitch
            }
        }
    }

    /// Pitch classes (C = 0) that belong to the selected scale and root
    pub fn active_notes(&self) -> [bool; 12] {
        let mut notes = [false; 12];
        if let Some(scale) = self.scale {
            for &semi in scale.semitones() {
                notes[(semi + self.root).rem_euclid(12) as usize] = true;
            }
        }
        notes
    }

    /// Pitch class of the last quantized output, `None` while quantization is off
    pub fn current_note(&self) -> Option<usize> {
        self.current_note
    }
}

impl Default for PitchQuantizer {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphModule for PitchQuantizer {
    fn port_spec(&self) -> &PortSpec {
        &self.spec
    }

    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues) {
        let voct = inputs.get_or(VOCT_INPUT, 0.0);
        let pitch = self.process(voct);
        outputs.set(PITCH_OUTPUT, pitch);
    }

    fn reset(&mut self) {
        self.up_trigger.reset();
        self.down_trigger.reset();
        self.current_note = None;
    }

    fn set_sample_rate(&mut self, _: f64) {}

    fn params(&self) -> &[ParamDef] {
        &self.param_defs
    }

    fn get_param(&self, id: ParamId) -> Option<f64> {
        match id {
            SCALE_PARAM => Some(
                self.scale
                    .and_then(|s| Scale::ALL.iter().position(|&x| x == s))
                    .map_or(0.0, |i| (i + 1) as f64),
            ),
            ROOT_PARAM => Some(self.root as f64),
            COARSE_PARAM => Some(self.coarse),
            FINE_PARAM => Some(self.fine),
            OCTAVE_UP_PARAM => Some(self.octave_up),
            OCTAVE_DOWN_PARAM => Some(self.octave_down),
            _ => None,
        }
    }

    fn set_param(&mut self, id: ParamId, value: f64) {
        let Some(def) = self.param_defs.iter().find(|p| p.id == id) else {
            return;
        };
        let value = def.range.clamp(value);
        match id {
            SCALE_PARAM => self.scale = Scale::from_selector(value as usize),
            ROOT_PARAM => self.root = value as i32,
            COARSE_PARAM => self.coarse = value,
            FINE_PARAM => self.fine = value,
            OCTAVE_UP_PARAM => self.octave_up = value,
            OCTAVE_DOWN_PARAM => self.octave_down = value,
            _ => {}
        }
    }

    fn type_id(&self) -> &'static str {
        "pitch_quantizer"
    }

    fn serialize_state(&self) -> Option<serde_json::Value> {
        Some(serde_json::json!({ "octaveOffset": self.octave_offset }))
    }

    fn deserialize_state(&mut self, state: &serde_json::Value) -> Result<(), StateError> {
        let obj = state.as_object().ok_or(StateError::NotAnObject)?;
        if let Some(offset) = read_i64(obj, "octaveOffset") {
            self.octave_offset =
                offset.clamp(-MAX_OCTAVE_OFFSET as i64, MAX_OCTAVE_OFFSET as i64) as i32;
        }
        Ok(())
    }
}
