//! Signal Conventions and Port System
//!
//! This module defines the signal types, port and parameter definitions, and the
//! type-erased interface a host uses to drive a module once per sample frame.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a port within a module
pub type PortId = u32;

/// Unique identifier for a parameter within a module
pub type ParamId = u32;

/// Schmitt low threshold for gate, trigger and clock inputs
pub const TRIGGER_LOW: f64 = 0.1;

/// Schmitt high threshold for gate, trigger and clock inputs
pub const TRIGGER_HIGH: f64 = 1.5;

/// Semantic signal classification following hardware modular conventions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignalKind {
    /// Bipolar control voltage, ±5V (LFO, modulation)
    CvBipolar,

    /// Unipolar control voltage, 0-10V (envelopes, indicator levels)
    CvUnipolar,

    /// Pitch CV following 1V/octave standard
    /// Reference: 0V = C4
    VoltPerOctave,

    /// Gate signal, binary state: 0V (low) or +10V (high)
    Gate,

    /// Trigger signal, short pulse (~1ms) at +10V
    Trigger,

    /// Clock signal, regular trigger pulses at tempo
    Clock,
}

impl SignalKind {
    /// Returns the typical voltage range (min, max) for this signal type
    pub fn voltage_range(&self) -> (f64, f64) {
        match self {
            SignalKind::CvBipolar => (-5.0, 5.0),
            SignalKind::CvUnipolar => (0.0, 10.0),
            SignalKind::VoltPerOctave => (-5.0, 5.0),
            SignalKind::Gate | SignalKind::Trigger | SignalKind::Clock => (0.0, 10.0),
        }
    }

    /// Schmitt thresholds (low, high) used when this signal drives an edge input
    pub fn trigger_thresholds(&self) -> Option<(f64, f64)> {
        match self {
            SignalKind::Gate | SignalKind::Trigger | SignalKind::Clock => {
                Some((TRIGGER_LOW, TRIGGER_HIGH))
            }
            _ => None,
        }
    }
}

/// Definition of a single port (input or output)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortDef {
    /// Unique identifier within the module
    pub id: PortId,

    /// Human-readable name (e.g., "clock", "reset", "quarter")
    pub name: String,

    /// Signal type for validation and UI hints
    pub kind: SignalKind,

    /// Whether this input has an associated attenuator control
    pub has_attenuator: bool,
}

impl PortDef {
    pub fn new(id: PortId, name: impl Into<String>, kind: SignalKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            has_attenuator: false,
        }
    }

    pub fn with_attenuator(mut self) -> Self {
        self.has_attenuator = true;
        self
    }
}

/// Specification of all ports for a module
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortSpec {
    pub inputs: Vec<PortDef>,
    pub outputs: Vec<PortDef>,
}

impl PortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input_by_name(&self, name: &str) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.name == name)
    }

    pub fn output_by_name(&self, name: &str) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.name == name)
    }

    pub fn input_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.inputs.iter().find(|p| p.id == id)
    }

    pub fn output_by_id(&self, id: PortId) -> Option<&PortDef> {
        self.outputs.iter().find(|p| p.id == id)
    }
}

/// Runtime port values container
///
/// An input that is absent from the container is treated as an unpatched jack.
#[derive(Debug, Clone, Default)]
pub struct PortValues {
    pub values: HashMap<PortId, f64>,
}

impl PortValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: PortId) -> Option<f64> {
        self.values.get(&id).copied()
    }

    pub fn get_or(&self, id: PortId, default: f64) -> f64 {
        self.values.get(&id).copied().unwrap_or(default)
    }

    pub fn set(&mut self, id: PortId, value: f64) {
        self.values.insert(id, value);
    }

    pub fn remove(&mut self, id: PortId) {
        self.values.remove(&id);
    }

    pub fn has(&self, id: PortId) -> bool {
        self.values.contains_key(&id)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Parameter range mapping for panel controls
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum ParamRange {
    /// Continuous value between min and max
    Linear { min: f64, max: f64 },

    /// Integer steps between min and max (switches, selectors)
    Stepped { min: i32, max: i32 },
}

impl ParamRange {
    /// Clamp a raw value into this range
    pub fn clamp(&self, value: f64) -> f64 {
        match self {
            ParamRange::Linear { min, max } => value.clamp(*min, *max),
            ParamRange::Stepped { min, max } => value.round().clamp(*min as f64, *max as f64),
        }
    }
}

/// Parameter definition for UI binding
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParamDef {
    pub id: ParamId,
    pub name: String,
    pub default: f64,
    pub range: ParamRange,
}

impl ParamDef {
    pub fn linear(id: ParamId, name: impl Into<String>, min: f64, max: f64, default: f64) -> Self {
        Self {
            id,
            name: name.into(),
            default,
            range: ParamRange::Linear { min, max },
        }
    }

    pub fn stepped(id: ParamId, name: impl Into<String>, min: i32, max: i32, default: i32) -> Self {
        Self {
            id,
            name: name.into(),
            default: default as f64,
            range: ParamRange::Stepped { min, max },
        }
    }
}

/// Type-erased module interface driven by the host once per sample frame
pub trait GraphModule: Send + Sync {
    /// Returns the module's port specification
    fn port_spec(&self) -> &PortSpec;

    /// Process one sample given port values
    fn tick(&mut self, inputs: &PortValues, outputs: &mut PortValues);

    /// Reset internal state
    fn reset(&mut self);

    /// Set sample rate
    fn set_sample_rate(&mut self, sample_rate: f64);

    /// Get parameter definitions for UI binding
    fn params(&self) -> &[ParamDef] {
        &[]
    }

    /// Get a parameter value
    fn get_param(&self, _id: ParamId) -> Option<f64> {
        None
    }

    /// Set a parameter value
    fn set_param(&mut self, _id: ParamId, _value: f64) {}

    /// Get module type identifier for serialization
    fn type_id(&self) -> &'static str {
        "unknown"
    }

    /// Serialize module state
    fn serialize_state(&self) -> Option<serde_json::Value> {
        None
    }

    /// Restore module state
    fn deserialize_state(
        &mut self,
        _state: &serde_json::Value,
    ) -> Result<(), crate::serialize::StateError> {
        Ok(())
    }
}
