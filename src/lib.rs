//! # Pulsegrid: Sample-Accurate Modular Clock
//!
//! `pulsegrid` provides real-time control-voltage modules meant to be driven once
//! per audio sample frame. The centerpiece is [`TriggerClock`], a tempo clock that
//! derives its BPM from a knob, an external clock, tap tempo and CV modulation,
//! and emits fourteen phase-locked trigger outputs from sixteenths down to 7/4
//! polymeter cycles.
//!
//! ## Architecture
//!
//! - **trigger** - Schmitt edge detection and fixed-length pulse generation
//! - **tempo** - period measurement and tempo source arbitration
//! - **divider** - drift-free phase accumulators and the table-driven divider
//! - **clock** - the complete clock module with reset, bypass and beat LED
//! - **quantizer** - pitch CV summing and scale quantization
//! - **port** / **serialize** - host-facing module interface and persistence
//!
//! ## Quick Start
//!
//! ```rust
//! use pulsegrid::prelude::*;
//!
//! let sample_rate = 48000.0;
//! let mut clock = TriggerClock::new(sample_rate);
//!
//! let inputs = ClockInputs {
//!     tempo_knob: 120.0,
//!     ..ClockInputs::default()
//! };
//!
//! // One second of audio
//! let mut quarters = 0;
//! for _ in 0..48000 {
//!     let out = clock.process(1.0 / sample_rate, &inputs);
//!     if out.gate(GateOutput::Quarter) > 0.0 {
//!         quarters += 1;
//!     }
//! }
//! assert!(quarters > 0);
//! ```

pub mod clock;
pub mod divider;
pub mod port;
pub mod quantizer;
pub mod serialize;
pub mod tempo;
pub mod trigger;

/// Prelude module for convenient imports
pub mod prelude {
    // Port System
    pub use crate::port::{
        GraphModule, ParamDef, ParamId, ParamRange, PortDef, PortId, PortSpec, PortValues,
        SignalKind,
    };

    // Timing primitives
    pub use crate::trigger::{PulseGenerator, SchmittTrigger};

    // Tempo
    pub use crate::tempo::{
        ClockMeasurement, Measurement, TempoArbiter, TempoInputs, TempoState, DEFAULT_BPM,
    };

    // Divider
    pub use crate::divider::{
        BeatEvent, BeatEvents, DividerEngine, DividerFrame, GateOutput, PhaseAccumulator,
        StepCounters, GATE_COUNT,
    };

    // Modules
    pub use crate::clock::{ClockConfig, ClockInputs, ClockOutputs, TriggerClock};
    pub use crate::quantizer::{PitchQuantizer, Scale};

    // Serialization
    pub use crate::serialize::{ModuleDef, ModuleMetadata, ModuleRegistry, RackDef, StateError};
}

// Re-export key types at crate root for convenience
pub use prelude::*;
