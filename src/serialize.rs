//! Serialization and Persistence
//!
//! Modules persist a small JSON state document (tempo memory, octave offset).
//! This module provides the error type, tolerant key readers, rack documents and
//! the registry used to instantiate modules by type id.

use crate::clock::TriggerClock;
use crate::port::{GraphModule, PortSpec};
use crate::quantizer::PitchQuantizer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Error type for state and rack operations
#[derive(Debug, Clone, PartialEq)]
pub enum StateError {
    /// State document is not a JSON object
    NotAnObject,
    /// No factory registered for this type id
    UnknownModule(String),
    /// Document could not be parsed or written
    Json(String),
}

impl std::fmt::Display for StateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StateError::NotAnObject => write!(f, "State document is not an object"),
            StateError::UnknownModule(id) => write!(f, "Unknown module type: {}", id),
            StateError::Json(msg) => write!(f, "Invalid state document: {}", msg),
        }
    }
}

impl std::error::Error for StateError {}

impl From<serde_json::Error> for StateError {
    fn from(err: serde_json::Error) -> Self {
        StateError::Json(err.to_string())
    }
}

/// Read an optional numeric key. Absent keys are silent, wrong types are logged.
pub(crate) fn read_f64(obj: &Map<String, Value>, key: &str) -> Option<f64> {
    let value = obj.get(key)?;
    let number = value.as_f64();
    if number.is_none() {
        log::warn!(target: "pulsegrid::state", "ignoring non-numeric {}: {}", key, value);
    }
    number
}

/// Read an optional integer key. Absent keys are silent, wrong types are logged.
pub(crate) fn read_i64(obj: &Map<String, Value>, key: &str) -> Option<i64> {
    let value = obj.get(key)?;
    let number = value.as_i64();
    if number.is_none() {
        log::warn!(target: "pulsegrid::state", "ignoring non-integer {}: {}", key, value);
    }
    number
}

/// Serializable module instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleDef {
    /// Instance name
    pub name: String,

    /// Module type identifier
    pub module_type: String,

    /// Module-specific state
    pub state: Option<Value>,
}

impl ModuleDef {
    pub fn new(name: impl Into<String>, module_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module_type: module_type.into(),
            state: None,
        }
    }

    /// Capture a live module
    pub fn capture(name: impl Into<String>, module: &dyn GraphModule) -> Self {
        Self {
            name: name.into(),
            module_type: module.type_id().to_string(),
            state: module.serialize_state(),
        }
    }

    pub fn with_state(mut self, state: Value) -> Self {
        self.state = Some(state);
        self
    }
}

/// Serializable set of module instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RackDef {
    /// Schema version for forward compatibility
    pub version: u32,

    /// Module instances
    pub modules: Vec<ModuleDef>,
}

impl RackDef {
    pub fn new() -> Self {
        Self {
            version: 1,
            modules: vec![],
        }
    }

    pub fn with_module(mut self, module: ModuleDef) -> Self {
        self.modules.push(module);
        self
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, StateError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, StateError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Instantiate every module and restore its saved state
    pub fn build(
        &self,
        registry: &ModuleRegistry,
        sample_rate: f64,
    ) -> Result<Vec<(String, Box<dyn GraphModule>)>, StateError> {
        let mut modules = Vec::with_capacity(self.modules.len());
        for def in &self.modules {
            let mut module = registry
                .instantiate(&def.module_type, sample_rate)
                .ok_or_else(|| StateError::UnknownModule(def.module_type.clone()))?;
            if let Some(state) = &def.state {
                module.deserialize_state(state)?;
            }
            modules.push((def.name.clone(), module));
        }
        Ok(modules)
    }
}

impl Default for RackDef {
    fn default() -> Self {
        Self::new()
    }
}

/// Module factory function type
pub type ModuleFactory = Box<dyn Fn(f64) -> Box<dyn GraphModule> + Send + Sync>;

/// Metadata about a registered module type
#[derive(Debug, Clone)]
pub struct ModuleMetadata {
    pub type_id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub port_spec: PortSpec,
}

/// Registry of available module types for instantiation
pub struct ModuleRegistry {
    factories: HashMap<String, ModuleFactory>,
    metadata: HashMap<String, ModuleMetadata>,
}

impl ModuleRegistry {
    /// Create a registry with the built-in modules
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
            metadata: HashMap::new(),
        };
        registry.register_builtin();
        registry
    }

    fn register_builtin(&mut self) {
        self.register_factory(
            "trigger_clock",
            "Trigger Clock",
            "Clock",
            "Tempo clock with tap, clock follow and fourteen division outputs",
            |sr| Box::new(TriggerClock::new(sr)),
        );
        self.register_factory(
            "pitch_quantizer",
            "Pitch Quantizer",
            "Pitch",
            "Pitch CV summing and scale quantization",
            |_| Box::new(PitchQuantizer::new()),
        );
    }

    /// Register a module factory with metadata
    pub fn register_factory<F>(
        &mut self,
        type_id: &str,
        name: &str,
        category: &str,
        description: &str,
        factory: F,
    ) where
        F: Fn(f64) -> Box<dyn GraphModule> + Send + Sync + 'static,
    {
        // Get port spec from a temporary instance
        let temp_instance = factory(44100.0);
        let port_spec = temp_instance.port_spec().clone();

        self.factories
            .insert(type_id.to_string(), Box::new(factory));

        self.metadata.insert(
            type_id.to_string(),
            ModuleMetadata {
                type_id: type_id.to_string(),
                name: name.to_string(),
                category: category.to_string(),
                description: description.to_string(),
                port_spec,
            },
        );
    }

    /// Instantiate a module by type ID
    pub fn instantiate(&self, type_id: &str, sample_rate: f64) -> Option<Box<dyn GraphModule>> {
        self.factories.get(type_id).map(|f| f(sample_rate))
    }

    /// List all registered module types
    pub fn list_modules(&self) -> impl Iterator<Item = &ModuleMetadata> {
        self.metadata.values()
    }

    /// Get metadata for a specific module type
    pub fn get_metadata(&self, type_id: &str) -> Option<&ModuleMetadata> {
        self.metadata.get(type_id)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
