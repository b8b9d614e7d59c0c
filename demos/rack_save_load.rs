//! How-To: Save and Restore a Rack
//!
//! Captures a clock and a quantizer into a JSON rack document, rebuilds them
//! through the module registry and checks the tempo memory came back.
//!
//! Run with: cargo run --example rack_save_load

use pulsegrid::prelude::*;

fn main() -> Result<(), StateError> {
    let sample_rate = 44100.0;

    println!("=== Rack Save/Load Demo ===\n");

    let mut clock = TriggerClock::new(sample_rate);
    clock.set_param(pulsegrid::clock::TEMPO_PARAM, 132.0);
    let inputs = PortValues::new();
    let mut outputs = PortValues::new();
    for _ in 0..(sample_rate as usize) {
        clock.tick(&inputs, &mut outputs);
    }

    let mut quantizer = PitchQuantizer::new().with_scale(Scale::Dorian, 2);
    quantizer.set_param(pulsegrid::quantizer::OCTAVE_UP_PARAM, 1.0);
    quantizer.tick(&inputs, &mut outputs);

    let rack = RackDef::new()
        .with_module(ModuleDef::capture("main_clock", &clock))
        .with_module(ModuleDef::capture("lead_pitch", &quantizer));

    let json = rack.to_json()?;
    println!("Saved rack:\n{}\n", json);

    let registry = ModuleRegistry::new();
    println!("Registered modules:");
    for meta in registry.list_modules() {
        println!(
            "  {:<16} {:<6} {} inputs, {} outputs",
            meta.type_id,
            meta.category,
            meta.port_spec.inputs.len(),
            meta.port_spec.outputs.len()
        );
    }
    println!();

    let restored = RackDef::from_json(&json)?.build(&registry, sample_rate)?;
    for (name, module) in &restored {
        println!(
            "Restored {} ({}): {}",
            name,
            module.type_id(),
            module
                .serialize_state()
                .map(|s| s.to_string())
                .unwrap_or_default()
        );
    }

    // Unknown module types are reported, not skipped
    let broken = RackDef::new().with_module(ModuleDef::new("x", "theremin"));
    match broken.build(&registry, sample_rate) {
        Ok(_) => println!("\nUnexpectedly built an unknown module"),
        Err(e) => println!("\nExpected failure: {}", e),
    }

    Ok(())
}
