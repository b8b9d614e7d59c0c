//! How-To: Tap Tempo and Clock Following
//!
//! Drives the clock from the tempo knob, then from tap tempo, then from an
//! external clock, printing the tempo and output activity at each stage.
//!
//! Run with: cargo run --example tap_and_follow

use pulsegrid::prelude::*;

const SAMPLE_RATE: f64 = 48000.0;

/// Run `seconds` of audio, pulsing the tap button or clock jack every `period` seconds
fn run(
    clock: &mut TriggerClock,
    base: ClockInputs,
    seconds: f64,
    tap_period: Option<f64>,
    clock_period: Option<f64>,
) -> [usize; GATE_COUNT] {
    let dt = 1.0 / SAMPLE_RATE;
    let frames = (seconds * SAMPLE_RATE) as usize;
    let mut counts = [0; GATE_COUNT];
    let mut last = [0.0; GATE_COUNT];

    for i in 0..frames {
        let t = i as f64 * dt;
        let mut inputs = base;
        if let Some(p) = tap_period {
            inputs.tap_button = if t % p < 0.02 { 2.0 } else { 0.0 };
        }
        if let Some(p) = clock_period {
            inputs.clock_cv = Some(if t % p < 0.005 { 10.0 } else { 0.0 });
        }

        let out = clock.process(dt, &inputs);
        for (n, &v) in out.gates.iter().enumerate() {
            if v > 0.0 && last[n] == 0.0 {
                counts[n] += 1;
            }
            last[n] = v;
        }
    }
    counts
}

fn report(stage: &str, clock: &TriggerClock, counts: &[usize; GATE_COUNT]) {
    println!("{stage}: {:.2} BPM", clock.bpm());
    for gate in [
        GateOutput::Sixteenth,
        GateOutput::Quarter,
        GateOutput::QuarterTriplet,
        GateOutput::Whole,
        GateOutput::FiveQuarter,
    ] {
        println!("  {:<16} {:>3} pulses", gate.name(), counts[gate.index()]);
    }
    println!();
}

fn main() {
    println!("=== Tap Tempo and Clock Following ===\n");

    let mut clock = TriggerClock::new(SAMPLE_RATE);
    let panel = ClockInputs {
        tempo_knob: 100.0,
        ..ClockInputs::default()
    };

    let counts = run(&mut clock, panel, 4.0, None, None);
    report("Knob", &clock, &counts);

    // Tapping every 0.4s sets 150 BPM and becomes the fallback tempo
    let counts = run(&mut clock, panel, 4.0, Some(0.4), None);
    report("Tap", &clock, &counts);

    // A patched clock at 0.5s periods overrides the tap tempo
    let counts = run(&mut clock, panel, 4.0, None, Some(0.5));
    report("External clock", &clock, &counts);

    // Unpatching falls back to the tapped tempo
    let counts = run(&mut clock, panel, 2.0, None, None);
    report("Clock unpatched", &clock, &counts);
}
