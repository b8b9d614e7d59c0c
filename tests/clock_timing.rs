//! Timing properties of the clock, driven frame by frame through the public API.

use approx::assert_relative_eq;
use pulsegrid::prelude::*;

fn knob(bpm: f64) -> ClockInputs {
    ClockInputs {
        tempo_knob: bpm,
        ..ClockInputs::default()
    }
}

/// Count rising edges per output over `frames` frames
fn count_edges(
    clock: &mut TriggerClock,
    inputs: &ClockInputs,
    dt: f64,
    frames: usize,
) -> [usize; GATE_COUNT] {
    let mut counts = [0; GATE_COUNT];
    let mut last = [0.0; GATE_COUNT];
    for _ in 0..frames {
        let out = clock.process(dt, inputs);
        for (i, &v) in out.gates.iter().enumerate() {
            if v > 0.0 && last[i] == 0.0 {
                counts[i] += 1;
            }
            last[i] = v;
        }
    }
    counts
}

#[test]
fn test_division_counts_over_ten_seconds() {
    let sr = 48000.0;
    let mut clock = TriggerClock::new(sr);
    // 10.05s at 120 BPM: sixteenth every 125ms, last tick at exactly 10s
    let counts = count_edges(&mut clock, &knob(120.0), 1.0 / sr, 482_400);

    let n = |g: GateOutput| counts[g.index()];
    assert_eq!(n(GateOutput::Sixteenth), 80);
    assert_eq!(n(GateOutput::EighthTriplet), 60);
    assert_eq!(n(GateOutput::QuarterTriplet), 30);
    assert_eq!(n(GateOutput::Eighth), 40);
    assert_eq!(n(GateOutput::EighthOffbeat), 40);
    assert_eq!(n(GateOutput::Quarter), 20);
    assert_eq!(n(GateOutput::QuarterOffbeat), 20);
    assert_eq!(n(GateOutput::Half), 10);
    assert_eq!(n(GateOutput::HalfOffbeat), 10);
    assert_eq!(n(GateOutput::Whole), 5);
    assert_eq!(n(GateOutput::ThreeQuarter), 7);
    assert_eq!(n(GateOutput::FiveQuarter), 4);
    assert_eq!(n(GateOutput::SixQuarter), 4);
    assert_eq!(n(GateOutput::SevenQuarter), 3);
}

#[test]
fn test_phase_does_not_drift() {
    // 15/113 s is not a whole number of frames at 44.1kHz
    let sr = 44100.0;
    let dt = 1.0 / sr;
    let mut clock = TriggerClock::new(sr);
    let inputs = knob(113.0);

    let mut ticks = 0;
    let mut last = 0.0;
    for _ in 0..441_000 {
        let out = clock.process(dt, &inputs);
        let phase = clock.divider().sixteenth_phase();
        assert!(phase.elapsed() >= 0.0);
        assert!(phase.elapsed() < phase.interval() + 1e-9);

        let v = out.gate(GateOutput::Sixteenth);
        if v > 0.0 && last == 0.0 {
            ticks += 1;
        }
        last = v;
    }
    // 10s / (15/113 s) = 75.33
    assert_eq!(ticks, 75);
}

#[test]
fn test_pulse_width_is_one_millisecond() {
    for &sr in &[44100.0, 48000.0, 96000.0, 192000.0] {
        let dt = 1.0 / sr;
        let mut clock = TriggerClock::new(sr);
        let inputs = knob(120.0);

        let mut run = 0usize;
        let mut runs = Vec::new();
        for _ in 0..(sr as usize / 2) {
            let out = clock.process(dt, &inputs);
            if out.gate(GateOutput::Sixteenth) > 0.0 {
                run += 1;
            } else if run > 0 {
                runs.push(run);
                run = 0;
            }
        }

        let min = ceil_frames(0.001 * sr);
        assert!(!runs.is_empty(), "no pulses at {sr}");
        for &r in &runs {
            assert!(r == min || r == min + 1, "{r} frames at {sr}");
        }
    }
}

fn ceil_frames(x: f64) -> usize {
    let floor = x as usize;
    if (floor as f64) < x - 1e-9 {
        floor + 1
    } else {
        floor
    }
}

#[test]
fn test_derived_outputs_are_phase_locked() {
    let sr = 48000.0;
    let mut clock = TriggerClock::new(sr);
    let inputs = knob(137.0);

    for _ in 0..(sr as usize * 8) {
        let out = clock.process(1.0 / sr, &inputs);
        let on = |g: GateOutput| out.gate(g) > 0.0;

        if on(GateOutput::Whole) {
            assert!(on(GateOutput::Half));
        }
        if on(GateOutput::Half) || on(GateOutput::HalfOffbeat) {
            assert!(on(GateOutput::Quarter));
        }
        if on(GateOutput::Quarter) || on(GateOutput::QuarterOffbeat) {
            assert!(on(GateOutput::Eighth));
        }
        if on(GateOutput::Eighth) || on(GateOutput::EighthOffbeat) {
            assert!(on(GateOutput::Sixteenth));
        }
        assert!(!(on(GateOutput::Eighth) && on(GateOutput::EighthOffbeat)));
        assert!(!(on(GateOutput::Quarter) && on(GateOutput::QuarterOffbeat)));
        assert!(!(on(GateOutput::Half) && on(GateOutput::HalfOffbeat)));
    }
}

#[test]
fn test_reset_restarts_from_scratch() {
    let sr = 48000.0;
    let dt = 1.0 / sr;
    let inputs = knob(120.0);

    let mut clock = TriggerClock::new(sr);
    for _ in 0..33_333 {
        clock.process(dt, &inputs);
    }
    let pressed = ClockInputs {
        reset_cv: Some(10.0),
        ..inputs
    };
    assert!(clock.process(dt, &pressed).is_silent());

    // After the reset frame the clock runs exactly like a fresh one
    let mut fresh = TriggerClock::new(sr);
    let released = ClockInputs {
        reset_cv: Some(0.0),
        ..inputs
    };
    for _ in 0..50_000 {
        let a = clock.process(dt, &released);
        let b = fresh.process(dt, &inputs);
        assert_eq!(a, b);
    }
}

#[test]
fn test_reset_is_idempotent() {
    let sr = 48000.0;
    let dt = 1.0 / sr;
    let inputs = knob(140.0);

    let mut once = TriggerClock::new(sr);
    let mut twice = TriggerClock::new(sr);
    for _ in 0..20_000 {
        once.process(dt, &inputs);
        twice.process(dt, &inputs);
    }

    once.reset();
    twice.reset();
    twice.reset();

    assert_eq!(once.divider().counters(), twice.divider().counters());
    assert_eq!(
        once.divider().sixteenth_phase(),
        twice.divider().sixteenth_phase()
    );
    assert_eq!(once.last_outputs(), twice.last_outputs());
    assert_eq!(once.bpm(), twice.bpm());

    for _ in 0..20_000 {
        assert_eq!(once.process(dt, &inputs), twice.process(dt, &inputs));
    }
}

/// Drive `frames` frames with the clock jack and tap button pulsed on the given periods
fn drive(
    clock: &mut TriggerClock,
    base: ClockInputs,
    clock_period: Option<usize>,
    tap_period: Option<usize>,
    frames: usize,
) {
    let dt = 1.0 / 1000.0;
    for i in 0..frames {
        let mut inputs = base;
        if let Some(p) = clock_period {
            inputs.clock_cv = Some(if i % p < 5 { 5.0 } else { 0.0 });
        }
        if let Some(p) = tap_period {
            inputs.tap_button = if i % p < 20 { 2.0 } else { 0.0 };
        }
        clock.process(dt, &inputs);
    }
}

#[test]
fn test_tempo_source_precedence() {
    let mut clock = TriggerClock::new(1000.0);
    let base = knob(100.0);

    drive(&mut clock, base, None, None, 10);
    assert_eq!(clock.bpm(), 100.0);

    // External clock at 0.5s periods
    drive(&mut clock, base, Some(500), None, 1001);
    assert_relative_eq!(clock.bpm(), 120.0, epsilon = 1e-6);

    // Unpatching falls back to the knob tempo
    drive(&mut clock, base, None, None, 1);
    assert_eq!(clock.bpm(), 100.0);

    // Tap at 0.4s periods becomes the new fallback
    drive(&mut clock, base, None, Some(400), 801);
    assert_relative_eq!(clock.bpm(), 150.0, epsilon = 1e-6);
    drive(&mut clock, base, None, None, 100);
    assert_relative_eq!(clock.bpm(), 150.0, epsilon = 1e-6);

    // Moving the knob overrides everything
    drive(&mut clock, knob(80.0), None, None, 1);
    assert_eq!(clock.bpm(), 80.0);
}

#[test]
fn test_reset_frame_still_stores_new_tempo() {
    let dt = 1.0 / 1000.0;
    let mut clock = TriggerClock::new(1000.0);
    let base = knob(100.0);

    // Edges at 0 and 0.5s lock to 120 BPM
    drive(&mut clock, base, Some(500), None, 505);
    assert_relative_eq!(clock.bpm(), 120.0, epsilon = 1e-6);

    let idle = ClockInputs {
        clock_cv: Some(0.0),
        reset_cv: Some(0.0),
        ..base
    };
    for _ in 505..900 {
        clock.process(dt, &idle);
    }
    assert!(clock.divider().counters().sixteenth() > 0);

    // Clock edge 0.4s after the last one, together with a reset
    let both = ClockInputs {
        clock_cv: Some(5.0),
        reset_cv: Some(5.0),
        ..base
    };
    let out = clock.process(dt, &both);
    assert!(out.is_silent());
    assert_eq!(clock.divider().counters().sixteenth(), 0);
    assert_relative_eq!(clock.bpm(), 150.0, epsilon = 1e-6);
    assert_relative_eq!(clock.tempo().last_good_bpm, 150.0, epsilon = 1e-6);
}

#[test]
fn test_tempo_modulation() {
    let sr = 1000.0;
    let mut clock = TriggerClock::new(sr);
    let mut inputs = ClockInputs {
        tempo_knob: 120.0,
        tempo_mod_atten: 1.0,
        tempo_mod_cv: Some(1.0),
        ..ClockInputs::default()
    };
    clock.process(1.0 / sr, &inputs);
    assert_relative_eq!(clock.bpm(), 240.0);

    inputs.tempo_mod_cv = Some(-1.0);
    clock.process(1.0 / sr, &inputs);
    assert_relative_eq!(clock.bpm(), 60.0);

    // Half attenuation
    inputs.tempo_mod_atten = 0.5;
    inputs.tempo_mod_cv = Some(2.0);
    clock.process(1.0 / sr, &inputs);
    assert_relative_eq!(clock.bpm(), 240.0);

    // Unpatched mod input leaves the knob tempo alone
    inputs.tempo_mod_cv = None;
    clock.process(1.0 / sr, &inputs);
    assert_relative_eq!(clock.bpm(), 120.0);
}

#[test]
fn test_zero_tempo_bypasses() {
    let sr = 48000.0;
    let dt = 1.0 / sr;
    let mut clock = TriggerClock::new(sr);

    for _ in 0..48_000 {
        let out = clock.process(dt, &knob(0.0));
        assert!(out.is_silent());
    }
    assert!(clock.is_bypassed());
    assert_eq!(clock.divider().counters().sixteenth(), 0);

    let counts = count_edges(&mut clock, &knob(120.0), dt, 48_000);
    assert!(!clock.is_bypassed());
    assert_eq!(counts[GateOutput::Quarter.index()], 2);
}

#[test]
fn test_tempo_survives_rack_reload() {
    let registry = ModuleRegistry::new();
    let mut clock = TriggerClock::new(48000.0);
    clock.process(1.0 / 48000.0, &knob(96.0));

    let rack = RackDef::new().with_module(ModuleDef::capture("main", &clock));
    let json = rack.to_json().unwrap();

    let modules = RackDef::from_json(&json)
        .unwrap()
        .build(&registry, 48000.0)
        .unwrap();
    let state = modules[0].1.serialize_state().unwrap();
    assert_eq!(state["bpm"], 96.0);
    assert_eq!(state["lastKnobBPM"], 96.0);
    assert_eq!(state["clockOutFallbackBPM"], 96.0);
}

#[test]
fn test_modulation_to_zero_bypasses_same_frame() {
    let sr = 48000.0;
    let dt = 1.0 / sr;
    let mut clock = TriggerClock::new(sr);
    let mut inputs = ClockInputs {
        tempo_knob: 120.0,
        tempo_mod_atten: 1.0,
        tempo_mod_cv: Some(0.0),
        ..ClockInputs::default()
    };

    // Land inside the first pulse
    for _ in 0..6005 {
        clock.process(dt, &inputs);
    }
    assert!(!clock.last_outputs().is_silent());

    // Negative modulation without bound collapses the tempo to zero
    inputs.tempo_mod_cv = Some(f64::NEG_INFINITY);
    let out = clock.process(dt, &inputs);
    assert_eq!(clock.bpm(), 0.0);
    assert!(out.is_silent());
    assert!(clock.is_bypassed());

    inputs.tempo_mod_cv = Some(0.0);
    let counts = count_edges(&mut clock, &inputs, dt, 48_000);
    assert!(!clock.is_bypassed());
    assert_relative_eq!(clock.bpm(), 120.0);
    assert!(counts[GateOutput::Quarter.index()] >= 1);
    assert!(counts[GateOutput::Sixteenth.index()] >= 7);
}
