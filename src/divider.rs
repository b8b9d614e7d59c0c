//! Phase Accumulators and the Rhythmic Divider
//!
//! Three free-running accumulators (sixteenth, eighth triplet, quarter triplet)
//! produce [`BeatEvent`]s. Every other division is read off the sixteenth grid
//! through step counters, so derived gates can never drift against it.

use crate::trigger::PulseGenerator;

/// Number of gate outputs
pub const GATE_COUNT: usize = 14;

/// Sixteenth-note interval numerator: `15 / bpm` seconds
pub const SIXTEENTH_BEATS: f64 = 15.0;

/// Eighth-triplet interval numerator: `20 / bpm` seconds
pub const EIGHTH_TRIPLET_BEATS: f64 = 20.0;

/// Quarter-triplet interval numerator: `40 / bpm` seconds
pub const QUARTER_TRIPLET_BEATS: f64 = 40.0;

/// The gate outputs in panel order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateOutput {
    Sixteenth,
    EighthTriplet,
    Eighth,
    EighthOffbeat,
    QuarterTriplet,
    Quarter,
    QuarterOffbeat,
    Half,
    HalfOffbeat,
    ThreeQuarter,
    Whole,
    FiveQuarter,
    SixQuarter,
    SevenQuarter,
}

impl GateOutput {
    pub const ALL: [GateOutput; GATE_COUNT] = [
        GateOutput::Sixteenth,
        GateOutput::EighthTriplet,
        GateOutput::Eighth,
        GateOutput::EighthOffbeat,
        GateOutput::QuarterTriplet,
        GateOutput::Quarter,
        GateOutput::QuarterOffbeat,
        GateOutput::Half,
        GateOutput::HalfOffbeat,
        GateOutput::ThreeQuarter,
        GateOutput::Whole,
        GateOutput::FiveQuarter,
        GateOutput::SixQuarter,
        GateOutput::SevenQuarter,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Port name
    pub fn name(self) -> &'static str {
        match self {
            GateOutput::Sixteenth => "sixteenth",
            GateOutput::EighthTriplet => "eighth_triplet",
            GateOutput::Eighth => "eighth",
            GateOutput::EighthOffbeat => "eighth_offbeat",
            GateOutput::QuarterTriplet => "quarter_triplet",
            GateOutput::Quarter => "quarter",
            GateOutput::QuarterOffbeat => "quarter_offbeat",
            GateOutput::Half => "half",
            GateOutput::HalfOffbeat => "half_offbeat",
            GateOutput::ThreeQuarter => "three_quarter",
            GateOutput::Whole => "whole",
            GateOutput::FiveQuarter => "five_quarter",
            GateOutput::SixQuarter => "six_quarter",
            GateOutput::SevenQuarter => "seven_quarter",
        }
    }
}

/// Accumulator overflow emitted by the divider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BeatEvent {
    Sixteenth,
    EighthTriplet,
    QuarterTriplet,
}

impl BeatEvent {
    fn bit(self) -> u8 {
        match self {
            BeatEvent::Sixteenth => 0b001,
            BeatEvent::EighthTriplet => 0b010,
            BeatEvent::QuarterTriplet => 0b100,
        }
    }
}

/// Set of beat events that fired within one frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BeatEvents(u8);

impl BeatEvents {
    pub fn insert(&mut self, event: BeatEvent) {
        self.0 |= event.bit();
    }

    pub fn contains(self, event: BeatEvent) -> bool {
        self.0 & event.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = BeatEvent> {
        [
            BeatEvent::Sixteenth,
            BeatEvent::EighthTriplet,
            BeatEvent::QuarterTriplet,
        ]
        .into_iter()
        .filter(move |e| self.contains(*e))
    }
}

/// Free-running phase accumulator measured in seconds
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PhaseAccumulator {
    elapsed: f64,
    interval: f64,
}

impl PhaseAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `delta` seconds against the given interval; returns true on overflow.
    ///
    /// The overshoot past the interval is carried into the next period.
    pub fn advance(&mut self, delta: f64, interval: f64) -> bool {
        self.interval = interval;
        self.elapsed += delta;
        if self.elapsed >= interval {
            self.elapsed = libm::fmod(self.elapsed, interval);
            true
        } else {
            false
        }
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn reset(&mut self) {
        self.elapsed = 0.0;
    }
}

/// Sixteenth-step counter plus the polymeter tracks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StepCounters {
    sixteenth: u32,
    track_3_4: u32,
    track_5_4: u32,
    track_6_4: u32,
    track_7_4: u32,
}

impl StepCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Step every counter by one sixteenth, wrapping back to 1
    pub fn advance(&mut self) {
        self.sixteenth = wrap_step(self.sixteenth, 16);
        self.track_3_4 = wrap_step(self.track_3_4, 12);
        self.track_5_4 = wrap_step(self.track_5_4, 20);
        self.track_6_4 = wrap_step(self.track_6_4, 24);
        self.track_7_4 = wrap_step(self.track_7_4, 28);
    }

    pub fn sixteenth(&self) -> u32 {
        self.sixteenth
    }

    pub fn track_3_4(&self) -> u32 {
        self.track_3_4
    }

    pub fn track_5_4(&self) -> u32 {
        self.track_5_4
    }

    pub fn track_6_4(&self) -> u32 {
        self.track_6_4
    }

    pub fn track_7_4(&self) -> u32 {
        self.track_7_4
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

fn wrap_step(step: u32, modulus: u32) -> u32 {
    if step >= modulus {
        1
    } else {
        step + 1
    }
}

/// Polymeter track selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Track {
    ThreeFour,
    FiveFour,
    SixFour,
    SevenFour,
}

/// Condition on the step counters that gates a trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepCondition {
    Always,
    Odd,
    Even,
    StepIn(&'static [u32]),
    TrackStart(Track),
}

impl StepCondition {
    fn holds(self, counters: &StepCounters) -> bool {
        match self {
            StepCondition::Always => true,
            StepCondition::Odd => counters.sixteenth % 2 == 1,
            StepCondition::Even => counters.sixteenth % 2 == 0,
            StepCondition::StepIn(steps) => steps.contains(&counters.sixteenth),
            StepCondition::TrackStart(track) => {
                let step = match track {
                    Track::ThreeFour => counters.track_3_4,
                    Track::FiveFour => counters.track_5_4,
                    Track::SixFour => counters.track_6_4,
                    Track::SevenFour => counters.track_7_4,
                };
                step == 1
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TriggerRule {
    output: GateOutput,
    event: BeatEvent,
    condition: StepCondition,
}

const fn rule(output: GateOutput, event: BeatEvent, condition: StepCondition) -> TriggerRule {
    TriggerRule {
        output,
        event,
        condition,
    }
}

/// One rule per gate output, in panel order
const TRIGGER_TABLE: [TriggerRule; GATE_COUNT] = [
    rule(GateOutput::Sixteenth, BeatEvent::Sixteenth, StepCondition::Always),
    rule(GateOutput::EighthTriplet, BeatEvent::EighthTriplet, StepCondition::Always),
    rule(GateOutput::Eighth, BeatEvent::Sixteenth, StepCondition::Odd),
    rule(GateOutput::EighthOffbeat, BeatEvent::Sixteenth, StepCondition::Even),
    rule(GateOutput::QuarterTriplet, BeatEvent::QuarterTriplet, StepCondition::Always),
    rule(GateOutput::Quarter, BeatEvent::Sixteenth, StepCondition::StepIn(&[1, 5, 9, 13])),
    rule(GateOutput::QuarterOffbeat, BeatEvent::Sixteenth, StepCondition::StepIn(&[3, 7, 11, 15])),
    rule(GateOutput::Half, BeatEvent::Sixteenth, StepCondition::StepIn(&[1, 9])),
    rule(GateOutput::HalfOffbeat, BeatEvent::Sixteenth, StepCondition::StepIn(&[5, 13])),
    rule(GateOutput::ThreeQuarter, BeatEvent::Sixteenth, StepCondition::TrackStart(Track::ThreeFour)),
    rule(GateOutput::Whole, BeatEvent::Sixteenth, StepCondition::StepIn(&[1])),
    rule(GateOutput::FiveQuarter, BeatEvent::Sixteenth, StepCondition::TrackStart(Track::FiveFour)),
    rule(GateOutput::SixQuarter, BeatEvent::Sixteenth, StepCondition::TrackStart(Track::SixFour)),
    rule(GateOutput::SevenQuarter, BeatEvent::Sixteenth, StepCondition::TrackStart(Track::SevenFour)),
];

/// Result of one divider frame
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DividerFrame {
    /// Gate state per output, indexed by [`GateOutput::index`]
    pub gates: [bool; GATE_COUNT],
    /// Accumulator overflows of this frame
    pub events: BeatEvents,
    /// Outputs whose pulse was (re)started this frame
    pub fired: [bool; GATE_COUNT],
}

impl DividerFrame {
    pub fn gate(&self, output: GateOutput) -> bool {
        self.gates[output.index()]
    }

    pub fn fired(&self, output: GateOutput) -> bool {
        self.fired[output.index()]
    }
}

/// Accumulators, step counters and one pulse generator per gate output
#[derive(Debug, Clone, Default)]
pub struct DividerEngine {
    sixteenth: PhaseAccumulator,
    eighth_triplet: PhaseAccumulator,
    quarter_triplet: PhaseAccumulator,
    counters: StepCounters,
    pulses: [PulseGenerator; GATE_COUNT],
}

impl DividerEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance the grid by `delta` seconds at `bpm` (must be positive)
    pub fn process(&mut self, bpm: f64, delta: f64, pulse_width: f64) -> DividerFrame {
        let mut frame = DividerFrame::default();

        if self.sixteenth.advance(delta, SIXTEENTH_BEATS / bpm) {
            self.counters.advance();
            frame.events.insert(BeatEvent::Sixteenth);
        }
        if self
            .eighth_triplet
            .advance(delta, EIGHTH_TRIPLET_BEATS / bpm)
        {
            frame.events.insert(BeatEvent::EighthTriplet);
        }
        if self
            .quarter_triplet
            .advance(delta, QUARTER_TRIPLET_BEATS / bpm)
        {
            frame.events.insert(BeatEvent::QuarterTriplet);
        }

        for rule in &TRIGGER_TABLE {
            let slot = rule.output.index();
            let pulse = &mut self.pulses[slot];
            if frame.events.contains(rule.event) && rule.condition.holds(&self.counters) {
                pulse.trigger(pulse_width);
                frame.fired[slot] = true;
            }
            frame.gates[slot] = pulse.process(delta);
        }

        frame
    }

    /// Zero accumulators, counters and pulses
    pub fn reset(&mut self) {
        self.sixteenth.reset();
        self.eighth_triplet.reset();
        self.quarter_triplet.reset();
        self.counters.reset();
        self.silence();
    }

    /// Expire every pending pulse, leaving the grid position alone
    pub fn silence(&mut self) {
        for pulse in &mut self.pulses {
            pulse.reset();
        }
    }

    pub fn counters(&self) -> &StepCounters {
        &self.counters
    }

    pub fn sixteenth_phase(&self) -> &PhaseAccumulator {
        &self.sixteenth
    }

    pub fn eighth_triplet_phase(&self) -> &PhaseAccumulator {
        &self.eighth_triplet
    }

    pub fn quarter_triplet_phase(&self) -> &PhaseAccumulator {
        &self.quarter_triplet
    }

    pub fn pulse(&self, output: GateOutput) -> &PulseGenerator {
        &self.pulses[output.index()]
    }
}
