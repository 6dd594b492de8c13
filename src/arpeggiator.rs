//! Per-instrument arpeggiators.
//!
//! Each melodic instrument owns an [`Arpeggiator`] that cycles through the
//! notes held on the keyboard in a fixed index pattern, one note per
//! sixteenth. The engine drives them with `Task::Arp` timers; this module
//! only keeps the state and decides what the next tick plays.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::instrument::InstrumentId;
use crate::note::NOTE_NAMES;

/// Shortest time between two arpeggiator steps, and the shortest gate.
pub const MIN_ARP_MS: f64 = 50.0;
/// Fraction of a step a played note is held for.
const GATE: f64 = 0.8;

/// Milliseconds between arpeggiator steps: a sixteenth note at `tempo`.
pub fn step_ms(tempo: f64) -> f64 {
    (60_000.0 / tempo / 4.0).max(MIN_ARP_MS)
}

/// How long each arpeggiated note sounds before its release starts.
pub fn gate_ms(tempo: f64) -> f64 {
    (step_ms(tempo) * GATE).max(MIN_ARP_MS)
}

fn default_pattern(id: InstrumentId) -> Vec<usize> {
    match id {
        InstrumentId::Bass => vec![0, 1, 2, 3],
        InstrumentId::Keys => vec![2, 1, 0, 1],
        _ => vec![0, 2, 1, 2],
    }
}

/// Note name without its octave: `"C#4"` gives `"C#"`.
fn pitch_class(note: &str) -> &str {
    let end = note.find(|c: char| c.is_ascii_digit() || c == '-').unwrap_or(note.len());
    &note[..end]
}

/// Move `note` by `delta` octaves. Names that do not parse are kept.
fn transpose_octave(note: &str, delta: i32) -> String {
    let class = pitch_class(note);
    match note[class.len()..].parse::<i32>() {
        Ok(octave) if NOTE_NAMES.contains(&class) => format!("{class}{}", octave + delta),
        _ => note.to_string(),
    }
}

/// Outcome of one arpeggiator tick.
#[derive(Debug, Clone, PartialEq)]
pub enum ArpStep {
    Play(String),
    /// Looping with nothing to play yet; tick again.
    Rest,
    /// Nothing left to play; the arpeggiator has stopped.
    Stop,
}

/// What removing a note left behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// Notes remain, or looping carries on with the last chord.
    Playing,
    /// The arpeggiator stopped; the instrument's voices should be released.
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Arpeggiator {
    enabled: bool,
    looping: bool,
    notes: Vec<String>,
    last_notes: Vec<String>,
    pattern: Vec<usize>,
    step: usize,
    running: bool,
}

impl Arpeggiator {
    pub fn new(id: InstrumentId) -> Self {
        Arpeggiator {
            enabled: false,
            looping: false,
            notes: Vec::new(),
            last_notes: Vec::new(),
            pattern: default_pattern(id),
            step: 0,
            running: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_looping(&self) -> bool {
        self.looping
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn last_notes(&self) -> &[String] {
        &self.last_notes
    }

    pub fn pattern(&self) -> &[usize] {
        &self.pattern
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// Begin stepping from the top of the pattern. Returns `false` when the
    /// arpeggiator is already running or has nothing to play.
    pub fn start(&mut self) -> bool {
        if self.running {
            return false;
        }
        if self.notes.is_empty() && self.looping && !self.last_notes.is_empty() {
            self.notes = self.last_notes.clone();
        }
        if self.notes.is_empty() && !self.looping {
            return false;
        }
        self.step = 0;
        self.running = true;
        true
    }

    pub fn stop(&mut self) {
        self.running = false;
        self.step = 0;
    }

    /// Switch the arpeggiator on or off. Returns whether it should now be
    /// ticking.
    pub fn set_mode(&mut self, enabled: bool, looping: bool) -> bool {
        self.enabled = enabled;
        self.looping = looping;
        if enabled {
            self.start();
        } else {
            self.stop();
        }
        self.running
    }

    /// Hold `note`. Returns `true` when this starts the arpeggiator.
    pub fn add(&mut self, note: &str) -> bool {
        if !self.enabled || self.notes.iter().any(|n| n == note) {
            return false;
        }
        self.notes.push(note.to_string());
        self.last_notes = self.notes.clone();
        self.notes.len() == 1 && self.start()
    }

    /// Let go of `note` in any octave. The last chord is kept for looping.
    pub fn remove(&mut self, note: &str) -> Removal {
        let class = pitch_class(note);
        self.notes.retain(|n| pitch_class(n) != class);
        if !self.notes.is_empty() {
            return Removal::Playing;
        }
        if self.looping && !self.last_notes.is_empty() {
            self.start();
            return Removal::Playing;
        }
        self.stop();
        Removal::Stopped
    }

    /// Pick the note for the current step and advance.
    pub fn tick(&mut self) -> ArpStep {
        if !self.running {
            return ArpStep::Stop;
        }
        let source = if !self.notes.is_empty() {
            &self.notes
        } else if self.looping {
            &self.last_notes
        } else {
            self.stop();
            return ArpStep::Stop;
        };
        let len = self.pattern.len().max(1);
        let played = match source.len() {
            0 => ArpStep::Rest,
            n => {
                let index = self.pattern.get(self.step % len).copied().unwrap_or(0);
                ArpStep::Play(source[index % n].clone())
            }
        };
        self.step = (self.step + 1) % len;
        played
    }

    /// Move every held and remembered note by `delta` octaves.
    pub fn shift_octaves(&mut self, delta: i32) {
        if delta == 0 {
            return;
        }
        for note in self.notes.iter_mut().chain(self.last_notes.iter_mut()) {
            *note = transpose_octave(note, delta);
        }
    }
}

/// One arpeggiator per melodic instrument.
#[derive(Debug, Clone)]
pub struct ArpeggiatorBank {
    arps: BTreeMap<InstrumentId, Arpeggiator>,
}

impl Default for ArpeggiatorBank {
    fn default() -> Self {
        Self::new()
    }
}

impl ArpeggiatorBank {
    pub fn new() -> Self {
        ArpeggiatorBank {
            arps: InstrumentId::MELODIC.into_iter().map(|id| (id, Arpeggiator::new(id))).collect(),
        }
    }

    /// `None` for instruments without an arpeggiator (drums).
    pub fn get(&self, id: InstrumentId) -> Option<&Arpeggiator> {
        self.arps.get(&id)
    }

    pub fn get_mut(&mut self, id: InstrumentId) -> Option<&mut Arpeggiator> {
        self.arps.get_mut(&id)
    }

    pub fn all(&self) -> &BTreeMap<InstrumentId, Arpeggiator> {
        &self.arps
    }
}
