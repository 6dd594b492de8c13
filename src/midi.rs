//! Standard MIDI file export of the current pattern.
//!
//! One pass over the grid becomes a format 0 file at 96 ticks per quarter
//! note. Melodic instruments get a channel and a General MIDI program each;
//! drums go to channel 10 on their General MIDI percussion keys. Swing is
//! not written: steps land on the straight grid.

use midly::num::{u4, u7, u15, u24, u28};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};

use crate::drums::DrumType;
use crate::engine::NOTE_DURATION;
use crate::error::Result;
use crate::instrument::{InstrumentId, InstrumentRegistry};
use crate::note::note_to_midi;
use crate::pattern::PatternStore;

pub const TICKS_PER_QUARTER: u16 = 96;
/// Channel 10, counted from zero.
pub const DRUM_CHANNEL: u8 = 9;

/// Channel and General MIDI program for a melodic instrument.
fn channel_program(id: InstrumentId) -> (u8, u8) {
    match id {
        InstrumentId::Synth => (0, 80),
        InstrumentId::Bass => (1, 38),
        InstrumentId::Keys => (2, 4),
        InstrumentId::Drums => (DRUM_CHANNEL, 0),
    }
}

/// General MIDI percussion key for `drum`.
pub fn gm_drum_key(drum: DrumType) -> u8 {
    match drum {
        DrumType::Kick => 36,
        DrumType::Snare => 38,
        DrumType::Hat1 | DrumType::HiHat => 42,
        DrumType::Hat2 => 44,
        DrumType::TomLow => 45,
        DrumType::TomMid => 47,
        DrumType::TomHigh => 50,
        DrumType::Crash => 49,
        DrumType::Rim => 37,
        DrumType::Perc1 => 56,
        DrumType::Perc2 => 75,
        DrumType::Clap => 39,
        DrumType::OpenHat => 46,
        DrumType::Sub => 35,
    }
}

fn velocity(volume: f64) -> u8 {
    (volume * 127.0).round().clamp(1.0, 127.0) as u8
}

#[derive(Debug, Clone, Copy)]
struct NoteSpan {
    channel: u8,
    key: u8,
    velocity: u8,
    start: u64,
    end: u64,
}

#[derive(Debug, Clone)]
struct AbsoluteEvent {
    tick: u64,
    /// Note-offs sort before note-ons on the same tick.
    order: u8,
    kind: TrackEventKind<'static>,
}

/// Every audible cell of one pass as note spans. A note that would run into
/// the next hit on the same key is cut at that hit, the way the engine
/// replaces a sounding voice.
fn collect_notes(patterns: &PatternStore, registry: &InstrumentRegistry, tempo: f64) -> Vec<NoteSpan> {
    let layout = patterns.layout();
    let per_step = (f64::from(TICKS_PER_QUARTER) / layout.steps_per_beat()).round() as u64;
    let note_ticks = ((NOTE_DURATION * tempo / 60.0 * f64::from(TICKS_PER_QUARTER)).round() as u64).max(1);
    let drum_ticks = (per_step / 2).max(1);
    let drum_level = registry.get(InstrumentId::Drums).volume;

    let mut notes = Vec::new();
    for col in 0..layout.columns() {
        let start = col as u64 * per_step;
        for id in InstrumentId::MELODIC {
            if !patterns.is_audible(id) {
                continue;
            }
            let Some(key) = patterns.note_at(id, col).as_deref().and_then(note_to_midi) else {
                continue;
            };
            notes.push(NoteSpan {
                channel: channel_program(id).0,
                key,
                velocity: velocity(registry.get(id).volume),
                start,
                end: start + note_ticks,
            });
        }
        if !patterns.is_audible(InstrumentId::Drums) {
            continue;
        }
        for drum in patterns.drums_at(col) {
            if patterns.is_drum_muted(drum) {
                continue;
            }
            notes.push(NoteSpan {
                channel: DRUM_CHANNEL,
                key: gm_drum_key(drum),
                velocity: velocity(patterns.drum_volume(drum) * drum_level),
                start,
                end: start + drum_ticks,
            });
        }
    }

    notes.sort_by_key(|n| (n.channel, n.key, n.start));
    for i in 1..notes.len() {
        let next = notes[i];
        let prev = &mut notes[i - 1];
        if prev.channel == next.channel && prev.key == next.key && prev.end > next.start {
            prev.end = next.start;
        }
    }
    notes
}

fn note_events(note: &NoteSpan) -> [AbsoluteEvent; 2] {
    let channel = u4::from(note.channel);
    let key = u7::from(note.key);
    [
        AbsoluteEvent {
            tick: note.start,
            order: 1,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key,
                    vel: u7::from(note.velocity),
                },
            },
        },
        AbsoluteEvent {
            tick: note.end,
            order: 0,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff { key, vel: u7::from(0_u8) },
            },
        },
    ]
}

fn meta(kind: MetaMessage<'static>) -> TrackEvent<'static> {
    TrackEvent {
        delta: u28::from(0_u32),
        kind: TrackEventKind::Meta(kind),
    }
}

/// Encode one pass of the pattern at `tempo` as a format 0 MIDI file.
pub fn export(patterns: &PatternStore, registry: &InstrumentRegistry, tempo: f64) -> Result<Vec<u8>> {
    let micros_per_quarter = (60_000_000.0 / tempo.max(1.0)).round() as u32;
    let mut track = vec![
        meta(MetaMessage::Tempo(u24::from(micros_per_quarter))),
        meta(MetaMessage::TimeSignature(4, 2, 24, 8)),
    ];
    for id in InstrumentId::MELODIC {
        let (channel, program) = channel_program(id);
        track.push(TrackEvent {
            delta: u28::from(0_u32),
            kind: TrackEventKind::Midi {
                channel: u4::from(channel),
                message: MidiMessage::ProgramChange {
                    program: u7::from(program),
                },
            },
        });
    }

    let notes = collect_notes(patterns, registry, tempo);
    let mut events: Vec<AbsoluteEvent> = notes.iter().flat_map(note_events).collect();
    events.sort_by_key(|e| (e.tick, e.order));

    let mut previous = 0_u64;
    for event in events {
        let delta = event.tick.saturating_sub(previous).min(u64::from(u32::MAX)) as u32;
        track.push(TrackEvent {
            delta: u28::from(delta),
            kind: event.kind,
        });
        previous = event.tick;
    }
    track.push(meta(MetaMessage::EndOfTrack));

    let header = Header {
        format: Format::SingleTrack,
        timing: Timing::Metrical(u15::from(TICKS_PER_QUARTER)),
    };
    let mut bytes = Vec::new();
    Smf {
        header,
        tracks: vec![track],
    }
    .write_std(&mut bytes)?;
    log::debug!("midi export: {} notes, {} bytes", notes.len(), bytes.len());
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::GridLayout;

    fn store() -> PatternStore {
        PatternStore::new(GridLayout::Halves, 4)
    }

    /// `(tick, channel, key, on)` for every note event in the file.
    fn note_events_of(bytes: &[u8]) -> Vec<(u64, u8, u8, bool)> {
        let smf = Smf::parse(bytes).unwrap();
        assert_eq!(smf.header.format, Format::SingleTrack);
        assert_eq!(smf.header.timing, Timing::Metrical(u15::from(96_u16)));
        assert_eq!(smf.tracks.len(), 1);
        let mut tick = 0;
        let mut out = Vec::new();
        for event in &smf.tracks[0] {
            tick += u64::from(event.delta.as_int());
            if let TrackEventKind::Midi { channel, message } = event.kind {
                match message {
                    MidiMessage::NoteOn { key, .. } => out.push((tick, channel.as_int(), key.as_int(), true)),
                    MidiMessage::NoteOff { key, .. } => out.push((tick, channel.as_int(), key.as_int(), false)),
                    _ => {}
                }
            }
        }
        out
    }

    #[test]
    fn empty_pattern_has_tempo_and_programs_only() {
        let bytes = export(&store(), &InstrumentRegistry::new(), 120.0).unwrap();
        assert_eq!(&bytes[..4], b"MThd");
        let smf = Smf::parse(&bytes).unwrap();
        let track = &smf.tracks[0];
        assert_eq!(track[0].kind, TrackEventKind::Meta(MetaMessage::Tempo(u24::from(500_000_u32))));
        assert_eq!(track.last().map(|e| e.kind), Some(TrackEventKind::Meta(MetaMessage::EndOfTrack)));
        assert!(note_events_of(&bytes).is_empty());
    }

    #[test]
    fn cells_become_notes_on_the_grid() {
        let mut patterns = store();
        // Bottom bass row is C3; kick on row 0, snare on row 1.
        patterns.toggle_step(InstrumentId::Bass, 11, 0);
        patterns.toggle_step(InstrumentId::Drums, 0, 0);
        patterns.toggle_step(InstrumentId::Drums, 1, 2);
        let bytes = export(&patterns, &InstrumentRegistry::new(), 120.0).unwrap();
        let events = note_events_of(&bytes);

        // Halves: 48 ticks per step; 0.35 s at 120 BPM is 67 ticks.
        assert!(events.contains(&(0, 1, 48, true)), "{events:?}");
        assert!(events.contains(&(67, 1, 48, false)));
        assert!(events.contains(&(0, DRUM_CHANNEL, 36, true)));
        assert!(events.contains(&(24, DRUM_CHANNEL, 36, false)));
        assert!(events.contains(&(96, DRUM_CHANNEL, 38, true)));
        assert_eq!(events.len(), 6);
    }

    #[test]
    fn repeated_keys_do_not_overlap() {
        let mut patterns = store();
        patterns.toggle_step(InstrumentId::Keys, 11, 0);
        patterns.toggle_step(InstrumentId::Keys, 11, 1);
        let bytes = export(&patterns, &InstrumentRegistry::new(), 120.0).unwrap();
        let events = note_events_of(&bytes);
        assert_eq!(
            events,
            vec![(0, 2, 48, true), (48, 2, 48, false), (48, 2, 48, true), (115, 2, 48, false)]
        );
    }

    #[test]
    fn muted_channels_are_left_out() {
        let mut patterns = store();
        patterns.toggle_step(InstrumentId::Synth, 11, 0);
        patterns.toggle_step(InstrumentId::Drums, 0, 0);
        patterns.toggle_mute(InstrumentId::Synth);
        patterns.toggle_drum_mute(DrumType::Kick);
        let bytes = export(&patterns, &InstrumentRegistry::new(), 90.0).unwrap();
        assert!(note_events_of(&bytes).is_empty());
    }
}
