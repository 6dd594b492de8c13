//! Mixer view model: a grid of fader steps, one column per channel.

use serde::Serialize;

use crate::drums::{DrumKit, DrumType};
use crate::instrument::{InstrumentId, InstrumentRegistry};
use crate::pattern::PatternStore;

/// Fader steps per channel.
pub const MIXER_STEPS: usize = 8;
/// Drum rows of the kit that get a mixer column.
const DRUM_CHANNELS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MixerChannel {
    Instrument(InstrumentId),
    Drum(DrumType),
}

/// Volume selected by clicking fader step `step` (0 = quietest).
pub fn volume_for_step(step: usize) -> f64 {
    (step + 1) as f64 / MIXER_STEPS as f64
}

/// Whether fader step `step` is lit for `volume`.
pub fn is_cell_active(step: usize, volume: f64) -> bool {
    volume_for_step(step) <= volume + 0.05
}

/// Columns of the mixer: the melodic instruments, then the first drums of
/// the kit.
pub fn channels(kit: DrumKit) -> Vec<MixerChannel> {
    InstrumentId::MELODIC
        .into_iter()
        .map(MixerChannel::Instrument)
        .chain(kit.rows().iter().take(DRUM_CHANNELS).map(|&d| MixerChannel::Drum(d)))
        .collect()
}

pub fn channel_at(kit: DrumKit, column: usize) -> Option<MixerChannel> {
    channels(kit).get(column).copied()
}

pub fn channel_volume(store: &PatternStore, channel: MixerChannel) -> f64 {
    match channel {
        MixerChannel::Instrument(id) => store.instrument_volume(id),
        MixerChannel::Drum(drum) => store.drum_volume(drum),
    }
}

/// Lit cells of every column, bottom step first.
pub fn cells(store: &PatternStore) -> Vec<[bool; MIXER_STEPS]> {
    channels(store.layout().kit())
        .into_iter()
        .map(|ch| {
            let volume = channel_volume(store, ch);
            std::array::from_fn(|step| is_cell_active(step, volume))
        })
        .collect()
}

/// Apply a click on `(column, step)`. Returns the channel and the volume it
/// now has, or `None` when the click misses every column.
pub fn click(
    store: &mut PatternStore,
    registry: &mut InstrumentRegistry,
    column: usize,
    step: usize,
) -> Option<(MixerChannel, f64)> {
    let channel = channel_at(store.layout().kit(), column)?;
    let volume = volume_for_step(step.min(MIXER_STEPS - 1));
    match channel {
        MixerChannel::Instrument(id) => store.set_instrument_volume(id, volume, registry),
        MixerChannel::Drum(drum) => store.set_drum_volume(drum, volume),
    }
    Some((channel, volume))
}
