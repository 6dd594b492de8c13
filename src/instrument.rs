//! Instrument parameter sets and per-drum settings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::drums::DrumType;
use crate::dsp::oscillator::Waveform;
use crate::error::{Result, RositaError};

/// The four sequencer instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentId {
    Synth,
    Bass,
    Keys,
    Drums,
}

impl InstrumentId {
    pub const ALL: [InstrumentId; 4] = [
        InstrumentId::Synth,
        InstrumentId::Bass,
        InstrumentId::Keys,
        InstrumentId::Drums,
    ];

    pub const MELODIC: [InstrumentId; 3] = [InstrumentId::Synth, InstrumentId::Bass, InstrumentId::Keys];

    /// Look up an instrument by name. Unknown names resolve to `Synth`.
    pub fn from_name(name: &str) -> InstrumentId {
        match name.to_ascii_lowercase().as_str() {
            "synth" => InstrumentId::Synth,
            "bass" => InstrumentId::Bass,
            "keys" => InstrumentId::Keys,
            "drums" => InstrumentId::Drums,
            other => {
                log::debug!("unknown instrument '{other}', using synth");
                InstrumentId::Synth
            }
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            InstrumentId::Synth => "synth",
            InstrumentId::Bass => "bass",
            InstrumentId::Keys => "keys",
            InstrumentId::Drums => "drums",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn is_melodic(self) -> bool {
        self != InstrumentId::Drums
    }
}

impl std::fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Oscillator shape, ADSR envelope and channel volume of one instrument.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstrumentParams {
    pub waveform: Waveform,
    pub attack: f64,
    pub decay: f64,
    pub sustain: f64,
    pub release: f64,
    pub volume: f64,
}

impl InstrumentParams {
    pub fn defaults_for(id: InstrumentId) -> Self {
        let (waveform, attack, decay, sustain, release, volume) = match id {
            InstrumentId::Synth => (Waveform::Square, 0.1, 0.2, 0.5, 0.5, 0.6),
            InstrumentId::Bass => (Waveform::Sawtooth, 0.05, 0.1, 0.5, 0.3, 0.6),
            InstrumentId::Keys => (Waveform::Sine, 0.02, 0.1, 0.5, 0.5, 0.6),
            InstrumentId::Drums => (Waveform::Square, 0.01, 0.1, 0.0, 0.1, 1.0),
        };
        InstrumentParams {
            waveform,
            attack,
            decay,
            sustain,
            release,
            volume,
        }
    }
}

/// Longest accepted attack, decay or release time in seconds.
const MAX_ENVELOPE_TIME: f64 = 10.0;

pub const MIN_DRUM_PITCH: f64 = 0.25;
pub const MAX_DRUM_PITCH: f64 = 4.0;

/// Effects applied to sample-based drum hits. Each amount is in `[0, 1]`;
/// zero disables the stage. The lowpass stage is only inserted once a cutoff
/// has been set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleFx {
    pub saturator: f64,
    pub filter_cutoff: Option<f64>,
    pub distortion: f64,
    pub reverb: f64,
    pub delay: f64,
}

/// Settings owned by the drum instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DrumSettings {
    pitch: BTreeMap<DrumType, f64>,
    decay: BTreeMap<DrumType, f64>,
    pub fx: SampleFx,
}

impl DrumSettings {
    /// Pitch multiplier of `drum`, 1.0 unless set.
    pub fn pitch(&self, drum: DrumType) -> f64 {
        self.pitch.get(&drum).copied().unwrap_or(1.0)
    }

    /// Out-of-range or non-finite multipliers are replaced by 1.0.
    pub fn set_pitch(&mut self, drum: DrumType, value: f64) {
        let value = if (MIN_DRUM_PITCH..=MAX_DRUM_PITCH).contains(&value) {
            value
        } else {
            log::warn!("pitch {value} for {drum} out of range, using 1.0");
            1.0
        };
        self.pitch.insert(drum, value);
    }

    /// Decay time of `drum` in seconds.
    pub fn decay(&self, drum: DrumType) -> f64 {
        self.decay
            .get(&drum)
            .copied()
            .unwrap_or_else(|| drum.default_decay())
    }

    pub fn set_decay(&mut self, drum: DrumType, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(RositaError::InvalidValue {
                param: format!("{drum} decay"),
                value,
            });
        }
        self.decay.insert(drum, value.clamp(0.0, MAX_ENVELOPE_TIME));
        Ok(())
    }

    /// Set one of the sample FX amounts by name (`saturator`, `filterCutoff`,
    /// `distortion`, `reverb`, `delay`).
    pub fn set_fx(&mut self, name: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(RositaError::InvalidValue {
                param: name.to_string(),
                value,
            });
        }
        let value = value.clamp(0.0, 1.0);
        match name {
            "saturator" => self.fx.saturator = value,
            "filterCutoff" | "filter_cutoff" => self.fx.filter_cutoff = Some(value),
            "distortion" => self.fx.distortion = value,
            "reverb" => self.fx.reverb = value,
            "delay" => self.fx.delay = value,
            _ => {
                return Err(RositaError::UnknownParam {
                    target: "drum fx".into(),
                    param: name.into(),
                });
            }
        }
        Ok(())
    }
}

/// Parameter sets for every instrument. Instruments are never removed,
/// only reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentRegistry {
    params: BTreeMap<InstrumentId, InstrumentParams>,
    drums: DrumSettings,
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentRegistry {
    pub fn new() -> Self {
        let params = InstrumentId::ALL
            .iter()
            .map(|&id| (id, InstrumentParams::defaults_for(id)))
            .collect();
        InstrumentRegistry {
            params,
            drums: DrumSettings::default(),
        }
    }

    pub fn get(&self, id: InstrumentId) -> InstrumentParams {
        self.params
            .get(&id)
            .copied()
            .unwrap_or_else(|| InstrumentParams::defaults_for(id))
    }

    fn entry(&mut self, id: InstrumentId) -> &mut InstrumentParams {
        self.params
            .entry(id)
            .or_insert_with(|| InstrumentParams::defaults_for(id))
    }

    /// Set `attack`, `decay`, `sustain`, `release` or `volume`. Times clamp
    /// to `[0, 10]` seconds; sustain and volume clamp to `[0, 1]`.
    pub fn set_envelope_param(&mut self, id: InstrumentId, param: &str, value: f64) -> Result<()> {
        if !value.is_finite() {
            return Err(RositaError::InvalidValue {
                param: param.to_string(),
                value,
            });
        }
        let params = self.entry(id);
        match param {
            "attack" => params.attack = value.clamp(0.0, MAX_ENVELOPE_TIME),
            "decay" => params.decay = value.clamp(0.0, MAX_ENVELOPE_TIME),
            "sustain" => params.sustain = value.clamp(0.0, 1.0),
            "release" => params.release = value.clamp(0.0, MAX_ENVELOPE_TIME),
            "volume" => params.volume = value.clamp(0.0, 1.0),
            _ => {
                return Err(RositaError::UnknownParam {
                    target: id.name().into(),
                    param: param.into(),
                });
            }
        }
        Ok(())
    }

    pub fn set_waveform(&mut self, id: InstrumentId, waveform: Waveform) {
        self.entry(id).waveform = waveform;
    }

    pub fn set_volume(&mut self, id: InstrumentId, volume: f64) {
        self.entry(id).volume = if volume.is_finite() { volume.clamp(0.0, 1.0) } else { 0.0 };
    }

    pub fn drum_settings(&self) -> &DrumSettings {
        &self.drums
    }

    pub fn drum_settings_mut(&mut self) -> &mut DrumSettings {
        &mut self.drums
    }

    /// Restore the defaults of one instrument. Resetting `Drums` also
    /// clears its drum settings.
    pub fn reset(&mut self, id: InstrumentId) {
        self.params.insert(id, InstrumentParams::defaults_for(id));
        if id == InstrumentId::Drums {
            self.drums = DrumSettings::default();
        }
    }
}
