//! Drum types, kits and the per-hit synthesis and sample playback paths.

use std::fmt;
use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dsp::filter::FilterMode;
use crate::dsp::oscillator::Waveform;
use crate::dsp::reverb::hit_impulse;
use crate::dsp::sampler::SampleBuffer;
use crate::dsp::shaper::{hard_clip_curve, saturator_curve};
use crate::error::GraphError;
use crate::graph::{AudioGraph, NodeId, NodeKind, Param, release_nodes};
use crate::instrument::{DrumSettings, SampleFx};

/// Level an exponential decay ends at.
const DECAY_FLOOR: f64 = 0.001;
/// Shortest hit.
const MIN_DECAY: f64 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DrumType {
    Kick,
    Snare,
    Hat1,
    Hat2,
    TomLow,
    TomMid,
    TomHigh,
    Crash,
    Rim,
    Perc1,
    Perc2,
    Clap,
    HiHat,
    OpenHat,
    Sub,
}

impl DrumType {
    pub const ALL: [DrumType; 15] = [
        DrumType::Kick,
        DrumType::Snare,
        DrumType::Hat1,
        DrumType::Hat2,
        DrumType::TomLow,
        DrumType::TomMid,
        DrumType::TomHigh,
        DrumType::Crash,
        DrumType::Rim,
        DrumType::Perc1,
        DrumType::Perc2,
        DrumType::Clap,
        DrumType::HiHat,
        DrumType::OpenHat,
        DrumType::Sub,
    ];

    /// Display label, as shown on the grid's drum rows.
    pub fn label(self) -> &'static str {
        match self {
            DrumType::Kick => "Kick",
            DrumType::Snare => "Snare",
            DrumType::Hat1 => "Hat 1",
            DrumType::Hat2 => "Hat 2",
            DrumType::TomLow => "Tom Low",
            DrumType::TomMid => "Tom Mid",
            DrumType::TomHigh => "Tom High",
            DrumType::Crash => "Crash",
            DrumType::Rim => "Rim",
            DrumType::Perc1 => "Perc 1",
            DrumType::Perc2 => "Perc 2",
            DrumType::Clap => "Clap",
            DrumType::HiHat => "Hi-Hat",
            DrumType::OpenHat => "Open Hat",
            DrumType::Sub => "Sub",
        }
    }

    /// Parse a label. Case, spaces, dashes and underscores are ignored, so
    /// `"Hat 1"`, `"hat1"` and `"tom_low"` all resolve.
    pub fn from_label(name: &str) -> Option<DrumType> {
        let squash = |s: &str| -> String {
            s.chars()
                .filter(|c| !matches!(c, ' ' | '-' | '_'))
                .collect::<String>()
                .to_ascii_lowercase()
        };
        let wanted = squash(name);
        DrumType::ALL.into_iter().find(|d| squash(d.label()) == wanted)
    }

    /// Decay in seconds when none has been set.
    pub fn default_decay(self) -> f64 {
        match self {
            DrumType::Kick => 0.4,
            DrumType::Snare => 0.2,
            DrumType::Clap => 0.15,
            DrumType::Hat1 | DrumType::HiHat => 0.1,
            DrumType::Hat2 | DrumType::OpenHat => 0.3,
            DrumType::TomLow => 0.3,
            DrumType::TomMid => 0.2,
            DrumType::TomHigh => 0.15,
            DrumType::Crash => 0.5,
            DrumType::Rim => 0.05,
            DrumType::Perc1 => 0.2,
            DrumType::Perc2 => 0.3,
            DrumType::Sub => 0.2,
        }
    }

    /// Whether toggling a grid cell of this drum auditions it. The four core
    /// kit pieces stay silent so editing a beat is not noisy.
    pub fn preview_on_toggle(self) -> bool {
        !matches!(self, DrumType::Kick | DrumType::Snare | DrumType::Hat1 | DrumType::Hat2)
    }
}

impl fmt::Display for DrumType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which set of drums a grid's rows play and how they are synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DrumKit {
    /// Twelve oscillator-based drums.
    #[default]
    Classic,
    /// Six filtered-noise drums.
    Noise,
}

impl DrumKit {
    /// Drum on each grid row, top to bottom.
    pub fn rows(self) -> &'static [DrumType] {
        match self {
            DrumKit::Classic => &[
                DrumType::Kick,
                DrumType::Snare,
                DrumType::Hat1,
                DrumType::Hat2,
                DrumType::TomLow,
                DrumType::TomMid,
                DrumType::TomHigh,
                DrumType::Crash,
                DrumType::Rim,
                DrumType::Perc1,
                DrumType::Perc2,
                DrumType::Clap,
            ],
            DrumKit::Noise => &[
                DrumType::Kick,
                DrumType::Snare,
                DrumType::HiHat,
                DrumType::OpenHat,
                DrumType::Crash,
                DrumType::Sub,
            ],
        }
    }

    pub fn drum_at(self, row: usize) -> Option<DrumType> {
        self.rows().get(row).copied()
    }

    pub fn row_of(self, drum: DrumType) -> Option<usize> {
        self.rows().iter().position(|&d| d == drum)
    }
}

/// Sound source of one layer of a drum hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LayerSource {
    /// An oscillator, optionally sweeping exponentially to `(end, seconds)`.
    Tone {
        waveform: Waveform,
        frequency: f64,
        sweep: Option<(f64, f64)>,
    },
    /// White noise, optionally through a filter at a center frequency.
    Noise { filter: Option<(FilterMode, f64)> },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrumLayer {
    pub source: LayerSource,
    pub peak: f64,
}

fn tone(waveform: Waveform, frequency: f64, peak: f64) -> DrumLayer {
    DrumLayer {
        source: LayerSource::Tone {
            waveform,
            frequency,
            sweep: None,
        },
        peak,
    }
}

fn swept(frequency: f64, end: f64, seconds: f64, peak: f64) -> DrumLayer {
    DrumLayer {
        source: LayerSource::Tone {
            waveform: Waveform::Square,
            frequency,
            sweep: Some((end, seconds)),
        },
        peak,
    }
}

fn noise(filter: Option<(FilterMode, f64)>, peak: f64) -> DrumLayer {
    DrumLayer {
        source: LayerSource::Noise { filter },
        peak,
    }
}

/// Layers that make up `drum` in `kit`, with every frequency scaled by `pitch`.
pub fn recipe(kit: DrumKit, drum: DrumType, pitch: f64) -> Vec<DrumLayer> {
    use DrumType::*;
    let p = pitch;
    match (kit, drum) {
        (DrumKit::Noise, Kick) => vec![tone(Waveform::Sine, 60.0 * p, 1.0)],
        (DrumKit::Noise, Snare) => vec![noise(Some((FilterMode::Highpass, 200.0 * p)), 1.0)],
        (DrumKit::Noise, HiHat | Hat1) => vec![noise(Some((FilterMode::Highpass, 8000.0 * p)), 1.0)],
        (DrumKit::Noise, OpenHat | Hat2) => vec![noise(Some((FilterMode::Highpass, 5000.0 * p)), 1.0)],
        (DrumKit::Noise, Crash) => vec![noise(Some((FilterMode::Bandpass, 4000.0 * p)), 1.0)],
        (_, Sub) => vec![tone(Waveform::Sine, 80.0 * p, 1.0)],

        (_, Kick) => vec![swept(60.0 * p, 30.0 * p, 0.3, 1.0)],
        (_, Snare) => vec![tone(Waveform::Triangle, 100.0 * p, 1.0), noise(None, 0.5)],
        (_, Hat1 | Hat2 | HiHat | OpenHat) => vec![tone(Waveform::Square, 800.0 * p, 0.5)],
        (_, TomLow) => vec![swept(90.0 * p, 40.0 * p, 0.3, 0.8)],
        (_, TomMid) => vec![swept(120.0 * p, 60.0 * p, 0.2, 0.7)],
        (_, TomHigh) => vec![swept(180.0 * p, 80.0 * p, 0.15, 0.6)],
        (_, Crash) => vec![tone(Waveform::Square, 1500.0 * p, 0.4)],
        (_, Rim) => vec![tone(Waveform::Square, 800.0 * p, 0.5)],
        (_, Perc1) => vec![tone(Waveform::Triangle, 400.0 * p, 0.5)],
        (_, Perc2) => vec![tone(Waveform::Sawtooth, 300.0 * p, 0.5)],
        (_, Clap) => vec![noise(Some((FilterMode::Bandpass, 1200.0 * p)), 0.7)],
    }
}

/// Nodes created for one drum hit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrumHit {
    pub sources: Vec<NodeId>,
    /// Envelope gains, faded on pause.
    pub gains: Vec<NodeId>,
    /// Every node of the hit, sources included.
    pub nodes: Vec<NodeId>,
    /// When the last source stops.
    pub ends_at: f64,
    /// Extra time effect tails keep ringing after `ends_at`.
    pub tail: f64,
}

/// Build and start a synthesized hit at `at`, routed into `bus`. On failure
/// every node created so far is released.
#[allow(clippy::too_many_arguments)]
pub fn synthesize<G: AudioGraph + ?Sized, R: Rng + ?Sized>(
    graph: &mut G,
    bus: NodeId,
    kit: DrumKit,
    drum: DrumType,
    settings: &DrumSettings,
    volume: f64,
    at: f64,
    rng: &mut R,
) -> Result<DrumHit, GraphError> {
    let decay = settings.decay(drum).max(MIN_DECAY);
    let mut hit = DrumHit {
        ends_at: at + decay,
        ..DrumHit::default()
    };
    let layers = recipe(kit, drum, settings.pitch(drum));
    match build_layers(graph, bus, &layers, volume, at, decay, rng, &mut hit) {
        Ok(()) => Ok(hit),
        Err(e) => {
            release_nodes(graph, &hit.nodes);
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_layers<G: AudioGraph + ?Sized, R: Rng + ?Sized>(
    graph: &mut G,
    bus: NodeId,
    layers: &[DrumLayer],
    volume: f64,
    at: f64,
    decay: f64,
    rng: &mut R,
    hit: &mut DrumHit,
) -> Result<(), GraphError> {
    let end = at + decay;
    for layer in layers {
        let level = layer.peak * volume;
        let gain = graph.create(NodeKind::gain(level));
        hit.nodes.push(gain);
        graph.set_value_at(gain, Param::Gain, level, at)?;
        graph.exponential_ramp_to(gain, Param::Gain, DECAY_FLOOR.min(level), end)?;
        graph.connect(gain, bus)?;
        hit.gains.push(gain);

        let source = match layer.source {
            LayerSource::Tone {
                waveform,
                frequency,
                sweep,
            } => {
                let osc = graph.create(NodeKind::Oscillator { waveform, frequency });
                hit.nodes.push(osc);
                if let Some((to, seconds)) = sweep {
                    graph.set_value_at(osc, Param::Frequency, frequency, at)?;
                    graph.exponential_ramp_to(osc, Param::Frequency, to, at + seconds)?;
                }
                graph.connect(osc, gain)?;
                osc
            }
            LayerSource::Noise { filter } => {
                let buffer = SampleBuffer::noise(decay, graph.sample_rate() as u32, rng);
                let src = graph.create(NodeKind::Buffer {
                    buffer: Arc::new(buffer),
                    playback_rate: 1.0,
                });
                hit.nodes.push(src);
                match filter {
                    Some((mode, frequency)) => {
                        let f = graph.create(NodeKind::Filter { mode, frequency, q: 1.0 });
                        hit.nodes.push(f);
                        graph.chain(&[src, f, gain])?;
                    }
                    None => graph.connect(src, gain)?,
                }
                src
            }
        };
        graph.start(source, at)?;
        graph.stop(source, end)?;
        hit.sources.push(source);
    }
    Ok(())
}

/// Play a recorded sample for `drum` at `at` through the sample FX chain.
///
/// The drum's decay setting is read as a fraction of the sample length.
/// A fraction at or below 1 % cuts the hit to 2 ms; otherwise the hit lasts
/// at least 10 ms and fades out linearly over its last 30 %. On failure
/// every node created so far is released.
#[allow(clippy::too_many_arguments)]
pub fn play_sample<G: AudioGraph + ?Sized, R: Rng + ?Sized>(
    graph: &mut G,
    bus: NodeId,
    drum: DrumType,
    buffer: Arc<SampleBuffer>,
    settings: &DrumSettings,
    volume: f64,
    at: f64,
    rng: &mut R,
) -> Result<DrumHit, GraphError> {
    let length = buffer.duration();
    let source = graph.create(NodeKind::Buffer {
        buffer,
        playback_rate: settings.pitch(drum),
    });
    let gain = graph.create(NodeKind::gain(volume));
    let mut hit = DrumHit {
        sources: vec![source],
        gains: vec![gain],
        nodes: vec![source, gain],
        ..DrumHit::default()
    };
    let fraction = settings.decay(drum).min(1.0);
    match build_sample_chain(graph, bus, settings.fx, fraction, length, volume, at, rng, &mut hit) {
        Ok(()) => Ok(hit),
        Err(e) => {
            release_nodes(graph, &hit.nodes);
            Err(e)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_sample_chain<G: AudioGraph + ?Sized, R: Rng + ?Sized>(
    graph: &mut G,
    bus: NodeId,
    fx: SampleFx,
    fraction: f64,
    length: f64,
    volume: f64,
    at: f64,
    rng: &mut R,
    hit: &mut DrumHit,
) -> Result<(), GraphError> {
    let (source, gain) = (hit.sources[0], hit.gains[0]);
    graph.set_value_at(gain, Param::Gain, volume, at)?;
    graph.connect(source, gain)?;
    let mut last = gain;

    if fx.saturator > 0.0 {
        let shaper = graph.create(NodeKind::WaveShaper {
            curve: saturator_curve(fx.saturator).into(),
        });
        hit.nodes.push(shaper);
        graph.connect(last, shaper)?;
        last = shaper;
    }

    if let Some(cutoff) = fx.filter_cutoff {
        let filter = graph.create(NodeKind::Filter {
            mode: FilterMode::Lowpass,
            frequency: 200.0 + cutoff * 8000.0,
            q: 1.0,
        });
        hit.nodes.push(filter);
        graph.connect(last, filter)?;
        last = filter;
    }

    if fx.distortion > 0.0 {
        let shaper = graph.create(NodeKind::WaveShaper {
            curve: hard_clip_curve(fx.distortion).into(),
        });
        hit.nodes.push(shaper);
        graph.connect(last, shaper)?;
        last = shaper;
    }

    if fx.reverb > 0.0 {
        let impulse = hit_impulse(graph.sample_rate(), fx.reverb, rng);
        hit.tail += impulse.len() as f64 / graph.sample_rate();
        let convolver = graph.create(NodeKind::Convolver {
            impulse: impulse.into(),
        });
        let wet = graph.create(NodeKind::gain(fx.reverb * 0.5));
        let dry = graph.create(NodeKind::gain(1.0 - fx.reverb * 0.3));
        let out = graph.create(NodeKind::gain(1.0));
        hit.nodes.extend([convolver, wet, dry, out]);
        graph.chain(&[last, wet, convolver, out])?;
        graph.chain(&[last, dry, out])?;
        last = out;
    }

    if fx.delay > 0.0 {
        let delay = graph.create(NodeKind::Delay {
            max_time: 1.0,
            time: fx.delay * 0.3,
        });
        let feedback = graph.create(NodeKind::gain(fx.delay * 0.4));
        let wet = graph.create(NodeKind::gain(fx.delay * 0.3));
        let dry = graph.create(NodeKind::gain(1.0 - fx.delay * 0.2));
        let out = graph.create(NodeKind::gain(1.0));
        hit.nodes.extend([delay, feedback, wet, dry, out]);
        graph.chain(&[last, dry, out])?;
        graph.connect(last, delay)?;
        graph.chain(&[delay, feedback, delay])?;
        graph.chain(&[delay, wet, out])?;
        // Feedback below 0.4 falls under the floor within a dozen repeats.
        hit.tail += fx.delay * 0.3 * 12.0;
        last = out;
    }
    graph.connect(last, bus)?;

    hit.ends_at = if fraction <= 0.01 {
        at + MIN_DECAY
    } else {
        let duration = (fraction * length).max(0.01);
        graph.set_value_at(gain, Param::Gain, volume, at + duration * 0.7)?;
        graph.linear_ramp_to(gain, Param::Gain, 0.0, at + duration)?;
        at + duration + 0.01
    };
    graph.stop(source, hit.ends_at)?;
    graph.start(source, at)
}
