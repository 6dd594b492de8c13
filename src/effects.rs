//! Master effects bus: filter, distortion, delay and reverb stages between
//! the voice bus and the destination.
//!
//! ```text
//! input ─┬─ dry ──────────────────────────────────────────┬─ output ─ destination
//!        └─ wet ─ [filter] ─ [distortion] ─ [delay] ─ [reverb]┘
//! ```
//!
//! Disabled stages are skipped. Every rebuild disconnects the wet gain and
//! every stage output before re-chaining, so the resulting routing depends
//! only on which stages are enabled.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dsp::filter::FilterMode;
use crate::dsp::reverb::impulse_response;
use crate::dsp::shaper::distortion_curve;
use crate::error::{GraphError, Result, RositaError};
use crate::graph::{AudioGraph, NodeId, NodeKind, Param};

/// Time constant of live parameter changes, in seconds.
const RAMP: f64 = 0.01;
const MAX_DELAY: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Filter,
    Distortion,
    Delay,
    Reverb,
}

impl EffectKind {
    /// Order of the stages along the wet path.
    pub const CHAIN: [EffectKind; 4] = [
        EffectKind::Filter,
        EffectKind::Distortion,
        EffectKind::Delay,
        EffectKind::Reverb,
    ];

    pub fn from_name(name: &str) -> Result<EffectKind> {
        match name.to_ascii_lowercase().as_str() {
            "filter" => Ok(EffectKind::Filter),
            "distortion" => Ok(EffectKind::Distortion),
            "delay" => Ok(EffectKind::Delay),
            "reverb" => Ok(EffectKind::Reverb),
            _ => Err(RositaError::UnknownEffect(name.to_string())),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            EffectKind::Filter => "filter",
            EffectKind::Distortion => "distortion",
            EffectKind::Delay => "delay",
            EffectKind::Reverb => "reverb",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReverbParams {
    pub enabled: bool,
    pub wetness: f64,
    pub room_size: f64,
    pub decay: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelayParams {
    pub enabled: bool,
    pub time: f64,
    pub feedback: f64,
    pub wetness: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterParams {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub mode: FilterMode,
    pub frequency: f64,
    pub resonance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistortionParams {
    pub enabled: bool,
    pub amount: f64,
}

/// Stored parameters of every stage. All stages start disabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EffectParams {
    pub reverb: ReverbParams,
    pub delay: DelayParams,
    pub filter: FilterParams,
    pub distortion: DistortionParams,
}

impl Default for EffectParams {
    fn default() -> Self {
        EffectParams {
            reverb: ReverbParams {
                enabled: false,
                wetness: 0.3,
                room_size: 0.7,
                decay: 2.0,
            },
            delay: DelayParams {
                enabled: false,
                time: 0.25,
                feedback: 0.3,
                wetness: 0.3,
            },
            filter: FilterParams {
                enabled: false,
                mode: FilterMode::Lowpass,
                frequency: 2000.0,
                resonance: 1.0,
            },
            distortion: DistortionParams {
                enabled: false,
                amount: 20.0,
            },
        }
    }
}

impl EffectParams {
    pub fn is_enabled(&self, kind: EffectKind) -> bool {
        match kind {
            EffectKind::Filter => self.filter.enabled,
            EffectKind::Distortion => self.distortion.enabled,
            EffectKind::Delay => self.delay.enabled,
            EffectKind::Reverb => self.reverb.enabled,
        }
    }

    fn set_enabled(&mut self, kind: EffectKind, enabled: bool) {
        match kind {
            EffectKind::Filter => self.filter.enabled = enabled,
            EffectKind::Distortion => self.distortion.enabled = enabled,
            EffectKind::Delay => self.delay.enabled = enabled,
            EffectKind::Reverb => self.reverb.enabled = enabled,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Stage {
    input: NodeId,
    output: NodeId,
}

#[derive(Debug)]
pub struct EffectsChain {
    input: NodeId,
    output: NodeId,
    dry: NodeId,
    wet: NodeId,
    filter: Stage,
    biquad: NodeId,
    distortion: Stage,
    shaper: NodeId,
    delay: Stage,
    delay_line: NodeId,
    delay_feedback: NodeId,
    delay_wet: NodeId,
    delay_dry: NodeId,
    reverb: Stage,
    convolver: NodeId,
    reverb_wet: NodeId,
    reverb_dry: NodeId,
    params: EffectParams,
}

impl EffectsChain {
    /// Build every stage and route `input` straight to `destination`.
    pub fn new<G: AudioGraph + ?Sized, R: Rng + ?Sized>(
        graph: &mut G,
        destination: NodeId,
        rng: &mut R,
    ) -> std::result::Result<Self, GraphError> {
        let params = EffectParams::default();
        let gain = |graph: &mut G, level: f64| graph.create(NodeKind::gain(level));

        let input = gain(graph, 1.0);
        let output = gain(graph, 1.0);
        let dry = gain(graph, 1.0);
        let wet = gain(graph, 0.0);
        graph.chain(&[input, dry, output])?;
        graph.connect(input, wet)?;
        graph.connect(output, destination)?;

        let p = params.filter;
        let biquad = graph.create(NodeKind::Filter {
            mode: p.mode,
            frequency: p.frequency,
            q: p.resonance,
        });
        let filter = Stage {
            input: gain(graph, 1.0),
            output: gain(graph, 1.0),
        };
        graph.chain(&[filter.input, biquad, filter.output])?;

        let shaper = graph.create(NodeKind::WaveShaper {
            curve: distortion_curve(params.distortion.amount).into(),
        });
        let distortion = Stage {
            input: gain(graph, 1.0),
            output: gain(graph, 1.0),
        };
        graph.chain(&[distortion.input, shaper, distortion.output])?;

        let p = params.delay;
        let delay_line = graph.create(NodeKind::Delay {
            max_time: MAX_DELAY,
            time: p.time,
        });
        let delay_feedback = gain(graph, p.feedback);
        let delay_wet = gain(graph, p.wetness);
        let delay_dry = gain(graph, 1.0 - p.wetness);
        let delay = Stage {
            input: gain(graph, 1.0),
            output: gain(graph, 1.0),
        };
        graph.chain(&[delay.input, delay_dry, delay.output])?;
        graph.connect(delay.input, delay_line)?;
        graph.chain(&[delay_line, delay_feedback, delay_line])?;
        graph.chain(&[delay_line, delay_wet, delay.output])?;

        let p = params.reverb;
        let impulse = impulse_response(graph.sample_rate(), p.decay, p.room_size, rng);
        let convolver = graph.create(NodeKind::Convolver {
            impulse: impulse.into(),
        });
        let reverb_wet = gain(graph, p.wetness);
        let reverb_dry = gain(graph, 1.0 - p.wetness);
        let reverb = Stage {
            input: gain(graph, 1.0),
            output: gain(graph, 1.0),
        };
        graph.chain(&[reverb.input, reverb_dry, reverb.output])?;
        graph.chain(&[reverb.input, convolver, reverb_wet, reverb.output])?;

        let mut chain = EffectsChain {
            input,
            output,
            dry,
            wet,
            filter,
            biquad,
            distortion,
            shaper,
            delay,
            delay_line,
            delay_feedback,
            delay_wet,
            delay_dry,
            reverb,
            convolver,
            reverb_wet,
            reverb_dry,
            params,
        };
        chain.rebuild(graph)?;
        log::debug!("effects chain ready");
        Ok(chain)
    }

    /// The bus voices connect to.
    pub fn input(&self) -> NodeId {
        self.input
    }

    pub fn output(&self) -> NodeId {
        self.output
    }

    pub fn wet(&self) -> NodeId {
        self.wet
    }

    pub fn dry(&self) -> NodeId {
        self.dry
    }

    pub fn params(&self) -> &EffectParams {
        &self.params
    }

    fn stage(&self, kind: EffectKind) -> Stage {
        match kind {
            EffectKind::Filter => self.filter,
            EffectKind::Distortion => self.distortion,
            EffectKind::Delay => self.delay,
            EffectKind::Reverb => self.reverb,
        }
    }

    /// Enabled stages in chain order.
    pub fn enabled_stages(&self) -> Vec<EffectKind> {
        EffectKind::CHAIN
            .into_iter()
            .filter(|&k| self.params.is_enabled(k))
            .collect()
    }

    pub fn set_enabled<G: AudioGraph + ?Sized>(
        &mut self,
        kind: EffectKind,
        enabled: bool,
        graph: &mut G,
    ) -> std::result::Result<(), GraphError> {
        self.params.set_enabled(kind, enabled);
        log::debug!("effect {kind} {}", if enabled { "on" } else { "off" });
        self.rebuild(graph)
    }

    fn rebuild<G: AudioGraph + ?Sized>(&mut self, graph: &mut G) -> std::result::Result<(), GraphError> {
        graph.disconnect(self.wet)?;
        for kind in EffectKind::CHAIN {
            graph.disconnect(self.stage(kind).output)?;
        }

        let enabled = self.enabled_stages();
        let mut current = self.wet;
        for &kind in &enabled {
            let stage = self.stage(kind);
            graph.connect(current, stage.input)?;
            current = stage.output;
        }
        graph.connect(current, self.output)?;

        let mix = if enabled.is_empty() { 0.0 } else { 0.5 };
        let now = graph.current_time();
        graph.set_target_at(self.wet, Param::Gain, mix, now, RAMP)?;
        graph.set_target_at(self.dry, Param::Gain, 1.0 - mix, now, RAMP)?;
        Ok(())
    }

    /// Store a parameter and push it to the running stage.
    ///
    /// Names follow the UI: `filter.{type,frequency,resonance}`,
    /// `distortion.amount`, `delay.{time,feedback,wetness}`,
    /// `reverb.{wetness,roomSize,decay}`. A filter `type` arrives as its
    /// numeric code (see [`FilterMode::from_index`]).
    pub fn set_param<G: AudioGraph + ?Sized, R: Rng + ?Sized>(
        &mut self,
        kind: EffectKind,
        name: &str,
        value: f64,
        graph: &mut G,
        rng: &mut R,
    ) -> Result<()> {
        if !value.is_finite() {
            return Err(RositaError::InvalidValue {
                param: format!("{kind}.{name}"),
                value,
            });
        }
        let now = graph.current_time();
        match (kind, name) {
            (EffectKind::Filter, "type") => {
                let mode = FilterMode::from_index(value).ok_or_else(|| RositaError::InvalidValue {
                    param: "filter.type".into(),
                    value,
                })?;
                self.set_filter_mode(mode, graph)?;
            }
            (EffectKind::Filter, "frequency") => {
                let v = value.clamp(20.0, 20_000.0);
                self.params.filter.frequency = v;
                graph.set_target_at(self.biquad, Param::Frequency, v, now, RAMP)?;
            }
            (EffectKind::Filter, "resonance") => {
                let v = value.clamp(0.0001, 30.0);
                self.params.filter.resonance = v;
                graph.set_target_at(self.biquad, Param::Q, v, now, RAMP)?;
            }
            (EffectKind::Distortion, "amount") => {
                let v = value.clamp(0.0, 1000.0);
                self.params.distortion.amount = v;
                graph.set_curve(self.shaper, distortion_curve(v).into())?;
            }
            (EffectKind::Delay, "time") => {
                let v = value.clamp(0.0, MAX_DELAY);
                self.params.delay.time = v;
                graph.set_target_at(self.delay_line, Param::DelayTime, v, now, RAMP)?;
            }
            (EffectKind::Delay, "feedback") => {
                let v = value.clamp(0.0, 0.95);
                self.params.delay.feedback = v;
                graph.set_target_at(self.delay_feedback, Param::Gain, v, now, RAMP)?;
            }
            (EffectKind::Delay, "wetness") => {
                let v = value.clamp(0.0, 1.0);
                self.params.delay.wetness = v;
                graph.set_target_at(self.delay_wet, Param::Gain, v, now, RAMP)?;
                graph.set_target_at(self.delay_dry, Param::Gain, 1.0 - v, now, RAMP)?;
            }
            (EffectKind::Reverb, "wetness") => {
                let v = value.clamp(0.0, 1.0);
                self.params.reverb.wetness = v;
                graph.set_target_at(self.reverb_wet, Param::Gain, v, now, RAMP)?;
                graph.set_target_at(self.reverb_dry, Param::Gain, 1.0 - v, now, RAMP)?;
            }
            (EffectKind::Reverb, "roomSize" | "room_size") => {
                self.params.reverb.room_size = value.clamp(0.0, 1.0);
                self.regenerate_impulse(graph, rng)?;
            }
            (EffectKind::Reverb, "decay") => {
                self.params.reverb.decay = value.clamp(0.1, 10.0);
                self.regenerate_impulse(graph, rng)?;
            }
            _ => {
                return Err(RositaError::UnknownParam {
                    target: kind.name().into(),
                    param: name.into(),
                });
            }
        }
        Ok(())
    }

    pub fn set_filter_mode<G: AudioGraph + ?Sized>(
        &mut self,
        mode: FilterMode,
        graph: &mut G,
    ) -> std::result::Result<(), GraphError> {
        self.params.filter.mode = mode;
        graph.set_filter_mode(self.biquad, mode)
    }

    fn regenerate_impulse<G: AudioGraph + ?Sized, R: Rng + ?Sized>(
        &mut self,
        graph: &mut G,
        rng: &mut R,
    ) -> std::result::Result<(), GraphError> {
        let p = self.params.reverb;
        let impulse = impulse_response(graph.sample_rate(), p.decay, p.room_size, rng);
        graph.set_impulse(self.convolver, impulse.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::OfflineGraph;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn setup() -> (OfflineGraph, EffectsChain, StdRng) {
        let mut graph = OfflineGraph::new(4000.0);
        let mut rng = StdRng::seed_from_u64(1);
        let dest = graph.destination();
        let chain = EffectsChain::new(&mut graph, dest, &mut rng).unwrap();
        (graph, chain, rng)
    }

    #[test]
    fn defaults_route_dry_only() {
        let (graph, chain, _) = setup();
        assert!(chain.enabled_stages().is_empty());
        assert_eq!(graph.outputs_of(chain.wet()), vec![chain.output()]);
        assert_eq!(graph.param_value(chain.wet(), Param::Gain, 1.0).unwrap(), 0.0);
        let dry = graph.param_value(chain.dry(), Param::Gain, 1.0).unwrap();
        assert!((dry - 1.0).abs() < 1e-9);
    }

    #[test]
    fn stages_chain_in_fixed_order() {
        let (mut graph, mut chain, _) = setup();
        chain.set_enabled(EffectKind::Reverb, true, &mut graph).unwrap();
        chain.set_enabled(EffectKind::Filter, true, &mut graph).unwrap();
        assert_eq!(chain.enabled_stages(), vec![EffectKind::Filter, EffectKind::Reverb]);
        assert_eq!(graph.outputs_of(chain.wet()), vec![chain.filter.input]);
        assert_eq!(graph.outputs_of(chain.filter.output), vec![chain.reverb.input]);
        assert_eq!(graph.outputs_of(chain.reverb.output), vec![chain.output()]);
        assert!(graph.outputs_of(chain.delay.output).is_empty());

        let wet = graph.param_value(chain.wet(), Param::Gain, graph.current_time() + 1.0).unwrap();
        assert!((wet - 0.5).abs() < 1e-6, "wet mix {wet}");
    }

    #[test]
    fn routing_depends_only_on_enabled_set() {
        let (mut graph, mut chain, _) = setup();
        chain.set_enabled(EffectKind::Delay, true, &mut graph).unwrap();
        chain.set_enabled(EffectKind::Distortion, true, &mut graph).unwrap();
        let reference = graph.connections();

        for kind in EffectKind::CHAIN {
            chain.set_enabled(kind, true, &mut graph).unwrap();
            chain.set_enabled(kind, false, &mut graph).unwrap();
        }
        chain.set_enabled(EffectKind::Distortion, true, &mut graph).unwrap();
        chain.set_enabled(EffectKind::Delay, true, &mut graph).unwrap();
        chain.set_enabled(EffectKind::Delay, true, &mut graph).unwrap();
        assert_eq!(graph.connections(), reference);

        let settled = |graph: &OfflineGraph, node| {
            graph.param_value(node, Param::Gain, graph.current_time() + 1.0).unwrap()
        };
        assert!((settled(&graph, chain.wet()) - 0.5).abs() < 1e-6);
        assert!((settled(&graph, chain.dry()) - 0.5).abs() < 1e-6);

        chain.set_enabled(EffectKind::Distortion, false, &mut graph).unwrap();
        chain.set_enabled(EffectKind::Delay, false, &mut graph).unwrap();
        assert!(chain.enabled_stages().is_empty());
        assert!(settled(&graph, chain.wet()).abs() < 1e-6, "wet closed with nothing enabled");
        assert!((settled(&graph, chain.dry()) - 1.0).abs() < 1e-6, "dry fully open");
        assert_eq!(graph.outputs_of(chain.wet()), vec![chain.output()], "wet path bypasses every stage");
    }

    #[test]
    fn delay_feedback_loop_survives_rebuilds() {
        let (mut graph, mut chain, _) = setup();
        chain.set_enabled(EffectKind::Delay, true, &mut graph).unwrap();
        chain.set_enabled(EffectKind::Delay, false, &mut graph).unwrap();
        let fb_out = graph.outputs_of(chain.delay_feedback);
        assert_eq!(fb_out, vec![chain.delay_line]);
    }

    #[test]
    fn live_params_ramp_towards_target() {
        let (mut graph, mut chain, mut rng) = setup();
        chain
            .set_param(EffectKind::Filter, "frequency", 500.0, &mut graph, &mut rng)
            .unwrap();
        let f = graph.param_value(chain.biquad, Param::Frequency, 1.0).unwrap();
        assert!((f - 500.0).abs() < 1e-3, "frequency {f}");
        chain
            .set_param(EffectKind::Delay, "feedback", 2.0, &mut graph, &mut rng)
            .unwrap();
        assert_eq!(chain.params().delay.feedback, 0.95);
        chain
            .set_param(EffectKind::Filter, "type", 1.0, &mut graph, &mut rng)
            .unwrap();
        assert_eq!(chain.params().filter.mode, FilterMode::Highpass);
    }

    #[test]
    fn unknown_params_are_rejected_without_side_effects() {
        let (mut graph, mut chain, mut rng) = setup();
        let before = *chain.params();
        let err = chain.set_param(EffectKind::Reverb, "shimmer", 0.5, &mut graph, &mut rng);
        assert!(matches!(err, Err(RositaError::UnknownParam { .. })), "{err:?}");
        let err = chain.set_param(EffectKind::Filter, "type", 9.0, &mut graph, &mut rng);
        assert!(err.is_err());
        assert_eq!(*chain.params(), before);
        assert!(EffectKind::from_name("chorus").is_err());
    }

    #[test]
    fn impulse_regenerates_on_room_change() {
        let (mut graph, mut chain, mut rng) = setup();
        chain
            .set_param(EffectKind::Reverb, "decay", 0.5, &mut graph, &mut rng)
            .unwrap();
        chain
            .set_param(EffectKind::Reverb, "roomSize", 0.2, &mut graph, &mut rng)
            .unwrap();
        assert_eq!(chain.params().reverb.decay, 0.5);
        assert_eq!(chain.params().reverb.room_size, 0.2);
    }

    #[test]
    fn dry_signal_passes_when_no_stage_is_enabled() {
        let (mut graph, chain, _) = setup();
        let osc = graph.create(NodeKind::Oscillator {
            waveform: crate::dsp::oscillator::Waveform::Sine,
            frequency: 200.0,
        });
        graph.connect(osc, chain.input()).unwrap();
        graph.start(osc, 0.0).unwrap();
        let out = graph.render(400);
        assert!(out.iter().any(|s| s.abs() > 0.5));
    }
}
