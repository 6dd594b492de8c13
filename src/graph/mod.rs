//! Audio graph abstraction.
//!
//! The engine never renders audio itself. It builds node graphs and hands
//! them explicit timestamps and automation ramps through [`AudioGraph`], the
//! same contract a WebAudio `AudioContext` offers. [`offline::OfflineGraph`]
//! is the in-process implementation used by the WASM worklet bridge, WAV
//! export and the test suite.

pub mod offline;

use std::sync::Arc;

use serde::Serialize;

use crate::dsp::filter::FilterMode;
use crate::dsp::oscillator::Waveform;
use crate::dsp::param::Automation;
use crate::dsp::sampler::SampleBuffer;
use crate::error::GraphError;

pub use offline::OfflineGraph;

/// Handle to a node owned by a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Node construction parameters.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Oscillator { waveform: Waveform, frequency: f64 },
    Buffer { buffer: Arc<SampleBuffer>, playback_rate: f64 },
    Gain { gain: f64 },
    Filter { mode: FilterMode, frequency: f64, q: f64 },
    Delay { max_time: f64, time: f64 },
    Convolver { impulse: Arc<[f32]> },
    WaveShaper { curve: Arc<[f32]> },
}

impl NodeKind {
    pub fn gain(gain: f64) -> Self {
        NodeKind::Gain { gain }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, NodeKind::Oscillator { .. } | NodeKind::Buffer { .. })
    }
}

/// Automatable node parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Param {
    Gain,
    Frequency,
    Q,
    DelayTime,
    PlaybackRate,
}

impl Param {
    pub fn name(self) -> &'static str {
        match self {
            Param::Gain => "gain",
            Param::Frequency => "frequency",
            Param::Q => "Q",
            Param::DelayTime => "delayTime",
            Param::PlaybackRate => "playbackRate",
        }
    }
}

/// Lifecycle of the audio context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

/// Output graph factory, audio clock and context lifecycle.
pub trait AudioGraph {
    /// Monotonic audio clock in seconds.
    fn current_time(&self) -> f64;

    fn sample_rate(&self) -> f64;

    fn state(&self) -> ContextState;

    /// Ask the context to run. Returns the state after the request.
    fn resume(&mut self) -> Result<ContextState, GraphError>;

    /// The final output node.
    fn destination(&self) -> NodeId;

    fn create(&mut self, kind: NodeKind) -> NodeId;

    /// Route `from`'s output into `to`. Connecting twice is a no-op.
    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError>;

    /// Remove every outgoing connection of `from`.
    fn disconnect(&mut self, from: NodeId) -> Result<(), GraphError>;

    fn automate(&mut self, node: NodeId, param: Param, event: Automation) -> Result<(), GraphError>;

    /// Drop automation events of `param` anchored at or after `from`.
    fn cancel_automation(&mut self, node: NodeId, param: Param, from: f64) -> Result<(), GraphError>;

    /// Value of `param` at audio time `at` according to its automation.
    fn param_value(&self, node: NodeId, param: Param, at: f64) -> Result<f64, GraphError>;

    fn start(&mut self, node: NodeId, at: f64) -> Result<(), GraphError>;

    /// Schedule a source to stop. A later call replaces an earlier stop time.
    fn stop(&mut self, node: NodeId, at: f64) -> Result<(), GraphError>;

    /// Replace a wave shaper's transfer curve.
    fn set_curve(&mut self, node: NodeId, curve: Arc<[f32]>) -> Result<(), GraphError>;

    /// Replace a convolver's impulse response.
    fn set_impulse(&mut self, node: NodeId, impulse: Arc<[f32]>) -> Result<(), GraphError>;

    fn set_filter_mode(&mut self, node: NodeId, mode: FilterMode) -> Result<(), GraphError>;

    /// Disconnect and free a node. Its id becomes invalid.
    fn release(&mut self, node: NodeId) -> Result<(), GraphError>;

    fn set_value_at(&mut self, node: NodeId, param: Param, value: f64, time: f64) -> Result<(), GraphError> {
        self.automate(node, param, Automation::SetValue { value, time })
    }

    fn linear_ramp_to(&mut self, node: NodeId, param: Param, value: f64, end: f64) -> Result<(), GraphError> {
        self.automate(node, param, Automation::LinearRamp { value, end })
    }

    fn exponential_ramp_to(&mut self, node: NodeId, param: Param, value: f64, end: f64) -> Result<(), GraphError> {
        self.automate(node, param, Automation::ExponentialRamp { value, end })
    }

    fn set_target_at(
        &mut self,
        node: NodeId,
        param: Param,
        target: f64,
        start: f64,
        time_constant: f64,
    ) -> Result<(), GraphError> {
        self.automate(
            node,
            param,
            Automation::SetTarget {
                target,
                start,
                time_constant,
            },
        )
    }

    /// Connect a list of nodes in series.
    fn chain(&mut self, nodes: &[NodeId]) -> Result<(), GraphError> {
        for pair in nodes.windows(2) {
            self.connect(pair[0], pair[1])?;
        }
        Ok(())
    }
}

/// Free nodes that are no longer audible. Already-freed nodes are skipped.
pub fn release_nodes<G: AudioGraph + ?Sized>(graph: &mut G, nodes: &[NodeId]) {
    for &node in nodes {
        ignore_stale(graph.release(node), "release");
    }
}

/// Cleanup calls (stop, disconnect, release) on nodes that may already be
/// gone are expected to fail; the failure is logged at trace level and dropped.
pub(crate) fn ignore_stale(result: Result<(), GraphError>, what: &str) {
    if let Err(e) = result {
        log::trace!("ignored during {what}: {e}");
    }
}
