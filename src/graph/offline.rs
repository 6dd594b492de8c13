//! Offline implementation of [`AudioGraph`].
//!
//! Nodes are evaluated one frame at a time by pulling from the destination.
//! Feedback loops (a delay wired back into itself through a gain) are legal:
//! a delay publishes its output for the current frame before it pulls its
//! inputs, and any other cycle falls back to the previous frame's value.

use std::sync::Arc;

use crate::dsp::delay::DelayLine;
use crate::dsp::filter::{BiquadFilter, FilterMode};
use crate::dsp::oscillator::Oscillator;
use crate::dsp::param::{Automation, ParamTimeline};
use crate::dsp::reverb::Convolver;
use crate::dsp::sampler::SampleBuffer;
use crate::dsp::shaper::WaveShaper;
use crate::error::GraphError;

use super::{AudioGraph, ContextState, NodeId, NodeKind, Param};

enum Processor {
    Destination,
    Oscillator(Oscillator),
    Buffer { buffer: Arc<SampleBuffer>, position: f64 },
    Gain,
    Filter(BiquadFilter),
    Delay(DelayLine),
    Convolver(Convolver),
    WaveShaper(WaveShaper),
}

impl Processor {
    fn is_source(&self) -> bool {
        matches!(self, Processor::Oscillator(_) | Processor::Buffer { .. })
    }

    fn label(&self) -> &'static str {
        match self {
            Processor::Destination => "destination",
            Processor::Oscillator(_) => "oscillator",
            Processor::Buffer { .. } => "buffer",
            Processor::Gain => "gain",
            Processor::Filter(_) => "filter",
            Processor::Delay(_) => "delay",
            Processor::Convolver(_) => "convolver",
            Processor::WaveShaper(_) => "waveshaper",
        }
    }
}

struct Node {
    processor: Processor,
    inputs: Vec<NodeId>,
    params: Vec<(Param, ParamTimeline)>,
    start: Option<f64>,
    stop: Option<f64>,
}

impl Node {
    fn timeline(&self, param: Param) -> Option<&ParamTimeline> {
        self.params.iter().find(|(p, _)| *p == param).map(|(_, tl)| tl)
    }

    fn timeline_mut(&mut self, param: Param) -> Option<&mut ParamTimeline> {
        self.params.iter_mut().find(|(p, _)| *p == param).map(|(_, tl)| tl)
    }

    fn is_active(&self, t: f64) -> bool {
        self.start.is_some_and(|s| t >= s) && self.stop.is_none_or(|s| t < s)
    }
}

fn param_at(params: &[(Param, ParamTimeline)], param: Param, t: f64) -> f64 {
    params
        .iter()
        .find(|(p, _)| *p == param)
        .map_or(0.0, |(_, tl)| tl.value_at(t))
}

/// A software audio context with a frame-accurate clock.
pub struct OfflineGraph {
    sample_rate: f64,
    frame: u64,
    state: ContextState,
    resume_fails: bool,
    master_gain: f64,
    nodes: Vec<Option<Node>>,
    /// `frame + 1` of the last evaluation, 0 if never evaluated.
    stamp: Vec<u64>,
    cache: Vec<f32>,
    last: Vec<f32>,
    visiting: Vec<bool>,
}

impl OfflineGraph {
    /// A running context at `sample_rate` with node 0 as the destination.
    pub fn new(sample_rate: f64) -> Self {
        let mut graph = OfflineGraph {
            sample_rate,
            frame: 0,
            state: ContextState::Running,
            resume_fails: false,
            master_gain: 1.0,
            nodes: Vec::new(),
            stamp: Vec::new(),
            cache: Vec::new(),
            last: Vec::new(),
            visiting: Vec::new(),
        };
        graph.insert(Node {
            processor: Processor::Destination,
            inputs: Vec::new(),
            params: Vec::new(),
            start: None,
            stop: None,
        });
        graph
    }

    fn insert(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        self.stamp.push(0);
        self.cache.push(0.0);
        self.last.push(0.0);
        self.visiting.push(false);
        id
    }

    fn node(&self, id: NodeId) -> Result<&Node, GraphError> {
        self.nodes
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(GraphError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, GraphError> {
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or(GraphError::UnknownNode(id))
    }

    /// Move the context to the suspended state (the clock stops).
    pub fn suspend(&mut self) {
        if self.state != ContextState::Closed {
            self.state = ContextState::Suspended;
        }
    }

    pub fn close(&mut self) {
        self.state = ContextState::Closed;
    }

    /// Make subsequent [`AudioGraph::resume`] calls fail.
    pub fn set_resume_fails(&mut self, fails: bool) {
        self.resume_fails = fails;
    }

    pub fn set_master_gain(&mut self, gain: f64) {
        self.master_gain = gain.max(0.0);
    }

    /// Move the clock forward without rendering. Sources do not advance
    /// their phase; automation is evaluated against the new time.
    pub fn advance(&mut self, seconds: f64) {
        if self.state == ContextState::Running {
            self.frame += (seconds.max(0.0) * self.sample_rate).round() as u64;
        }
    }

    /// Render `frames` mono samples. A non-running context yields silence
    /// and does not move its clock.
    pub fn render(&mut self, frames: usize) -> Vec<f32> {
        if self.state != ContextState::Running {
            return vec![0.0; frames];
        }
        let dest = NodeId(0);
        let mut out = Vec::with_capacity(frames);
        for _ in 0..frames {
            let t = self.current_time();
            let mixed = self.pull(dest, t) as f64 * self.master_gain;
            out.push(mixed.tanh() as f32);
            self.frame += 1;
        }
        out
    }

    fn sum_inputs(&mut self, inputs: &[NodeId], t: f64) -> f32 {
        inputs.iter().map(|&i| self.pull(i, t)).sum()
    }

    fn pull(&mut self, id: NodeId, t: f64) -> f32 {
        let idx = id.index();
        let stamp = self.frame + 1;
        if self.stamp[idx] == stamp {
            return self.cache[idx];
        }
        if self.visiting[idx] {
            return self.last[idx];
        }
        let Some(mut node) = self.nodes[idx].take() else {
            return 0.0;
        };
        self.visiting[idx] = true;

        let active = node.is_active(t);
        let out = match &mut node.processor {
            Processor::Destination => self.sum_inputs(&node.inputs, t),
            Processor::Oscillator(osc) => {
                if active {
                    osc.next_sample(param_at(&node.params, Param::Frequency, t)) as f32
                } else {
                    0.0
                }
            }
            Processor::Buffer { buffer, position } => {
                if active {
                    let rate = param_at(&node.params, Param::PlaybackRate, t);
                    let step = rate * buffer.sample_rate as f64 / self.sample_rate;
                    let s = buffer.read_interpolated(*position);
                    *position += step.max(0.0);
                    s
                } else {
                    0.0
                }
            }
            Processor::Gain => {
                let input = self.sum_inputs(&node.inputs, t);
                input * param_at(&node.params, Param::Gain, t) as f32
            }
            Processor::Filter(filter) => {
                filter.set_frequency(param_at(&node.params, Param::Frequency, t));
                filter.set_q(param_at(&node.params, Param::Q, t));
                let input = self.sum_inputs(&node.inputs, t);
                filter.process(input as f64) as f32
            }
            Processor::Delay(line) => {
                let out = line.read(param_at(&node.params, Param::DelayTime, t));
                self.stamp[idx] = stamp;
                self.cache[idx] = out;
                let input = self.sum_inputs(&node.inputs, t);
                line.write(input);
                out
            }
            Processor::Convolver(conv) => {
                let input = self.sum_inputs(&node.inputs, t);
                conv.process(input)
            }
            Processor::WaveShaper(shaper) => {
                let input = self.sum_inputs(&node.inputs, t);
                shaper.process(input)
            }
        };

        self.nodes[idx] = Some(node);
        self.visiting[idx] = false;
        self.stamp[idx] = stamp;
        self.cache[idx] = out;
        self.last[idx] = out;
        out
    }

    pub fn is_live(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    /// Number of nodes that have not been released, destination included.
    pub fn live_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn inputs_of(&self, id: NodeId) -> Vec<NodeId> {
        self.node(id).map(|n| n.inputs.clone()).unwrap_or_default()
    }

    pub fn outputs_of(&self, id: NodeId) -> Vec<NodeId> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| {
                n.as_ref()
                    .filter(|n| n.inputs.contains(&id))
                    .map(|_| NodeId(i as u32))
            })
            .collect()
    }

    /// Every `(from, to)` edge, sorted.
    pub fn connections(&self) -> Vec<(NodeId, NodeId)> {
        let mut edges: Vec<(NodeId, NodeId)> = self
            .nodes
            .iter()
            .enumerate()
            .filter_map(|(i, n)| n.as_ref().map(|n| (NodeId(i as u32), n)))
            .flat_map(|(to, n)| n.inputs.iter().map(move |&from| (from, to)))
            .collect();
        edges.sort();
        edges
    }

    pub fn kind_label(&self, id: NodeId) -> Option<&'static str> {
        self.node(id).ok().map(|n| n.processor.label())
    }

    pub fn start_time(&self, id: NodeId) -> Option<f64> {
        self.node(id).ok().and_then(|n| n.start)
    }

    pub fn stop_time(&self, id: NodeId) -> Option<f64> {
        self.node(id).ok().and_then(|n| n.stop)
    }

    /// Whether `id` is a live source that is sounding at `at`.
    pub fn is_sounding(&self, id: NodeId, at: f64) -> bool {
        self.node(id)
            .map(|n| n.processor.is_source() && n.is_active(at))
            .unwrap_or(false)
    }

    /// Count of live sources sounding at `at`.
    pub fn sounding_sources(&self, at: f64) -> usize {
        self.nodes
            .iter()
            .flatten()
            .filter(|n| n.processor.is_source() && n.is_active(at))
            .count()
    }

    pub fn automation_events(&self, id: NodeId, param: Param) -> Vec<Automation> {
        self.node(id)
            .ok()
            .and_then(|n| n.timeline(param))
            .map(|tl| tl.events().to_vec())
            .unwrap_or_default()
    }
}

impl AudioGraph for OfflineGraph {
    fn current_time(&self) -> f64 {
        self.frame as f64 / self.sample_rate
    }

    fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) -> Result<ContextState, GraphError> {
        match self.state {
            ContextState::Closed => Err(GraphError::Closed),
            _ if self.resume_fails => Err(GraphError::ResumeFailed),
            _ => {
                self.state = ContextState::Running;
                Ok(self.state)
            }
        }
    }

    fn destination(&self) -> NodeId {
        NodeId(0)
    }

    fn create(&mut self, kind: NodeKind) -> NodeId {
        let sr = self.sample_rate;
        let (processor, params) = match kind {
            NodeKind::Oscillator { waveform, frequency } => (
                Processor::Oscillator(Oscillator::new(waveform, sr)),
                vec![(Param::Frequency, ParamTimeline::new(frequency))],
            ),
            NodeKind::Buffer {
                buffer,
                playback_rate,
            } => (
                Processor::Buffer {
                    buffer,
                    position: 0.0,
                },
                vec![(Param::PlaybackRate, ParamTimeline::new(playback_rate))],
            ),
            NodeKind::Gain { gain } => (
                Processor::Gain,
                vec![(Param::Gain, ParamTimeline::new(gain))],
            ),
            NodeKind::Filter { mode, frequency, q } => (
                Processor::Filter(BiquadFilter::new(mode, frequency, q, sr)),
                vec![
                    (Param::Frequency, ParamTimeline::new(frequency)),
                    (Param::Q, ParamTimeline::new(q)),
                ],
            ),
            NodeKind::Delay { max_time, time } => (
                Processor::Delay(DelayLine::new(sr, max_time)),
                vec![(Param::DelayTime, ParamTimeline::new(time))],
            ),
            NodeKind::Convolver { impulse } => (Processor::Convolver(Convolver::new(&impulse)), Vec::new()),
            NodeKind::WaveShaper { curve } => (Processor::WaveShaper(WaveShaper::new(&curve)), Vec::new()),
        };
        self.insert(Node {
            processor,
            inputs: Vec::new(),
            params,
            start: None,
            stop: None,
        })
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), GraphError> {
        self.node(from)?;
        let target = self.node_mut(to)?;
        if !target.inputs.contains(&from) {
            target.inputs.push(from);
        }
        Ok(())
    }

    fn disconnect(&mut self, from: NodeId) -> Result<(), GraphError> {
        self.node(from)?;
        for node in self.nodes.iter_mut().flatten() {
            node.inputs.retain(|&i| i != from);
        }
        Ok(())
    }

    fn automate(&mut self, node: NodeId, param: Param, event: Automation) -> Result<(), GraphError> {
        self.node_mut(node)?
            .timeline_mut(param)
            .ok_or(GraphError::NoSuchParam(node, param.name()))?
            .schedule(event);
        Ok(())
    }

    fn cancel_automation(&mut self, node: NodeId, param: Param, from: f64) -> Result<(), GraphError> {
        self.node_mut(node)?
            .timeline_mut(param)
            .ok_or(GraphError::NoSuchParam(node, param.name()))?
            .cancel_from(from);
        Ok(())
    }

    fn param_value(&self, node: NodeId, param: Param, at: f64) -> Result<f64, GraphError> {
        self.node(node)?
            .timeline(param)
            .map(|tl| tl.value_at(at))
            .ok_or(GraphError::NoSuchParam(node, param.name()))
    }

    fn start(&mut self, node: NodeId, at: f64) -> Result<(), GraphError> {
        let n = self.node_mut(node)?;
        if !n.processor.is_source() {
            return Err(GraphError::NotASource(node));
        }
        if n.start.is_some() {
            return Err(GraphError::AlreadyStarted(node));
        }
        n.start = Some(at);
        Ok(())
    }

    fn stop(&mut self, node: NodeId, at: f64) -> Result<(), GraphError> {
        let n = self.node_mut(node)?;
        if !n.processor.is_source() {
            return Err(GraphError::NotASource(node));
        }
        n.stop = Some(at);
        Ok(())
    }

    fn set_curve(&mut self, node: NodeId, curve: Arc<[f32]>) -> Result<(), GraphError> {
        match &mut self.node_mut(node)?.processor {
            Processor::WaveShaper(shaper) => {
                shaper.set_curve(&curve);
                Ok(())
            }
            _ => Err(GraphError::NoSuchParam(node, "curve")),
        }
    }

    fn set_impulse(&mut self, node: NodeId, impulse: Arc<[f32]>) -> Result<(), GraphError> {
        match &mut self.node_mut(node)?.processor {
            Processor::Convolver(conv) => {
                conv.set_impulse(&impulse);
                Ok(())
            }
            _ => Err(GraphError::NoSuchParam(node, "buffer")),
        }
    }

    fn set_filter_mode(&mut self, node: NodeId, mode: FilterMode) -> Result<(), GraphError> {
        match &mut self.node_mut(node)?.processor {
            Processor::Filter(filter) => {
                filter.set_mode(mode);
                Ok(())
            }
            _ => Err(GraphError::NoSuchParam(node, "type")),
        }
    }

    fn release(&mut self, node: NodeId) -> Result<(), GraphError> {
        if node == self.destination() {
            return Err(GraphError::UnknownNode(node));
        }
        self.disconnect(node)?;
        self.nodes[node.index()] = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::oscillator::Waveform;

    fn tone(graph: &mut OfflineGraph, at: f64) -> (NodeId, NodeId) {
        let osc = graph.create(NodeKind::Oscillator {
            waveform: Waveform::Sine,
            frequency: 100.0,
        });
        let gain = graph.create(NodeKind::gain(0.5));
        let dest = graph.destination();
        graph.chain(&[osc, gain, dest]).unwrap();
        graph.start(osc, at).unwrap();
        (osc, gain)
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().map(|s| s.abs()).fold(0.0, f32::max)
    }

    #[test]
    fn silent_before_start_then_sounding() {
        let mut graph = OfflineGraph::new(1000.0);
        let (osc, _) = tone(&mut graph, 0.1);
        let before = graph.render(100);
        assert_eq!(peak(&before), 0.0, "nothing should sound before start");
        let after = graph.render(100);
        assert!(peak(&after) > 0.3, "tone should sound after start");
        assert!(graph.is_sounding(osc, graph.current_time()));
    }

    #[test]
    fn stop_silences_source() {
        let mut graph = OfflineGraph::new(1000.0);
        let (osc, _) = tone(&mut graph, 0.0);
        graph.stop(osc, 0.05).unwrap();
        graph.render(50);
        let tail = graph.render(50);
        assert_eq!(peak(&tail), 0.0);
        assert_eq!(graph.sounding_sources(0.06), 0);
    }

    #[test]
    fn gain_automation_shapes_output() {
        let mut graph = OfflineGraph::new(1000.0);
        let (_, gain) = tone(&mut graph, 0.0);
        graph.set_value_at(gain, Param::Gain, 0.0, 0.0).unwrap();
        graph.linear_ramp_to(gain, Param::Gain, 0.8, 0.1).unwrap();
        assert!((graph.param_value(gain, Param::Gain, 0.05).unwrap() - 0.4).abs() < 1e-9);

        let first = graph.render(20);
        let later = graph.render(200);
        assert!(peak(&first) < peak(&later), "ramp should grow the level");
    }

    #[test]
    fn delay_feedback_loop_echoes() {
        let mut graph = OfflineGraph::new(1000.0);
        let click = Arc::new(SampleBuffer::new(vec![1.0], 1000));
        let src = graph.create(NodeKind::Buffer {
            buffer: click,
            playback_rate: 1.0,
        });
        let delay = graph.create(NodeKind::Delay {
            max_time: 1.0,
            time: 0.01,
        });
        let feedback = graph.create(NodeKind::gain(0.5));
        let dest = graph.destination();
        graph.connect(src, delay).unwrap();
        graph.connect(delay, feedback).unwrap();
        graph.connect(feedback, delay).unwrap();
        graph.connect(delay, dest).unwrap();
        graph.start(src, 0.0).unwrap();

        let out = graph.render(40);
        assert!((out[10] - 1.0_f32.tanh()).abs() < 1e-6, "first echo {}", out[10]);
        assert!((out[20] - 0.5_f32.tanh()).abs() < 1e-6, "second echo {}", out[20]);
        assert_eq!(out[15], 0.0);
    }

    #[test]
    fn released_nodes_reject_calls() {
        let mut graph = OfflineGraph::new(1000.0);
        let (osc, gain) = tone(&mut graph, 0.0);
        graph.release(gain).unwrap();
        assert!(!graph.is_live(gain));
        assert!(graph.outputs_of(osc).is_empty());
        assert_eq!(graph.connect(osc, gain), Err(GraphError::UnknownNode(gain)));
        assert_eq!(graph.release(gain), Err(GraphError::UnknownNode(gain)));
        assert!(graph.release(graph.destination()).is_err());
    }

    #[test]
    fn connect_is_idempotent() {
        let mut graph = OfflineGraph::new(1000.0);
        let a = graph.create(NodeKind::gain(1.0));
        let dest = graph.destination();
        graph.connect(a, dest).unwrap();
        graph.connect(a, dest).unwrap();
        assert_eq!(graph.connections(), vec![(a, dest)]);
        graph.disconnect(a).unwrap();
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn sources_start_once() {
        let mut graph = OfflineGraph::new(1000.0);
        let (osc, gain) = tone(&mut graph, 0.0);
        assert_eq!(graph.start(osc, 1.0), Err(GraphError::AlreadyStarted(osc)));
        assert_eq!(graph.start(gain, 1.0), Err(GraphError::NotASource(gain)));
    }

    #[test]
    fn suspended_context_is_frozen() {
        let mut graph = OfflineGraph::new(1000.0);
        tone(&mut graph, 0.0);
        graph.suspend();
        let out = graph.render(10);
        assert_eq!(peak(&out), 0.0);
        assert_eq!(graph.current_time(), 0.0);

        graph.set_resume_fails(true);
        assert_eq!(graph.resume(), Err(GraphError::ResumeFailed));
        assert_eq!(graph.state(), ContextState::Suspended);

        graph.set_resume_fails(false);
        assert_eq!(graph.resume(), Ok(ContextState::Running));
        graph.advance(0.5);
        assert!((graph.current_time() - 0.5).abs() < 1e-9);

        graph.close();
        assert_eq!(graph.resume(), Err(GraphError::Closed));
    }

    #[test]
    fn shaper_and_filter_nodes_reconfigure() {
        let mut graph = OfflineGraph::new(1000.0);
        let shaper = graph.create(NodeKind::WaveShaper {
            curve: Arc::from(vec![-1.0_f32, 1.0]),
        });
        let filter = graph.create(NodeKind::Filter {
            mode: FilterMode::Lowpass,
            frequency: 200.0,
            q: 1.0,
        });
        assert!(graph.set_curve(shaper, Arc::from(vec![0.0_f32, 0.0])).is_ok());
        assert!(graph.set_filter_mode(filter, FilterMode::Highpass).is_ok());
        assert!(graph.set_curve(filter, Arc::from(vec![0.0_f32])).is_err());
        assert_eq!(graph.kind_label(shaper), Some("waveshaper"));
    }
}
