//! Voice lifecycle: note on/off, scheduled notes and drum hits.
//!
//! Every sounding voice lives in a table keyed by note name (`"C#4"`) or
//! drum key (`"drum:Kick"`). A key holds at most one voice; retriggering a
//! key force-stops the previous voice first. Entries are removed by cleanup
//! tasks that carry the voice id they were created for, so a late cleanup
//! never removes a newer voice under the same key.

use std::collections::HashMap;
use std::sync::Arc;

use rand::Rng;

use crate::drums::{self, DrumHit, DrumKit, DrumType};
use crate::dsp::sampler::SampleBuffer;
use crate::engine::Task;
use crate::error::GraphError;
use crate::graph::{AudioGraph, ContextState, NodeId, NodeKind, Param, ignore_stale, release_nodes};
use crate::instrument::{InstrumentId, InstrumentParams, InstrumentRegistry};
use crate::note::note_to_frequency;
use crate::timer::TimerQueue;

/// Level gain envelopes fade to before a source stops.
const SILENT: f64 = 0.001;
/// Fade and stop offsets of an immediate note-off.
const FORCE_FADE: f64 = 0.01;
const FORCE_STOP: f64 = 0.02;
/// Pause fades voices over 50 ms and stops them at 60 ms.
const PAUSE_FADE: f64 = 0.05;
const PAUSE_STOP: f64 = 0.06;
/// Upper bound on how long a released voice stays in the table.
const MAX_CLEANUP_MS: f64 = 500.0;
/// Delay before a deferred trigger is retried.
pub const NOTE_RETRY_MS: f64 = 50.0;
pub const DRUM_RETRY_MS: f64 = 30.0;

/// How a note-off ends a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteOff {
    /// Follow the instrument's release time.
    Release,
    /// Fade out within 10 ms and free the voice at once.
    Immediate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Voice {
    pub id: u64,
    pub instrument: InstrumentId,
    pub sources: Vec<NodeId>,
    pub gains: Vec<NodeId>,
    /// Every node owned by the voice.
    pub nodes: Vec<NodeId>,
    pub started_at: f64,
    /// Audio time after which the voice is silent, once known.
    pub ends_at: Option<f64>,
}

/// Key under which hits of `drum` are tracked.
pub fn drum_key(drum: DrumType) -> String {
    format!("drum:{}", drum.label())
}

#[derive(Debug)]
pub struct NoteDispatcher {
    voices: HashMap<String, Voice>,
    /// Voices already out of the table whose sources have not stopped yet.
    fading: Vec<Voice>,
    next_id: u64,
    bus: NodeId,
    samples: HashMap<DrumType, Arc<SampleBuffer>>,
}

impl NoteDispatcher {
    /// Voices are routed into `bus`.
    pub fn new(bus: NodeId) -> Self {
        NoteDispatcher {
            voices: HashMap::new(),
            fading: Vec::new(),
            next_id: 1,
            bus,
            samples: HashMap::new(),
        }
    }

    pub fn voice(&self, key: &str) -> Option<&Voice> {
        self.voices.get(key)
    }

    pub fn active_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.voices.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    /// Keys currently sounding on `instrument`, sorted.
    pub fn keys_for(&self, instrument: InstrumentId) -> Vec<String> {
        let mut keys: Vec<String> = self
            .voices
            .iter()
            .filter(|(_, v)| v.instrument == instrument)
            .map(|(k, _)| k.clone())
            .collect();
        keys.sort_unstable();
        keys
    }

    pub fn active_count(&self) -> usize {
        self.voices.len()
    }

    pub fn load_sample(&mut self, drum: DrumType, buffer: SampleBuffer) {
        log::debug!("sample loaded for {drum}: {:.3}s", buffer.duration());
        self.samples.insert(drum, Arc::new(buffer));
    }

    pub fn has_sample(&self, drum: DrumType) -> bool {
        self.samples.contains_key(&drum)
    }

    /// Whether a trigger may proceed now. A context that is not running is
    /// asked to resume; if it still is not running the caller defers.
    pub fn context_ready<G: AudioGraph + ?Sized>(graph: &mut G) -> bool {
        if graph.state() == ContextState::Running {
            return true;
        }
        match graph.resume() {
            Ok(ContextState::Running) => true,
            Ok(state) => {
                log::debug!("audio context still {state:?} after resume");
                false
            }
            Err(e) => {
                log::warn!("audio context resume failed: {e}");
                false
            }
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Start a note under `key` at audio time `at`.
    ///
    /// Gain follows `0 -> volume` over the attack, then `-> volume * sustain`
    /// over the decay, and holds until a note-off.
    pub fn note_on<G: AudioGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        timers: &mut TimerQueue<Task>,
        registry: &InstrumentRegistry,
        key: &str,
        instrument: InstrumentId,
        at: f64,
    ) -> Result<u64, GraphError> {
        let now = graph.current_time();
        if self.voices.contains_key(key) {
            self.force_stop(graph, timers, key, now.max(at));
        }

        let params = registry.get(instrument);
        let osc = graph.create(NodeKind::Oscillator {
            waveform: params.waveform,
            frequency: note_to_frequency(key),
        });
        let gain = graph.create(NodeKind::gain(0.0));
        if let Err(e) = wire_note(graph, osc, gain, self.bus, &params, at) {
            release_nodes(graph, &[osc, gain]);
            return Err(e);
        }

        let id = self.allocate_id();
        self.voices.insert(
            key.to_string(),
            Voice {
                id,
                instrument,
                sources: vec![osc],
                gains: vec![gain],
                nodes: vec![osc, gain],
                started_at: at,
                ends_at: None,
            },
        );
        Ok(id)
    }

    /// Release the voice under `key` at audio time `from`. Returns the audio
    /// time its sources stop.
    fn release_at<G: AudioGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        timers: &mut TimerQueue<Task>,
        release: f64,
        key: &str,
        from: f64,
    ) -> Result<Option<f64>, GraphError> {
        let Some(voice) = self.voices.get_mut(key) else {
            return Ok(None);
        };
        let stop = from + release + 0.01;
        voice.ends_at = Some(stop);

        // Cleanup is queued first; it has to run even if the fade fails.
        let now = graph.current_time();
        let delay = (from - now).max(0.0) * 1000.0 + (release * 1000.0 + 50.0).min(MAX_CLEANUP_MS);
        timers.schedule(
            delay,
            Task::Cleanup {
                key: key.to_string(),
                voice: voice.id,
            },
        );
        release_envelope(graph, voice, from, release, stop)?;
        Ok(Some(stop))
    }

    /// End the voice under `key`. A missing key is a no-op.
    pub fn note_off<G: AudioGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        timers: &mut TimerQueue<Task>,
        registry: &InstrumentRegistry,
        key: &str,
        mode: NoteOff,
    ) -> Result<(), GraphError> {
        if !self.voices.contains_key(key) {
            return Ok(());
        }
        let now = graph.current_time();
        match mode {
            NoteOff::Immediate => {
                self.force_stop(graph, timers, key, now);
                Ok(())
            }
            NoteOff::Release => {
                let release = self
                    .voices
                    .get(key)
                    .map(|v| registry.get(v.instrument).release)
                    .unwrap_or(0.0);
                self.release_at(graph, timers, release, key, now).map(|_| ())
            }
        }
    }

    /// Note on at `at` with its release already anchored at `at + duration`.
    #[allow(clippy::too_many_arguments)]
    pub fn schedule_note<G: AudioGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        timers: &mut TimerQueue<Task>,
        registry: &InstrumentRegistry,
        key: &str,
        instrument: InstrumentId,
        at: f64,
        duration: f64,
    ) -> Result<u64, GraphError> {
        let id = self.note_on(graph, timers, registry, key, instrument, at)?;
        let release = registry.get(instrument).release;
        self.release_at(graph, timers, release, key, at + duration.max(0.0))?;
        Ok(id)
    }

    /// Fade every gain of the voice under `key` from `from` over 10 ms, stop
    /// its sources at +20 ms, drop the entry now and free the nodes after
    /// they have gone quiet.
    fn force_stop<G: AudioGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        timers: &mut TimerQueue<Task>,
        key: &str,
        from: f64,
    ) {
        if let Some(voice) = self.voices.remove(key) {
            self.silence(graph, timers, voice, from, FORCE_FADE, FORCE_STOP);
        }
    }

    fn silence<G: AudioGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        timers: &mut TimerQueue<Task>,
        voice: Voice,
        from: f64,
        fade: f64,
        stop_after: f64,
    ) {
        for &gain in &voice.gains {
            let current = graph.param_value(gain, Param::Gain, from).unwrap_or(0.0);
            ignore_stale(graph.cancel_automation(gain, Param::Gain, from), "fade");
            ignore_stale(graph.set_value_at(gain, Param::Gain, current, from), "fade");
            ignore_stale(
                graph.exponential_ramp_to(gain, Param::Gain, SILENT.min(current), from + fade),
                "fade",
            );
        }
        let mut ends = from + stop_after;
        match voice.ends_at {
            // Sources already scheduled to stop earlier keep that stop.
            Some(end) if end < ends => ends = end,
            _ => {
                for &src in &voice.sources {
                    ignore_stale(graph.stop(src, ends), "stop");
                }
            }
        }
        let now = graph.current_time();
        let delay = ((ends - now).max(0.0) + 0.01) * 1000.0;
        self.fading.retain(|v| v.ends_at.is_some_and(|end| end > now));
        self.fading.push(Voice {
            ends_at: Some(ends),
            ..voice.clone()
        });
        timers.schedule(delay, Task::Release { nodes: voice.nodes });
    }

    /// Silence the table and every fading voice that would outlast
    /// `now + stop_after`.
    fn silence_all<G: AudioGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        timers: &mut TimerQueue<Task>,
        fade: f64,
        stop_after: f64,
    ) {
        let now = graph.current_time();
        let deadline = now + stop_after;
        let mut voices: Vec<Voice> = self.voices.drain().map(|(_, v)| v).collect();
        let (late, done): (Vec<Voice>, Vec<Voice>) = std::mem::take(&mut self.fading)
            .into_iter()
            .partition(|v| v.ends_at.is_some_and(|end| end > deadline));
        self.fading = done;
        voices.extend(late.into_iter().map(|v| Voice { ends_at: None, ..v }));
        for voice in voices {
            self.silence(graph, timers, voice, now, fade, stop_after);
        }
    }

    /// Complete a cleanup task: drop the entry if it still holds voice `id`
    /// and free its nodes once they are silent.
    pub fn cleanup<G: AudioGraph + ?Sized>(
        &mut self,
        graph: &mut G,
        timers: &mut TimerQueue<Task>,
        key: &str,
        id: u64,
    ) {
        if self.voices.get(key).is_none_or(|v| v.id != id) {
            return;
        }
        let Some(voice) = self.voices.remove(key) else {
            return;
        };
        let now = graph.current_time();
        match voice.ends_at {
            Some(end) if end > now => {
                timers.schedule((end - now) * 1000.0 + 10.0, Task::Release { nodes: voice.nodes });
            }
            _ => release_nodes(graph, &voice.nodes),
        }
    }

    /// Stop every voice immediately (transport stop).
    pub fn stop_all<G: AudioGraph + ?Sized>(&mut self, graph: &mut G, timers: &mut TimerQueue<Task>) {
        self.silence_all(graph, timers, FORCE_FADE, FORCE_STOP);
    }

    /// Fade every voice out over 50 ms (transport pause).
    pub fn fade_all<G: AudioGraph + ?Sized>(&mut self, graph: &mut G, timers: &mut TimerQueue<Task>) {
        self.silence_all(graph, timers, PAUSE_FADE, PAUSE_STOP);
    }

    /// Play `drum` at `at`, from a loaded sample when one exists and
    /// synthesized otherwise. The hit replaces any earlier hit of the same drum.
    #[allow(clippy::too_many_arguments)]
    pub fn trigger_drum<G: AudioGraph + ?Sized, R: Rng + ?Sized>(
        &mut self,
        graph: &mut G,
        timers: &mut TimerQueue<Task>,
        registry: &InstrumentRegistry,
        kit: DrumKit,
        drum: DrumType,
        volume: f64,
        at: f64,
        rng: &mut R,
    ) -> Result<u64, GraphError> {
        let key = drum_key(drum);
        let now = graph.current_time();
        if self.voices.contains_key(&key) {
            self.force_stop(graph, timers, &key, now.max(at));
        }

        let settings = registry.drum_settings();
        let sampled = match self.samples.get(&drum) {
            Some(buffer) => {
                match drums::play_sample(graph, self.bus, drum, Arc::clone(buffer), settings, volume, at, rng) {
                    Ok(hit) => Some(hit),
                    Err(e) => {
                        log::warn!("sample playback for {drum} failed, synthesizing: {e}");
                        None
                    }
                }
            }
            None => None,
        };
        let hit: DrumHit = match sampled {
            Some(hit) => hit,
            None => drums::synthesize(graph, self.bus, kit, drum, settings, volume, at, rng)?,
        };

        let end = hit.ends_at + hit.tail;
        let id = self.allocate_id();
        timers.schedule(
            (end - now).max(0.0) * 1000.0 + 10.0,
            Task::Cleanup {
                key: key.clone(),
                voice: id,
            },
        );
        self.voices.insert(
            key,
            Voice {
                id,
                instrument: InstrumentId::Drums,
                sources: hit.sources,
                gains: hit.gains,
                nodes: hit.nodes,
                started_at: at,
                ends_at: Some(end),
            },
        );
        Ok(id)
    }
}

/// Envelope and start of a fresh note voice: `osc -> gain -> bus`.
fn wire_note<G: AudioGraph + ?Sized>(
    graph: &mut G,
    osc: NodeId,
    gain: NodeId,
    bus: NodeId,
    params: &InstrumentParams,
    at: f64,
) -> Result<(), GraphError> {
    let peak_at = at + params.attack;
    graph.set_value_at(gain, Param::Gain, 0.0, at)?;
    graph.linear_ramp_to(gain, Param::Gain, params.volume, peak_at)?;
    graph.linear_ramp_to(gain, Param::Gain, params.volume * params.sustain, peak_at + params.decay)?;
    graph.chain(&[osc, gain, bus])?;
    graph.start(osc, at)
}

/// Ramp every gain of `voice` from its level at `from` down to silence over
/// `release` and stop its sources at `stop`.
fn release_envelope<G: AudioGraph + ?Sized>(
    graph: &mut G,
    voice: &Voice,
    from: f64,
    release: f64,
    stop: f64,
) -> Result<(), GraphError> {
    for &gain in &voice.gains {
        let current = graph.param_value(gain, Param::Gain, from)?;
        graph.cancel_automation(gain, Param::Gain, from)?;
        graph.set_value_at(gain, Param::Gain, current, from)?;
        graph.exponential_ramp_to(gain, Param::Gain, SILENT.min(current), from + release.max(0.01))?;
    }
    for &src in &voice.sources {
        graph.stop(src, stop)?;
    }
    Ok(())
}
