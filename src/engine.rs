//! Engine facade.
//!
//! [`Engine`] owns every collaborator (audio graph, timer queue, scheduler,
//! dispatcher, effects chain, registry and pattern store) and is driven from
//! outside through [`Engine::poll`]. All host-timer work goes through one
//! [`TimerQueue`] of [`Task`]s.

use std::collections::BTreeMap;

use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;

use crate::arpeggiator::{self, ArpStep, Arpeggiator, ArpeggiatorBank, Removal};
use crate::config::EngineConfig;
use crate::dispatcher::{DRUM_RETRY_MS, NOTE_RETRY_MS, NoteDispatcher, NoteOff};
use crate::drums::DrumType;
use crate::dsp::filter::FilterMode;
use crate::dsp::oscillator::Waveform;
use crate::dsp::renderer;
use crate::dsp::sampler::SampleBuffer;
use crate::effects::{EffectKind, EffectParams, EffectsChain};
use crate::error::{Result, RositaError};
use crate::graph::{AudioGraph, ContextState, NodeId, OfflineGraph, release_nodes};
use crate::instrument::{InstrumentId, InstrumentParams, InstrumentRegistry};
use crate::midi;
use crate::mixer::{self, MIXER_STEPS, MixerChannel};
use crate::note::Scale;
use crate::pattern::{Grid, GridLayout, PatternStore};
use crate::scheduler::Scheduler;
use crate::timer::TimerQueue;

/// Length of a sequenced melodic note in seconds.
pub const NOTE_DURATION: f64 = 0.35;
/// How long a grid-toggle preview holds before it is released.
const PREVIEW_MS: f64 = 200.0;

/// Deferred work run by the host timer.
#[derive(Debug, Clone, PartialEq)]
pub enum Task {
    /// Scheduler loop iteration.
    Tick,
    /// Column that just became audible.
    Highlight(usize),
    /// Remove a released voice if the key still holds voice `voice`.
    Cleanup { key: String, voice: u64 },
    /// Second attempt at a note that met a suspended context.
    RetryNote {
        key: String,
        instrument: InstrumentId,
        at: f64,
        duration: Option<f64>,
    },
    RetryDrum { drum: DrumType, volume: f64, at: f64 },
    /// Release a toggle preview if it is still the same voice.
    PreviewOff { key: String, voice: u64 },
    /// Free nodes that have gone silent.
    Release { nodes: Vec<NodeId> },
    /// Next step of an instrument's arpeggiator.
    Arp(InstrumentId),
}

impl Task {
    /// Tasks that belong to the running transport rather than to voice
    /// bookkeeping.
    fn is_transport(&self) -> bool {
        matches!(
            self,
            Task::Tick | Task::Highlight(_) | Task::RetryNote { .. } | Task::RetryDrum { .. } | Task::PreviewOff { .. }
        )
    }
}

/// Receives the column that is sounding, or `None` when the transport stops.
pub type StepCallback = Box<dyn FnMut(Option<usize>) + Send>;

/// Serializable view of the engine for UIs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub running: bool,
    pub paused: bool,
    pub step: usize,
    pub highlighted: Option<usize>,
    pub tempo: f64,
    pub swing: f64,
    pub layout: GridLayout,
    pub scale: Scale,
    pub context: ContextState,
    pub current_instrument: InstrumentId,
    pub current_slot: usize,
    pub grids: BTreeMap<InstrumentId, Grid>,
    pub octave_offsets: BTreeMap<InstrumentId, i32>,
    pub instruments: BTreeMap<InstrumentId, InstrumentParams>,
    pub muted: Vec<InstrumentId>,
    pub soloed: Vec<InstrumentId>,
    pub mixer: Vec<[bool; MIXER_STEPS]>,
    pub effects: EffectParams,
    pub active_voices: Vec<String>,
    pub arpeggiators: BTreeMap<InstrumentId, Arpeggiator>,
}

pub struct Engine<G: AudioGraph = OfflineGraph> {
    config: EngineConfig,
    graph: G,
    timers: TimerQueue<Task>,
    scheduler: Scheduler,
    dispatcher: NoteDispatcher,
    effects: EffectsChain,
    registry: InstrumentRegistry,
    patterns: PatternStore,
    arps: ArpeggiatorBank,
    rng: StdRng,
    on_step: Option<StepCallback>,
    highlighted: Option<usize>,
}

impl Engine<OfflineGraph> {
    /// An engine rendering into its own [`OfflineGraph`].
    pub fn offline(config: EngineConfig) -> Result<Self> {
        let graph = OfflineGraph::new(config.sample_rate);
        Engine::new(config, graph)
    }

    /// Render `seconds` of audio, polling the timers between blocks with the
    /// audio clock as host clock.
    pub fn render(&mut self, seconds: f64) -> Vec<f32> {
        let sr = self.graph.sample_rate();
        let total = (seconds * sr).round().max(0.0) as usize;
        let block = ((self.scheduler.timing().loop_interval_ms() / 1000.0 * sr).round() as usize).max(1);
        let mut out = Vec::with_capacity(total);
        while out.len() < total {
            self.poll(self.graph.current_time() * 1000.0);
            let frames = block.min(total - out.len());
            out.extend(self.graph.render(frames));
        }
        self.poll(self.graph.current_time() * 1000.0);
        out
    }

    /// Render `seconds` and encode them as a 16-bit mono WAV file.
    pub fn render_wav(&mut self, seconds: f64) -> Result<Vec<u8>> {
        let samples = self.render(seconds);
        renderer::encode_wav(&samples, self.graph.sample_rate() as u32)
    }
}

impl<G: AudioGraph> Engine<G> {
    pub fn new(config: EngineConfig, mut graph: G) -> Result<Self> {
        config.validate()?;
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let destination = graph.destination();
        let effects = EffectsChain::new(&mut graph, destination, &mut rng)?;
        let dispatcher = NoteDispatcher::new(effects.input());
        let scheduler = Scheduler::new(config.timing(), config.layout, config.tempo);
        let patterns = PatternStore::new(config.layout, config.slot_count);
        log::debug!(
            "engine ready: {:?} layout, {:?} timing, {} slots",
            config.layout,
            config.platform,
            config.slot_count
        );
        Ok(Engine {
            config,
            graph,
            timers: TimerQueue::new(),
            scheduler,
            dispatcher,
            effects,
            registry: InstrumentRegistry::new(),
            patterns,
            arps: ArpeggiatorBank::new(),
            rng,
            on_step: None,
            highlighted: None,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn graph(&self) -> &G {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut G {
        &mut self.graph
    }

    pub fn timers(&self) -> &TimerQueue<Task> {
        &self.timers
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn dispatcher(&self) -> &NoteDispatcher {
        &self.dispatcher
    }

    pub fn effects(&self) -> &EffectsChain {
        &self.effects
    }

    pub fn registry(&self) -> &InstrumentRegistry {
        &self.registry
    }

    pub fn patterns(&self) -> &PatternStore {
        &self.patterns
    }

    pub fn arpeggiators(&self) -> &ArpeggiatorBank {
        &self.arps
    }

    /// Column of the last highlight delivered.
    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn on_step(&mut self, callback: impl FnMut(Option<usize>) + Send + 'static) {
        self.on_step = Some(Box::new(callback));
    }

    fn notify(&mut self, column: Option<usize>) {
        self.highlighted = column;
        if let Some(callback) = self.on_step.as_mut() {
            callback(column);
        }
    }

    // Host timer

    /// Advance the host clock to `now_ms` and run every task that is due.
    pub fn poll(&mut self, now_ms: f64) {
        self.timers.advance_to(now_ms);
        while let Some((_, task)) = self.timers.pop_due() {
            self.run(task);
        }
    }

    fn run(&mut self, task: Task) {
        match task {
            Task::Tick => {
                let now = self.graph.current_time();
                let ok = match self.tick(now) {
                    Ok(()) => true,
                    Err(e) => {
                        log::warn!("scheduler tick failed: {e}");
                        false
                    }
                };
                self.scheduler.finish_tick(now, ok, &mut self.timers);
            }
            Task::Highlight(column) => self.notify(Some(column)),
            Task::Cleanup { key, voice } => self.dispatcher.cleanup(&mut self.graph, &mut self.timers, &key, voice),
            Task::RetryNote {
                key,
                instrument,
                at,
                duration,
            } => self.trigger_note(&key, instrument, at, duration, true),
            Task::RetryDrum { drum, volume, at } => self.trigger_drum(drum, volume, at, true),
            Task::PreviewOff { key, voice } => {
                if self.dispatcher.voice(&key).is_some_and(|v| v.id == voice) {
                    self.note_off(&key, NoteOff::Release);
                }
            }
            Task::Release { nodes } => release_nodes(&mut self.graph, &nodes),
            Task::Arp(instrument) => self.arp_step(instrument),
        }
    }

    /// Dispatch every step due in the lookahead window. A step that fails is
    /// logged and skipped; the tick fails only when no step could be played.
    fn tick(&mut self, now: f64) -> Result<()> {
        let events = self.scheduler.collect(now);
        let total = events.len();
        let mut last_err = None;
        let mut failed = 0;
        for event in events {
            if let Err(e) = self.play_step(event.column, event.time) {
                log::warn!("step {} at {:.3}s dropped: {e}", event.column, event.time);
                failed += 1;
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) if failed == total => Err(e),
            _ => Ok(()),
        }
    }

    /// Trigger every audible instrument's cells in `column` at `time` and
    /// queue the column's highlight for when it sounds.
    fn play_step(&mut self, column: usize, time: f64) -> Result<()> {
        let mut time = time;
        if self.graph.state() != ContextState::Running && NoteDispatcher::context_ready(&mut self.graph) {
            time += self.scheduler.timing().wake_nudge;
        }
        let now = self.graph.current_time();

        for id in InstrumentId::MELODIC {
            if !self.patterns.is_audible(id) {
                continue;
            }
            if let Some(note) = self.patterns.note_at(id, column) {
                self.try_note(&note, id, time, Some(NOTE_DURATION), false)?;
            }
        }

        if self.patterns.is_audible(InstrumentId::Drums) {
            let level = self.registry.get(InstrumentId::Drums).volume;
            for drum in self.patterns.drums_at(column) {
                if self.patterns.is_drum_muted(drum) {
                    continue;
                }
                let volume = self.patterns.drum_volume(drum) * level;
                self.try_drum(drum, volume, time, false)?;
            }
        }

        self.timers
            .schedule(((time - now) * 1000.0).max(0.0), Task::Highlight(column));
        Ok(())
    }

    // Triggers

    fn defer(&mut self, task: Task, delay_ms: f64, retried: bool, what: &str) {
        if retried {
            log::debug!("audio context unavailable, dropping {what}");
        } else {
            log::debug!("audio context not running, retrying {what} in {delay_ms} ms");
            self.timers.schedule(delay_ms, task);
        }
    }

    fn try_note(
        &mut self,
        key: &str,
        instrument: InstrumentId,
        at: f64,
        duration: Option<f64>,
        retried: bool,
    ) -> std::result::Result<(), crate::error::GraphError> {
        if !NoteDispatcher::context_ready(&mut self.graph) {
            let task = Task::RetryNote {
                key: key.to_string(),
                instrument,
                at,
                duration,
            };
            self.defer(task, NOTE_RETRY_MS, retried, key);
            return Ok(());
        }
        let at = at.max(self.graph.current_time());
        let (graph, timers, registry) = (&mut self.graph, &mut self.timers, &self.registry);
        match duration {
            Some(d) => self
                .dispatcher
                .schedule_note(graph, timers, registry, key, instrument, at, d)
                .map(|_| ()),
            None => self
                .dispatcher
                .note_on(graph, timers, registry, key, instrument, at)
                .map(|_| ()),
        }
    }

    fn try_drum(
        &mut self,
        drum: DrumType,
        volume: f64,
        at: f64,
        retried: bool,
    ) -> std::result::Result<(), crate::error::GraphError> {
        if !NoteDispatcher::context_ready(&mut self.graph) {
            self.defer(Task::RetryDrum { drum, volume, at }, DRUM_RETRY_MS, retried, drum.label());
            return Ok(());
        }
        let at = at.max(self.graph.current_time());
        let kit = self.patterns.layout().kit();
        self.dispatcher.trigger_drum(
            &mut self.graph,
            &mut self.timers,
            &self.registry,
            kit,
            drum,
            volume,
            at,
            &mut self.rng,
        )?;
        Ok(())
    }

    fn trigger_note(&mut self, key: &str, instrument: InstrumentId, at: f64, duration: Option<f64>, retried: bool) {
        if let Err(e) = self.try_note(key, instrument, at, duration, retried) {
            log::warn!("note {key} on {instrument} failed: {e}");
        }
    }

    fn trigger_drum(&mut self, drum: DrumType, volume: f64, at: f64, retried: bool) {
        if let Err(e) = self.try_drum(drum, volume, at, retried) {
            log::warn!("drum {drum} failed: {e}");
        }
    }

    fn note_off(&mut self, key: &str, mode: NoteOff) {
        if let Err(e) = self
            .dispatcher
            .note_off(&mut self.graph, &mut self.timers, &self.registry, key, mode)
        {
            log::warn!("note off {key} failed: {e}");
        }
    }

    /// Start `note` on `instrument` now and hold it until [`Engine::stop_note`].
    /// On `drums`, `note` names the drum to hit.
    pub fn play_note_with_instrument(&mut self, note: &str, instrument: InstrumentId) -> Result<()> {
        if instrument == InstrumentId::Drums {
            let drum = DrumType::from_label(note).ok_or_else(|| RositaError::UnknownDrum(note.to_string()))?;
            self.play_drum_sound(drum);
            return Ok(());
        }
        let now = self.graph.current_time();
        self.trigger_note(note, instrument, now, None, false);
        Ok(())
    }

    /// Release `note` with its instrument's release time.
    pub fn stop_note(&mut self, note: &str) {
        self.note_off(note, NoteOff::Release);
    }

    /// Hit `drum` now at its mixer volume.
    pub fn play_drum_sound(&mut self, drum: DrumType) {
        let now = self.graph.current_time();
        let volume = self.patterns.drum_volume(drum) * self.registry.get(InstrumentId::Drums).volume;
        self.trigger_drum(drum, volume, now, false);
    }

    // Transport

    /// Start from column 0. Does nothing while already running.
    pub fn start_sequencer(&mut self) {
        if self.scheduler.is_running() {
            log::debug!("start ignored: transport already running");
            return;
        }
        if !NoteDispatcher::context_ready(&mut self.graph) {
            log::warn!("starting with the audio context {:?}", self.graph.state());
        }
        let now = self.graph.current_time();
        self.scheduler.start(now, &mut self.timers);
    }

    /// Halt, silence every voice within 20 ms and clear the highlight.
    /// Arpeggiators keep stepping.
    pub fn stop_sequencer(&mut self) {
        self.scheduler.stop(&mut self.timers);
        let dropped = self
            .timers
            .cancel_where(|t| !matches!(t, Task::Release { .. } | Task::Arp(_)));
        log::debug!("stop cancelled {dropped} pending tasks");
        self.dispatcher.stop_all(&mut self.graph, &mut self.timers);
        self.notify(None);
    }

    /// Keep the position and fade every voice out over 50 ms.
    pub fn pause_sequencer(&mut self) {
        let now = self.graph.current_time();
        if self.scheduler.pause(now, &mut self.timers).is_none() {
            return;
        }
        self.timers.cancel_where(Task::is_transport);
        self.dispatcher.fade_all(&mut self.graph, &mut self.timers);
    }

    /// Continue after a pause. See [`Scheduler::resume`].
    pub fn resume_sequencer(&mut self, is_pattern_change: bool) {
        if !NoteDispatcher::context_ready(&mut self.graph) {
            log::warn!("resuming with the audio context {:?}", self.graph.state());
        }
        let now = self.graph.current_time();
        self.scheduler.resume(now, is_pattern_change, &mut self.timers);
    }

    /// Returns the tempo in effect after clamping.
    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        self.scheduler.set_tempo(bpm, &mut self.timers)
    }

    pub fn set_swing(&mut self, amount: f64) -> f64 {
        self.scheduler.set_swing(amount)
    }

    // Instruments

    pub fn set_envelope_param(&mut self, instrument: InstrumentId, param: &str, value: f64) -> Result<()> {
        self.registry
            .set_envelope_param(instrument, param, value)
            .inspect_err(|e| log::warn!("{e}"))
    }

    pub fn set_waveform(&mut self, instrument: InstrumentId, waveform: Waveform) {
        self.registry.set_waveform(instrument, waveform);
    }

    pub fn reset_instrument(&mut self, instrument: InstrumentId) {
        self.registry.reset(instrument);
    }

    /// Set a drum's `pitch` multiplier or `decay` time.
    pub fn set_drum_param(&mut self, drum: DrumType, param: &str, value: f64) -> Result<()> {
        let settings = self.registry.drum_settings_mut();
        let result = match param {
            "pitch" => {
                settings.set_pitch(drum, value);
                Ok(())
            }
            "decay" => settings.set_decay(drum, value),
            other => Err(RositaError::UnknownParam {
                target: drum.label().to_string(),
                param: other.to_string(),
            }),
        };
        result.inspect_err(|e| log::warn!("{e}"))
    }

    /// Set one amount of the sample FX chain.
    pub fn set_drum_fx(&mut self, name: &str, value: f64) -> Result<()> {
        self.registry
            .drum_settings_mut()
            .set_fx(name, value)
            .inspect_err(|e| log::warn!("{e}"))
    }

    /// Play `drum` from `sample` from now on.
    pub fn load_drum_sample(&mut self, drum: DrumType, sample: SampleBuffer) {
        self.dispatcher.load_sample(drum, sample);
    }

    /// Decode a WAV file and use it for `drum`.
    pub fn load_drum_wav(&mut self, drum: DrumType, bytes: &[u8]) -> Result<()> {
        let sample = SampleBuffer::from_wav(bytes)?;
        self.load_drum_sample(drum, sample);
        Ok(())
    }

    // Arpeggiators

    /// Switch `instrument`'s arpeggiator on or off. Drums have none.
    pub fn toggle_arpeggiator(&mut self, instrument: InstrumentId, enabled: bool, looping: bool) {
        let Some(arp) = self.arps.get_mut(instrument) else {
            log::debug!("no arpeggiator on {instrument}");
            return;
        };
        let was_running = arp.is_running();
        if arp.set_mode(enabled, looping) {
            if !was_running {
                self.schedule_arp(instrument);
            }
        } else {
            self.cancel_arp(instrument);
        }
    }

    /// Hold `note` in `instrument`'s arpeggiator. Ignored while it is off.
    pub fn add_note_to_arpeggiator(&mut self, note: &str, instrument: InstrumentId) {
        if self.arps.get_mut(instrument).is_some_and(|a| a.add(note)) {
            self.schedule_arp(instrument);
        }
    }

    /// Let go of `note`. When nothing is left to play the arpeggiator stops
    /// and `instrument`'s sounding notes are released.
    pub fn remove_note_from_arpeggiator(&mut self, note: &str, instrument: InstrumentId) {
        let Some(arp) = self.arps.get_mut(instrument) else {
            return;
        };
        let removal = arp.remove(note);
        let running = arp.is_running();
        match removal {
            Removal::Playing => {
                if running && !self.timers.tasks().any(|t| *t == Task::Arp(instrument)) {
                    self.schedule_arp(instrument);
                }
            }
            Removal::Stopped => {
                self.cancel_arp(instrument);
                for key in self.dispatcher.keys_for(instrument) {
                    self.note_off(&key, NoteOff::Release);
                }
            }
        }
    }

    fn schedule_arp(&mut self, instrument: InstrumentId) {
        let delay = arpeggiator::step_ms(self.scheduler.tempo());
        self.timers.schedule(delay, Task::Arp(instrument));
    }

    fn cancel_arp(&mut self, instrument: InstrumentId) {
        self.timers.cancel_where(|t| *t == Task::Arp(instrument));
    }

    /// Play the arpeggiator's next note for a gate's length and queue the
    /// following step.
    fn arp_step(&mut self, instrument: InstrumentId) {
        let Some(arp) = self.arps.get_mut(instrument) else {
            return;
        };
        let tempo = self.scheduler.tempo();
        match arp.tick() {
            ArpStep::Play(note) => {
                let now = self.graph.current_time();
                let gate = arpeggiator::gate_ms(tempo) / 1000.0;
                self.trigger_note(&note, instrument, now, Some(gate), false);
                self.schedule_arp(instrument);
            }
            ArpStep::Rest => self.schedule_arp(instrument),
            ArpStep::Stop => log::debug!("arpeggiator on {instrument} ran out of notes"),
        }
    }

    // Effects

    pub fn set_effect(&mut self, effect: EffectKind, enabled: bool) {
        if let Err(e) = self.effects.set_enabled(effect, enabled, &mut self.graph) {
            log::warn!("effect {effect} routing failed: {e}");
        }
    }

    pub fn set_effect_param(&mut self, effect: EffectKind, param: &str, value: f64) -> Result<()> {
        self.effects
            .set_param(effect, param, value, &mut self.graph, &mut self.rng)
            .inspect_err(|e| log::warn!("{e}"))
    }

    pub fn set_filter_mode(&mut self, mode: FilterMode) {
        if let Err(e) = self.effects.set_filter_mode(mode, &mut self.graph) {
            log::warn!("filter mode change failed: {e}");
        }
    }

    // Patterns

    pub fn select_instrument(&mut self, instrument: InstrumentId) {
        self.patterns.select_instrument(instrument);
    }

    /// Flip a cell. Switching a cell on while the transport is stopped
    /// auditions it: melodic rows play their note briefly, drums play when
    /// their type allows previews.
    pub fn toggle_step(&mut self, instrument: InstrumentId, row: usize, col: usize) -> Option<bool> {
        let on = self.patterns.toggle_step(instrument, row, col)?;
        if on && !self.scheduler.is_running() {
            self.preview(instrument, row);
        }
        Some(on)
    }

    fn preview(&mut self, instrument: InstrumentId, row: usize) {
        if instrument == InstrumentId::Drums {
            let kit = self.patterns.layout().kit();
            if let Some(drum) = kit.drum_at(row).filter(|d| d.preview_on_toggle()) {
                self.play_drum_sound(drum);
            }
            return;
        }
        let note = self.patterns.note_for_row(instrument, row);
        let now = self.graph.current_time();
        self.trigger_note(&note, instrument, now, None, false);
        if let Some(voice) = self.dispatcher.voice(&note) {
            let task = Task::PreviewOff {
                key: note.clone(),
                voice: voice.id,
            };
            self.timers.schedule(PREVIEW_MS, task);
        }
    }

    pub fn clear_pattern(&mut self, instrument: InstrumentId) {
        self.patterns.clear(instrument);
    }

    /// Regenerate the selected instrument's grid.
    pub fn random_fill(&mut self, density: f64) {
        let id = self.patterns.current_instrument();
        self.patterns.random_fill(id, density, &mut self.rng);
    }

    /// Move `instrument` an octave; an enabled arpeggiator follows.
    pub fn shift_octave(&mut self, instrument: InstrumentId, up: bool) -> i32 {
        let before = self.patterns.octave_offset(instrument);
        let after = self.patterns.shift_octave(instrument, up);
        if let Some(arp) = self.arps.get_mut(instrument).filter(|a| a.is_enabled()) {
            arp.shift_octaves(after - before);
        }
        after
    }

    /// Move every melodic pattern onto `scale`.
    pub fn set_scale(&mut self, scale: Scale) {
        self.patterns.convert_all_to_scale(scale);
    }

    pub fn save_pattern(&mut self, slot: usize) -> Result<()> {
        self.patterns.save(slot).inspect_err(|e| log::warn!("{e}"))
    }

    /// Switch to `slot`. The transport keeps running.
    pub fn load_pattern(&mut self, slot: usize) -> Result<()> {
        self.patterns
            .load(slot, &mut self.registry)
            .inspect_err(|e| log::warn!("{e}"))
    }

    pub fn duplicate_pattern(&mut self, target: usize) -> Result<()> {
        self.patterns.duplicate(target).inspect_err(|e| log::warn!("{e}"))
    }

    /// One pass of the current pattern at the current tempo as a MIDI file.
    pub fn export_midi(&self) -> Result<Vec<u8>> {
        midi::export(&self.patterns, &self.registry, self.scheduler.tempo())
    }

    // Mixer

    pub fn set_instrument_volume(&mut self, instrument: InstrumentId, volume: f64) {
        self.patterns
            .set_instrument_volume(instrument, volume, &mut self.registry);
    }

    pub fn set_drum_volume(&mut self, drum: DrumType, volume: f64) {
        self.patterns.set_drum_volume(drum, volume);
    }

    pub fn toggle_mute(&mut self, instrument: InstrumentId) -> bool {
        self.patterns.toggle_mute(instrument)
    }

    pub fn toggle_solo(&mut self, instrument: InstrumentId) -> bool {
        self.patterns.toggle_solo(instrument)
    }

    pub fn toggle_drum_mute(&mut self, drum: DrumType) -> bool {
        self.patterns.toggle_drum_mute(drum)
    }

    /// Apply a click on the mixer grid.
    pub fn mixer_click(&mut self, column: usize, step: usize) -> Option<(MixerChannel, f64)> {
        mixer::click(&mut self.patterns, &mut self.registry, column, step)
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        let p = &self.patterns;
        EngineSnapshot {
            running: self.scheduler.is_running(),
            paused: self.scheduler.pause_snapshot().is_some(),
            step: self.scheduler.step(),
            highlighted: self.highlighted,
            tempo: self.scheduler.tempo(),
            swing: self.scheduler.swing(),
            layout: p.layout(),
            scale: p.scale(),
            context: self.graph.state(),
            current_instrument: p.current_instrument(),
            current_slot: p.current_slot(),
            grids: InstrumentId::ALL.iter().map(|&id| (id, p.grid(id).clone())).collect(),
            octave_offsets: InstrumentId::ALL.iter().map(|&id| (id, p.octave_offset(id))).collect(),
            instruments: InstrumentId::ALL.iter().map(|&id| (id, self.registry.get(id))).collect(),
            muted: InstrumentId::ALL.into_iter().filter(|&id| p.is_muted(id)).collect(),
            soloed: InstrumentId::ALL.into_iter().filter(|&id| p.is_soloed(id)).collect(),
            mixer: mixer::cells(p),
            effects: *self.effects.params(),
            active_voices: self.dispatcher.active_keys().into_iter().map(String::from).collect(),
            arpeggiators: self.arps.all().clone(),
        }
    }
}
