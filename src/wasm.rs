//! WebAssembly bindings.
//!
//! The browser side owns an AudioWorklet that pulls rendered blocks through
//! [`RositaEngine::process`]; the engine's timers are polled between blocks
//! against its own audio clock. UI threads read state with
//! [`RositaEngine::snapshot`] and drain step highlights with
//! [`RositaEngine::take_steps`].
//!
//! ```javascript
//! import init, { rosita_init, RositaEngine } from './rosita_core.js';
//!
//! await init();
//! rosita_init();
//! const engine = new RositaEngine('{"platform":"desktop","sampleRate":48000}');
//! engine.toggle_step("synth", 11, 0);
//! engine.start_sequencer();
//! const block = engine.process(128);
//! ```

use std::collections::VecDeque;
use std::fmt::Display;
use std::sync::{Arc, Mutex};

use wasm_bindgen::prelude::*;

use crate::config::EngineConfig;
use crate::drums::DrumType;
use crate::dsp::oscillator::Waveform;
use crate::effects::EffectKind;
use crate::engine::Engine;
use crate::error::{Result, RositaError};
use crate::graph::AudioGraph;
use crate::instrument::InstrumentId;
use crate::note::Scale;

/// Install the panic hook and route `log` to the browser console.
#[wasm_bindgen]
pub fn rosita_init() {
    #[cfg(feature = "console")]
    {
        console_error_panic_hook::set_once();
        console_log::init_with_level(log::Level::Debug).ok();
    }
}

fn js_err(e: impl Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

fn parse_drum(name: &str) -> Result<DrumType> {
    DrumType::from_label(name).ok_or_else(|| RositaError::UnknownDrum(name.to_string()))
}

fn parse_scale(name: &str) -> Result<Scale> {
    Scale::from_name(name).ok_or_else(|| RositaError::UnknownParam {
        target: "scale".into(),
        param: name.to_string(),
    })
}

fn parse_waveform(name: &str) -> Result<Waveform> {
    Waveform::from_name(name).ok_or_else(|| RositaError::UnknownParam {
        target: "waveform".into(),
        param: name.to_string(),
    })
}

/// Queue step highlights for the UI thread to drain. Columns are pushed as
/// their index, a cleared highlight as `-1`.
fn step_queue(engine: &mut Engine) -> Arc<Mutex<VecDeque<i32>>> {
    let queue = Arc::new(Mutex::new(VecDeque::new()));
    let sink = Arc::clone(&queue);
    engine.on_step(move |column| {
        if let Ok(mut q) = sink.lock() {
            q.push_back(column.map_or(-1, |c| c as i32));
        }
    });
    queue
}

#[wasm_bindgen]
pub struct RositaEngine {
    inner: Engine,
    steps: Arc<Mutex<VecDeque<i32>>>,
}

#[wasm_bindgen]
impl RositaEngine {
    /// Create an engine from a JSON [`EngineConfig`]. Missing fields and an
    /// absent document take their defaults.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: Option<String>) -> std::result::Result<RositaEngine, JsValue> {
        let config = match config_json {
            Some(json) => EngineConfig::from_json(&json).map_err(js_err)?,
            None => EngineConfig::default(),
        };
        let mut inner = Engine::offline(config).map_err(js_err)?;
        let steps = step_queue(&mut inner);
        Ok(RositaEngine { inner, steps })
    }

    /// Render the next `frames` samples.
    pub fn process(&mut self, frames: u32) -> Vec<f32> {
        let seconds = frames as f64 / self.inner.graph().sample_rate();
        self.inner.render(seconds)
    }

    pub fn current_time(&self) -> f64 {
        self.inner.graph().current_time()
    }

    pub fn set_master_gain(&mut self, gain: f64) {
        self.inner.graph_mut().set_master_gain(gain);
    }

    /// Step highlights since the last call, oldest first.
    pub fn take_steps(&mut self) -> Vec<i32> {
        match self.steps.lock() {
            Ok(mut q) => q.drain(..).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn snapshot(&self) -> std::result::Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.inner.snapshot()).map_err(js_err)
    }

    // Transport

    pub fn start_sequencer(&mut self) {
        self.inner.start_sequencer();
    }

    pub fn stop_sequencer(&mut self) {
        self.inner.stop_sequencer();
    }

    pub fn pause_sequencer(&mut self) {
        self.inner.pause_sequencer();
    }

    pub fn resume_sequencer(&mut self, is_pattern_change: bool) {
        self.inner.resume_sequencer(is_pattern_change);
    }

    pub fn set_tempo(&mut self, bpm: f64) -> f64 {
        self.inner.set_tempo(bpm)
    }

    pub fn set_swing(&mut self, amount: f64) -> f64 {
        self.inner.set_swing(amount)
    }

    // Notes

    pub fn play_note_with_instrument(&mut self, note: &str, instrument: &str) -> std::result::Result<(), JsValue> {
        self.inner
            .play_note_with_instrument(note, InstrumentId::from_name(instrument))
            .map_err(js_err)
    }

    pub fn stop_note(&mut self, note: &str) {
        self.inner.stop_note(note);
    }

    pub fn play_drum_sound(&mut self, drum: &str) -> std::result::Result<(), JsValue> {
        let drum = parse_drum(drum).map_err(js_err)?;
        self.inner.play_drum_sound(drum);
        Ok(())
    }

    // Arpeggiators

    /// The UI cycles off, on, looping.
    pub fn toggle_arpeggiator(&mut self, instrument: &str, enabled: bool, looping: bool) {
        self.inner
            .toggle_arpeggiator(InstrumentId::from_name(instrument), enabled, looping);
    }

    pub fn add_note_to_arpeggiator(&mut self, note: &str, instrument: &str) {
        self.inner
            .add_note_to_arpeggiator(note, InstrumentId::from_name(instrument));
    }

    pub fn remove_note_from_arpeggiator(&mut self, note: &str, instrument: &str) {
        self.inner
            .remove_note_from_arpeggiator(note, InstrumentId::from_name(instrument));
    }

    // Instruments

    pub fn set_envelope_param(&mut self, instrument: &str, param: &str, value: f64) -> std::result::Result<(), JsValue> {
        self.inner
            .set_envelope_param(InstrumentId::from_name(instrument), param, value)
            .map_err(js_err)
    }

    pub fn set_waveform(&mut self, instrument: &str, waveform: &str) -> std::result::Result<(), JsValue> {
        let waveform = parse_waveform(waveform).map_err(js_err)?;
        self.inner.set_waveform(InstrumentId::from_name(instrument), waveform);
        Ok(())
    }

    pub fn set_drum_param(&mut self, drum: &str, param: &str, value: f64) -> std::result::Result<(), JsValue> {
        let drum = parse_drum(drum).map_err(js_err)?;
        self.inner.set_drum_param(drum, param, value).map_err(js_err)
    }

    pub fn set_drum_fx(&mut self, name: &str, value: f64) -> std::result::Result<(), JsValue> {
        self.inner.set_drum_fx(name, value).map_err(js_err)
    }

    /// Decode a WAV file and play it for `drum` from now on.
    pub fn load_drum_sample(&mut self, drum: &str, wav: &[u8]) -> std::result::Result<(), JsValue> {
        let drum = parse_drum(drum).map_err(js_err)?;
        self.inner.load_drum_wav(drum, wav).map_err(js_err)
    }

    // Effects

    pub fn set_effect(&mut self, effect: &str, enabled: bool) -> std::result::Result<(), JsValue> {
        let kind = EffectKind::from_name(effect).map_err(js_err)?;
        self.inner.set_effect(kind, enabled);
        Ok(())
    }

    pub fn set_effect_param(&mut self, effect: &str, param: &str, value: f64) -> std::result::Result<(), JsValue> {
        let kind = EffectKind::from_name(effect).map_err(js_err)?;
        self.inner.set_effect_param(kind, param, value).map_err(js_err)
    }

    // Patterns

    pub fn select_instrument(&mut self, instrument: &str) {
        self.inner.select_instrument(InstrumentId::from_name(instrument));
    }

    /// Returns the new cell state, or `undefined` when the cell is off the grid.
    pub fn toggle_step(&mut self, instrument: &str, row: usize, col: usize) -> Option<bool> {
        self.inner.toggle_step(InstrumentId::from_name(instrument), row, col)
    }

    pub fn clear_pattern(&mut self, instrument: &str) {
        self.inner.clear_pattern(InstrumentId::from_name(instrument));
    }

    pub fn random_fill(&mut self, density: f64) {
        self.inner.random_fill(density);
    }

    pub fn shift_octave(&mut self, instrument: &str, up: bool) -> i32 {
        self.inner.shift_octave(InstrumentId::from_name(instrument), up)
    }

    pub fn set_scale(&mut self, scale: &str) -> std::result::Result<(), JsValue> {
        let scale = parse_scale(scale).map_err(js_err)?;
        self.inner.set_scale(scale);
        Ok(())
    }

    pub fn save_pattern(&mut self, slot: usize) -> std::result::Result<(), JsValue> {
        self.inner.save_pattern(slot).map_err(js_err)
    }

    pub fn load_pattern(&mut self, slot: usize) -> std::result::Result<(), JsValue> {
        self.inner.load_pattern(slot).map_err(js_err)
    }

    pub fn duplicate_pattern(&mut self, target: usize) -> std::result::Result<(), JsValue> {
        self.inner.duplicate_pattern(target).map_err(js_err)
    }

    // Mixer

    pub fn set_instrument_volume(&mut self, instrument: &str, volume: f64) {
        self.inner
            .set_instrument_volume(InstrumentId::from_name(instrument), volume);
    }

    pub fn set_drum_volume(&mut self, drum: &str, volume: f64) -> std::result::Result<(), JsValue> {
        let drum = parse_drum(drum).map_err(js_err)?;
        self.inner.set_drum_volume(drum, volume);
        Ok(())
    }

    pub fn toggle_mute(&mut self, instrument: &str) -> bool {
        self.inner.toggle_mute(InstrumentId::from_name(instrument))
    }

    pub fn toggle_solo(&mut self, instrument: &str) -> bool {
        self.inner.toggle_solo(InstrumentId::from_name(instrument))
    }

    pub fn toggle_drum_mute(&mut self, drum: &str) -> std::result::Result<bool, JsValue> {
        let drum = parse_drum(drum).map_err(js_err)?;
        Ok(self.inner.toggle_drum_mute(drum))
    }

    /// Returns the volume the clicked channel now has, or `undefined` when
    /// the click missed every column.
    pub fn mixer_click(&mut self, column: usize, step: usize) -> Option<f64> {
        self.inner.mixer_click(column, step).map(|(_, volume)| volume)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_parse_like_the_ui_sends_them() {
        assert_eq!(parse_drum("Open Hat").unwrap(), DrumType::OpenHat);
        assert_eq!(parse_drum("hi-hat").unwrap(), DrumType::HiHat);
        assert!(matches!(parse_drum("gong"), Err(RositaError::UnknownDrum(_))));
        assert_eq!(parse_scale("minor").unwrap(), Scale::Minor);
        assert!(parse_scale("dorian").is_err());
        assert!(parse_waveform("sawtooth").is_ok());
    }

    #[test]
    fn highlights_are_queued_for_the_ui() {
        let mut engine = Engine::offline(EngineConfig {
            sample_rate: 8000.0,
            seed: Some(3),
            ..EngineConfig::default()
        })
        .unwrap();
        let queue = step_queue(&mut engine);
        engine.start_sequencer();
        engine.render(0.3);
        engine.stop_sequencer();
        let steps: Vec<i32> = queue.lock().unwrap().drain(..).collect();
        assert_eq!(steps, vec![0, 1, -1]);
    }
}
