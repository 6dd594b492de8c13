//! Rosita core: the sequencing and synthesis engine behind the Rosita step
//! sequencer.
//!
//! [`Engine`] ties together the lookahead [`scheduler`], the voice table in
//! [`dispatcher`], the master [`effects`] bus and the [`pattern`] store, and
//! drives any [`AudioGraph`]. [`OfflineGraph`] renders in-process for the
//! AudioWorklet bridge in [`wasm`], WAV export and tests.
//!
//! [`VERSION`] and [`core_version`] report the crate version;
//! [`render_pattern_wav`] and [`export_pattern_midi`] turn a pattern into a
//! file without keeping an engine around.

pub mod arpeggiator;
pub mod config;
pub mod dispatcher;
pub mod drums;
pub mod dsp;
pub mod effects;
pub mod engine;
pub mod error;
pub mod graph;
pub mod instrument;
pub mod midi;
pub mod mixer;
pub mod note;
pub mod pattern;
pub mod scheduler;
pub mod timer;
pub mod wasm;

#[cfg(feature = "driver")]
pub mod driver;

use wasm_bindgen::prelude::*;

pub use config::{EngineConfig, Platform};
pub use engine::{Engine, EngineSnapshot};
pub use error::{GraphError, RositaError};
pub use graph::{AudioGraph, OfflineGraph};
pub use instrument::InstrumentId;
pub use pattern::GridLayout;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the rosita-core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// WASM-exposed: render `seconds` of a pattern described by a JSON config
/// with every cell of `cells` (`[instrument, row, col]` triples) switched on,
/// as a WAV byte array.
#[wasm_bindgen]
pub fn render_pattern_wav(config_json: &str, cells: &str, seconds: f64) -> Result<Vec<u8>, JsValue> {
    render_pattern(config_json, cells, seconds).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: the same pattern description as [`render_pattern_wav`],
/// exported as a standard MIDI file.
#[wasm_bindgen]
pub fn export_pattern_midi(config_json: &str, cells: &str) -> Result<Vec<u8>, JsValue> {
    pattern_midi(config_json, cells).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// An engine built from `config_json` with every cell of `cells` switched on.
fn engine_with_cells(config_json: &str, cells: &str) -> error::Result<Engine> {
    let config = EngineConfig::from_json(config_json)?;
    let cells: Vec<(InstrumentId, usize, usize)> = serde_json::from_str(cells)?;
    let mut engine = Engine::offline(config)?;
    for (instrument, row, col) in cells {
        if engine.patterns().grid(instrument).get(row, col) {
            continue;
        }
        engine.toggle_step(instrument, row, col);
    }
    Ok(engine)
}

/// Build an engine from `config_json`, switch on `cells`, run the sequencer
/// for `seconds` and return the WAV file.
pub fn render_pattern(config_json: &str, cells: &str, seconds: f64) -> error::Result<Vec<u8>> {
    let mut engine = engine_with_cells(config_json, cells)?;
    engine.stop_sequencer();
    engine.start_sequencer();
    engine.render_wav(seconds)
}

/// Build an engine from `config_json`, switch on `cells` and return one pass
/// of the pattern as a MIDI file.
pub fn pattern_midi(config_json: &str, cells: &str) -> error::Result<Vec<u8>> {
    engine_with_cells(config_json, cells)?.export_midi()
}
