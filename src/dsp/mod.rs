//! DSP primitives behind the offline audio graph.
//!
//! Everything here works one sample at a time so the graph can evaluate
//! feedback loops frame by frame. The same code renders for the AudioWorklet
//! bridge and for offline WAV export.

pub mod delay;
pub mod filter;
pub mod oscillator;
pub mod param;
pub mod renderer;
pub mod reverb;
pub mod sampler;
pub mod shaper;
