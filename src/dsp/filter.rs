//! Biquad filter matching WebAudio `BiquadFilterNode` coefficients.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Filter response, as named by `BiquadFilterNode.type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    Lowpass,
    Highpass,
    Bandpass,
    Notch,
}

impl FilterMode {
    pub fn from_name(name: &str) -> Option<FilterMode> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lowpass" => Some(FilterMode::Lowpass),
            "highpass" => Some(FilterMode::Highpass),
            "bandpass" => Some(FilterMode::Bandpass),
            "notch" => Some(FilterMode::Notch),
            _ => None,
        }
    }

    /// Numeric code used when the mode travels through a numeric parameter
    /// channel (the UI sends `0..=3`).
    pub fn from_index(index: f64) -> Option<FilterMode> {
        match index.round() as i64 {
            0 => Some(FilterMode::Lowpass),
            1 => Some(FilterMode::Highpass),
            2 => Some(FilterMode::Bandpass),
            3 => Some(FilterMode::Notch),
            _ => None,
        }
    }
}

/// A 2nd-order IIR filter in Direct Form II Transposed.
///
/// Coefficients come from the Audio EQ Cookbook (Robert Bristow-Johnson).
/// Frequency and Q may be changed every sample; coefficients are only
/// recomputed when either actually moves.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    mode: FilterMode,
    frequency: f64,
    q: f64,

    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    z1: f64,
    z2: f64,

    sample_rate: f64,
    dirty: bool,
}

impl BiquadFilter {
    pub fn new(mode: FilterMode, frequency: f64, q: f64, sample_rate: f64) -> Self {
        let mut f = BiquadFilter {
            mode,
            frequency,
            q,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            z1: 0.0,
            z2: 0.0,
            sample_rate,
            dirty: true,
        };
        f.update_coefficients();
        f
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    fn update_coefficients(&mut self) {
        let nyquist = self.sample_rate / 2.0;
        let freq = self.frequency.clamp(10.0, nyquist * 0.999);
        let q = self.q.max(1e-4);
        let w0 = 2.0 * PI * freq / self.sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let (b0, b1, b2) = match self.mode {
            FilterMode::Lowpass => {
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0)
            }
            FilterMode::Highpass => {
                let b0 = (1.0 + cos_w0) / 2.0;
                (b0, -(1.0 + cos_w0), b0)
            }
            FilterMode::Bandpass => (alpha, 0.0, -alpha),
            FilterMode::Notch => (1.0, -2.0 * cos_w0, 1.0),
        };
        let a0 = 1.0 + alpha;

        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = (-2.0 * cos_w0) / a0;
        self.a2 = (1.0 - alpha) / a0;
        self.dirty = false;
    }

    pub fn process(&mut self, input: f64) -> f64 {
        if self.dirty {
            self.update_coefficients();
        }
        let output = self.b0 * input + self.z1;
        self.z1 = self.b1 * input - self.a1 * output + self.z2;
        self.z2 = self.b2 * input - self.a2 * output;
        output
    }

    pub fn set_mode(&mut self, mode: FilterMode) {
        if mode != self.mode {
            self.mode = mode;
            self.dirty = true;
        }
    }

    pub fn set_frequency(&mut self, freq: f64) {
        if freq != self.frequency {
            self.frequency = freq;
            self.dirty = true;
        }
    }

    pub fn set_q(&mut self, q: f64) {
        if q != self.q {
            self.q = q;
            self.dirty = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(filter: &mut BiquadFilter, input: f64) -> f64 {
        let mut out = 0.0;
        for _ in 0..2000 {
            out = filter.process(input);
        }
        out
    }

    #[test]
    fn lowpass_passes_dc() {
        let mut f = BiquadFilter::new(FilterMode::Lowpass, 2000.0, 1.0, 44100.0);
        let out = settle(&mut f, 1.0);
        assert!((out - 1.0).abs() < 0.001, "Lowpass should pass DC, got {out}");
    }

    #[test]
    fn highpass_blocks_dc() {
        let mut f = BiquadFilter::new(FilterMode::Highpass, 200.0, 0.707, 44100.0);
        let out = settle(&mut f, 1.0);
        assert!(out.abs() < 0.001, "Highpass should block DC, got {out}");
    }

    #[test]
    fn lowpass_attenuates_high_freq() {
        let mut f = BiquadFilter::new(FilterMode::Lowpass, 200.0, 0.707, 44100.0);
        let mut max_out = 0.0_f64;
        for i in 0..4410 {
            let t = i as f64 / 44100.0;
            let out = f.process((2.0 * PI * 10000.0 * t).sin());
            if i > 1000 {
                max_out = max_out.max(out.abs());
            }
        }
        assert!(max_out < 0.01, "Lowpass@200Hz should cut 10kHz, got {max_out}");
    }

    #[test]
    fn retuning_keeps_output_finite() {
        let mut f = BiquadFilter::new(FilterMode::Bandpass, 4000.0, 1.0, 44100.0);
        for i in 0..10000 {
            f.set_frequency(200.0 + (i % 500) as f64 * 10.0);
            let input = if i % 100 == 0 { 1.0 } else { 0.0 };
            let out = f.process(input);
            assert!(out.is_finite(), "Filter output not finite at sample {i}");
        }
    }

    #[test]
    fn frequency_above_nyquist_is_clamped() {
        let mut f = BiquadFilter::new(FilterMode::Lowpass, 90_000.0, 1.0, 44100.0);
        let out = settle(&mut f, 0.5);
        assert!(out.is_finite());
    }

    #[test]
    fn mode_names() {
        assert_eq!(FilterMode::from_name("HighPass"), Some(FilterMode::Highpass));
        assert_eq!(FilterMode::from_index(2.0), Some(FilterMode::Bandpass));
        assert_eq!(FilterMode::from_name("allpass"), None);
    }
}
