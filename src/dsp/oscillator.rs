//! Band-limited oscillators (PolyBLEP) for the offline graph.

use std::f64::consts::PI;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Oscillator shapes, named the way the WebAudio `OscillatorNode.type` is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    Sine,
    Square,
    Sawtooth,
    Triangle,
}

impl Waveform {
    /// Parse a waveform name. Accepts the short aliases the UI sends.
    pub fn from_name(name: &str) -> Option<Waveform> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sine" => Some(Waveform::Sine),
            "square" => Some(Waveform::Square),
            "sawtooth" | "saw" => Some(Waveform::Sawtooth),
            "triangle" | "tri" => Some(Waveform::Triangle),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Sine => "sine",
            Waveform::Square => "square",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Triangle => "triangle",
        }
    }
}

impl fmt::Display for Waveform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A phase-accumulating oscillator whose frequency may change every sample
/// (pitch sweeps on kicks and toms).
#[derive(Debug, Clone)]
pub struct Oscillator {
    pub waveform: Waveform,
    phase: f64,
    sample_rate: f64,
}

impl Oscillator {
    pub fn new(waveform: Waveform, sample_rate: f64) -> Self {
        Oscillator {
            waveform,
            phase: 0.0,
            sample_rate,
        }
    }

    /// Generate the next sample at `frequency` Hz.
    pub fn next_sample(&mut self, frequency: f64) -> f64 {
        let inc = (frequency / self.sample_rate).clamp(0.0, 0.5);
        let sample = match self.waveform {
            Waveform::Sine => (2.0 * PI * self.phase).sin(),
            Waveform::Sawtooth => 2.0 * self.phase - 1.0 - poly_blep(self.phase, inc),
            Waveform::Square => {
                let mut value = if self.phase < 0.5 { 1.0 } else { -1.0 };
                value += poly_blep(self.phase, inc);
                value -= poly_blep((self.phase + 0.5) % 1.0, inc);
                value
            }
            Waveform::Triangle => {
                if self.phase < 0.5 {
                    4.0 * self.phase - 1.0
                } else {
                    3.0 - 4.0 * self.phase
                }
            }
        };

        self.phase += inc;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
        sample
    }
}

/// PolyBLEP correction around a discontinuity. `t` is the phase in
/// `[0, 1)`, `dt` the per-sample increment.
fn poly_blep(t: f64, dt: f64) -> f64 {
    if dt <= 0.0 {
        return 0.0;
    }
    if t < dt {
        let t = t / dt;
        2.0 * t - t * t - 1.0
    } else if t > 1.0 - dt {
        let t = (t - 1.0) / dt;
        t * t + 2.0 * t + 1.0
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peak(waveform: Waveform, freq: f64) -> f64 {
        let mut osc = Oscillator::new(waveform, 44100.0);
        (0..44100)
            .map(|_| osc.next_sample(freq).abs())
            .fold(0.0, f64::max)
    }

    #[test]
    fn sine_starts_at_zero() {
        let mut osc = Oscillator::new(Waveform::Sine, 44100.0);
        let s = osc.next_sample(440.0);
        assert!(s.abs() < 1e-10, "Sine should start near 0, got {s}");
    }

    #[test]
    fn shapes_stay_in_range() {
        assert!(peak(Waveform::Sine, 440.0) <= 1.0);
        assert!(peak(Waveform::Triangle, 440.0) <= 1.0);
        assert!(peak(Waveform::Sawtooth, 440.0) <= 1.5);
        assert!(peak(Waveform::Square, 440.0) <= 1.5);
    }

    #[test]
    fn sweeping_frequency_is_stable() {
        let mut osc = Oscillator::new(Waveform::Square, 44100.0);
        for i in 0..13230 {
            // 60 Hz falling to 30 Hz, like a kick
            let f = 60.0 * (0.5_f64).powf(i as f64 / 13230.0);
            let s = osc.next_sample(f);
            assert!(s.is_finite() && s.abs() <= 1.5, "bad sample {s} at {i}");
        }
    }

    #[test]
    fn zero_crossings_match_frequency() {
        let mut osc = Oscillator::new(Waveform::Sine, 44100.0);
        let mut prev = osc.next_sample(100.0);
        let mut rising = 0;
        for _ in 1..44100 {
            let s = osc.next_sample(100.0);
            if prev < 0.0 && s >= 0.0 {
                rising += 1;
            }
            prev = s;
        }
        assert!((99..=100).contains(&rising), "expected ~100 cycles, got {rising}");
    }

    #[test]
    fn parses_names() {
        assert_eq!(Waveform::from_name("Saw"), Some(Waveform::Sawtooth));
        assert_eq!(Waveform::from_name("triangle"), Some(Waveform::Triangle));
        assert_eq!(Waveform::from_name("noise"), None);
        assert_eq!(Waveform::Square.to_string(), "square");
    }
}
