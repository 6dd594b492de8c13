//! Waveshaping transfer curves and the shaper that applies them.

use std::f64::consts::PI;

/// Points per generated curve.
pub const CURVE_LEN: usize = 44_100;

fn curve_from(f: impl Fn(f64) -> f64) -> Vec<f32> {
    (0..CURVE_LEN)
        .map(|i| {
            let x = (i as f64 * 2.0) / CURVE_LEN as f64 - 1.0;
            f(x) as f32
        })
        .collect()
}

/// Master-bus distortion: `((3 + k) * x * 20 * deg) / (PI + k * |x|)`.
pub fn distortion_curve(amount: f64) -> Vec<f32> {
    let deg = PI / 180.0;
    curve_from(|x| ((3.0 + amount) * x * 20.0 * deg) / (PI + amount * x.abs()))
}

/// Sample-hit saturator: `sign(x) * |tanh(x * amount * 50)|^0.7`.
pub fn saturator_curve(amount: f64) -> Vec<f32> {
    let drive = amount * 50.0;
    curve_from(|x| x.signum() * (x * drive).tanh().abs().powf(0.7))
}

/// Sample-hit hard clipper: `sign(x * d) * min(|x * d|, 1) * 0.8`, `d = amount * 15`.
pub fn hard_clip_curve(amount: f64) -> Vec<f32> {
    let drive = amount * 15.0;
    curve_from(|x| {
        let driven = x * drive;
        driven.signum() * driven.abs().min(1.0) * 0.8
    })
}

/// Maps input in `[-1, 1]` through a curve with linear interpolation,
/// clamping beyond the ends.
#[derive(Debug, Clone)]
pub struct WaveShaper {
    curve: Vec<f32>,
}

impl WaveShaper {
    pub fn new(curve: &[f32]) -> Self {
        WaveShaper {
            curve: curve.to_vec(),
        }
    }

    pub fn set_curve(&mut self, curve: &[f32]) {
        self.curve = curve.to_vec();
    }

    pub fn process(&self, input: f32) -> f32 {
        let n = self.curve.len();
        match n {
            0 => input,
            1 => self.curve[0],
            _ => {
                let pos = (input.clamp(-1.0, 1.0) + 1.0) * 0.5 * (n - 1) as f32;
                let idx = (pos.floor() as usize).min(n - 2);
                let frac = pos - idx as f32;
                self.curve[idx] + (self.curve[idx + 1] - self.curve[idx]) * frac
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distortion_is_odd_and_bounded() {
        let curve = distortion_curve(20.0);
        assert_eq!(curve.len(), CURVE_LEN);
        let shaper = WaveShaper::new(&curve);
        let pos = shaper.process(0.5);
        let neg = shaper.process(-0.5);
        assert!((pos + neg).abs() < 1e-3, "curve should be odd: {pos} vs {neg}");
        assert!(shaper.process(0.0).abs() < 1e-3);
    }

    #[test]
    fn more_drive_compresses_more() {
        let soft = WaveShaper::new(&distortion_curve(0.0));
        let hard = WaveShaper::new(&distortion_curve(400.0));
        let ratio = |s: &WaveShaper| s.process(0.1) / s.process(1.0);
        assert!(
            ratio(&hard) > ratio(&soft),
            "high drive should lift quiet input relative to loud input"
        );
    }

    #[test]
    fn saturator_reaches_unity() {
        let shaper = WaveShaper::new(&saturator_curve(1.0));
        let top = shaper.process(1.0);
        assert!((top - 1.0).abs() < 1e-3, "saturated top {top}");
    }

    #[test]
    fn hard_clip_caps_at_point_eight() {
        let shaper = WaveShaper::new(&hard_clip_curve(1.0));
        assert!((shaper.process(0.9) - 0.8).abs() < 1e-3);
        assert!((shaper.process(-0.9) + 0.8).abs() < 1e-3);
    }

    #[test]
    fn out_of_range_input_clamps() {
        let shaper = WaveShaper::new(&[-1.0, 0.0, 1.0]);
        assert_eq!(shaper.process(5.0), 1.0);
        assert_eq!(shaper.process(-5.0), -1.0);
        assert_eq!(shaper.process(0.0), 0.0);
    }
}
