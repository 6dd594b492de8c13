//! Convolution reverb with procedurally generated impulse responses.

use rand::Rng;

/// Build a reverb impulse: `sample_rate * decay` frames of noise shaped by a
/// `(1 - i/len)^2` envelope. The first tenth is louder (early reflections);
/// the diffuse tail is scaled by `room_size`.
pub fn impulse_response<R: Rng + ?Sized>(
    sample_rate: f64,
    decay: f64,
    room_size: f64,
    rng: &mut R,
) -> Vec<f32> {
    let len = (sample_rate * decay.max(0.0)) as usize;
    let early = len as f64 * 0.1;
    (0..len)
        .map(|i| {
            let env = (1.0 - i as f64 / len as f64).powi(2);
            let noise: f64 = rng.gen_range(-1.0..1.0);
            let gain = if (i as f64) < early {
                0.5
            } else {
                room_size * 0.3
            };
            (noise * env * gain) as f32
        })
        .collect()
}

/// Impulse used by per-hit sample reverbs: `sample_rate * (1 + intensity)`
/// frames, linear noise scaled by `intensity`.
pub fn hit_impulse<R: Rng + ?Sized>(sample_rate: f64, intensity: f64, rng: &mut R) -> Vec<f32> {
    let len = (sample_rate * (1.0 + intensity)) as usize;
    (0..len)
        .map(|i| {
            let env = (1.0 - i as f64 / len as f64).powi(2);
            let noise: f64 = rng.gen_range(-1.0..1.0);
            (noise * env * intensity) as f32
        })
        .collect()
}

/// Direct-form FIR convolver. Cost per sample grows with the impulse length;
/// silent taps at the end of the impulse are trimmed on load.
#[derive(Debug, Clone)]
pub struct Convolver {
    taps: Vec<f32>,
    history: Vec<f32>,
    pos: usize,
}

impl Convolver {
    pub fn new(impulse: &[f32]) -> Self {
        let mut c = Convolver {
            taps: Vec::new(),
            history: Vec::new(),
            pos: 0,
        };
        c.set_impulse(impulse);
        c
    }

    /// Swap in a new impulse. The input history is cleared.
    pub fn set_impulse(&mut self, impulse: &[f32]) {
        let used = impulse
            .iter()
            .rposition(|s| s.abs() > 1e-6)
            .map_or(0, |last| last + 1);
        self.taps = impulse[..used].to_vec();
        self.history = vec![0.0; used.max(1)];
        self.pos = 0;
    }

    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    pub fn process(&mut self, input: f32) -> f32 {
        if self.taps.is_empty() {
            return 0.0;
        }
        let len = self.history.len();
        self.history[self.pos] = input;

        let mut acc = 0.0;
        let mut idx = self.pos;
        for &tap in &self.taps {
            acc += tap * self.history[idx];
            idx = if idx == 0 { len - 1 } else { idx - 1 };
        }

        self.pos = (self.pos + 1) % len;
        acc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn impulse_length_follows_decay() {
        let mut rng = StdRng::seed_from_u64(7);
        let ir = impulse_response(1000.0, 2.0, 0.7, &mut rng);
        assert_eq!(ir.len(), 2000);
    }

    #[test]
    fn early_reflections_are_denser_than_tail() {
        let mut rng = StdRng::seed_from_u64(11);
        let ir = impulse_response(10_000.0, 2.0, 0.7, &mut rng);
        let early = ir[..2000].iter().map(|s| s.abs()).fold(0.0, f32::max);
        let late = ir[2000..].iter().map(|s| s.abs()).fold(0.0, f32::max);
        assert!(early <= 0.5 + 1e-6, "early bound: {early}");
        assert!(late <= (0.7 * 0.3) as f32 + 1e-6, "tail bound: {late}");
        assert!(early > late, "early {early} should exceed tail {late}");
    }

    #[test]
    fn room_size_scales_tail() {
        let mut rng = StdRng::seed_from_u64(3);
        let small = impulse_response(8000.0, 1.0, 0.1, &mut rng);
        let tail = small[800..].iter().map(|s| s.abs()).fold(0.0, f32::max);
        assert!(tail <= 0.03 + 1e-6, "tail too loud for a small room: {tail}");
    }

    #[test]
    fn convolving_with_unit_impulse_is_identity() {
        let mut conv = Convolver::new(&[1.0]);
        for x in [0.5_f32, -0.25, 1.0] {
            assert_eq!(conv.process(x), x);
        }
    }

    #[test]
    fn convolver_delays_by_tap_position() {
        let mut conv = Convolver::new(&[0.0, 0.0, 0.5]);
        assert_eq!(conv.process(1.0), 0.0);
        assert_eq!(conv.process(0.0), 0.0);
        assert_eq!(conv.process(0.0), 0.5);
        assert_eq!(conv.process(0.0), 0.0);
    }

    #[test]
    fn silent_impulse_outputs_nothing() {
        let mut conv = Convolver::new(&[0.0; 16]);
        assert!(conv.is_empty());
        assert_eq!(conv.process(1.0), 0.0);
    }

    #[test]
    fn hit_impulse_scales_with_intensity() {
        let mut rng = StdRng::seed_from_u64(5);
        let ir = hit_impulse(1000.0, 0.5, &mut rng);
        assert_eq!(ir.len(), 1500);
        assert!(ir.iter().all(|s| s.abs() <= 0.5 + 1e-6));
    }
}
