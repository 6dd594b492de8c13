//! Delay line backing the graph's delay node.
//!
//! Unlike a self-contained delay effect, feedback and wet/dry mixing live in
//! the graph (a gain node wired back into the delay input), so this type only
//! stores and reads samples.

/// A mono circular delay buffer with fractional read positions.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
    sample_rate: f64,
}

impl DelayLine {
    /// Create a delay line able to hold `max_delay_seconds` of audio.
    pub fn new(sample_rate: f64, max_delay_seconds: f64) -> Self {
        let size = (sample_rate * max_delay_seconds.max(0.0)) as usize + 2;
        DelayLine {
            buffer: vec![0.0; size],
            write_pos: 0,
            sample_rate,
        }
    }

    /// Longest delay this line can produce, in seconds.
    pub fn max_delay(&self) -> f64 {
        (self.buffer.len() - 2) as f64 / self.sample_rate
    }

    /// Read the sample written `delay_seconds` ago, linearly interpolated.
    /// Delays shorter than one sample read as one sample.
    pub fn read(&self, delay_seconds: f64) -> f32 {
        let len = self.buffer.len();
        let delay = (delay_seconds * self.sample_rate).clamp(1.0, (len - 2) as f64);
        let whole = delay.floor() as usize;
        let frac = (delay - whole as f64) as f32;

        let idx = |back: usize| (self.write_pos + len - back) % len;
        let a = self.buffer[idx(whole)];
        let b = self.buffer[idx(whole + 1)];
        a + (b - a) * frac
    }

    /// Push one input sample.
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}
