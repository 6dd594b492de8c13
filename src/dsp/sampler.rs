//! In-memory audio buffers: recorded drum samples and generated noise.

use std::io::Cursor;

use rand::Rng;

/// A mono sample buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBuffer {
    pub data: Vec<f32>,
    /// Native sample rate of the audio.
    pub sample_rate: u32,
}

impl SampleBuffer {
    pub fn new(data: Vec<f32>, sample_rate: u32) -> Self {
        SampleBuffer { data, sample_rate }
    }

    /// Create from 16-bit signed PCM data.
    pub fn from_i16(pcm: &[i16], sample_rate: u32) -> Self {
        let data = pcm.iter().map(|&s| s as f32 / 32768.0).collect();
        SampleBuffer { data, sample_rate }
    }

    /// Decode a WAV file. Multi-channel audio is averaged down to mono.
    pub fn from_wav(bytes: &[u8]) -> Result<Self, hound::Error> {
        let mut reader = hound::WavReader::new(Cursor::new(bytes))?;
        let spec = reader.spec();
        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
            hound::SampleFormat::Int => {
                let max = (1i64 << (spec.bits_per_sample - 1)) as f32;
                reader
                    .samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / max))
                    .collect::<Result<_, _>>()?
            }
        };
        let channels = usize::from(spec.channels.max(1));
        let data = interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect();
        Ok(SampleBuffer {
            data,
            sample_rate: spec.sample_rate,
        })
    }

    /// White noise in `[-1, 1)` lasting `duration` seconds.
    pub fn noise<R: Rng + ?Sized>(duration: f64, sample_rate: u32, rng: &mut R) -> Self {
        let frames = (duration.max(0.0) * sample_rate as f64).round() as usize;
        let data = (0..frames).map(|_| rng.gen_range(-1.0..1.0)).collect();
        SampleBuffer { data, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Length in seconds at the native rate.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.data.len() as f64 / self.sample_rate as f64
    }

    /// Read a sample with linear interpolation at a fractional frame position.
    pub fn read_interpolated(&self, position: f64) -> f32 {
        if self.data.is_empty() || position < 0.0 {
            return 0.0;
        }
        let idx = position as usize;
        if idx + 1 >= self.data.len() {
            return self.data.get(idx).copied().unwrap_or(0.0);
        }
        let frac = (position - idx as f64) as f32;
        self.data[idx] * (1.0 - frac) + self.data[idx + 1] * frac
    }
}
