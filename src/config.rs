//! Engine configuration: platform timing profile, grid layout and defaults.

use serde::{Deserialize, Serialize};

use crate::error::{Result, RositaError};
use crate::pattern::GridLayout;

/// Host class. Mobile browsers get longer lookahead and looser drift
/// tolerance because their timers are throttled harder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Desktop,
    Mobile,
}

/// Scheduler timing constants derived from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timing {
    /// Nominal timer period in milliseconds.
    pub lookahead_ms: f64,
    /// How far ahead of the audio clock steps are scheduled, in seconds.
    pub schedule_ahead: f64,
    /// The first step lands this far behind `now` so it is emitted at once.
    pub start_offset: f64,
    /// Lag behind the audio clock after which the cursor snaps forward.
    pub drift_tolerance: f64,
    /// Timer delay before the loop retries after a failed tick.
    pub error_retry_ms: f64,
    /// Added to step times when the context had to be woken first.
    pub wake_nudge: f64,
}

impl Timing {
    pub fn for_platform(platform: Platform) -> Timing {
        match platform {
            Platform::Desktop => Timing {
                lookahead_ms: 25.0,
                schedule_ahead: 0.1,
                start_offset: 0.05,
                drift_tolerance: 0.1,
                error_retry_ms: 50.0,
                wake_nudge: 0.0,
            },
            Platform::Mobile => Timing {
                lookahead_ms: 40.0,
                schedule_ahead: 0.15,
                start_offset: 0.1,
                drift_tolerance: 0.15,
                error_retry_ms: 100.0,
                wake_nudge: 0.05,
            },
        }
    }

    /// Period of the scheduler loop task.
    pub fn loop_interval_ms(&self) -> f64 {
        (self.lookahead_ms / 2.0).max(5.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub platform: Platform,
    pub layout: GridLayout,
    pub slot_count: usize,
    /// Initial tempo in BPM.
    pub tempo: f64,
    /// Sample rate of the offline graph.
    pub sample_rate: f64,
    /// Fixed RNG seed. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            platform: Platform::Desktop,
            layout: GridLayout::Halves,
            slot_count: 8,
            tempo: 120.0,
            sample_rate: 44_100.0,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Parse a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.slot_count == 0 {
            return Err(RositaError::Config("slotCount must be at least 1".into()));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate >= 3000.0) {
            return Err(RositaError::Config(format!("sampleRate {} is not usable", self.sample_rate)));
        }
        if !self.tempo.is_finite() {
            return Err(RositaError::Config("tempo must be a number".into()));
        }
        Ok(())
    }

    pub fn timing(&self) -> Timing {
        Timing::for_platform(self.platform)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn desktop_loop_runs_every_12_5_ms() {
        let timing = Timing::for_platform(Platform::Desktop);
        assert_eq!(timing.loop_interval_ms(), 12.5);
        assert_eq!(Timing::for_platform(Platform::Mobile).loop_interval_ms(), 20.0);
    }

    #[test]
    fn json_fills_missing_fields() {
        let config = EngineConfig::from_json(r#"{"platform":"mobile","layout":"steps16"}"#).unwrap();
        assert_eq!(config.platform, Platform::Mobile);
        assert_eq!(config.layout, GridLayout::Steps16);
        assert_eq!(config.slot_count, 8);
        assert_eq!(config.timing().schedule_ahead, 0.15);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = EngineConfig::from_json(r#"{"slotCount":0}"#).unwrap_err();
        assert!(matches!(err, RositaError::Config(_)), "{err}");
        let err = EngineConfig::from_json("{not json").unwrap_err();
        assert!(matches!(err, RositaError::Json(_)), "{err}");
    }
}
