//! Parameter automation timeline.
//!
//! Every automatable node parameter (gain, frequency, Q, delay time,
//! playback rate) owns a [`ParamTimeline`]. Events are evaluated the way a
//! WebAudio `AudioParam` evaluates them, so envelopes written against the
//! [`crate::graph::AudioGraph`] trait sound the same in the offline renderer
//! as they do in a browser.

use serde::Serialize;

/// One automation event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Automation {
    /// Jump to `value` at `time`.
    SetValue { value: f64, time: f64 },
    /// Ramp linearly from the previous event to `value`, arriving at `end`.
    LinearRamp { value: f64, end: f64 },
    /// Ramp exponentially from the previous event to `value`, arriving at `end`.
    ExponentialRamp { value: f64, end: f64 },
    /// Approach `target` from `start` with the given time constant.
    SetTarget {
        target: f64,
        start: f64,
        time_constant: f64,
    },
}

impl Automation {
    /// The time at which this event is anchored on the timeline.
    pub fn time(&self) -> f64 {
        match *self {
            Automation::SetValue { time, .. } => time,
            Automation::LinearRamp { end, .. } => end,
            Automation::ExponentialRamp { end, .. } => end,
            Automation::SetTarget { start, .. } => start,
        }
    }
}

/// An ordered list of automation events plus the static default value.
#[derive(Debug, Clone)]
pub struct ParamTimeline {
    default: f64,
    events: Vec<Automation>,
}

/// Exponential approach used by set-target segments.
#[derive(Debug, Clone, Copy)]
struct Approach {
    target: f64,
    start: f64,
    time_constant: f64,
}

impl ParamTimeline {
    pub fn new(default: f64) -> Self {
        ParamTimeline {
            default,
            events: Vec::new(),
        }
    }

    /// The value used before any event applies.
    pub fn default_value(&self) -> f64 {
        self.default
    }

    pub fn events(&self) -> &[Automation] {
        &self.events
    }

    /// Insert an event, keeping the list ordered by time. Events sharing a
    /// timestamp keep their insertion order.
    pub fn schedule(&mut self, event: Automation) {
        let time = event.time();
        let idx = self.events.partition_point(|e| e.time() <= time);
        self.events.insert(idx, event);
    }

    /// Drop every event anchored at or after `time`.
    pub fn cancel_from(&mut self, time: f64) {
        self.events.retain(|e| e.time() < time);
    }

    /// Evaluate the parameter at time `t` (seconds on the audio clock).
    pub fn value_at(&self, t: f64) -> f64 {
        let mut value = self.default;
        let mut from_time = 0.0;
        let mut approach: Option<Approach> = None;

        for event in &self.events {
            match *event {
                Automation::SetValue { value: v, time } => {
                    if time > t {
                        break;
                    }
                    value = v;
                    from_time = time;
                    approach = None;
                }
                Automation::LinearRamp { value: v, end } => {
                    let v0 = value;
                    if end <= t {
                        value = v;
                        from_time = end;
                        approach = None;
                        continue;
                    }
                    let span = end - from_time;
                    if span <= 0.0 {
                        return v;
                    }
                    let frac = ((t - from_time) / span).clamp(0.0, 1.0);
                    return v0 + (v - v0) * frac;
                }
                Automation::ExponentialRamp { value: v, end } => {
                    let v0 = value;
                    if end <= t {
                        value = v;
                        from_time = end;
                        approach = None;
                        continue;
                    }
                    // Undefined for a zero start or a sign change: hold.
                    if v0 == 0.0 || v0.signum() != v.signum() {
                        return v0;
                    }
                    let span = end - from_time;
                    if span <= 0.0 {
                        return v;
                    }
                    let frac = ((t - from_time) / span).clamp(0.0, 1.0);
                    return v0 * (v / v0).powf(frac);
                }
                Automation::SetTarget {
                    target,
                    start,
                    time_constant,
                } => {
                    if start > t {
                        break;
                    }
                    value = settle(value, approach, start);
                    from_time = start;
                    approach = Some(Approach {
                        target,
                        start,
                        time_constant,
                    });
                }
            }
        }

        settle(value, approach, t)
    }
}

fn settle(value: f64, approach: Option<Approach>, t: f64) -> f64 {
    match approach {
        None => value,
        Some(a) if a.time_constant <= 0.0 => a.target,
        Some(a) => {
            let elapsed = (t - a.start).max(0.0);
            a.target + (value - a.target) * (-elapsed / a.time_constant).exp()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_until_first_event() {
        let mut p = ParamTimeline::new(0.25);
        p.schedule(Automation::SetValue { value: 1.0, time: 1.0 });
        assert_eq!(p.value_at(0.5), 0.25);
        assert_eq!(p.value_at(1.0), 1.0);
        assert_eq!(p.value_at(5.0), 1.0);
    }

    #[test]
    fn adsr_shape() {
        // 0 -> 0.6 over 0.1s, then -> 0.3 over 0.2s
        let mut p = ParamTimeline::new(1.0);
        p.schedule(Automation::SetValue { value: 0.0, time: 1.0 });
        p.schedule(Automation::LinearRamp { value: 0.6, end: 1.1 });
        p.schedule(Automation::LinearRamp { value: 0.3, end: 1.3 });

        assert!((p.value_at(1.05) - 0.3).abs() < 1e-9, "mid attack");
        assert!((p.value_at(1.1) - 0.6).abs() < 1e-9, "peak");
        assert!((p.value_at(1.2) - 0.45).abs() < 1e-9, "mid decay");
        assert!((p.value_at(2.0) - 0.3).abs() < 1e-9, "sustain holds");
    }

    #[test]
    fn exponential_ramp_reaches_floor() {
        let mut p = ParamTimeline::new(0.0);
        p.schedule(Automation::SetValue { value: 1.0, time: 0.0 });
        p.schedule(Automation::ExponentialRamp { value: 0.001, end: 0.4 });

        let mid = p.value_at(0.2);
        assert!(
            (mid - 0.001_f64.sqrt()).abs() < 1e-9,
            "halfway should be the geometric mean, got {mid}"
        );
        assert!((p.value_at(0.4) - 0.001).abs() < 1e-12);
    }

    #[test]
    fn exponential_ramp_from_zero_holds() {
        let mut p = ParamTimeline::new(0.0);
        p.schedule(Automation::ExponentialRamp { value: 1.0, end: 1.0 });
        assert_eq!(p.value_at(0.5), 0.0);
        assert_eq!(p.value_at(1.0), 1.0);
    }

    #[test]
    fn set_target_converges() {
        let mut p = ParamTimeline::new(1.0);
        p.schedule(Automation::SetTarget {
            target: 0.5,
            start: 0.0,
            time_constant: 0.01,
        });
        let early = p.value_at(0.01);
        assert!(early < 1.0 && early > 0.5, "one time constant in: {early}");
        assert!((p.value_at(0.2) - 0.5).abs() < 1e-6, "settled");
    }

    #[test]
    fn chained_targets_start_from_settled_value() {
        let mut p = ParamTimeline::new(0.0);
        p.schedule(Automation::SetTarget {
            target: 0.5,
            start: 0.0,
            time_constant: 0.01,
        });
        p.schedule(Automation::SetTarget {
            target: 0.0,
            start: 1.0,
            time_constant: 0.01,
        });
        assert!((p.value_at(0.99) - 0.5).abs() < 1e-6);
        assert!(p.value_at(2.0).abs() < 1e-6);
    }

    #[test]
    fn cancel_from_drops_later_events() {
        let mut p = ParamTimeline::new(0.0);
        p.schedule(Automation::SetValue { value: 1.0, time: 0.0 });
        p.schedule(Automation::LinearRamp { value: 0.0, end: 2.0 });
        p.cancel_from(1.0);
        assert_eq!(p.events().len(), 1);
        assert_eq!(p.value_at(1.5), 1.0);
    }

    #[test]
    fn events_stay_sorted() {
        let mut p = ParamTimeline::new(0.0);
        p.schedule(Automation::SetValue { value: 2.0, time: 2.0 });
        p.schedule(Automation::SetValue { value: 1.0, time: 1.0 });
        let times: Vec<f64> = p.events().iter().map(|e| e.time()).collect();
        assert_eq!(times, vec![1.0, 2.0]);
    }
}
