//! Lookahead transport.
//!
//! The host timer only wakes the loop; timing precision comes from the audio
//! clock. Each tick emits every step whose cursor falls inside the lookahead
//! window, stamped with the audio time it must sound at. The cursor grid is
//! never swung: swing only shifts the emitted times, so the step count over a
//! span of time does not depend on the swing amount.

use serde::Serialize;

use crate::config::Timing;
use crate::engine::Task;
use crate::pattern::GridLayout;
use crate::timer::{TimerHandle, TimerQueue};

pub const MIN_TEMPO: f64 = 30.0;
pub const MAX_TEMPO: f64 = 300.0;
/// Share of a step added to odd steps at full swing.
const SWING_LATE: f64 = 0.67;
/// Share of a step removed from even steps at full swing.
const SWING_EARLY: f64 = 0.33;
/// Recovered cursors land this far ahead of the audio clock.
const RECOVER_LEAD: f64 = 0.01;

/// A step to play.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepEvent {
    pub column: usize,
    /// Audio time the step sounds at, swing applied.
    pub time: f64,
    /// Unswung cursor position of the step.
    pub grid_time: f64,
}

/// Transport position saved by a pause.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseSnapshot {
    pub paused_at: f64,
    pub step: usize,
    pub cursor: f64,
}

#[derive(Debug)]
pub struct Scheduler {
    timing: Timing,
    columns: usize,
    steps_per_beat: f64,
    tempo: f64,
    swing: f64,
    step: usize,
    cursor: f64,
    running: bool,
    paused: Option<PauseSnapshot>,
    loop_task: Option<TimerHandle>,
}

impl Scheduler {
    pub fn new(timing: Timing, layout: GridLayout, tempo: f64) -> Self {
        Scheduler {
            timing,
            columns: layout.columns(),
            steps_per_beat: layout.steps_per_beat(),
            tempo: clamp_tempo(tempo),
            swing: 0.0,
            step: 0,
            cursor: 0.0,
            running: false,
            paused: None,
            loop_task: None,
        }
    }

    pub fn timing(&self) -> &Timing {
        &self.timing
    }

    pub fn tempo(&self) -> f64 {
        self.tempo
    }

    pub fn swing(&self) -> f64 {
        self.swing
    }

    /// Column the next emitted step plays.
    pub fn step(&self) -> usize {
        self.step
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pause_snapshot(&self) -> Option<PauseSnapshot> {
        self.paused
    }

    pub fn seconds_per_step(&self) -> f64 {
        60.0 / self.tempo / self.steps_per_beat
    }

    /// Replace the pending loop task with one firing after `delay_ms`.
    fn arm(&mut self, timers: &mut TimerQueue<Task>, delay_ms: f64) {
        if let Some(handle) = self.loop_task.take() {
            timers.cancel(handle);
        }
        self.loop_task = Some(timers.schedule(delay_ms, Task::Tick));
    }

    fn disarm(&mut self, timers: &mut TimerQueue<Task>) {
        if let Some(handle) = self.loop_task.take() {
            timers.cancel(handle);
        }
    }

    /// Start from column 0. The first step is placed slightly behind `now`
    /// so the first tick emits it at once.
    pub fn start(&mut self, now: f64, timers: &mut TimerQueue<Task>) {
        self.step = 0;
        self.cursor = now - self.timing.start_offset;
        self.running = true;
        self.paused = None;
        self.arm(timers, 0.0);
        log::info!("transport started at {now:.3}s, {} BPM", self.tempo);
    }

    /// Emit every step due within the lookahead window of `now`.
    pub fn collect(&mut self, now: f64) -> Vec<StepEvent> {
        let mut events = Vec::new();
        if !self.running {
            return events;
        }
        if self.cursor < now - self.timing.drift_tolerance {
            log::warn!(
                "scheduler fell {:.3}s behind the audio clock, snapping forward",
                now - self.cursor
            );
            self.cursor = now + RECOVER_LEAD;
        }

        let spd = self.seconds_per_step();
        let horizon = now + self.timing.schedule_ahead;
        while self.cursor <= horizon {
            let time = (self.cursor + self.swing_offset(self.step, spd)).max(now);
            events.push(StepEvent {
                column: self.step,
                time,
                grid_time: self.cursor,
            });
            self.step = (self.step + 1) % self.columns;
            self.cursor += spd;
        }
        events
    }

    fn swing_offset(&self, step: usize, spd: f64) -> f64 {
        let amount = spd * self.swing / 100.0;
        if step % 2 == 1 {
            amount * SWING_LATE
        } else {
            -amount * SWING_EARLY
        }
    }

    /// Re-arm the loop after a tick. A failed tick moves the cursor to just
    /// ahead of `now` and retries after the platform's error delay; the
    /// transport keeps running either way.
    pub fn finish_tick(&mut self, now: f64, ok: bool, timers: &mut TimerQueue<Task>) {
        if !self.running {
            return;
        }
        if ok {
            let interval = self.timing.loop_interval_ms();
            self.arm(timers, interval);
        } else {
            self.recover(now);
            let retry = self.timing.error_retry_ms;
            self.arm(timers, retry);
        }
    }

    pub fn recover(&mut self, now: f64) {
        self.cursor = now + RECOVER_LEAD;
    }

    /// Save the position and halt the loop. Returns `None` when the
    /// transport was not running.
    pub fn pause(&mut self, now: f64, timers: &mut TimerQueue<Task>) -> Option<PauseSnapshot> {
        if !self.running {
            return None;
        }
        let snapshot = PauseSnapshot {
            paused_at: now,
            step: self.step,
            cursor: self.cursor,
        };
        self.paused = Some(snapshot);
        self.running = false;
        self.disarm(timers);
        log::info!("transport paused at step {}", self.step);
        Some(snapshot)
    }

    /// Continue after a pause. With `is_pattern_change` the cursor keeps its
    /// place on the timeline, shifted by the time spent paused; otherwise it
    /// restarts at `now`. Does nothing while already running.
    pub fn resume(&mut self, now: f64, is_pattern_change: bool, timers: &mut TimerQueue<Task>) {
        if self.running {
            return;
        }
        match self.paused.take() {
            Some(snapshot) => {
                self.step = snapshot.step;
                self.cursor = if is_pattern_change {
                    snapshot.cursor + (now - snapshot.paused_at)
                } else {
                    now
                };
            }
            None => self.cursor = now,
        }
        self.running = true;
        self.arm(timers, 0.0);
        log::info!("transport resumed at step {}", self.step);
    }

    /// Halt and rewind to column 0.
    pub fn stop(&mut self, timers: &mut TimerQueue<Task>) {
        self.disarm(timers);
        self.running = false;
        self.step = 0;
        self.cursor = 0.0;
        self.paused = None;
        log::info!("transport stopped");
    }

    /// Clamp to 30..=300 BPM. A running loop is re-armed at once with its
    /// cursor and step untouched.
    pub fn set_tempo(&mut self, bpm: f64, timers: &mut TimerQueue<Task>) -> f64 {
        self.tempo = clamp_tempo(bpm);
        if self.running {
            self.arm(timers, 0.0);
        }
        self.tempo
    }

    /// Clamp to 0..=100.
    pub fn set_swing(&mut self, amount: f64) -> f64 {
        self.swing = if amount.is_nan() { 0.0 } else { amount.clamp(0.0, 100.0) };
        self.swing
    }
}

fn clamp_tempo(bpm: f64) -> f64 {
    if bpm.is_nan() {
        log::warn!("tempo is not a number, using {MIN_TEMPO}");
        return MIN_TEMPO;
    }
    bpm.clamp(MIN_TEMPO, MAX_TEMPO)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Platform;

    fn desktop(layout: GridLayout, tempo: f64) -> (Scheduler, TimerQueue<Task>) {
        (
            Scheduler::new(Timing::for_platform(Platform::Desktop), layout, tempo),
            TimerQueue::new(),
        )
    }

    /// Drive the loop the way a host timer would, returning every event.
    fn run(sched: &mut Scheduler, timers: &mut TimerQueue<Task>, until: f64) -> Vec<StepEvent> {
        let mut events = Vec::new();
        let mut now = timers.now_ms() / 1000.0;
        while now <= until {
            timers.advance_to(now * 1000.0);
            while let Some((_, task)) = timers.pop_due() {
                if matches!(task, Task::Tick) {
                    events.extend(sched.collect(now));
                    sched.finish_tick(now, true, timers);
                }
            }
            now += 0.001;
        }
        events
    }

    #[test]
    fn step_length_follows_tempo_and_layout() {
        let (s, _) = desktop(GridLayout::Halves, 120.0);
        assert_eq!(s.seconds_per_step(), 0.25);
        let (s, _) = desktop(GridLayout::Steps16, 120.0);
        assert_eq!(s.seconds_per_step(), 0.125);
    }

    #[test]
    fn start_emits_first_step_immediately() {
        let (mut s, mut t) = desktop(GridLayout::Halves, 120.0);
        s.start(1.0, &mut t);
        let events = s.collect(1.0);
        assert_eq!(events.len(), 1, "only one step fits in 0.15 s at 0.25 s per step");
        assert_eq!(events[0].column, 0);
        assert_eq!(events[0].time, 1.0, "step behind now is clamped to now");
        assert!((events[0].grid_time - 0.95).abs() < 1e-12);
        assert_eq!(s.step(), 1);
    }

    #[test]
    fn columns_wrap() {
        let (mut s, mut t) = desktop(GridLayout::Halves, 300.0);
        s.start(0.0, &mut t);
        let events = run(&mut s, &mut t, 2.0);
        let cols: Vec<usize> = events.iter().map(|e| e.column).collect();
        assert_eq!(&cols[..10], &[0, 1, 2, 3, 4, 5, 6, 7, 0, 1]);
        assert!(events.windows(2).all(|w| w[0].grid_time < w[1].grid_time), "increasing cursor order");
    }

    #[test]
    fn step_count_is_tempo_and_swing_invariant() {
        let span = 4.0;
        for tempo in [60.0, 90.0, 120.0, 150.0, 200.0] {
            let mut counts = Vec::new();
            for swing in [0.0, 25.0, 50.0, 100.0] {
                let (mut s, mut t) = desktop(GridLayout::Steps16, tempo);
                s.set_swing(swing);
                s.start(0.0, &mut t);
                let events = run(&mut s, &mut t, span + 0.5);
                let first = events[0].grid_time;
                let count = events.iter().filter(|e| e.grid_time < first + span).count();
                let expected = (span / s.seconds_per_step()).floor() as usize;
                assert!(
                    count.abs_diff(expected) <= 1,
                    "tempo {tempo} swing {swing}: {count} steps, expected about {expected}"
                );
                let last = events.iter().filter(|e| e.grid_time < first + span).last().unwrap();
                assert_eq!(last.column, (count - 1) % 16);
                counts.push(count);
            }
            assert!(counts.windows(2).all(|w| w[0] == w[1]), "swing changed the count: {counts:?}");
        }
    }

    #[test]
    fn swing_delays_odd_and_advances_even_steps() {
        let (mut s, mut t) = desktop(GridLayout::Halves, 120.0);
        s.set_swing(50.0);
        s.start(0.0, &mut t);
        let events = run(&mut s, &mut t, 3.0);
        let spd = 0.25;
        for e in events.iter().skip(1) {
            let offset = e.time - e.grid_time;
            let expected = if e.column % 2 == 1 {
                spd * 0.5 * 0.67
            } else {
                -spd * 0.5 * 0.33
            };
            assert!((offset - expected).abs() < 1e-9, "column {}: offset {offset}", e.column);
        }
    }

    #[test]
    fn swing_and_tempo_are_clamped() {
        let (mut s, mut t) = desktop(GridLayout::Halves, 120.0);
        assert_eq!(s.set_swing(150.0), 100.0);
        assert_eq!(s.set_swing(-3.0), 0.0);
        assert_eq!(s.set_tempo(10.0, &mut t), 30.0);
        assert_eq!(s.set_tempo(900.0, &mut t), 300.0);
        assert!(t.is_empty(), "a stopped transport arms nothing");
    }

    #[test]
    fn drift_snaps_cursor_forward() {
        let (mut s, mut t) = desktop(GridLayout::Halves, 120.0);
        s.start(0.0, &mut t);
        s.collect(0.0);
        // The host stalled for two seconds.
        let events = s.collect(2.0);
        assert!((events[0].grid_time - 2.01).abs() < 1e-9, "cursor snapped to now + 10 ms");
        assert_eq!(events.len(), 1, "no burst of missed steps");
    }

    #[test]
    fn pattern_change_resume_keeps_timeline() {
        let (mut s, mut t) = desktop(GridLayout::Halves, 120.0);
        s.start(0.0, &mut t);
        let events = run(&mut s, &mut t, 0.9);
        assert!(events.len() >= 4);
        let snap = s.pause(0.9, &mut t).unwrap();
        assert!(!s.is_running());
        assert!(t.is_empty(), "loop task cancelled");

        s.resume(2.9, true, &mut t);
        assert_eq!(s.step(), snap.step);
        let cursor = s.cursor();
        assert!(
            (cursor - (snap.cursor + 2.0)).abs() < 1e-9,
            "cursor moved by the pause length: {cursor} vs {}",
            snap.cursor
        );
        let next = s.collect(cursor - 0.05);
        assert_eq!(next[0].grid_time, cursor, "next step lands on the shifted cursor");
        assert_eq!(next[0].column, snap.step);
    }

    #[test]
    fn plain_resume_restarts_at_now() {
        let (mut s, mut t) = desktop(GridLayout::Halves, 120.0);
        s.start(0.0, &mut t);
        run(&mut s, &mut t, 0.6);
        let snap = s.pause(0.6, &mut t).unwrap();
        s.resume(5.0, false, &mut t);
        assert_eq!(s.cursor(), 5.0);
        assert_eq!(s.step(), snap.step);
        assert!(s.pause_snapshot().is_none());
    }

    #[test]
    fn stop_rewinds() {
        let (mut s, mut t) = desktop(GridLayout::Halves, 120.0);
        s.start(0.0, &mut t);
        run(&mut s, &mut t, 1.0);
        s.stop(&mut t);
        assert_eq!((s.step(), s.cursor(), s.is_running()), (0, 0.0, false));
        assert!(t.is_empty());
        assert!(s.collect(2.0).is_empty());
    }

    #[test]
    fn tempo_change_rearms_without_losing_position() {
        let (mut s, mut t) = desktop(GridLayout::Halves, 120.0);
        s.start(0.0, &mut t);
        run(&mut s, &mut t, 0.5);
        let (step, cursor) = (s.step(), s.cursor());
        s.set_tempo(140.0, &mut t);
        assert_eq!((s.step(), s.cursor()), (step, cursor));
        assert_eq!(t.len(), 1, "exactly one loop task");
        assert_eq!(t.next_due(), Some(t.now_ms()));
    }

    #[test]
    fn failed_tick_recovers_and_retries() {
        let (mut s, mut t) = desktop(GridLayout::Halves, 120.0);
        s.start(0.0, &mut t);
        t.pop_due();
        s.finish_tick(1.0, false, &mut t);
        assert!((s.cursor() - 1.01).abs() < 1e-12);
        assert!(s.is_running());
        assert_eq!(t.next_due(), Some(50.0));
    }
}
