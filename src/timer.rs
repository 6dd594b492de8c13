//! One-shot host timers with cancellable handles.
//!
//! The queue keeps its own millisecond clock. The host advances it (from an
//! AudioWorklet message, a tokio interval, or a test) and drains whatever
//! has come due.

/// Identifies a scheduled task until it fires or is cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerHandle(u64);

#[derive(Debug)]
struct Entry<T> {
    due: f64,
    handle: TimerHandle,
    task: T,
}

#[derive(Debug)]
pub struct TimerQueue<T> {
    now_ms: f64,
    next_id: u64,
    entries: Vec<Entry<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> TimerQueue<T> {
    pub fn new() -> Self {
        TimerQueue {
            now_ms: 0.0,
            next_id: 0,
            entries: Vec::new(),
        }
    }

    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    /// Move the clock forward. Going backwards is ignored.
    pub fn advance_to(&mut self, now_ms: f64) {
        if now_ms > self.now_ms {
            self.now_ms = now_ms;
        }
    }

    /// Run `task` once, `delay_ms` from now. Negative delays fire on the next drain.
    pub fn schedule(&mut self, delay_ms: f64, task: T) -> TimerHandle {
        let handle = TimerHandle(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry {
            due: self.now_ms + delay_ms.max(0.0),
            handle,
            task,
        });
        handle
    }

    /// Returns whether the task was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.handle != handle);
        self.entries.len() != before
    }

    /// Cancel every pending task matching `pred`. Returns how many were dropped.
    pub fn cancel_where(&mut self, mut pred: impl FnMut(&T) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| !pred(&e.task));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.entries.iter().any(|e| e.handle == handle)
    }

    /// Remove and return the earliest task that is due. Ties fire in
    /// scheduling order.
    pub fn pop_due(&mut self) -> Option<(TimerHandle, T)> {
        let now = self.now_ms;
        let idx = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, e)| e.due <= now)
            .min_by(|(_, a), (_, b)| a.due.total_cmp(&b.due).then(a.handle.0.cmp(&b.handle.0)))
            .map(|(i, _)| i)?;
        let entry = self.entries.remove(idx);
        Some((entry.handle, entry.task))
    }

    /// Due time of the earliest pending task.
    pub fn next_due(&self) -> Option<f64> {
        self.entries.iter().map(|e| e.due).min_by(f64::total_cmp)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tasks(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|e| &e.task)
    }
}
