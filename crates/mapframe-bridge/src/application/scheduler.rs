//! Virtual-time timer queue.
//!
//! The bridge never sleeps.  Anything that would have been a `setTimeout` in
//! a browser is a [`TimerKind`] scheduled here against the injected clock's
//! time.  The runtime (or a test) asks for the [`Scheduler::next_deadline`],
//! advances time however it likes, and then pops the timers that are due.

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// Next discovery attempt.
    SearchTick,
    /// Forces readiness when the map's load signal never fires.
    MapWaitFallback,
    /// Delayed readiness for an application of unrecognized shape.
    UnknownShapeFallback,
    /// Deferred replay of queued messages after readiness.
    FlushQueue,
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    due_ms: u64,
    seq: u64,
    kind: TimerKind,
}

/// Pending timers, fired earliest first and in scheduling order on ties.
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: Vec<Timer>,
    next_seq: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `kind` to fire `delay_ms` after `now_ms`.
    pub fn schedule(&mut self, now_ms: u64, delay_ms: u64, kind: TimerKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.push(Timer {
            due_ms: now_ms.saturating_add(delay_ms),
            seq,
            kind,
        });
    }

    /// Cancels every pending timer of `kind`.  Returns `true` if any was
    /// pending.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        let before = self.timers.len();
        self.timers.retain(|t| t.kind != kind);
        self.timers.len() != before
    }

    pub fn is_scheduled(&self, kind: TimerKind) -> bool {
        self.timers.iter().any(|t| t.kind == kind)
    }

    pub fn clear(&mut self) {
        self.timers.clear();
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Absolute time of the earliest pending timer.
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.iter().map(|t| t.due_ms).min()
    }

    /// Removes and returns the earliest timer due at or before `now_ms`.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<TimerKind> {
        let index = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due_ms <= now_ms)
            .min_by_key(|(_, t)| (t.due_ms, t.seq))
            .map(|(i, _)| i)?;
        Some(self.timers.swap_remove(index).kind)
    }
}
