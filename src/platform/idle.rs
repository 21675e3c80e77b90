use std::time::{Duration, Instant};

/// Opaque handle of one scheduled idle callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdleHandle(u64);

impl IdleHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Deferred execution in the `requestIdleCallback` shape.
///
/// The scheduler only hands out and expires handles; whoever drives the page
/// calls [`poll_due`](IdleScheduler::poll_due) and runs the work for each
/// handle it returns.
pub trait IdleScheduler: Send {
    fn request(&mut self) -> IdleHandle;

    /// Cancel a pending callback. Unknown or already fired handles are ignored.
    fn cancel(&mut self, handle: IdleHandle);

    /// Remove and return the callbacks that may run at `now`.
    fn poll_due(&mut self, now: Instant) -> Vec<IdleHandle>;

    /// Earliest instant a pending callback becomes due, if the scheduler is
    /// time based.
    fn next_deadline(&self) -> Option<Instant> {
        None
    }

    fn has_pending(&self) -> bool;
}

/// Native idle queue: every pending callback runs on the next idle period.
#[derive(Debug, Default)]
pub struct IdleQueue {
    next: u64,
    pending: Vec<IdleHandle>,
}

impl IdleQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdleScheduler for IdleQueue {
    fn request(&mut self) -> IdleHandle {
        self.next += 1;
        let handle = IdleHandle(self.next);
        self.pending.push(handle);
        handle
    }

    fn cancel(&mut self, handle: IdleHandle) {
        self.pending.retain(|h| *h != handle);
    }

    fn poll_due(&mut self, _now: Instant) -> Vec<IdleHandle> {
        std::mem::take(&mut self.pending)
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Timer fallback for pages without an idle API: a callback becomes due
/// `relaxation` after it was requested.
#[derive(Debug)]
pub struct TimeoutScheduler {
    relaxation: Duration,
    next: u64,
    pending: Vec<(IdleHandle, Instant)>,
}

impl TimeoutScheduler {
    pub fn new(relaxation: Duration) -> Self {
        Self {
            relaxation,
            next: 0,
            pending: Vec::new(),
        }
    }
}

impl Default for TimeoutScheduler {
    fn default() -> Self {
        Self::new(Duration::from_millis(1))
    }
}

impl IdleScheduler for TimeoutScheduler {
    fn request(&mut self) -> IdleHandle {
        self.next += 1;
        let handle = IdleHandle(self.next);
        self.pending.push((handle, Instant::now() + self.relaxation));
        handle
    }

    fn cancel(&mut self, handle: IdleHandle) {
        self.pending.retain(|(h, _)| *h != handle);
    }

    fn poll_due(&mut self, now: Instant) -> Vec<IdleHandle> {
        let (due, waiting): (Vec<_>, Vec<_>) = self
            .pending
            .drain(..)
            .partition(|(_, deadline)| *deadline <= now);
        self.pending = waiting;
        due.into_iter().map(|(h, _)| h).collect()
    }

    fn next_deadline(&self) -> Option<Instant> {
        self.pending.iter().map(|(_, deadline)| *deadline).min()
    }

    fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_queue_cancel_drops_only_that_handle() {
        let mut q = IdleQueue::new();
        let a = q.request();
        let b = q.request();
        q.cancel(a);
        assert_eq!(q.poll_due(Instant::now()), vec![b]);
        assert!(!q.has_pending());
    }

    #[test]
    fn timeout_waits_for_relaxation() {
        let mut t = TimeoutScheduler::new(Duration::from_millis(50));
        let h = t.request();
        let requested = Instant::now();
        assert!(t.poll_due(requested - Duration::from_millis(1)).is_empty());
        let deadline = t.next_deadline().unwrap();
        assert_eq!(t.poll_due(deadline), vec![h]);
        assert!(t.next_deadline().is_none());
    }
}
