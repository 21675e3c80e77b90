//! Change debouncing: selectors collect between idle periods and are flushed
//! together.

use std::collections::BTreeSet;
use std::time::Instant;

use log::debug;

use crate::platform::{IdleHandle, IdleScheduler};

pub struct Debouncer {
    scheduler: Box<dyn IdleScheduler>,
    pending: BTreeSet<String>,
    scheduled: Option<IdleHandle>,
}

impl Debouncer {
    pub fn new(scheduler: impl IdleScheduler + 'static) -> Self {
        Self::boxed(Box::new(scheduler))
    }

    pub fn boxed(scheduler: Box<dyn IdleScheduler>) -> Self {
        Self {
            scheduler,
            pending: BTreeSet::new(),
            scheduled: None,
        }
    }

    /// Add selectors and push the flush back to the next idle period.
    pub fn queue<I>(&mut self, selectors: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.pending.extend(selectors);
        if let Some(previous) = self.scheduled.take() {
            self.scheduler.cancel(previous);
        }
        let handle = self.scheduler.request();
        debug!(
            "flush of {} selectors scheduled as {}",
            self.pending.len(),
            handle.id()
        );
        self.scheduled = Some(handle);
    }

    /// Forget a pending selector without touching the schedule.
    pub fn discard(&mut self, selector: &str) -> bool {
        self.pending.remove(selector)
    }

    pub fn pending(&self) -> impl Iterator<Item = &str> {
        self.pending.iter().map(String::as_str)
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled.is_some()
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.scheduler.next_deadline()
    }

    /// Run the scheduler up to `now`. When the scheduled flush is due, the
    /// pending selectors are handed over and the set is left empty.
    pub fn poll(&mut self, now: Instant) -> Option<BTreeSet<String>> {
        let due = self.scheduler.poll_due(now);
        let scheduled = self.scheduled?;
        if !due.contains(&scheduled) {
            return None;
        }
        self.scheduled = None;
        Some(std::mem::take(&mut self.pending))
    }

    /// Drop the schedule and everything pending.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.scheduled.take() {
            self.scheduler.cancel(handle);
        }
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{IdleQueue, TimeoutScheduler};
    use std::time::Duration;

    #[test]
    fn rapid_changes_collapse_into_one_flush() {
        let mut d = Debouncer::new(IdleQueue::new());
        for _ in 0..5 {
            d.queue(["#a".to_string()]);
        }
        d.queue(["#b".to_string()]);
        let flushed = d.poll(Instant::now()).unwrap();
        assert_eq!(flushed.into_iter().collect::<Vec<_>>(), vec!["#a", "#b"]);
        assert!(d.poll(Instant::now()).is_none());
        assert!(!d.is_scheduled());
    }

    #[test]
    fn timer_fallback_reschedules_too() {
        let mut d = Debouncer::new(TimeoutScheduler::new(Duration::from_millis(1)));
        d.queue(["#a".to_string()]);
        let first = d.next_deadline().unwrap();
        d.queue(["#a".to_string()]);
        let second = d.next_deadline().unwrap();
        assert!(second >= first);
        assert!(d.poll(first - Duration::from_millis(1)).is_none());
        assert_eq!(d.poll(second).map(|s| s.len()), Some(1));
    }

    #[test]
    fn discard_and_cancel() {
        let mut d = Debouncer::new(IdleQueue::new());
        d.queue(["#a".to_string(), "#b".to_string()]);
        assert!(d.discard("#a"));
        assert_eq!(d.pending().collect::<Vec<_>>(), vec!["#b"]);
        d.cancel();
        assert!(d.poll(Instant::now()).is_none());
        assert_eq!(d.pending().count(), 0);
    }
}
