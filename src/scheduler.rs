//! Timers for the event loop
//!
//! Nothing here sleeps. Components schedule a [`Timer`] with a delay, the
//! event loop uses [`Scheduler::time_until_next`] as its poll timeout and
//! hands back whatever [`Scheduler::take_due`] returns.

use log::debug;
use std::time::{Duration, Instant};

/// Things that can be waiting on the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timer {
    /// Reconnect attempt; `generation` must still match the manager's
    Retry { generation: u64 },
    /// Pause between one utterance finishing and the next starting
    SpeechSettle,
}

#[derive(Debug)]
struct Scheduled {
    when: Instant,
    delay: Duration,
    timer: Timer,
}

/// Pending timers ordered by deadline
#[derive(Debug, Default)]
pub struct Scheduler {
    entries: Vec<Scheduled>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `timer` to fire after `delay`
    pub fn schedule(&mut self, delay: Duration, timer: Timer) {
        debug!("Scheduling {:?} in {:?}", timer, delay);
        let when = Instant::now() + delay;
        let idx = self.entries.partition_point(|e| e.when <= when);
        self.entries.insert(idx, Scheduled { when, delay, timer });
    }

    /// Drop every pending timer matching `pred`
    pub fn cancel<F>(&mut self, pred: F)
    where
        F: Fn(&Timer) -> bool,
    {
        self.entries.retain(|e| !pred(&e.timer));
    }

    /// Remove and return all timers whose deadline has passed
    pub fn take_due(&mut self, now: Instant) -> Vec<Timer> {
        let split = self.entries.partition_point(|e| e.when <= now);
        self.entries.drain(..split).map(|e| e.timer).collect()
    }

    /// Remove and return the earliest timer regardless of its deadline
    ///
    /// Lets a driver fast-forward the clock one timer at a time.
    pub fn take_next(&mut self) -> Option<Timer> {
        if self.entries.is_empty() {
            None
        } else {
            Some(self.entries.remove(0).timer)
        }
    }

    /// Time until the earliest deadline, `None` when nothing is pending
    pub fn time_until_next(&self, now: Instant) -> Option<Duration> {
        self.entries
            .first()
            .map(|e| e.when.saturating_duration_since(now))
    }

    /// Pending timers with the delay each was scheduled with
    pub fn pending(&self) -> impl Iterator<Item = (Timer, Duration)> + '_ {
        self.entries.iter().map(|e| (e.timer, e.delay))
    }

    pub fn is_pending(&self, timer: Timer) -> bool {
        self.entries.iter().any(|e| e.timer == timer)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_due_in_deadline_order() {
        let mut sched = Scheduler::new();
        sched.schedule(Duration::from_millis(0), Timer::SpeechSettle);
        sched.schedule(Duration::from_secs(60), Timer::Retry { generation: 1 });

        let due = sched.take_due(Instant::now() + Duration::from_millis(1));
        assert_eq!(due, vec![Timer::SpeechSettle]);
        assert_eq!(sched.len(), 1);
    }

    #[test]
    fn test_cancel() {
        let mut sched = Scheduler::new();
        sched.schedule(Duration::from_secs(1), Timer::Retry { generation: 1 });
        sched.schedule(Duration::from_secs(1), Timer::SpeechSettle);

        sched.cancel(|t| matches!(t, Timer::Retry { .. }));
        assert!(!sched.is_pending(Timer::Retry { generation: 1 }));
        assert!(sched.is_pending(Timer::SpeechSettle));
    }

    #[test]
    fn test_time_until_next() {
        let mut sched = Scheduler::new();
        assert_eq!(sched.time_until_next(Instant::now()), None);

        sched.schedule(Duration::from_secs(2), Timer::SpeechSettle);
        // Read the clock after scheduling so the deadline can't be further
        // away than the delay
        let now = Instant::now();
        let wait = sched.time_until_next(now).unwrap();
        assert!(wait <= Duration::from_secs(2));
        assert!(wait > Duration::from_secs(1));
    }

    #[test]
    fn test_take_next_ignores_clock() {
        let mut sched = Scheduler::new();
        sched.schedule(Duration::from_secs(30), Timer::Retry { generation: 7 });
        sched.schedule(Duration::from_secs(2), Timer::Retry { generation: 6 });

        assert_eq!(sched.take_next(), Some(Timer::Retry { generation: 6 }));
        assert_eq!(sched.take_next(), Some(Timer::Retry { generation: 7 }));
        assert_eq!(sched.take_next(), None);
    }
}
