use super::shift;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Virtual clock: time only moves when `advance` or `fire_next` is called, and
/// due timers run inline, in due order, on the caller's task.
pub struct ManualClock {
    state: Mutex<ManualState>,
}

struct ManualState {
    now: DateTime<Utc>,
    next_id: u64,
    pending: Vec<PendingTimer>,
}

struct PendingTimer {
    handle: TimerHandle,
    due: DateTime<Utc>,
    delay: Duration,
    task: TimerTask,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: start,
                next_id: 1,
                pending: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, ManualState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn pending_count(&self) -> usize {
        self.state().pending.len()
    }

    /// Delays the pending timers were armed with, earliest due first.
    pub fn pending_delays(&self) -> Vec<Duration> {
        let state = self.state();
        let mut timers: Vec<_> = state.pending.iter().map(|t| (t.due, t.delay)).collect();
        timers.sort_by_key(|(due, _)| *due);
        timers.into_iter().map(|(_, delay)| delay).collect()
    }

    /// Moves time forward by `by`, running every timer that falls due on the way.
    pub async fn advance(&self, by: Duration) {
        let target = shift(self.now(), by);
        while let Some(task) = self.take_due(Some(target)) {
            task.await;
        }
        let mut state = self.state();
        if state.now < target {
            state.now = target;
        }
    }

    /// Jumps to the earliest pending timer and runs it. Returns the delay it was
    /// armed with, or `None` when nothing is pending.
    pub async fn fire_next(&self) -> Option<Duration> {
        let delay = {
            let state = self.state();
            state
                .pending
                .iter()
                .min_by_key(|t| (t.due, t.handle))
                .map(|t| t.delay)?
        };
        let task = self.take_due(None)?;
        task.await;
        Some(delay)
    }

    fn take_due(&self, limit: Option<DateTime<Utc>>) -> Option<TimerTask> {
        let mut state = self.state();
        let index = state
            .pending
            .iter()
            .enumerate()
            .filter(|(_, t)| limit.is_none_or(|limit| t.due <= limit))
            .min_by_key(|(_, t)| (t.due, t.handle))
            .map(|(index, _)| index)?;
        let timer = state.pending.swap_remove(index);
        if timer.due > state.now {
            state.now = timer.due;
        }
        Some(timer.task)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.state().now
    }

    fn set_timer(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let mut state = self.state();
        let handle = TimerHandle(state.next_id);
        state.next_id += 1;
        let due = shift(state.now, delay);
        state.pending.push(PendingTimer {
            handle,
            due,
            delay,
            task,
        });
        handle
    }

    fn cancel_timer(&self, handle: TimerHandle) {
        self.state().pending.retain(|t| t.handle != handle);
    }
}
