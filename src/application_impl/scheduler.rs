use super::expiry;
use crate::application_port::LifecycleConfig;
use crate::domain_model::Session;
use crate::domain_port::*;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Owns the single pending refresh timer of one owner.
///
/// Each arming gets a fresh ticket which the task receives; when the timer
/// fires the owner calls `take_fired(ticket)` and drops the work if a newer
/// timer has replaced it in the meantime.
pub struct RefreshScheduler {
    clock: Arc<dyn Clock>,
    buffer: Duration,
    min_interval: Duration,
    next_ticket: u64,
    pending: Option<(TimerHandle, u64)>,
}

impl RefreshScheduler {
    pub fn new(clock: Arc<dyn Clock>, config: &LifecycleConfig) -> Self {
        Self {
            clock,
            buffer: config.buffer,
            min_interval: config.min_refresh_interval,
            next_ticket: 1,
            pending: None,
        }
    }

    /// `max(min_interval, time_until_expiry - buffer)`
    pub fn next_delay(&self, session: Option<&Session>, now: DateTime<Utc>) -> Duration {
        expiry::time_until_expiry(session, now)
            .saturating_sub(self.buffer)
            .max(self.min_interval)
    }

    /// Replaces any pending timer with one due at the next refresh check.
    pub fn schedule_next<F>(
        &mut self,
        session: Option<&Session>,
        now: DateTime<Utc>,
        make_task: F,
    ) -> Duration
    where
        F: FnOnce(u64) -> TimerTask,
    {
        let delay = self.next_delay(session, now);
        self.arm(delay, make_task);
        delay
    }

    /// Replaces any pending timer with one firing after `delay`.
    pub fn arm<F>(&mut self, delay: Duration, make_task: F)
    where
        F: FnOnce(u64) -> TimerTask,
    {
        self.cancel();
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let handle = self.clock.set_timer(delay, make_task(ticket));
        self.pending = Some((handle, ticket));
    }

    pub fn cancel(&mut self) {
        if let Some((handle, _)) = self.pending.take() {
            self.clock.cancel_timer(handle);
        }
    }

    /// Marks the timer behind `ticket` as fired. False for a superseded timer.
    pub fn take_fired(&mut self, ticket: u64) -> bool {
        match self.pending {
            Some((_, current)) if current == ticket => {
                self.pending = None;
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.pending.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::{SessionUser, UserId};
    use crate::infra_clock::ManualClock;
    use chrono::TimeDelta;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn session_expiring(now: DateTime<Utc>, in_ms: i64) -> Session {
        Session::new(
            "access",
            None,
            now + TimeDelta::milliseconds(in_ms),
            SessionUser {
                id: UserId(uuid::Uuid::nil()),
                email: None,
            },
        )
    }

    fn noop(_: u64) -> TimerTask {
        Box::pin(async {})
    }

    #[test]
    fn delay_leads_expiry_by_buffer() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let now = clock.now();
        let mut scheduler = RefreshScheduler::new(clock.clone(), &LifecycleConfig::default());

        let session = session_expiring(now, 3_600_000);
        let delay = scheduler.schedule_next(Some(&session), now, noop);

        assert_eq!(delay, Duration::from_millis(3_300_000));
        assert_eq!(clock.pending_delays(), vec![Duration::from_millis(3_300_000)]);
    }

    #[test]
    fn delay_never_drops_below_min_interval() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let now = clock.now();
        let scheduler = RefreshScheduler::new(clock, &LifecycleConfig::default());

        let nearly_expired = session_expiring(now, 60_000);
        assert_eq!(
            scheduler.next_delay(Some(&nearly_expired), now),
            Duration::from_millis(30_000)
        );
        assert_eq!(scheduler.next_delay(None, now), Duration::from_millis(30_000));
    }

    #[test]
    fn at_most_one_timer_is_pending() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let now = clock.now();
        let mut scheduler = RefreshScheduler::new(clock.clone(), &LifecycleConfig::default());
        let session = session_expiring(now, 3_600_000);

        for _ in 0..5 {
            scheduler.schedule_next(Some(&session), now, noop);
            assert_eq!(clock.pending_count(), 1);
        }
        scheduler.arm(Duration::from_secs(1), noop);
        assert_eq!(clock.pending_count(), 1);

        scheduler.cancel();
        scheduler.cancel();
        assert_eq!(clock.pending_count(), 0);
        assert!(!scheduler.is_armed());
    }

    #[tokio::test]
    async fn superseded_ticket_is_not_current() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut scheduler = RefreshScheduler::new(clock.clone(), &LifecycleConfig::default());
        let fired = Arc::new(AtomicUsize::new(0));

        let mut first_ticket = 0;
        scheduler.arm(Duration::from_secs(1), |ticket| {
            first_ticket = ticket;
            noop(ticket)
        });
        let mut second_ticket = 0;
        let counter = fired.clone();
        scheduler.arm(Duration::from_secs(2), |ticket| {
            second_ticket = ticket;
            let task: TimerTask = Box::pin(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
            task
        });

        assert!(!scheduler.take_fired(first_ticket));
        clock.advance(Duration::from_secs(3)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert!(scheduler.take_fired(second_ticket));
        assert!(!scheduler.is_armed());
    }
}
