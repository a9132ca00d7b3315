use crate::application_port::LifecycleConfig;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub enum AttemptGate {
    Proceed,
    /// An attempt happened within the minimum interval; `retry_in` is what is
    /// left of that window.
    TooSoon { retry_in: Duration },
}

/// Minimum-interval guard and exponential backoff for refresh attempts.
#[derive(Debug, Clone)]
pub struct RetryBackoff {
    initial: Duration,
    max: Duration,
    min_interval: Duration,
    current: Duration,
    last_attempt_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

impl RetryBackoff {
    pub fn new(config: &LifecycleConfig) -> Self {
        Self {
            initial: config.initial_backoff,
            max: config.max_backoff,
            min_interval: config.min_refresh_interval,
            current: config.initial_backoff,
            last_attempt_at: None,
            consecutive_failures: 0,
        }
    }

    /// Checks the minimum interval and, when clear, records `now` as the latest
    /// attempt in the same step.
    pub fn try_begin(&mut self, now: DateTime<Utc>) -> AttemptGate {
        if let Some(last) = self.last_attempt_at {
            // A last attempt in the future (clock stepped back) counts as just now.
            let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
            if elapsed < self.min_interval {
                return AttemptGate::TooSoon {
                    retry_in: self.min_interval - elapsed,
                };
            }
        }
        self.last_attempt_at = Some(now);
        AttemptGate::Proceed
    }

    pub fn record_success(&mut self) {
        self.current = self.initial;
        self.consecutive_failures = 0;
    }

    /// Returns the delay before the next retry and doubles it for the one after.
    pub fn record_failure(&mut self) -> Duration {
        let delay = self.current.min(self.max);
        self.current = self.current.saturating_mul(2).min(self.max);
        self.consecutive_failures += 1;
        delay
    }

    pub fn current_backoff(&self) -> Duration {
        self.current
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn last_attempt_at(&self) -> Option<DateTime<Utc>> {
        self.last_attempt_at
    }
}
