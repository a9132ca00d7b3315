use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Work run once when a timer fires.
pub type TimerTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Debug, Clone, Copy, Ord, PartialOrd, Eq, PartialEq, Hash)]
pub struct TimerHandle(pub u64);

/// Time source and one-shot timers.
///
/// Cancelling a timer only prevents it from firing; a task that already
/// started runs to completion.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn set_timer(&self, delay: Duration, task: TimerTask) -> TimerHandle;
    /// No-op for unknown or already fired handles.
    fn cancel_timer(&self, handle: TimerHandle);
}
