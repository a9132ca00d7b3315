use crate::domain_port::*;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Wall clock backed by tokio timers. `set_timer` must be called inside a runtime.
pub struct TokioClock {
    timers: Arc<DashMap<u64, CancellationToken>>,
    next_id: AtomicU64,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            timers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn pending_count(&self) -> usize {
        self.timers.len()
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn set_timer(&self, delay: Duration, task: TimerTask) -> TimerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        self.timers.insert(id, token.clone());

        let timers = self.timers.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    tracing::trace!(timer = id, "timer cancelled");
                }
                _ = tokio::time::sleep(delay) => {
                    timers.remove(&id);
                    task.await;
                }
            }
        });

        TimerHandle(id)
    }

    fn cancel_timer(&self, handle: TimerHandle) {
        if let Some((_, token)) = self.timers.remove(&handle.0) {
            token.cancel();
        }
    }
}
