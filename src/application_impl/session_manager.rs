use super::backoff::{AttemptGate, RetryBackoff};
use super::expiry;
use super::scheduler::RefreshScheduler;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::broadcast;

const EVENT_CHANNEL_CAP: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Timer,
    OnDemand,
}

/// Per-owner refresh bookkeeping.
///
/// Only touched under the manager's mutex, which is never held across an
/// `.await`. `epoch` changes on every start and stop so that a refresh which
/// completes after the owner was stopped cannot re-arm a timer.
struct RefreshAttemptState {
    phase: LifecyclePhase,
    epoch: u64,
    backoff: RetryBackoff,
    scheduler: RefreshScheduler,
}

impl RefreshAttemptState {
    fn is_live(&self, epoch: u64) -> bool {
        self.epoch == epoch && self.phase != LifecyclePhase::Unmonitored
    }
}

/// Keeps one client's session fresh: a background timer refreshes ahead of
/// expiry, and `ensure_fresh_session` refreshes on demand before sensitive work.
pub struct SessionManager {
    client_id: ClientId,
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
    state: Mutex<RefreshAttemptState>,
    events: broadcast::Sender<LifecycleEvent>,
    this: Weak<SessionManager>,
}

impl SessionManager {
    pub fn new(
        client_id: ClientId,
        store: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        config: LifecycleConfig,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAP);
        Arc::new_cyclic(|this| Self {
            state: Mutex::new(RefreshAttemptState {
                phase: LifecyclePhase::Unmonitored,
                epoch: 0,
                backoff: RetryBackoff::new(&config),
                scheduler: RefreshScheduler::new(clock.clone(), &config),
            }),
            client_id,
            store,
            clock,
            config,
            events,
            this: this.clone(),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.state().backoff.consecutive_failures()
    }

    pub fn current_backoff(&self) -> Duration {
        self.state().backoff.current_backoff()
    }

    pub fn has_pending_timer(&self) -> bool {
        self.state().scheduler.is_armed()
    }

    fn state(&self) -> MutexGuard<'_, RefreshAttemptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: LifecycleEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn current_session(&self) -> Option<Session> {
        match self.store.get_current_session().await {
            Ok(session) => session,
            Err(e) => {
                tracing::warn!(client_id = %self.client_id, error = %e, "could not read current session");
                None
            }
        }
    }

    /// Arms the regular check for `session` and returns its delay.
    fn arm_check(&self, state: &mut RefreshAttemptState, session: Option<&Session>) -> Duration {
        let task = timer_task(self.this.clone(), state.epoch);
        state.scheduler.schedule_next(session, self.clock.now(), task)
    }

    async fn on_timer(&self, epoch: u64, ticket: u64) {
        {
            let mut state = self.state();
            if !state.scheduler.take_fired(ticket) || !state.is_live(epoch) {
                tracing::trace!(client_id = %self.client_id, ticket, "stale refresh timer ignored");
                return;
            }
        }
        self.attempt_refresh(Trigger::Timer).await;
    }

    /// One refresh attempt behind the minimum-interval guard.
    ///
    /// The guard's check-and-set completes before the store is called, so a
    /// caller arriving while a refresh is in flight is turned away instead of
    /// issuing a second one.
    async fn attempt_refresh(&self, trigger: Trigger) -> RefreshOutcome {
        let now = self.clock.now();
        let epoch = {
            let mut state = self.state();
            match state.backoff.try_begin(now) {
                AttemptGate::Proceed => state.epoch,
                AttemptGate::TooSoon { retry_in } => {
                    if trigger == Trigger::Timer && state.phase != LifecyclePhase::Unmonitored {
                        let task = timer_task(self.this.clone(), state.epoch);
                        state.scheduler.arm(retry_in, task);
                    }
                    drop(state);
                    tracing::debug!(client_id = %self.client_id, ?trigger, "refresh skipped, last attempt too recent");
                    self.emit(LifecycleEvent::RefreshSkipped {
                        client_id: self.client_id.clone(),
                    });
                    return RefreshOutcome::SkippedTooSoon;
                }
            }
        };

        tracing::debug!(client_id = %self.client_id, ?trigger, "refreshing session");
        match self.store.refresh_session().await {
            Ok(session) => {
                let next_check = {
                    let mut state = self.state();
                    state.backoff.record_success();
                    if state.is_live(epoch) {
                        state.phase = LifecyclePhase::Monitoring;
                        Some(self.arm_check(&mut state, Some(&session)))
                    } else {
                        None
                    }
                };
                tracing::info!(
                    client_id = %self.client_id,
                    expires_at = %session.expires_at,
                    next_check_ms = next_check.map(|d| d.as_millis() as u64),
                    "session refreshed"
                );
                self.emit(LifecycleEvent::Refreshed {
                    client_id: self.client_id.clone(),
                    expires_at: session.expires_at,
                });
                RefreshOutcome::Refreshed(session)
            }
            Err(e) => {
                let (retry_in, armed) = {
                    let mut state = self.state();
                    let retry_in = state.backoff.record_failure();
                    let armed = state.is_live(epoch);
                    if armed {
                        state.phase = LifecyclePhase::Backoff;
                        let task = timer_task(self.this.clone(), epoch);
                        state.scheduler.arm(retry_in, task);
                    }
                    (retry_in, armed)
                };
                tracing::warn!(
                    client_id = %self.client_id,
                    error = %e,
                    transient = e.is_transient(),
                    retry_in_ms = retry_in.as_millis() as u64,
                    "session refresh failed"
                );
                self.emit(LifecycleEvent::RefreshFailed {
                    client_id: self.client_id.clone(),
                    error: e.to_string(),
                    retry_in_ms: armed.then(|| retry_in.as_millis() as u64),
                });
                RefreshOutcome::Failed {
                    error: e.to_string(),
                    retry_in,
                }
            }
        }
    }

    /// The provider refreshed on its own; move the next check to the new expiry.
    async fn follow_external_refresh(&self) {
        let epoch = {
            let state = self.state();
            if state.phase == LifecyclePhase::Unmonitored {
                return;
            }
            state.epoch
        };
        let session = self.current_session().await;
        let mut state = self.state();
        if !state.is_live(epoch) {
            return;
        }
        state.backoff.record_success();
        state.phase = LifecyclePhase::Monitoring;
        let delay = self.arm_check(&mut state, session.as_ref());
        tracing::debug!(client_id = %self.client_id, next_check_ms = delay.as_millis() as u64, "rescheduled after external refresh");
    }
}

fn timer_task(this: Weak<SessionManager>, epoch: u64) -> impl FnOnce(u64) -> TimerTask {
    move |ticket| -> TimerTask {
        Box::pin(async move {
            if let Some(manager) = this.upgrade() {
                manager.on_timer(epoch, ticket).await;
            }
        })
    }
}

#[async_trait::async_trait]
impl SessionLifecycle for SessionManager {
    async fn start_monitoring(&self) {
        let Some(session) = self.current_session().await else {
            tracing::debug!(
                client_id = %self.client_id,
                phase = ?self.phase(),
                "no session, monitoring left as it was"
            );
            return;
        };

        let delay = {
            let mut state = self.state();
            state.epoch += 1;
            state.phase = LifecyclePhase::Monitoring;
            self.arm_check(&mut state, Some(&session))
        };
        tracing::info!(
            client_id = %self.client_id,
            expires_at = %session.expires_at,
            next_check_ms = delay.as_millis() as u64,
            "session monitoring started"
        );
        self.emit(LifecycleEvent::MonitoringStarted {
            client_id: self.client_id.clone(),
            next_check_in_ms: delay.as_millis() as u64,
        });
    }

    fn stop_monitoring(&self) {
        let was_monitoring = {
            let mut state = self.state();
            state.scheduler.cancel();
            let was_monitoring = state.phase != LifecyclePhase::Unmonitored;
            if was_monitoring {
                state.phase = LifecyclePhase::Unmonitored;
                state.epoch += 1;
                state.backoff = RetryBackoff::new(&self.config);
            }
            was_monitoring
        };
        if was_monitoring {
            tracing::info!(client_id = %self.client_id, "session monitoring stopped");
            self.emit(LifecycleEvent::MonitoringStopped {
                client_id: self.client_id.clone(),
            });
        }
    }

    async fn ensure_fresh_session(&self) -> bool {
        let session = self.current_session().await;
        if !expiry::needs_refresh(session.as_ref(), self.clock.now(), self.config.buffer) {
            return true;
        }

        match self.attempt_refresh(Trigger::OnDemand).await {
            RefreshOutcome::Refreshed(fresh) => !expiry::is_expired(Some(&fresh), self.clock.now()),
            // Someone refreshed moments ago; trust whatever the store holds now
            // unless it has already lapsed.
            RefreshOutcome::SkippedTooSoon => {
                let current = self.current_session().await;
                !expiry::is_expired(current.as_ref(), self.clock.now())
            }
            RefreshOutcome::Failed { .. } => {
                !expiry::is_expired(session.as_ref(), self.clock.now())
            }
        }
    }

    async fn get_session_info(&self) -> Option<SessionInfo> {
        self.current_session().await.map(|session| SessionInfo {
            expires_at: session.expires_at,
            refresh_token: session.refresh_token,
        })
    }

    async fn needs_refresh(&self) -> bool {
        let session = self.current_session().await;
        expiry::needs_refresh(session.as_ref(), self.clock.now(), self.config.buffer)
    }

    async fn is_expired(&self) -> bool {
        let session = self.current_session().await;
        expiry::is_expired(session.as_ref(), self.clock.now())
    }

    async fn get_time_until_expiry(&self) -> Duration {
        let session = self.current_session().await;
        expiry::time_until_expiry(session.as_ref(), self.clock.now())
    }

    async fn handle_auth_event(&self, event: AuthEvent) {
        tracing::debug!(client_id = %self.client_id, ?event, "auth event");
        match event {
            AuthEvent::SignedIn => self.start_monitoring().await,
            AuthEvent::SignedOut => self.stop_monitoring(),
            AuthEvent::TokenRefreshed => self.follow_external_refresh().await,
        }
    }

    fn phase(&self) -> LifecyclePhase {
        self.state().phase
    }
}

#[cfg(test)]
#[path = "session_manager_tests.rs"]
mod tests;
