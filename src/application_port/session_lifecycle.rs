use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Timing knobs of the lifecycle core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Lead time before expiry at which a refresh is due.
    pub buffer: Duration,
    /// Floor for timer delays and minimum spacing between refresh attempts.
    pub min_refresh_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            buffer: Duration::from_millis(300_000),
            min_refresh_interval: Duration::from_millis(30_000),
            initial_backoff: Duration::from_millis(1_000),
            max_backoff: Duration::from_millis(60_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    Unmonitored,
    Monitoring,
    /// Last attempt failed, a retry is pending.
    Backoff,
}

/// Diagnostics snapshot of the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub expires_at: DateTime<Utc>,
    pub refresh_token: Option<RefreshToken>,
}

#[derive(Debug)]
pub enum RefreshOutcome {
    Refreshed(Session),
    /// The previous attempt was too recent; the session is assumed still valid.
    SkippedTooSoon,
    Failed { error: String, retry_in: Duration },
}

/// Provider-side auth state changes forwarded by the application.
#[derive(Debug, Clone)]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    /// The provider refreshed the session outside the lifecycle core.
    TokenRefreshed,
}

/// Events published by a lifecycle manager.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    MonitoringStarted {
        client_id: ClientId,
        next_check_in_ms: u64,
    },
    MonitoringStopped {
        client_id: ClientId,
    },
    Refreshed {
        client_id: ClientId,
        expires_at: DateTime<Utc>,
    },
    RefreshSkipped {
        client_id: ClientId,
    },
    RefreshFailed {
        client_id: ClientId,
        error: String,
        retry_in_ms: Option<u64>,
    },
}

#[async_trait::async_trait]
pub trait SessionLifecycle: Send + Sync {
    /// Arms the first refresh timer if a session exists. No session is not an error.
    async fn start_monitoring(&self);
    /// Cancels any pending timer. Idempotent.
    fn stop_monitoring(&self);
    /// Refreshes now if the session is inside the buffer window. Returns whether
    /// an unexpired session is available afterwards.
    async fn ensure_fresh_session(&self) -> bool;
    async fn get_session_info(&self) -> Option<SessionInfo>;
    async fn needs_refresh(&self) -> bool;
    async fn is_expired(&self) -> bool;
    async fn get_time_until_expiry(&self) -> Duration;
    async fn handle_auth_event(&self, event: AuthEvent);
    fn phase(&self) -> LifecyclePhase;
}
