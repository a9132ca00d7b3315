use super::*;
use crate::application_impl::FakeTokenStore;
use crate::infra_clock::ManualClock;
use chrono::{TimeDelta, Utc};
use tokio::sync::Notify;

const HOUR_MS: i64 = 3_600_000;

struct Fixture {
    clock: Arc<ManualClock>,
    store: Arc<FakeTokenStore>,
    manager: Arc<SessionManager>,
}

fn fixture_with(config: LifecycleConfig) -> Fixture {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let store = Arc::new(FakeTokenStore::new(
        clock.clone(),
        TimeDelta::milliseconds(HOUR_MS),
    ));
    let manager = SessionManager::new(
        ClientId::from("web"),
        store.clone(),
        clock.clone(),
        config,
    );
    Fixture {
        clock,
        store,
        manager,
    }
}

fn fixture() -> Fixture {
    fixture_with(LifecycleConfig::default())
}

/// Signs in, then shortens the session so that it expires `in_ms` from now.
fn sign_in_expiring(fx: &Fixture, in_ms: i64) -> Session {
    let mut session = fx.store.sign_in("ann");
    session.expires_at = fx.clock.now() + TimeDelta::milliseconds(in_ms);
    fx.store.set_session(Some(session.clone()));
    session
}

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

#[tokio::test]
async fn fresh_session_is_left_alone() {
    let fx = fixture();
    sign_in_expiring(&fx, HOUR_MS);

    assert!(!fx.manager.needs_refresh().await);
    assert!(!fx.manager.is_expired().await);
    assert_eq!(fx.manager.get_time_until_expiry().await, ms(3_600_000));
    assert!(fx.manager.ensure_fresh_session().await);
    assert_eq!(fx.store.refresh_calls(), 0);

    fx.manager.start_monitoring().await;
    assert_eq!(fx.manager.phase(), LifecyclePhase::Monitoring);
    assert_eq!(fx.clock.pending_delays(), vec![ms(3_300_000)]);
}

#[tokio::test]
async fn session_inside_buffer_is_refreshed_on_demand() {
    let fx = fixture();
    sign_in_expiring(&fx, 60_000);

    assert!(fx.manager.needs_refresh().await);
    assert!(fx.manager.ensure_fresh_session().await);
    assert_eq!(fx.store.refresh_calls(), 1);
    assert!(!fx.manager.needs_refresh().await);
    // Not monitoring, so nothing gets scheduled.
    assert_eq!(fx.clock.pending_count(), 0);
}

#[tokio::test]
async fn missing_session_is_a_normal_state() {
    let fx = fixture();

    assert!(fx.manager.is_expired().await);
    assert!(fx.manager.needs_refresh().await);
    assert_eq!(fx.manager.get_time_until_expiry().await, Duration::ZERO);
    assert_eq!(fx.manager.get_session_info().await, None);

    fx.manager.start_monitoring().await;
    assert_eq!(fx.manager.phase(), LifecyclePhase::Unmonitored);
    assert_eq!(fx.clock.pending_count(), 0);

    assert!(!fx.manager.ensure_fresh_session().await);
}

#[tokio::test]
async fn consecutive_failures_back_off_then_reset() {
    let fx = fixture_with(LifecycleConfig {
        min_refresh_interval: ms(500),
        ..LifecycleConfig::default()
    });
    sign_in_expiring(&fx, HOUR_MS);
    fx.manager.start_monitoring().await;
    fx.store.fail_next(3);

    assert_eq!(fx.clock.fire_next().await, Some(ms(3_300_000)));
    assert_eq!(fx.manager.phase(), LifecyclePhase::Backoff);
    assert_eq!(fx.clock.pending_delays(), vec![ms(1_000)]);

    assert_eq!(fx.clock.fire_next().await, Some(ms(1_000)));
    assert_eq!(fx.clock.pending_delays(), vec![ms(2_000)]);

    assert_eq!(fx.clock.fire_next().await, Some(ms(2_000)));
    assert_eq!(fx.clock.pending_delays(), vec![ms(4_000)]);
    assert_eq!(fx.manager.consecutive_failures(), 3);

    assert_eq!(fx.clock.fire_next().await, Some(ms(4_000)));
    assert_eq!(fx.manager.phase(), LifecyclePhase::Monitoring);
    assert_eq!(fx.manager.consecutive_failures(), 0);
    assert_eq!(fx.manager.current_backoff(), ms(1_000));
    assert_eq!(fx.store.refresh_calls(), 4);
    assert_eq!(fx.clock.pending_delays(), vec![ms(3_300_000)]);
}

#[tokio::test]
async fn simultaneous_callers_share_one_refresh() {
    let fx = fixture();
    sign_in_expiring(&fx, 60_000);

    let (first, second) = tokio::join!(
        fx.manager.ensure_fresh_session(),
        fx.manager.ensure_fresh_session()
    );

    assert!(first);
    assert!(second);
    assert_eq!(fx.store.refresh_calls(), 1);
}

#[tokio::test]
async fn calls_within_min_interval_refresh_once() {
    let fx = fixture();
    sign_in_expiring(&fx, 120_000);
    fx.store.fail_next(1);

    // Failed, but the old session has not lapsed yet.
    assert!(fx.manager.ensure_fresh_session().await);
    fx.clock.advance(ms(10_000)).await;
    assert!(fx.manager.ensure_fresh_session().await);

    assert_eq!(fx.store.refresh_calls(), 1);
}

#[tokio::test]
async fn skip_after_expiry_reports_unusable() {
    let fx = fixture();
    sign_in_expiring(&fx, 5_000);
    fx.store.fail_next(1);

    assert!(fx.manager.ensure_fresh_session().await);
    fx.clock.advance(ms(10_000)).await;
    assert!(!fx.manager.ensure_fresh_session().await);
    assert_eq!(fx.store.refresh_calls(), 1);
}

#[tokio::test]
async fn refresh_reschedules_from_new_expiry() {
    let fx = fixture();
    sign_in_expiring(&fx, 60_000);
    fx.manager.start_monitoring().await;
    assert_eq!(fx.clock.pending_delays(), vec![ms(30_000)]);

    fx.clock.fire_next().await;

    let current = fx.store.get_current_session().await.unwrap().unwrap();
    let info = fx.manager.get_session_info().await.unwrap();
    assert_eq!(info.expires_at, current.expires_at);
    assert_eq!(info.refresh_token, current.refresh_token);
    assert_eq!(fx.clock.pending_delays(), vec![ms(3_300_000)]);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let fx = fixture();
    sign_in_expiring(&fx, HOUR_MS);
    let mut events = fx.manager.subscribe();

    fx.manager.start_monitoring().await;
    fx.manager.stop_monitoring();
    fx.manager.stop_monitoring();

    assert_eq!(fx.manager.phase(), LifecyclePhase::Unmonitored);
    assert_eq!(fx.clock.pending_count(), 0);
    assert!(!fx.manager.has_pending_timer());

    assert!(matches!(
        events.try_recv(),
        Ok(LifecycleEvent::MonitoringStarted { .. })
    ));
    assert!(matches!(
        events.try_recv(),
        Ok(LifecycleEvent::MonitoringStopped { .. })
    ));
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn monitoring_can_restart_after_stop() {
    let fx = fixture();
    sign_in_expiring(&fx, HOUR_MS);

    fx.manager.start_monitoring().await;
    fx.manager.stop_monitoring();
    fx.manager.start_monitoring().await;

    assert_eq!(fx.manager.phase(), LifecyclePhase::Monitoring);
    assert_eq!(fx.clock.pending_count(), 1);
}

#[tokio::test]
async fn restart_after_stop_forgets_previous_failures() {
    let fx = fixture_with(LifecycleConfig {
        min_refresh_interval: ms(500),
        ..LifecycleConfig::default()
    });
    sign_in_expiring(&fx, HOUR_MS);
    fx.manager.start_monitoring().await;
    fx.store.fail_next(10);

    fx.clock.fire_next().await;
    fx.clock.fire_next().await;
    assert_eq!(fx.manager.consecutive_failures(), 2);
    assert_eq!(fx.clock.pending_delays(), vec![ms(2_000)]);

    fx.manager.stop_monitoring();
    assert_eq!(fx.manager.consecutive_failures(), 0);
    assert_eq!(fx.manager.current_backoff(), ms(1_000));

    // The new run refreshes straight away instead of waiting out the old guard
    // window, and its first failure starts from the initial backoff.
    fx.manager.start_monitoring().await;
    assert_eq!(fx.clock.pending_delays(), vec![ms(500)]);
    fx.clock.fire_next().await;
    assert_eq!(fx.store.refresh_calls(), 3);
    assert_eq!(fx.manager.consecutive_failures(), 1);
    assert_eq!(fx.clock.pending_delays(), vec![ms(1_000)]);
}

#[tokio::test]
async fn start_without_session_keeps_running_monitor() {
    let fx = fixture();
    sign_in_expiring(&fx, HOUR_MS);
    fx.manager.start_monitoring().await;
    fx.store.sign_out();

    fx.manager.start_monitoring().await;

    assert_eq!(fx.manager.phase(), LifecyclePhase::Monitoring);
    assert_eq!(fx.clock.pending_delays(), vec![ms(3_300_000)]);
}

#[tokio::test]
async fn on_demand_failure_while_monitoring_enters_backoff() {
    let fx = fixture();
    sign_in_expiring(&fx, 60_000);
    fx.manager.start_monitoring().await;
    fx.store.fail_next(1);

    assert!(fx.manager.ensure_fresh_session().await);

    assert_eq!(fx.manager.phase(), LifecyclePhase::Backoff);
    assert_eq!(fx.clock.pending_delays(), vec![ms(1_000)]);
}

#[tokio::test]
async fn retry_inside_guard_window_waits_for_the_window() {
    let fx = fixture();
    sign_in_expiring(&fx, 60_000);
    fx.manager.start_monitoring().await;
    fx.store.fail_next(1);
    fx.manager.ensure_fresh_session().await;

    // Backoff retry fires after 1s, but the guard holds it off for the rest of
    // the 30s window.
    assert_eq!(fx.clock.fire_next().await, Some(ms(1_000)));
    assert_eq!(fx.store.refresh_calls(), 1);
    assert_eq!(fx.clock.pending_delays(), vec![ms(29_000)]);
    assert_eq!(fx.manager.phase(), LifecyclePhase::Backoff);

    assert_eq!(fx.clock.fire_next().await, Some(ms(29_000)));
    assert_eq!(fx.store.refresh_calls(), 2);
    assert_eq!(fx.manager.phase(), LifecyclePhase::Monitoring);
}

/// Holds every refresh until the gate is opened.
struct GatedStore {
    inner: Arc<FakeTokenStore>,
    gate: Arc<Notify>,
}

#[async_trait::async_trait]
impl TokenStore for GatedStore {
    async fn get_current_session(&self) -> Result<Option<Session>, TokenStoreError> {
        self.inner.get_current_session().await
    }

    async fn refresh_session(&self) -> Result<Session, TokenStoreError> {
        self.gate.notified().await;
        self.inner.refresh_session().await
    }
}

#[tokio::test]
async fn refresh_completing_after_stop_does_not_rearm() {
    let fx = fixture();
    sign_in_expiring(&fx, 60_000);
    let gate = Arc::new(Notify::new());
    let manager = SessionManager::new(
        ClientId::from("gated"),
        Arc::new(GatedStore {
            inner: fx.store.clone(),
            gate: gate.clone(),
        }),
        fx.clock.clone(),
        LifecycleConfig::default(),
    );
    manager.start_monitoring().await;

    let (usable, ()) = tokio::join!(manager.ensure_fresh_session(), async {
        tokio::task::yield_now().await;
        manager.stop_monitoring();
        gate.notify_one();
    });

    assert!(usable);
    assert_eq!(fx.store.refresh_calls(), 1);
    assert_eq!(manager.phase(), LifecyclePhase::Unmonitored);
    assert_eq!(fx.clock.pending_count(), 0);
}

#[tokio::test]
async fn auth_events_drive_monitoring() {
    let fx = fixture();
    sign_in_expiring(&fx, HOUR_MS);

    fx.manager.handle_auth_event(AuthEvent::SignedIn).await;
    assert_eq!(fx.manager.phase(), LifecyclePhase::Monitoring);

    // Provider refreshed behind our back: follow its new expiry.
    sign_in_expiring(&fx, 2 * HOUR_MS);
    fx.manager.handle_auth_event(AuthEvent::TokenRefreshed).await;
    assert_eq!(fx.clock.pending_delays(), vec![ms(6_900_000)]);

    fx.manager.handle_auth_event(AuthEvent::SignedOut).await;
    assert_eq!(fx.manager.phase(), LifecyclePhase::Unmonitored);
    assert_eq!(fx.clock.pending_count(), 0);

    // Ignored while unmonitored.
    fx.manager.handle_auth_event(AuthEvent::TokenRefreshed).await;
    assert_eq!(fx.clock.pending_count(), 0);
}

#[tokio::test]
async fn refresh_publishes_event() {
    let fx = fixture();
    sign_in_expiring(&fx, 60_000);
    let mut events = fx.manager.subscribe();

    fx.manager.ensure_fresh_session().await;

    match events.try_recv() {
        Ok(LifecycleEvent::Refreshed {
            client_id,
            expires_at,
        }) => {
            assert_eq!(client_id, ClientId::from("web"));
            assert_eq!(expires_at, fx.clock.now() + TimeDelta::milliseconds(HOUR_MS));
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

struct UnreadableStore;

#[async_trait::async_trait]
impl TokenStore for UnreadableStore {
    async fn get_current_session(&self) -> Result<Option<Session>, TokenStoreError> {
        Err(TokenStoreError::Network("storage offline".to_string()))
    }

    async fn refresh_session(&self) -> Result<Session, TokenStoreError> {
        Err(TokenStoreError::Network("storage offline".to_string()))
    }
}

#[tokio::test]
async fn unreadable_store_counts_as_no_session() {
    let clock = Arc::new(ManualClock::new(Utc::now()));
    let manager = SessionManager::new(
        ClientId::from("offline"),
        Arc::new(UnreadableStore),
        clock.clone(),
        LifecycleConfig::default(),
    );

    assert!(manager.is_expired().await);
    assert_eq!(manager.get_session_info().await, None);
    assert!(!manager.ensure_fresh_session().await);
    assert_eq!(manager.consecutive_failures(), 1);
}
