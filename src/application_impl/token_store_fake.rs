use crate::domain_model::*;
use crate::domain_port::*;
use chrono::TimeDelta;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// In-process token store for demos and tests.
///
/// Sessions are minted from the shared clock so virtual time applies to them
/// too. Failures can be queued with `fail_next`.
pub struct FakeTokenStore {
    clock: Arc<dyn Clock>,
    session_ttl: TimeDelta,
    current: Mutex<Option<Session>>,
    failures_pending: AtomicU32,
    refresh_calls: AtomicU32,
    serial: AtomicU64,
}

impl FakeTokenStore {
    pub fn new(clock: Arc<dyn Clock>, session_ttl: TimeDelta) -> Self {
        Self {
            clock,
            session_ttl,
            current: Mutex::new(None),
            failures_pending: AtomicU32::new(0),
            refresh_calls: AtomicU32::new(0),
            serial: AtomicU64::new(0),
        }
    }

    fn current(&self) -> MutexGuard<'_, Option<Session>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Starts a session for `username` lasting the configured ttl.
    pub fn sign_in(&self, username: &str) -> Session {
        let session = self.mint(&fake_user(username));
        *self.current() = Some(session.clone());
        session
    }

    pub fn sign_out(&self) {
        *self.current() = None;
    }

    /// Replaces the current session as-is.
    pub fn set_session(&self, session: Option<Session>) {
        *self.current() = session;
    }

    /// Makes the next `count` refresh calls fail with a network error.
    pub fn fail_next(&self, count: u32) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    fn mint(&self, user: &SessionUser) -> Session {
        let serial = self.serial.fetch_add(1, Ordering::SeqCst);
        let name = user.email.as_deref().unwrap_or("anonymous");
        Session::new(
            format!("fake-access-token:{}:{}", name, serial),
            Some(format!("fake-refresh-token:{}:{}", name, serial)),
            self.clock.now() + self.session_ttl,
            user.clone(),
        )
    }
}

#[async_trait::async_trait]
impl TokenStore for FakeTokenStore {
    async fn get_current_session(&self) -> Result<Option<Session>, TokenStoreError> {
        Ok(self.current().clone())
    }

    async fn refresh_session(&self) -> Result<Session, TokenStoreError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to interleave, like a real network call.
        tokio::task::yield_now().await;

        let should_fail = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(TokenStoreError::Network("simulated network failure".to_string()));
        }

        let mut current = self.current();
        let user = match current.as_ref() {
            Some(session) if session.refresh_token.is_some() => session.user.clone(),
            Some(_) => return Err(TokenStoreError::InvalidRefreshToken),
            None => return Err(TokenStoreError::NoSession),
        };
        let session = self.mint(&user);
        *current = Some(session.clone());
        Ok(session)
    }
}

fn fake_user(username: &str) -> SessionUser {
    SessionUser {
        id: UserId(uuid::Uuid::new_v5(
            &uuid::Uuid::NAMESPACE_OID,
            username.as_bytes(),
        )),
        email: Some(format!("{}@example.com", username)),
    }
}
