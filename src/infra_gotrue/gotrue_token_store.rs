use super::{ProviderError, ProviderSession};
use crate::domain_model::*;
use crate::domain_port::*;
use anyhow::Context;
use serde_json::json;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct GoTrueConfig {
    /// Project base url, e.g. `https://xyz.supabase.co`.
    pub url: String,
    /// Public anon key sent as `apikey`.
    pub anon_key: String,
    pub timeout: Duration,
}

/// Token store talking to a Supabase GoTrue server over HTTP.
pub struct GoTrueTokenStore {
    http: reqwest::Client,
    token_url: String,
    anon_key: String,
    clock: Arc<dyn Clock>,
    current: Mutex<Option<Session>>,
    /// Used when no session exists yet, e.g. a refresh token handed over at startup.
    bootstrap_refresh_token: Mutex<Option<RefreshToken>>,
}

impl GoTrueTokenStore {
    pub fn new(config: GoTrueConfig, clock: Arc<dyn Clock>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .context("building GoTrue http client")?;
        Ok(Self {
            http,
            token_url: format!(
                "{}/auth/v1/token?grant_type=refresh_token",
                config.url.trim_end_matches('/')
            ),
            anon_key: config.anon_key,
            clock,
            current: Mutex::new(None),
            bootstrap_refresh_token: Mutex::new(None),
        })
    }

    pub fn with_refresh_token(self, refresh_token: impl Into<String>) -> Self {
        *lock(&self.bootstrap_refresh_token) = Some(RefreshToken(refresh_token.into()));
        self
    }

    pub fn set_session(&self, session: Option<Session>) {
        *lock(&self.current) = session;
    }

    fn refresh_token(&self) -> Option<RefreshToken> {
        let current = lock(&self.current)
            .as_ref()
            .and_then(|session| session.refresh_token.clone());
        current.or_else(|| lock(&self.bootstrap_refresh_token).clone())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[async_trait::async_trait]
impl TokenStore for GoTrueTokenStore {
    async fn get_current_session(&self) -> Result<Option<Session>, TokenStoreError> {
        Ok(lock(&self.current).clone())
    }

    async fn refresh_session(&self) -> Result<Session, TokenStoreError> {
        let refresh_token = self.refresh_token().ok_or(TokenStoreError::NoSession)?;

        let response = self
            .http
            .post(&self.token_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
            .json(&json!({ "refresh_token": refresh_token.0 }))
            .send()
            .await
            .map_err(|e| TokenStoreError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body: ProviderError = response.json().await.unwrap_or_default();
            return Err(body.into_store_error(status.as_u16()));
        }

        let provider: ProviderSession = response
            .json()
            .await
            .map_err(|e| TokenStoreError::Decode(e.to_string()))?;
        let session = provider.into_session(self.clock.now())?;

        *lock(&self.current) = Some(session.clone());
        *lock(&self.bootstrap_refresh_token) = None;
        Ok(session)
    }
}
