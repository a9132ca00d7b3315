use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_clock::TokioClock;
use crate::infra_gotrue::GoTrueTokenStore;
use crate::logger::*;
use crate::settings::Settings;
use chrono::TimeDelta;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

const DEFAULT_FAKE_TTL_SECS: i64 = 60 * 60;

pub struct Server {
    pub registry: Arc<SessionRegistry>,
    pub client_id: ClientId,
    event_log_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: CancellationToken,
}

impl Server {
    /// Wires the clock, token store backend and registry together, registers
    /// `client_id` (generated when absent) and starts monitoring it.
    pub async fn try_new(settings: &Settings, client_id: Option<String>) -> anyhow::Result<Self> {
        let clock: Arc<dyn Clock> = Arc::new(TokioClock::new());
        let config = settings.lifecycle.to_config();

        let store: Arc<dyn TokenStore> = match settings.auth.backend.as_str() {
            "fake" => {
                let ttl = settings
                    .auth
                    .fake_session_ttl_secs
                    .unwrap_or(DEFAULT_FAKE_TTL_SECS);
                let fake = FakeTokenStore::new(clock.clone(), TimeDelta::seconds(ttl));
                fake.sign_in("demo");
                Arc::new(fake)
            }
            "gotrue" => {
                let gotrue = settings
                    .gotrue
                    .as_ref()
                    .ok_or_else(|| anyhow::anyhow!("auth backend is gotrue but [gotrue] is missing"))?;
                let mut store = GoTrueTokenStore::new(gotrue.to_config(), clock.clone())?;
                if let Some(token) = &gotrue.refresh_token {
                    store = store.with_refresh_token(token.clone());
                }
                Arc::new(store)
            }
            other => return Err(anyhow::anyhow!("Unknown auth backend: {}", other)),
        };

        let client_id = client_id.map(ClientId::new).unwrap_or_else(ClientId::generate);
        let registry = Arc::new(SessionRegistry::new(clock, config));
        let manager = registry.get_or_create(client_id.clone(), store);

        // A GoTrue store started from a bare refresh token has no session
        // until the first exchange.
        if !manager.ensure_fresh_session().await {
            warn!(%client_id, "no usable session at startup");
        }
        manager.start_monitoring().await;

        let cancel = CancellationToken::new();
        let event_log_handle = tokio::spawn(log_events(manager, cancel.clone()));

        info!(%client_id, phase = ?registry.get(&client_id).map(|m| m.phase()), "server started");

        Ok(Self {
            registry,
            client_id,
            event_log_handle: Mutex::new(Some(event_log_handle)),
            cancel,
        })
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");
        self.cancel.cancel();

        let handle = self
            .event_log_handle
            .lock()
            .ok()
            .and_then(|mut lock| lock.take());
        if let Some(handle) = handle {
            let r = handle.await;
            info!("event log handle dropped: {:?}", r);
        }

        self.registry.shutdown();
    }
}

async fn log_events(manager: Arc<SessionManager>, cancel: CancellationToken) {
    let mut events = manager.subscribe();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!(target: "session_keeper::events", "{}", json),
                    Err(e) => warn!("could not serialize lifecycle event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "lifecycle event log lagged"),
                Err(RecvError::Closed) => break,
            },
        }
    }
}
