use super::SessionManager;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use dashmap::DashMap;
use std::sync::Arc;

/// Exactly one lifecycle manager per client id.
///
/// Owned by whoever wires the application together and passed to the parts
/// that need it; there is no process-wide instance.
pub struct SessionRegistry {
    managers: DashMap<ClientId, Arc<SessionManager>>,
    clock: Arc<dyn Clock>,
    config: LifecycleConfig,
}

impl SessionRegistry {
    pub fn new(clock: Arc<dyn Clock>, config: LifecycleConfig) -> Self {
        Self {
            managers: DashMap::new(),
            clock,
            config,
        }
    }

    /// Returns the manager registered for `client_id`, creating it around
    /// `store` on first use. `store` is ignored when the manager already exists.
    pub fn get_or_create(
        &self,
        client_id: ClientId,
        store: Arc<dyn TokenStore>,
    ) -> Arc<SessionManager> {
        let key = client_id.clone();
        let manager = self.managers.entry(client_id).or_insert_with(|| {
            tracing::debug!(client_id = %key, "registering session manager");
            SessionManager::new(key, store, self.clock.clone(), self.config)
        });
        Arc::clone(&manager)
    }

    pub fn get(&self, client_id: &ClientId) -> Option<Arc<SessionManager>> {
        self.managers.get(client_id).map(|entry| Arc::clone(&entry))
    }

    /// Stops and forgets the manager for `client_id`.
    pub fn remove(&self, client_id: &ClientId) -> Option<Arc<SessionManager>> {
        let (_, manager) = self.managers.remove(client_id)?;
        manager.stop_monitoring();
        Some(manager)
    }

    pub fn client_ids(&self) -> Vec<ClientId> {
        let mut ids: Vec<_> = self.managers.iter().map(|entry| entry.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    pub fn shutdown(&self) {
        tracing::info!("SessionRegistry shutting down...");
        let managers: Vec<_> = self
            .managers
            .iter()
            .map(|entry| Arc::clone(&entry))
            .collect();
        for manager in managers {
            manager.stop_monitoring();
        }
        self.managers.clear();
        tracing::info!("All session managers stopped.");
    }
}
