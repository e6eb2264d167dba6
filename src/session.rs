use crate::alert::AlertDispatcher;
use crate::backend::{HttpBackend, NotificationBackend};
use crate::config::Config;
use crate::connection::{ConnectionManager, ConnectionStatus};
use crate::details::DetailCache;
use crate::store::NotificationStore;
use anyhow::Result;
use std::sync::Arc;
use tracing::info;

/// One authenticated session's notification state: connection manager, store,
/// enrichment cache and alert dispatcher wired together as a single context
/// object.
///
/// Exactly one account's data exists per session. Switching accounts is
/// `teardown` followed by a fresh session; there is no module-level global
/// to reset.
pub struct SyncSession {
    account_id: String,
    connection: ConnectionManager,
    store: NotificationStore,
    details: DetailCache,
    alerts: AlertDispatcher,
}

impl SyncSession {
    pub fn new(config: &Config, account_id: impl Into<String>) -> Self {
        let backend: Arc<dyn NotificationBackend> = Arc::new(HttpBackend::new(&config.api_url));
        Self::with_backend(config, account_id, backend)
    }

    /// Same wiring with an injected backend, the seam the tests drive.
    pub fn with_backend(
        config: &Config,
        account_id: impl Into<String>,
        backend: Arc<dyn NotificationBackend>,
    ) -> Self {
        let connection = ConnectionManager::new(config.connection());
        let alerts = AlertDispatcher::new();
        let store = NotificationStore::new(
            backend.clone(),
            connection.clone(),
            alerts.clone(),
            config.snapshot_limit(),
        );
        let details = DetailCache::new(backend);
        Self {
            account_id: account_id.into(),
            connection,
            store,
            details,
            alerts,
        }
    }

    /// Open the push channel and pull the first snapshot.
    pub async fn initialize(&self) -> Result<()> {
        info!(account_id = %self.account_id, "initializing notification session");
        self.store.initialize(&self.account_id).await
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn store(&self) -> &NotificationStore {
        &self.store
    }

    pub fn details(&self) -> &DetailCache {
        &self.details
    }

    pub fn alerts(&self) -> &AlertDispatcher {
        &self.alerts
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    /// Drop connection, listeners and cached state. The session is inert
    /// afterwards; build a new one to resume.
    pub fn teardown(&self) {
        info!(account_id = %self.account_id, "tearing down notification session");
        self.store.teardown();
    }
}
