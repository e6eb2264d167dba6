use crate::alert::AlertDispatcher;
use crate::backend::NotificationBackend;
use crate::connection::{ConnectionManager, ConnectionStatus};
use crate::event::{PushNotification, EVENT_NOTIFICATION};
use crate::notification::{Notification, StoreSnapshot};
use anyhow::{anyhow, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, info, warn};


pub type SubscriberFn = Arc<dyn Fn(StoreSnapshot) + Send + Sync>;

struct StoreInner {
    backend: Arc<dyn NotificationBackend>,
    connection: ConnectionManager,
    alerts: AlertDispatcher,
    snapshot_limit: usize,
    account_id: Mutex<Option<String>>,
    items: Mutex<Vec<Notification>>,
    subscribers: Mutex<Vec<(u64, SubscriberFn)>>,
    next_subscriber: AtomicU64,
    initialized: AtomicBool,
    /// Cleared on teardown so late snapshot responses and push events are
    /// dropped instead of resurrecting a dead store.
    live: AtomicBool,
}

/// Single source of truth for the notification list and unread count of one
/// account. Merges snapshot pulls with live push events and fans every change
/// out to subscribers as a full snapshot.
///
/// Cheaply clonable handle; all clones share state. The unread count is
/// always derived from the items, never stored, so it cannot drift.
#[derive(Clone)]
pub struct NotificationStore {
    inner: Arc<StoreInner>,
}

/// Subscriber registration guard. Dropping it (or calling `unsubscribe`)
/// removes the callback from the fan-out set.
pub struct Subscription {
    id: u64,
    store: Weak<StoreInner>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner
                .subscribers
                .lock()
                .unwrap()
                .retain(|(id, _)| *id != self.id);
        }
    }
}

impl NotificationStore {
    pub fn new(
        backend: Arc<dyn NotificationBackend>,
        connection: ConnectionManager,
        alerts: AlertDispatcher,
        snapshot_limit: usize,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                backend,
                connection,
                alerts,
                snapshot_limit,
                account_id: Mutex::new(None),
                items: Mutex::new(Vec::new()),
                subscribers: Mutex::new(Vec::new()),
                next_subscriber: AtomicU64::new(0),
                initialized: AtomicBool::new(false),
                live: AtomicBool::new(false),
            }),
        }
    }

    /// Open the push channel, attach the notification listener and pull the
    /// first snapshot. At most once per store instance: repeated UI mounts
    /// must not pile up connections or listeners, so a second call is a
    /// logged no-op.
    ///
    /// A failed first snapshot is surfaced to the caller; the guard stays
    /// set and `refresh` is the manual retry path.
    pub async fn initialize(&self, account_id: &str) -> Result<()> {
        if self.inner.initialized.swap(true, Ordering::SeqCst) {
            info!(account_id, "store already initialized, ignoring");
            return Ok(());
        }
        self.inner.live.store(true, Ordering::SeqCst);
        *self.inner.account_id.lock().unwrap() = Some(account_id.to_string());

        // The handler holds only a weak reference so events delivered after
        // teardown fall on the floor.
        let weak = Arc::downgrade(&self.inner);
        self.inner.connection.on(EVENT_NOTIFICATION, move |data| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            match serde_json::from_value::<PushNotification>(data) {
                Ok(push) => inner.ingest(push),
                Err(e) => warn!("undecodable notification event: {}", e),
            }
        });

        self.inner.connection.connect(account_id)?;
        self.refresh().await
    }

    /// Pull a fresh snapshot and union-merge it into the list.
    ///
    /// The merge is keyed by id, never a replace: a push event that landed
    /// while the pull was in flight survives a stale snapshot, merged copies
    /// keep the more-recent non-null `read_at`, and the result is re-sorted
    /// newest-first.
    pub async fn refresh(&self) -> Result<()> {
        let account = self.account()?;
        let fetched = self
            .inner
            .backend
            .list_notifications(&account, self.inner.snapshot_limit)
            .await?;
        if !self.inner.live.load(Ordering::SeqCst) {
            debug!("snapshot arrived after teardown, dropping");
            return Ok(());
        }
        self.inner.apply_snapshot(fetched);
        Ok(())
    }

    /// Mark one notification read. Idempotent: an already-read id returns
    /// without a backend call. Otherwise the backend confirms first and only
    /// then is local state flipped — no optimistic update for read state.
    pub async fn mark_as_read(&self, id: &str) -> Result<()> {
        {
            let items = self.inner.items.lock().unwrap();
            let item = items
                .iter()
                .find(|n| n.id == id)
                .ok_or_else(|| anyhow!("unknown notification: {}", id))?;
            if item.is_read() {
                debug!(id, "already read, skipping backend call");
                return Ok(());
            }
        }

        self.inner.backend.mark_read(id).await?;
        if !self.inner.live.load(Ordering::SeqCst) {
            return Ok(());
        }
        {
            let mut items = self.inner.items.lock().unwrap();
            if let Some(item) = items.iter_mut().find(|n| n.id == id) {
                if item.read_at.is_none() {
                    item.read_at = Some(Utc::now());
                }
            }
        }
        self.inner.notify_subscribers();
        Ok(())
    }

    /// Mark everything read via the bulk endpoint, then stamp every unread
    /// item with one shared timestamp and fan out exactly once.
    pub async fn mark_all_as_read(&self) -> Result<()> {
        let account = self.account()?;
        self.inner.backend.mark_all_read(&account).await?;
        if !self.inner.live.load(Ordering::SeqCst) {
            return Ok(());
        }
        let now = Utc::now();
        {
            let mut items = self.inner.items.lock().unwrap();
            for item in items.iter_mut().filter(|n| !n.is_read()) {
                item.read_at = Some(now);
            }
        }
        self.inner.notify_subscribers();
        Ok(())
    }

    /// Add a fan-out callback. Delivery is synchronous, in registration
    /// order, and always carries the full snapshot.
    pub fn subscribe(&self, callback: impl Fn(StoreSnapshot) + Send + Sync + 'static) -> Subscription {
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner
            .subscribers
            .lock()
            .unwrap()
            .push((id, Arc::new(callback)));
        Subscription {
            id,
            store: Arc::downgrade(&self.inner),
        }
    }

    pub fn list(&self) -> Vec<Notification> {
        self.inner.items.lock().unwrap().clone()
    }

    pub fn unread_count(&self) -> usize {
        self.inner
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|n| !n.is_read())
            .count()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.inner.snapshot()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.inner.connection.status()
    }

    /// Disconnect, clear state and reset the init guard. Required when the
    /// session ends or the account switches; a new `initialize` starts fresh.
    pub fn teardown(&self) {
        self.inner.live.store(false, Ordering::SeqCst);
        self.inner.connection.disconnect();
        self.inner.items.lock().unwrap().clear();
        self.inner.subscribers.lock().unwrap().clear();
        *self.inner.account_id.lock().unwrap() = None;
        self.inner.initialized.store(false, Ordering::SeqCst);
        info!("notification store torn down");
    }

    fn account(&self) -> Result<String> {
        self.inner
            .account_id
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow!("store not initialized"))
    }

    #[cfg(test)]
    pub(crate) fn activate_for_tests(&self, account_id: &str) {
        self.inner.initialized.store(true, Ordering::SeqCst);
        self.inner.live.store(true, Ordering::SeqCst);
        *self.inner.account_id.lock().unwrap() = Some(account_id.to_string());
    }

    #[cfg(test)]
    pub(crate) fn ingest_for_tests(&self, push: PushNotification) {
        self.inner.ingest(push);
    }
}

impl StoreInner {
    /// Push-event path: dedupe-or-prepend, fan out, then dispatch the
    /// transient alert. The alert path is independent of the store mutation;
    /// a failure in one cannot block the other.
    fn ingest(&self, push: PushNotification) {
        if !self.live.load(Ordering::SeqCst) {
            debug!("push event after teardown, dropping");
            return;
        }
        let account = match self.account_id.lock().unwrap().clone() {
            Some(account) => account,
            None => return,
        };
        let notification = Notification::from_push(push, account);
        debug!(
            id = %notification.id,
            kind = notification.kind.as_tag(),
            "ingesting push notification"
        );
        {
            let mut items = self.items.lock().unwrap();
            if let Some(existing) = items.iter_mut().find(|n| n.id == notification.id) {
                *existing = existing.merged_with(&notification);
            } else {
                items.insert(0, notification.clone());
            }
        }
        self.notify_subscribers();
        self.alerts.dispatch(&notification);
    }

    fn apply_snapshot(&self, fetched: Vec<Notification>) {
        {
            let mut items = self.items.lock().unwrap();
            let mut merged = fetched;
            for existing in items.iter() {
                if let Some(slot) = merged.iter_mut().find(|n| n.id == existing.id) {
                    *slot = slot.merged_with(existing);
                } else {
                    merged.push(existing.clone());
                }
            }
            merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            *items = merged;
        }
        self.notify_subscribers();
    }

    fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot::from_items(self.items.lock().unwrap().clone())
    }

    /// Callbacks run outside the subscriber lock so one may subscribe or
    /// unsubscribe without deadlocking.
    fn notify_subscribers(&self) {
        let snapshot = self.snapshot();
        let subscribers: Vec<SubscriberFn> = {
            let subscribers = self.subscribers.lock().unwrap();
            subscribers.iter().map(|(_, cb)| cb.clone()).collect()
        };
        for callback in subscribers {
            callback(snapshot.clone());
        }
    }
}
