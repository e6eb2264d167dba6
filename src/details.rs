use crate::backend::NotificationBackend;
use crate::notification::NotificationKind;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Enrichment payload for a completed transaction.
///
/// Entries are display-only: consumers must keep `read_at` and timestamps
/// from the live store object and borrow here only message fields, otherwise
/// a concurrent mark-as-read can appear to be undone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDetails {
    pub transaction_id: String,
    pub counterparty: String,
    pub amount: f64,
    #[serde(default)]
    pub fee: f64,
    pub currency: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
}

type DetailCell = Arc<OnceCell<Arc<TransactionDetails>>>;

struct CacheInner {
    backend: Arc<dyn NotificationBackend>,
    /// Resolved entries, immutable for the session lifetime. Completed
    /// transactions do not change after creation, so nothing is invalidated.
    entries: Mutex<HashMap<String, Arc<TransactionDetails>>>,
    /// Coalescing map: concurrent misses for one reference share a cell so
    /// only one fetch goes out.
    inflight: Mutex<HashMap<String, DetailCell>>,
}

/// Memoizing fetch-once cache for transaction details, keyed by the foreign
/// reference id embedded in a notification payload.
#[derive(Clone)]
pub struct DetailCache {
    inner: Arc<CacheInner>,
}

impl DetailCache {
    pub fn new(backend: Arc<dyn NotificationBackend>) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                backend,
                entries: Mutex::new(HashMap::new()),
                inflight: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Cached details for `reference_id`, fetching at most once per id.
    ///
    /// A failed fetch writes no entry and clears the in-flight slot, so a
    /// later call retries.
    pub async fn get_details(&self, reference_id: &str) -> Result<Arc<TransactionDetails>> {
        if let Some(details) = self.lookup(reference_id) {
            return Ok(details);
        }

        let cell = {
            let mut inflight = self.inner.inflight.lock().unwrap();
            inflight
                .entry(reference_id.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let inner = self.inner.clone();
        let id = reference_id.to_string();
        let result = cell
            .get_or_try_init(|| async {
                debug!(reference_id = %id, "fetching transaction details");
                inner.backend.transaction_details(&id).await.map(Arc::new)
            })
            .await;

        match result {
            Ok(details) => {
                let details = details.clone();
                self.inner
                    .entries
                    .lock()
                    .unwrap()
                    .insert(reference_id.to_string(), details.clone());
                self.inner.inflight.lock().unwrap().remove(reference_id);
                Ok(details)
            }
            Err(e) => {
                warn!(reference_id, "detail fetch failed: {}", e);
                self.inner.inflight.lock().unwrap().remove(reference_id);
                Err(e)
            }
        }
    }

    /// Synchronous lookup without fetching.
    pub fn lookup(&self, reference_id: &str) -> Option<Arc<TransactionDetails>> {
        self.inner.entries.lock().unwrap().get(reference_id).cloned()
    }
}

/// Human-readable message for a notification of `kind`.
///
/// Two-phase contract: without details this is a generic placeholder, once
/// the detail fetch resolves it becomes the fully specified sentence.
/// Consumers must tolerate seeing the generic form first.
pub fn compose_message(kind: &NotificationKind, details: Option<&TransactionDetails>) -> String {
    match (kind, details) {
        (NotificationKind::TrxCredit, Some(d)) => format!(
            "You have received {} from {}",
            format_amount(d.amount, &d.currency),
            d.counterparty
        ),
        (NotificationKind::TrxDebit, Some(d)) => format!(
            "You have sent {} to {}",
            format_amount(d.amount, &d.currency),
            d.counterparty
        ),
        (NotificationKind::TrxFailed, Some(d)) => format!(
            "Your transaction of {} to {} failed",
            format_amount(d.amount, &d.currency),
            d.counterparty
        ),
        (NotificationKind::TrxCredit, None) => "You have received money".to_string(),
        (NotificationKind::TrxDebit, None) => "You have sent money".to_string(),
        (NotificationKind::TrxFailed, None) => "A transaction on your account failed".to_string(),
        (NotificationKind::Security, _) => "There is a security alert on your account".to_string(),
        _ => "You have a new notification".to_string(),
    }
}

/// Thousands-grouped amount with two decimals, e.g. `KES 1,234.56`.
pub fn format_amount(amount: f64, currency: &str) -> String {
    let negative = amount < 0.0;
    let cents = (amount.abs() * 100.0).round() as u64;
    let whole = cents / 100;
    let frac = cents % 100;

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }

    let sign = if negative { "-" } else { "" };
    format!("{} {}{}.{:02}", currency, sign, grouped, frac)
}
