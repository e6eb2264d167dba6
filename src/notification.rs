use crate::event::PushNotification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Tag set of a notification. Unknown wire tags are preserved verbatim so a
/// newer server does not break an older client.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NotificationKind {
    TrxCredit,
    TrxDebit,
    TrxFailed,
    Security,
    Generic,
    Other(String),
}

impl NotificationKind {
    pub fn as_tag(&self) -> &str {
        match self {
            NotificationKind::TrxCredit => "TRX_CREDIT",
            NotificationKind::TrxDebit => "TRX_DEBIT",
            NotificationKind::TrxFailed => "TRX_FAILED",
            NotificationKind::Security => "SECURITY",
            NotificationKind::Generic => "GENERIC",
            NotificationKind::Other(tag) => tag.as_str(),
        }
    }

    /// Transaction kinds carry a foreign transaction reference and are the
    /// ones detail enrichment applies to.
    pub fn is_transaction(&self) -> bool {
        matches!(
            self,
            NotificationKind::TrxCredit | NotificationKind::TrxDebit | NotificationKind::TrxFailed
        )
    }
}

impl From<String> for NotificationKind {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "TRX_CREDIT" => NotificationKind::TrxCredit,
            "TRX_DEBIT" => NotificationKind::TrxDebit,
            "TRX_FAILED" => NotificationKind::TrxFailed,
            "SECURITY" => NotificationKind::Security,
            "GENERIC" => NotificationKind::Generic,
            _ => NotificationKind::Other(tag),
        }
    }
}

impl From<NotificationKind> for String {
    fn from(kind: NotificationKind) -> Self {
        kind.as_tag().to_string()
    }
}

/// One notification as held by the store and served by the REST snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub account_id: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub message: String,
    /// Type-specific fields; for transaction kinds this holds `transactionId`.
    #[serde(default)]
    pub payload: Value,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read_at: Option<DateTime<Utc>>,
}

impl Notification {
    pub fn from_push(push: PushNotification, account_id: impl Into<String>) -> Self {
        let created_at = push.created_at();
        Self {
            id: push.id,
            account_id: account_id.into(),
            kind: push.kind,
            message: push.message,
            payload: push.data,
            created_at,
            read_at: None,
        }
    }

    pub fn is_read(&self) -> bool {
        self.read_at.is_some()
    }

    /// Foreign transaction reference embedded in the payload, if any.
    pub fn transaction_ref(&self) -> Option<&str> {
        self.payload.get("transactionId").and_then(Value::as_str)
    }

    /// Merge two copies of the same notification (snapshot vs. push delivery).
    ///
    /// Keeps the most informationally complete fields and the more-recent
    /// non-null `read_at`. A non-null `read_at` is never cleared: a stale
    /// snapshot must not "unread" an item.
    pub fn merged_with(&self, other: &Notification) -> Notification {
        debug_assert_eq!(self.id, other.id);
        let richer = if self.payload.is_null() && !other.payload.is_null() {
            other
        } else {
            self
        };
        let mut merged = richer.clone();
        if merged.message.is_empty() && !other.message.is_empty() {
            merged.message = other.message.clone();
        }
        merged.read_at = match (self.read_at, other.read_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (Some(a), None) => Some(a),
            (None, Some(b)) => Some(b),
            (None, None) => None,
        };
        merged
    }
}

/// Full fan-out payload delivered to every subscriber: the whole list plus
/// the derived unread count, never a delta.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    pub items: Vec<Notification>,
    pub unread_count: usize,
}

impl StoreSnapshot {
    pub fn from_items(items: Vec<Notification>) -> Self {
        let unread_count = items.iter().filter(|n| !n.is_read()).count();
        Self {
            items,
            unread_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn notif(id: &str, read_at: Option<DateTime<Utc>>) -> Notification {
        Notification {
            id: id.to_string(),
            account_id: "acc-1".to_string(),
            kind: NotificationKind::TrxCredit,
            message: "You have received money".to_string(),
            payload: json!({"transactionId": "tx-1"}),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            read_at,
        }
    }

    #[test]
    fn test_kind_tags_roundtrip() {
        for tag in ["TRX_CREDIT", "TRX_DEBIT", "TRX_FAILED", "SECURITY", "GENERIC"] {
            let kind = NotificationKind::from(tag.to_string());
            assert_eq!(kind.as_tag(), tag);
        }
        let kind = NotificationKind::from("PROMO".to_string());
        assert_eq!(kind, NotificationKind::Other("PROMO".to_string()));
        assert_eq!(kind.as_tag(), "PROMO");
    }

    #[test]
    fn test_merge_never_unreads() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
        let read = notif("n-1", Some(t));
        let stale = notif("n-1", None);
        assert_eq!(read.merged_with(&stale).read_at, Some(t));
        assert_eq!(stale.merged_with(&read).read_at, Some(t));
    }

    #[test]
    fn test_merge_keeps_latest_read_at() {
        let t1 = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 5, 1, 14, 0, 0).unwrap();
        let a = notif("n-1", Some(t1));
        let b = notif("n-1", Some(t2));
        assert_eq!(a.merged_with(&b).read_at, Some(t2));
    }

    #[test]
    fn test_merge_prefers_richer_payload() {
        let mut bare = notif("n-1", None);
        bare.payload = Value::Null;
        bare.message = String::new();
        let full = notif("n-1", None);
        let merged = bare.merged_with(&full);
        assert_eq!(merged.transaction_ref(), Some("tx-1"));
        assert_eq!(merged.message, "You have received money");
    }

    #[test]
    fn test_snapshot_derives_unread_count() {
        let t = Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap();
        let snapshot =
            StoreSnapshot::from_items(vec![notif("a", None), notif("b", Some(t)), notif("c", None)]);
        assert_eq!(snapshot.unread_count, 2);
    }
}
