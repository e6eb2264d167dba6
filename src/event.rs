use crate::notification::NotificationKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Named events carried on the push channel.
pub const EVENT_CONNECT: &str = "connect";
pub const EVENT_RECONNECT: &str = "reconnect";
pub const EVENT_REGISTER: &str = "register";
pub const EVENT_REGISTERED: &str = "registered";
pub const EVENT_NOTIFICATION: &str = "notification";
pub const EVENT_DISCONNECT: &str = "disconnect";
pub const EVENT_CONNECT_ERROR: &str = "connect_error";

/// One frame on the push channel: a named event plus an opaque payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFrame {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl WireFrame {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

/// Identity registration sent right after the transport opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterPayload {
    pub account_id: String,
    pub client: String,
    pub instance_id: String,
}

/// Server acknowledgment of a registration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisteredAck {
    pub session_id: String,
}

/// Payload of a server-pushed `notification` event.
///
/// `timestamp` is epoch milliseconds; the store stamps the session's
/// account id onto it when building the full record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushNotification {
    pub id: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    #[serde(default)]
    pub data: Value,
    pub timestamp: i64,
}

impl PushNotification {
    pub fn created_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp).unwrap_or_else(Utc::now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_notification_decode() {
        let raw = json!({
            "id": "n-1",
            "message": "You have received money",
            "type": "TRX_CREDIT",
            "data": {"transactionId": "tx-9"},
            "timestamp": 1700000000000i64
        });
        let push: PushNotification = serde_json::from_value(raw).unwrap();
        assert_eq!(push.id, "n-1");
        assert_eq!(push.kind, NotificationKind::TrxCredit);
        assert_eq!(push.data["transactionId"], "tx-9");
        assert_eq!(push.created_at().timestamp_millis(), 1700000000000);
    }

    #[test]
    fn test_wire_frame_roundtrip() {
        let frame = WireFrame::new(EVENT_REGISTER, json!({"accountId": "acc-1"}));
        let text = serde_json::to_string(&frame).unwrap();
        let back: WireFrame = serde_json::from_str(&text).unwrap();
        assert_eq!(back.event, EVENT_REGISTER);
        assert_eq!(back.data["accountId"], "acc-1");
    }

    #[test]
    fn test_frame_without_data_defaults_to_null() {
        let back: WireFrame = serde_json::from_str(r#"{"event":"disconnect"}"#).unwrap();
        assert_eq!(back.event, EVENT_DISCONNECT);
        assert!(back.data.is_null());
    }
}
