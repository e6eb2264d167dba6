use crate::notification::{Notification, NotificationKind};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Severity of a transient user alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Error,
    Warning,
    Info,
}

impl Severity {
    /// Default severity for a notification kind; unknown kinds are `info`.
    pub fn for_kind(kind: &NotificationKind) -> Self {
        match kind {
            NotificationKind::TrxCredit => Severity::Success,
            NotificationKind::TrxFailed => Severity::Error,
            NotificationKind::Security => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

/// A short-lived, auto-dismissing user alert.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub severity: Severity,
    pub kind: NotificationKind,
    pub message: String,
}

/// Stateless fan-out of transient alerts, decoupled from the persistent list.
///
/// Dispatch also fires a payload-less data-refresh signal for non-error
/// severities: a generic "something changed, re-pull dependent views" channel
/// consumed by views unrelated to notifications.
#[derive(Clone)]
pub struct AlertDispatcher {
    alerts: broadcast::Sender<Alert>,
    refresh: broadcast::Sender<()>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        let (alerts, _) = broadcast::channel(64);
        let (refresh, _) = broadcast::channel(16);
        Self { alerts, refresh }
    }

    pub fn subscribe_alerts(&self) -> broadcast::Receiver<Alert> {
        self.alerts.subscribe()
    }

    pub fn subscribe_refresh(&self) -> broadcast::Receiver<()> {
        self.refresh.subscribe()
    }

    /// Emit an alert for a freshly pushed notification. Send failures mean no
    /// receiver is mounted and are swallowed.
    pub fn dispatch(&self, notification: &Notification) {
        let severity = Severity::for_kind(&notification.kind);
        let alert = Alert {
            severity,
            kind: notification.kind.clone(),
            message: notification.message.clone(),
        };
        debug!(id = %notification.id, ?severity, "dispatching transient alert");
        self.alerts.send(alert).ok();
        if severity != Severity::Error {
            self.refresh.send(()).ok();
        }
    }
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn notif(kind: NotificationKind) -> Notification {
        Notification {
            id: "n-1".to_string(),
            account_id: "acc-1".to_string(),
            kind,
            message: "hello".to_string(),
            payload: json!({}),
            created_at: Utc::now(),
            read_at: None,
        }
    }

    #[test]
    fn test_severity_classification() {
        assert_eq!(
            Severity::for_kind(&NotificationKind::TrxCredit),
            Severity::Success
        );
        assert_eq!(
            Severity::for_kind(&NotificationKind::TrxFailed),
            Severity::Error
        );
        assert_eq!(
            Severity::for_kind(&NotificationKind::Security),
            Severity::Warning
        );
        assert_eq!(
            Severity::for_kind(&NotificationKind::TrxDebit),
            Severity::Info
        );
        assert_eq!(
            Severity::for_kind(&NotificationKind::Other("PROMO".to_string())),
            Severity::Info
        );
    }

    #[test]
    fn test_dispatch_fires_alert_and_refresh() {
        let dispatcher = AlertDispatcher::new();
        let mut alerts = dispatcher.subscribe_alerts();
        let mut refresh = dispatcher.subscribe_refresh();

        dispatcher.dispatch(&notif(NotificationKind::TrxCredit));
        let alert = alerts.try_recv().unwrap();
        assert_eq!(alert.severity, Severity::Success);
        assert!(refresh.try_recv().is_ok());
    }

    #[test]
    fn test_error_severity_skips_refresh() {
        let dispatcher = AlertDispatcher::new();
        let mut alerts = dispatcher.subscribe_alerts();
        let mut refresh = dispatcher.subscribe_refresh();

        dispatcher.dispatch(&notif(NotificationKind::TrxFailed));
        assert_eq!(alerts.try_recv().unwrap().severity, Severity::Error);
        assert!(refresh.try_recv().is_err());
    }

    #[test]
    fn test_dispatch_without_receivers_is_swallowed() {
        let dispatcher = AlertDispatcher::new();
        dispatcher.dispatch(&notif(NotificationKind::Generic));
    }
}
