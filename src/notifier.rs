// src/notifier.rs
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use log::{info, warn};
use serde::Serialize;

use crate::alert::{AlertSpec, Severity};
use crate::drivers::Band;

/// Body POSTed to the webhook on alert-raising edges.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Notification {
    pub status: String,
    /// ISO-8601, UTC, millisecond precision.
    pub timestamp: String,
    pub dominant_wave: Band,
    pub severity: Severity,
}

impl Notification {
    pub fn for_alert(alert: &AlertSpec, at: DateTime<Utc>) -> Self {
        Self {
            status: alert.status.clone(),
            timestamp: at.to_rfc3339_opts(SecondsFormat::Millis, true),
            dominant_wave: alert.dominant_wave,
            severity: alert.severity,
        }
    }
}

/// Fire-and-forget delivery. Implementations must not block and must not retry.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Used when no webhook is configured.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        info!(
            "notification (no webhook configured): {} [{}]",
            notification.status, notification.severity
        );
    }
}

pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, notification: Notification) {
        tokio::spawn(deliver(self.client.clone(), self.url.clone(), notification));
    }
}

/// POSTs one notification. Failures are logged; returns whether the webhook
/// accepted it.
async fn deliver(client: reqwest::Client, url: String, notification: Notification) -> bool {
    let sent = client.post(&url).json(&notification).send().await;
    match sent.and_then(|r| r.error_for_status()) {
        Ok(resp) => {
            info!(
                "webhook accepted '{}' ({})",
                notification.status,
                resp.status()
            );
            true
        }
        Err(err) => {
            warn!("webhook delivery of '{}' failed: {err}", notification.status);
            false
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Keeps every notification in memory.
    #[derive(Clone, Default)]
    pub struct RecordingNotifier {
        pub sent: Arc<Mutex<Vec<Notification>>>,
    }

    impl RecordingNotifier {
        pub fn sent(&self) -> Vec<Notification> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.sent.lock().unwrap().push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn body_matches_webhook_contract() {
        let alert = AlertSpec {
            severity: Severity::High,
            status: "Seizure detected".into(),
            dominant_wave: Band::Gamma,
            banner: String::new(),
        };
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 30, 5).unwrap();
        let body = serde_json::to_value(Notification::for_alert(&alert, at)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "status": "Seizure detected",
                "timestamp": "2025-03-01T12:30:05.000Z",
                "dominant_wave": "gamma",
                "severity": "high",
            })
        );
    }

    #[tokio::test]
    async fn unreachable_webhook_is_logged_not_raised() {
        // nothing listens on port 9 of localhost
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/hook", Duration::from_millis(500))
            .unwrap();
        let alert = AlertSpec {
            severity: Severity::Medium,
            status: "High stress levels".into(),
            dominant_wave: Band::Beta,
            banner: String::new(),
        };
        let notification = Notification::for_alert(&alert, Utc::now());
        let delivered = deliver(
            notifier.client.clone(),
            notifier.url.clone(),
            notification.clone(),
        )
        .await;
        assert!(!delivered);

        // the spawned path completes on its own without touching the caller
        notifier.notify(notification);
        tokio::time::sleep(Duration::from_millis(800)).await;
    }
}
