//! Notifications to store staff: new orders and requests for a human attendant.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use storefront_core::config::AlertConfig;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    OrderPlaced {
        tenant_id: String,
        identity: String,
        order_number: String,
        total: Decimal,
        items: usize,
    },
    HumanRequested {
        tenant_id: String,
        identity: String,
        reason: Option<String>,
    },
}

impl Alert {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::OrderPlaced { .. } => "order_placed",
            Self::HumanRequested { .. } => "human_requested",
        }
    }

    fn tenant_id(&self) -> &str {
        match self {
            Self::OrderPlaced { tenant_id, .. } | Self::HumanRequested { tenant_id, .. } => {
                tenant_id
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert delivery failed: {0}")]
    Request(String),
    #[error("alert endpoint returned status {0}")]
    Status(u16),
}

#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn notify(&self, alert: &Alert) -> Result<(), AlertError>;
}

/// Writes alerts to the log; used when no webhook is configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl AlertNotifier for LoggingNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), AlertError> {
        info!(
            event_name = "alert.logged",
            tenant_id = alert.tenant_id(),
            alert_kind = alert.kind(),
            "staff alert raised"
        );
        Ok(())
    }
}

/// POSTs each alert as JSON.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, AlertError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| AlertError::Request(error.to_string()))?;
        Ok(Self { client, url: url.into() })
    }
}

#[async_trait]
impl AlertNotifier for WebhookNotifier {
    async fn notify(&self, alert: &Alert) -> Result<(), AlertError> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .map_err(|error| AlertError::Request(error.to_string()))?;
        if !response.status().is_success() {
            return Err(AlertError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

/// Webhook notifier when `escalation_webhook_url` is set, log notifier otherwise.
pub fn notifier_from_config(config: &AlertConfig) -> Result<Arc<dyn AlertNotifier>, AlertError> {
    match config.escalation_webhook_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => {
            Ok(Arc::new(WebhookNotifier::new(url, Duration::from_secs(10))?))
        }
        _ => Ok(Arc::new(LoggingNotifier)),
    }
}

/// Sends the alert in the background; failures are logged and never reach the customer.
pub fn spawn_alert(notifier: Arc<dyn AlertNotifier>, alert: Alert) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(error) = notifier.notify(&alert).await {
            warn!(
                event_name = "alert.delivery_failed",
                tenant_id = alert.tenant_id(),
                alert_kind = alert.kind(),
                error = %error,
                "staff alert could not be delivered"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal::Decimal;
    use tokio::sync::Mutex;

    use storefront_core::config::AlertConfig;

    use super::{notifier_from_config, spawn_alert, Alert, AlertError, AlertNotifier};

    #[derive(Default)]
    struct Recording {
        alerts: Mutex<Vec<Alert>>,
    }

    #[async_trait::async_trait]
    impl AlertNotifier for Recording {
        async fn notify(&self, alert: &Alert) -> Result<(), AlertError> {
            self.alerts.lock().await.push(alert.clone());
            Err(AlertError::Status(502))
        }
    }

    #[test]
    fn alerts_serialize_with_kind_tag() {
        let alert = Alert::OrderPlaced {
            tenant_id: "farmacia".to_string(),
            identity: "5561999991234".to_string(),
            order_number: "ORD-1A2B3C4D".to_string(),
            total: Decimal::new(2370, 2),
            items: 2,
        };
        let value = serde_json::to_value(&alert).expect("serialize");
        assert_eq!(value["kind"], "order_placed");
        assert_eq!(value["order_number"], "ORD-1A2B3C4D");
    }

    #[tokio::test]
    async fn spawned_alert_failure_is_swallowed() {
        let recording = Arc::new(Recording::default());
        let alert = Alert::HumanRequested {
            tenant_id: "farmacia".to_string(),
            identity: "5561999991234".to_string(),
            reason: Some("prescription question".to_string()),
        };

        spawn_alert(recording.clone(), alert.clone()).await.expect("task completes");
        assert_eq!(recording.alerts.lock().await.as_slice(), &[alert]);
    }

    #[tokio::test]
    async fn blank_webhook_url_falls_back_to_logging() {
        let config = AlertConfig { escalation_webhook_url: Some("  ".to_string()) };
        let notifier = notifier_from_config(&config).expect("notifier");
        let alert = Alert::HumanRequested {
            tenant_id: "farmacia".to_string(),
            identity: "1".to_string(),
            reason: None,
        };
        assert!(notifier.notify(&alert).await.is_ok());
    }
}
