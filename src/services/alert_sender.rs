// Delivery capability used by the delivery worker
// Implementations: EmailService (Resend) and LogAlertSender (local dev)

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::models::{Alert, AlertQueueEntry, AlertType};

/// Everything a sender needs to deliver one alert to one recipient
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEmailRequest {
    pub to: String,
    pub name: String,
    pub title: String,
    pub message: String,
    pub alert_type: AlertType,
    pub severity: i32,
    pub location: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub user_id: Uuid,
    pub alert_id: Uuid,
}

impl AlertEmailRequest {
    /// Build from a queue entry (recipient snapshot) and its alert
    pub fn for_entry(entry: &AlertQueueEntry, alert: &Alert) -> Self {
        Self {
            to: entry.recipient_email.clone(),
            name: entry.recipient_name.clone(),
            title: alert.title.clone(),
            message: alert.message.clone(),
            alert_type: alert.alert_type,
            severity: alert.severity,
            location: alert.alert_metadata.location.clone(),
            latitude: alert.alert_metadata.latitude,
            longitude: alert.alert_metadata.longitude,
            user_id: entry.user_id,
            alert_id: alert.id,
        }
    }
}

/// Outcome reported by a sender. Failures are data, not errors: the worker
/// records them on the queue row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    pub success: bool,
    pub id: Option<String>,
    pub error: Option<String>,
}

impl DeliveryReceipt {
    pub fn delivered(id: impl Into<String>) -> Self {
        Self {
            success: true,
            id: Some(id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(error.into()),
        }
    }
}

#[async_trait]
pub trait AlertSender: Send + Sync {
    async fn send_alert_email(&self, request: &AlertEmailRequest) -> DeliveryReceipt;
}

/// Sender that only logs; used when no email provider is configured
#[derive(Debug, Clone, Default)]
pub struct LogAlertSender;

#[async_trait]
impl AlertSender for LogAlertSender {
    async fn send_alert_email(&self, request: &AlertEmailRequest) -> DeliveryReceipt {
        info!(
            to = %request.to,
            alert_id = %request.alert_id,
            alert_type = %request.alert_type,
            severity = request.severity,
            title = %request.title,
            "alert email send stub"
        );
        DeliveryReceipt::delivered(format!("log-{}", Uuid::new_v4()))
    }
}
