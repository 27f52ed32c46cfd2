// Email Service Module
// Main orchestration module that coordinates builders and sender

pub mod builders;
pub mod sender;
pub mod types;

use self::types::EmailBuilder;
use crate::app_config::EmailConfig;
use crate::services::alert_sender::{AlertEmailRequest, AlertSender, DeliveryReceipt};
use anyhow::Result;
use async_trait::async_trait;
use builders::AlertEmailBuilder;
use handlebars::Handlebars;
use sender::EmailSender;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Upper bound for a single provider request
const PROVIDER_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Email service for sending disaster alerts
#[derive(Clone)]
pub struct EmailService {
    sender: EmailSender,
    config: EmailConfig,
    templates: Arc<Handlebars<'static>>,
}

impl EmailService {
    /// Create a new email service instance
    pub fn new(config: EmailConfig) -> Result<Self> {
        let mut templates = Handlebars::new();
        Self::register_templates(&mut templates)?;

        let sender =
            EmailSender::new_resend(config.resend_api_key.clone(), config.resend_api_url.clone())
                .with_request_timeout(PROVIDER_REQUEST_TIMEOUT)?;

        Ok(Self {
            sender,
            config,
            templates: Arc::new(templates),
        })
    }

    fn register_templates(templates: &mut Handlebars) -> Result<(), EmailError> {
        let disaster_alert_template =
            include_str!("../../../templates/email/disaster_alert.html");
        templates
            .register_template_string("disaster_alert", disaster_alert_template)
            .map_err(|e| EmailError::TemplateError(e.to_string()))?;

        Ok(())
    }

    /// Render the alert email without sending it
    pub fn build_alert_email(&self, request: &AlertEmailRequest) -> Result<EmailMessage, EmailError> {
        AlertEmailBuilder::new(request, &self.config, &self.templates).build()
    }

    /// Send a disaster alert email, returning the provider message id
    #[instrument(skip(self, request), fields(alert_id = %request.alert_id, user_id = %request.user_id))]
    pub async fn send_disaster_alert(&self, request: &AlertEmailRequest) -> Result<String, EmailError> {
        info!("Sending disaster alert email to {}", request.to);
        let message = self.build_alert_email(request)?;
        self.sender.send(message).await
    }
}

#[async_trait]
impl AlertSender for EmailService {
    async fn send_alert_email(&self, request: &AlertEmailRequest) -> DeliveryReceipt {
        match self.send_disaster_alert(request).await {
            Ok(id) => DeliveryReceipt::delivered(id),
            Err(e) => {
                warn!(alert_id = %request.alert_id, error = %e, "alert email not delivered");
                DeliveryReceipt::failed(e.to_string())
            },
        }
    }
}

// Re-export commonly used types for convenience
pub use types::{EmailError, EmailMessage};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_config::EmailProvider;
    use crate::models::AlertType;
    use uuid::Uuid;

    fn create_test_config(api_url: &str) -> EmailConfig {
        EmailConfig {
            provider: EmailProvider::Resend,
            resend_api_key: "test_key".to_string(),
            resend_api_url: api_url.to_string(),
            from_email: "alerts@test.com".to_string(),
            from_name: "Crisis Monitor".to_string(),
            support_email: "support@test.com".to_string(),
            dashboard_url: "https://dashboard.test.com".to_string(),
        }
    }

    fn request(alert_type: AlertType, coords: Option<(f64, f64)>) -> AlertEmailRequest {
        AlertEmailRequest {
            to: "resident@example.com".to_string(),
            name: "Dana".to_string(),
            title: "HIGH SEVERITY ALERT: Miami, FL, USA".to_string(),
            message: "A hurricane has been reported in Miami, FL, USA.".to_string(),
            alert_type,
            severity: 5,
            location: "Miami, FL, USA".to_string(),
            latitude: coords.map(|c| c.0),
            longitude: coords.map(|c| c.1),
            user_id: Uuid::new_v4(),
            alert_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_build_alert_email() {
        let service = EmailService::new(create_test_config("https://api.resend.com/emails")).unwrap();
        let message = service
            .build_alert_email(&request(AlertType::HighSeverity, Some((25.76, -80.19))))
            .unwrap();

        assert_eq!(message.to, vec!["resident@example.com".to_string()]);
        assert_eq!(message.from, "Crisis Monitor <alerts@test.com>");
        assert_eq!(message.subject, "[Crisis Monitor] HIGH SEVERITY ALERT: Miami, FL, USA");
        assert_eq!(message.reply_to.as_deref(), Some("support@test.com"));
        assert!(message.html.contains("Hi Dana,"));
        assert!(message.html.contains("#b91c1c"));
        assert!(message.html.contains("View on map"));
        assert!(message.html.contains("https://dashboard.test.com/settings/alerts"));

        let text = message.text.unwrap();
        assert!(text.contains("Location: Miami, FL, USA"));
        assert!(text.contains("Map: https://www.openstreetmap.org/?mlat=25.7600&mlon=-80.1900"));
    }

    #[test]
    fn test_alert_email_without_coordinates_has_no_map_link() {
        let service = EmailService::new(create_test_config("https://api.resend.com/emails")).unwrap();
        let message = service
            .build_alert_email(&request(AlertType::NewCrisis, None))
            .unwrap();

        assert!(!message.html.contains("View on map"));
        assert!(!message.html.contains("#b91c1c"));
        assert!(!message.text.unwrap().contains("Map:"));
    }

    #[test]
    fn test_invalid_recipient_is_rejected() {
        let service = EmailService::new(create_test_config("https://api.resend.com/emails")).unwrap();
        let mut req = request(AlertType::HighSeverity, None);
        req.to = "not-an-address".to_string();

        assert!(matches!(
            service.build_alert_email(&req),
            Err(EmailError::InvalidEmail(_))
        ));
    }

    #[tokio::test]
    async fn test_unreachable_provider_yields_failed_receipt() {
        let service = EmailService::new(create_test_config("http://127.0.0.1:9/emails")).unwrap();
        let receipt = service
            .send_alert_email(&request(AlertType::HighSeverity, None))
            .await;

        assert!(!receipt.success);
        assert!(receipt.id.is_none());
        assert!(receipt.error.is_some());
    }
}
