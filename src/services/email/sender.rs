// Email Sender - Generic email sending functionality
// Handles the actual delivery through the email provider API

use super::types::{EmailError, EmailMessage, ResendEmailPayload, ResendEmailResponse};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument};

/// Generic email sender that handles delivery to email providers.
/// Makes a single attempt per call; retries are owned by the alert queue.
#[derive(Clone)]
pub struct EmailSender {
    client: Arc<Client>,
    api_key: String,
    api_url: String,
}

impl EmailSender {
    /// Create a new email sender for Resend API
    pub fn new_resend(api_key: String, api_url: String) -> Self {
        Self {
            client: Arc::new(Client::new()),
            api_key,
            api_url,
        }
    }

    /// Bound every request; the worker also applies its own send timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Result<Self, EmailError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmailError::ConfigError(e.to_string()))?;
        self.client = Arc::new(client);
        Ok(self)
    }

    /// Send an email message, returning the provider message id
    #[instrument(skip(self, message), fields(to = ?message.to, subject = %message.subject))]
    pub async fn send(&self, message: EmailMessage) -> Result<String, EmailError> {
        let payload: ResendEmailPayload = message.into();

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&payload)
            .send()
            .await;

        match response {
            Ok(res) if res.status().is_success() => {
                let body: ResendEmailResponse = res.json().await.map_err(|e| {
                    EmailError::SendError(format!("Unexpected provider response: {}", e))
                })?;
                info!(message_id = %body.id, "Email sent successfully");
                Ok(body.id)
            },
            Ok(res) => {
                let status = res.status();
                let error_text = res
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());

                error!(
                    "Failed to send email. Status: {}, Error: {}",
                    status, error_text
                );

                if status.as_u16() == 429 {
                    Err(EmailError::RateLimitExceeded)
                } else if status.is_server_error() {
                    Err(EmailError::ServiceUnavailable)
                } else {
                    Err(EmailError::SendError(format!(
                        "Email send failed with status {}: {}",
                        status, error_text
                    )))
                }
            },
            Err(e) => {
                error!("Network error while sending email: {:?}", e);
                Err(EmailError::SendError(format!("Network error: {}", e)))
            },
        }
    }
}
