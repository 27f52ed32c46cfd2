// Email Builders - Builders for different types of emails
// Each builder knows how to construct its specific email type

use super::types::{DisasterAlertEmailData, EmailBuilder, EmailError, EmailMessage};
use crate::app_config::EmailConfig;
use crate::models::AlertType;
use crate::services::alert_sender::AlertEmailRequest;
use handlebars::Handlebars;
use tracing::instrument;

/// Builder for disaster alert emails
pub struct AlertEmailBuilder<'a> {
    request: &'a AlertEmailRequest,
    config: &'a EmailConfig,
    templates: &'a Handlebars<'a>,
}

impl<'a> AlertEmailBuilder<'a> {
    pub fn new(
        request: &'a AlertEmailRequest,
        config: &'a EmailConfig,
        templates: &'a Handlebars<'a>,
    ) -> Self {
        Self {
            request,
            config,
            templates,
        }
    }

    fn map_url(&self) -> Option<String> {
        let (lat, lon) = self.request.latitude.zip(self.request.longitude)?;
        Some(format!(
            "https://www.openstreetmap.org/?mlat={lat:.4}&mlon={lon:.4}#map=9/{lat:.4}/{lon:.4}"
        ))
    }
}

impl<'a> EmailBuilder for AlertEmailBuilder<'a> {
    #[instrument(skip(self), fields(alert_id = %self.request.alert_id))]
    fn build(&self) -> Result<EmailMessage, EmailError> {
        if !self.request.to.contains('@') {
            return Err(EmailError::InvalidEmail(self.request.to.clone()));
        }

        let map_url = self.map_url();
        let data = DisasterAlertEmailData {
            user_name: self.request.name.clone(),
            title: self.request.title.clone(),
            message: self.request.message.clone(),
            alert_type: self.request.alert_type.to_string(),
            severity: self.request.severity,
            location: self.request.location.clone(),
            map_url: map_url.clone(),
            is_high_severity: self.request.alert_type == AlertType::HighSeverity,
            dashboard_url: self.config.dashboard_url.clone(),
            app_name: self.config.from_name.clone(),
            support_email: self.config.support_email.clone(),
        };

        let html = self
            .templates
            .render("disaster_alert", &data)
            .map_err(|e| EmailError::TemplateError(e.to_string()))?;

        let mut text = format!(
            "Hi {},\n\n{}\n\n{}\n\nLocation: {}\n",
            self.request.name, self.request.title, self.request.message, self.request.location
        );
        if let Some(url) = map_url {
            text.push_str(&format!("Map: {}\n", url));
        }
        text.push_str(&format!(
            "\nManage your alert preferences at {}\n\nThe {} Team",
            self.config.dashboard_url, self.config.from_name
        ));

        Ok(EmailMessage::new(
            format!("{} <{}>", self.config.from_name, self.config.from_email),
            vec![self.request.to.clone()],
            format!("[{}] {}", self.config.from_name, self.request.title),
            html,
        )
        .with_text(text)
        .with_reply_to(self.config.support_email.clone()))
    }
}
