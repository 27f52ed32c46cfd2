// Alert generation
// Turns newly extracted disasters into alerts and fans them out to matching users

use chrono::{Duration, Utc};
use diesel_async::AsyncConnection;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    app_config::AlertConfig,
    db::DieselPool,
    models::{
        Alert, AlertMetadata, AlertQueueEntry, AlertType, Disaster, NewAlert,
        NewAlertQueueEntry, QueueStatus, User,
    },
    services::matcher::RecipientMatcher,
    utils::{severity_to_priority, ServiceError},
};

// =============================================================================
// CONSTANTS
// =============================================================================

/// Rows per queue INSERT; keeps bind parameters well under the Postgres limit
const QUEUE_INSERT_CHUNK: usize = 1000;

/// Width of `alerts.title`
const MAX_TITLE_CHARS: usize = 255;

// =============================================================================
// TYPES
// =============================================================================

/// Rendered alert text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertContent {
    pub title: String,
    pub message: String,
}

/// A freshly created alert and how many recipients were queued for it
#[derive(Debug, Clone, Serialize)]
pub struct CreatedAlert {
    pub alert: Alert,
    pub recipients_queued: usize,
}

/// Result of one generation run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationReport {
    pub status: String,
    pub disasters_checked: usize,
    pub alerts_created: usize,
    pub recipients_queued: usize,
    /// Disasters whose transaction failed; retried on the next run
    pub failures: usize,
}

// =============================================================================
// PURE HELPERS
// =============================================================================

/// Alert type for a severity, or `None` when it is below both thresholds
pub fn classify_severity(severity: i32, config: &AlertConfig) -> Option<AlertType> {
    if severity >= config.high_severity_threshold {
        Some(AlertType::HighSeverity)
    } else if severity >= config.new_crisis_threshold {
        Some(AlertType::NewCrisis)
    } else {
        None
    }
}

/// Deterministic title and body for an alert about `disaster`
pub fn build_alert_content(disaster: &Disaster, alert_type: AlertType) -> AlertContent {
    let location = disaster.location_name.trim();
    let kind = disaster.disaster_type.trim();

    let (title, intro) = match alert_type {
        AlertType::HighSeverity => (
            format!("HIGH SEVERITY ALERT: {}", location),
            format!(
                "A high severity {} has been reported in {}. Follow guidance from local authorities.",
                kind, location
            ),
        ),
        AlertType::NewCrisis => (
            format!("New Crisis Detected: {}", location),
            format!("A new {} has been detected in {}.", kind, location),
        ),
        AlertType::SeverityChange => (
            format!("Severity Update: {}", location),
            format!("The severity of the {} in {} has changed.", kind, location),
        ),
    };

    let mut message = format!("{}\n\nSeverity: {}/5", intro, disaster.severity);
    if let Some(description) = disaster
        .description
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
    {
        message.push_str("\n\n");
        message.push_str(description);
    }
    if let Some(population) = disaster.affected_population {
        message.push_str(&format!("\n\nEstimated affected population: {}", population));
    }

    AlertContent {
        title: title.chars().take(MAX_TITLE_CHARS).collect(),
        message,
    }
}

// =============================================================================
// GENERATOR
// =============================================================================

pub struct AlertGenerator {
    pool: DieselPool,
    config: AlertConfig,
    matcher: RecipientMatcher,
}

impl AlertGenerator {
    pub fn new(pool: DieselPool, config: AlertConfig) -> Self {
        let matcher = RecipientMatcher::new(config.radius_km);
        Self {
            pool,
            config,
            matcher,
        }
    }

    /// Unarchived disasters extracted within the last `window_minutes` that have no alert
    #[instrument(skip(self))]
    pub async fn find_unalerted_recent_disasters(
        &self,
        window_minutes: i64,
    ) -> Result<Vec<Disaster>, ServiceError> {
        let since = Utc::now() - Duration::minutes(window_minutes);
        let mut conn = self.pool.get().await?;
        let disasters = Disaster::find_unalerted_since(&mut conn, since).await?;
        debug!(count = disasters.len(), %since, "unalerted disasters");
        Ok(disasters)
    }

    pub fn should_alert_for_disaster(&self, disaster: &Disaster) -> Option<AlertType> {
        classify_severity(disaster.severity, &self.config)
    }

    pub fn build_alert_content(&self, disaster: &Disaster, alert_type: AlertType) -> AlertContent {
        build_alert_content(disaster, alert_type)
    }

    /// Insert the alert and one pending queue row per matching user in one
    /// transaction. `None` means the disaster already had an alert.
    #[instrument(skip(self, disaster), fields(disaster_id = %disaster.id))]
    pub async fn create_alert_and_queue(
        &self,
        disaster: &Disaster,
        alert_type: AlertType,
    ) -> Result<Option<CreatedAlert>, ServiceError> {
        let content = build_alert_content(disaster, alert_type);
        let new_alert = NewAlert {
            disaster_id: disaster.id,
            alert_type,
            severity: disaster.severity,
            title: content.title,
            message: content.message,
            alert_metadata: AlertMetadata::from(disaster),
        };
        let matcher = self.matcher;
        let max_retries = self.config.max_retries;
        let priority = severity_to_priority(disaster.severity);

        let mut conn = self.pool.get().await?;
        let created = conn
            .transaction::<_, ServiceError, _>(|tx| {
                Box::pin(async move {
                    let Some(alert) = Alert::insert_if_absent(tx, &new_alert).await? else {
                        return Ok(None);
                    };

                    let candidates = User::load_all_with_preferences(tx).await?;
                    let now = Utc::now();
                    let entries: Vec<NewAlertQueueEntry> = matcher
                        .select_recipients(disaster, &candidates)
                        .into_iter()
                        .map(|user| NewAlertQueueEntry {
                            alert_id: alert.id,
                            user_id: user.id,
                            recipient_email: user.email.clone(),
                            recipient_name: user.name.clone(),
                            priority,
                            status: QueueStatus::Pending,
                            max_retries,
                            scheduled_at: now,
                        })
                        .collect();

                    let mut recipients_queued = 0;
                    for chunk in entries.chunks(QUEUE_INSERT_CHUNK) {
                        recipients_queued += AlertQueueEntry::insert_batch(tx, chunk).await?;
                    }

                    Ok(Some(CreatedAlert {
                        alert,
                        recipients_queued,
                    }))
                })
            })
            .await?;

        match &created {
            Some(c) => info!(
                alert_id = %c.alert.id,
                recipients = c.recipients_queued,
                "Alert created and queued"
            ),
            None => debug!("Alert already exists for disaster"),
        }
        Ok(created)
    }

    /// One generation pass over the detection window.
    /// A failing disaster is rolled back and logged; the rest still run.
    #[instrument(skip(self))]
    pub async fn generate_alerts(&self) -> Result<GenerationReport, ServiceError> {
        let disasters = self
            .find_unalerted_recent_disasters(self.config.detection_window_minutes)
            .await?;

        let mut report = GenerationReport {
            disasters_checked: disasters.len(),
            ..Default::default()
        };

        for disaster in &disasters {
            let Some(alert_type) = self.should_alert_for_disaster(disaster) else {
                debug!(disaster_id = %disaster.id, severity = disaster.severity, "Below alert thresholds");
                continue;
            };

            match self.create_alert_and_queue(disaster, alert_type).await {
                Ok(Some(created)) => {
                    report.alerts_created += 1;
                    report.recipients_queued += created.recipients_queued;
                },
                Ok(None) => {},
                Err(e) => {
                    report.failures += 1;
                    error!(disaster_id = %disaster.id, error = %e, "Failed to create alert");
                },
            }
        }

        report.status = if report.failures == 0 {
            "success".to_string()
        } else {
            warn!(failures = report.failures, "Alert generation finished with failures");
            "partial".to_string()
        };

        info!(
            disasters_checked = report.disasters_checked,
            alerts_created = report.alerts_created,
            recipients_queued = report.recipients_queued,
            "Alert generation complete"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn disaster(severity: i32) -> Disaster {
        Disaster {
            id: Uuid::new_v4(),
            location_name: "Miami, FL, USA".to_string(),
            latitude: Some(25.76),
            longitude: Some(-80.19),
            severity,
            disaster_type: "hurricane".to_string(),
            description: Some("Category 4 hurricane making landfall".to_string()),
            affected_population: Some(450_000),
            event_time: None,
            extracted_at: Utc::now(),
            archived: false,
        }
    }

    #[test]
    fn test_classify_severity_defaults() {
        let config = AlertConfig::default();
        assert_eq!(classify_severity(5, &config), Some(AlertType::HighSeverity));
        assert_eq!(classify_severity(4, &config), Some(AlertType::HighSeverity));
        assert_eq!(classify_severity(3, &config), Some(AlertType::NewCrisis));
        assert_eq!(classify_severity(2, &config), None);
        assert_eq!(classify_severity(1, &config), None);
    }

    #[test]
    fn test_classify_severity_respects_config() {
        let config = AlertConfig {
            high_severity_threshold: 5,
            new_crisis_threshold: 2,
            ..AlertConfig::default()
        };
        assert_eq!(classify_severity(4, &config), Some(AlertType::NewCrisis));
        assert_eq!(classify_severity(2, &config), Some(AlertType::NewCrisis));
        assert_eq!(classify_severity(5, &config), Some(AlertType::HighSeverity));
    }

    #[test]
    fn test_high_severity_content() {
        let content = build_alert_content(&disaster(5), AlertType::HighSeverity);
        assert_eq!(content.title, "HIGH SEVERITY ALERT: Miami, FL, USA");
        assert!(content.message.contains("Severity: 5/5"));
        assert!(content.message.contains("Category 4 hurricane making landfall"));
        assert!(content.message.contains("Estimated affected population: 450000"));
    }

    #[test]
    fn test_content_omits_missing_fields() {
        let mut d = disaster(3);
        d.description = Some("   ".to_string());
        d.affected_population = None;

        let content = build_alert_content(&d, AlertType::NewCrisis);
        assert_eq!(content.title, "New Crisis Detected: Miami, FL, USA");
        assert!(content.message.ends_with("Severity: 3/5"));
        assert!(!content.message.contains("population"));
    }

    #[test]
    fn test_content_is_deterministic() {
        let d = disaster(4);
        for alert_type in [
            AlertType::HighSeverity,
            AlertType::NewCrisis,
            AlertType::SeverityChange,
        ] {
            assert_eq!(
                build_alert_content(&d, alert_type),
                build_alert_content(&d, alert_type)
            );
        }
    }

    #[test]
    fn test_title_is_bounded() {
        let mut d = disaster(4);
        d.location_name = "x".repeat(400);
        let content = build_alert_content(&d, AlertType::HighSeverity);
        assert_eq!(content.title.chars().count(), MAX_TITLE_CHARS);
    }
}
