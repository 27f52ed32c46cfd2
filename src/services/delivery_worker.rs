// Alert delivery worker
// Claims due queue rows with SKIP LOCKED and sends them through an AlertSender

use chrono::{DateTime, Utc};
use diesel_async::AsyncConnection;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::{
    app_config::AlertConfig,
    db::DieselPool,
    models::{Alert, AlertQueueEntry, QueueStatus, QueueStatusUpdate, UserAlertPreferences},
    services::alert_sender::{AlertEmailRequest, AlertSender, DeliveryReceipt},
    utils::ServiceError,
};

/// Error recorded when the queued alert no longer exists
pub const ALERT_NOT_FOUND_ERROR: &str = "alert not found";

/// Counts from one delivery batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub sent: usize,
    /// Every failed send attempt, including final attempts that went dead
    pub failed: usize,
    pub skipped: usize,
    /// Rows moved to `dead`, whether by a final failed send or dead-lettering
    pub dead: usize,
    pub total_processed: usize,
}

impl DeliveryReport {
    fn record(&mut self, update: &QueueStatusUpdate) {
        // Only send outcomes touch retry_count
        let send_failed = update.retry_count.is_some();
        match update.status {
            QueueStatus::Sent => self.sent += 1,
            QueueStatus::Failed => self.failed += 1,
            QueueStatus::Skipped => self.skipped += 1,
            QueueStatus::Dead => {
                self.dead += 1;
                if send_failed {
                    self.failed += 1;
                }
            },
            QueueStatus::Pending | QueueStatus::Processing => {},
        }
        self.total_processed += 1;
    }
}

/// What to do with one claimed row before any I/O happens
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryDecision {
    Send(AlertEmailRequest),
    /// Below the user's email floor, email disabled, or no preferences
    Skip,
    /// The row can never be delivered
    DeadLetter(String),
}

pub fn decide(
    entry: &AlertQueueEntry,
    alert: Option<&Alert>,
    prefs: Option<&UserAlertPreferences>,
) -> DeliveryDecision {
    let Some(alert) = alert else {
        return DeliveryDecision::DeadLetter(ALERT_NOT_FOUND_ERROR.to_string());
    };

    match prefs {
        Some(p) if p.email_enabled && alert.severity >= p.email_min_severity => {
            DeliveryDecision::Send(AlertEmailRequest::for_entry(entry, alert))
        },
        _ => DeliveryDecision::Skip,
    }
}

/// Status update for a row after a send attempt
pub fn resolve_send_outcome(
    entry: &AlertQueueEntry,
    receipt: &DeliveryReceipt,
    now: DateTime<Utc>,
) -> QueueStatusUpdate {
    if receipt.success {
        return QueueStatusUpdate {
            sent_at: Some(now),
            error_message: Some(None),
            ..QueueStatusUpdate::status(QueueStatus::Sent, now)
        };
    }

    let retry_count = entry.retry_count + 1;
    let status = if retry_count >= entry.max_retries {
        QueueStatus::Dead
    } else {
        QueueStatus::Failed
    };
    let error = receipt
        .error
        .clone()
        .unwrap_or_else(|| "unknown delivery error".to_string());

    QueueStatusUpdate {
        retry_count: Some(retry_count),
        error_message: Some(Some(error)),
        ..QueueStatusUpdate::status(status, now)
    }
}

pub struct AlertDeliveryWorker {
    pool: DieselPool,
    sender: Arc<dyn AlertSender>,
    config: AlertConfig,
}

impl AlertDeliveryWorker {
    pub fn new(pool: DieselPool, sender: Arc<dyn AlertSender>, config: AlertConfig) -> Self {
        Self {
            pool,
            sender,
            config,
        }
    }

    /// Claim up to `delivery_batch_size` due rows and mark them `processing`.
    /// The claim commits on return, before anything is sent.
    #[instrument(skip(self))]
    pub async fn claim_batch(&self) -> Result<Vec<AlertQueueEntry>, ServiceError> {
        let mut conn = self.pool.get().await?;
        let claimed =
            AlertQueueEntry::claim_pending_batch(&mut conn, self.config.delivery_batch_size, Utc::now())
                .await?;
        debug!(claimed = claimed.len(), "Claimed delivery batch");
        Ok(claimed)
    }

    /// Send one claimed row, bounded by the configured send timeout
    async fn deliver(&self, request: &AlertEmailRequest) -> DeliveryReceipt {
        let send_timeout = self.config.send_timeout();
        match timeout(send_timeout, self.sender.send_alert_email(request)).await {
            Ok(receipt) => receipt,
            Err(_) => DeliveryReceipt::failed(format!(
                "send timed out after {}s",
                send_timeout.as_secs()
            )),
        }
    }

    /// Decide and send for every claimed row, in claim order
    pub async fn resolve_batch(
        &self,
        claimed: &[AlertQueueEntry],
        alerts: &HashMap<Uuid, Alert>,
        prefs: &HashMap<Uuid, UserAlertPreferences>,
    ) -> Vec<(Uuid, QueueStatusUpdate)> {
        let mut updates = Vec::with_capacity(claimed.len());

        for entry in claimed {
            let decision = decide(
                entry,
                alerts.get(&entry.alert_id),
                prefs.get(&entry.user_id),
            );

            let update = match decision {
                DeliveryDecision::Send(request) => {
                    let receipt = self.deliver(&request).await;
                    if !receipt.success {
                        warn!(
                            entry_id = %entry.id,
                            attempt = entry.retry_count + 1,
                            error = receipt.error.as_deref().unwrap_or_default(),
                            "Alert delivery failed"
                        );
                    }
                    resolve_send_outcome(entry, &receipt, Utc::now())
                },
                DeliveryDecision::Skip => {
                    debug!(entry_id = %entry.id, "Below email floor, skipping");
                    QueueStatusUpdate::status(QueueStatus::Skipped, Utc::now())
                },
                DeliveryDecision::DeadLetter(reason) => {
                    warn!(entry_id = %entry.id, alert_id = %entry.alert_id, %reason, "Dead-lettering queue entry");
                    QueueStatusUpdate {
                        error_message: Some(Some(reason)),
                        ..QueueStatusUpdate::status(QueueStatus::Dead, Utc::now())
                    }
                },
            };
            updates.push((entry.id, update));
        }

        updates
    }

    /// Claim a batch, send it, and write every outcome in one transaction.
    /// A crash between send and commit leaves rows `processing` for stalled-row
    /// recovery, so a delivered alert may be sent again.
    #[instrument(skip(self))]
    pub async fn process_deliveries(&self) -> Result<DeliveryReport, ServiceError> {
        let claimed = self.claim_batch().await?;
        if claimed.is_empty() {
            return Ok(DeliveryReport::default());
        }

        let alert_ids: Vec<Uuid> = claimed.iter().map(|e| e.alert_id).collect();
        let user_ids: Vec<Uuid> = claimed.iter().map(|e| e.user_id).collect();

        let (alerts, prefs) = {
            let mut conn = self.pool.get().await?;
            let alerts: HashMap<Uuid, Alert> = Alert::find_many(&mut conn, &alert_ids)
                .await?
                .into_iter()
                .map(|a| (a.id, a))
                .collect();
            let prefs: HashMap<Uuid, UserAlertPreferences> =
                UserAlertPreferences::find_for_users(&mut conn, &user_ids)
                    .await?
                    .into_iter()
                    .map(|p| (p.user_id, p))
                    .collect();
            (alerts, prefs)
        };

        let updates = self.resolve_batch(&claimed, &alerts, &prefs).await;

        let mut report = DeliveryReport::default();
        for (_, update) in &updates {
            report.record(update);
        }

        let mut conn = self.pool.get().await?;
        let stale = conn
            .transaction::<_, ServiceError, _>(|tx| {
                Box::pin(async move {
                    let mut stale = 0;
                    for (entry_id, update) in &updates {
                        let rows = AlertQueueEntry::apply_update_if_status(
                            tx,
                            *entry_id,
                            QueueStatus::Processing,
                            update,
                        )
                        .await?;
                        if rows == 0 {
                            stale += 1;
                        }
                    }
                    Ok(stale)
                })
            })
            .await?;

        if stale > 0 {
            warn!(stale, "Some entries were recovered by the queue manager before the batch committed");
        }

        info!(
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            dead = report.dead,
            total = report.total_processed,
            "Delivery batch complete"
        );
        Ok(report)
    }
}
