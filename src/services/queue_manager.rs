// Alert queue maintenance
// Recovers stalled deliveries and re-arms failed rows with backoff

use chrono::{DateTime, Utc};
use diesel_async::AsyncConnection;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument, warn};

use crate::{
    app_config::AlertConfig,
    db::DieselPool,
    models::{AlertQueueEntry, QueueStatus, QueueStatusUpdate},
    utils::{backoff_with_jitter, ServiceError},
};

/// Error recorded on rows that sat in `processing` past the timeout
pub const STALLED_DELIVERY_ERROR: &str = "delivery stalled";

/// Counts from one sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSweepReport {
    /// Stalled `processing` rows moved to `failed` or `dead`
    pub recovered: usize,
    /// `failed` rows re-armed to `pending`
    pub retried: usize,
    /// Rows that reached the retry cap and became `dead`
    pub exhausted: usize,
}

/// A `processing` row past the timeout counts as one failed attempt
pub fn resolve_stalled(entry: &AlertQueueEntry, now: DateTime<Utc>) -> QueueStatusUpdate {
    let retry_count = entry.retry_count + 1;
    let status = if retry_count >= entry.max_retries {
        QueueStatus::Dead
    } else {
        QueueStatus::Failed
    };

    QueueStatusUpdate {
        retry_count: Some(retry_count),
        error_message: Some(Some(STALLED_DELIVERY_ERROR.to_string())),
        ..QueueStatusUpdate::status(status, now)
    }
}

/// Re-arm a `failed` row after `delay`, or bury it once the cap is reached.
/// `retry_count` is left as the worker recorded it.
pub fn resolve_failed(
    entry: &AlertQueueEntry,
    now: DateTime<Utc>,
    delay: Duration,
) -> QueueStatusUpdate {
    if entry.retry_count >= entry.max_retries {
        return QueueStatusUpdate::status(QueueStatus::Dead, now);
    }

    let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
    QueueStatusUpdate {
        scheduled_at: Some(now + delay),
        ..QueueStatusUpdate::status(QueueStatus::Pending, now)
    }
}

pub struct AlertQueueManager {
    pool: DieselPool,
    config: AlertConfig,
}

impl AlertQueueManager {
    pub fn new(pool: DieselPool, config: AlertConfig) -> Self {
        Self { pool, config }
    }

    /// Run both sweeps in one transaction. Rows are locked with
    /// `SKIP LOCKED`, so concurrent managers touch disjoint rows.
    #[instrument(skip(self))]
    pub async fn process_queue(&self) -> Result<QueueSweepReport, ServiceError> {
        let now = Utc::now();
        let stalled_before = now - self.config.processing_timeout();
        let base = self.config.retry_backoff_base();
        let max = self.config.retry_backoff_max();

        let mut conn = self.pool.get().await?;
        let report = conn
            .transaction::<_, ServiceError, _>(|tx| {
                Box::pin(async move {
                    let mut report = QueueSweepReport::default();

                    let stalled = AlertQueueEntry::lock_by_status_updated_before(
                        tx,
                        QueueStatus::Processing,
                        stalled_before,
                    )
                    .await?;
                    for entry in &stalled {
                        let update = resolve_stalled(entry, now);
                        warn!(
                            entry_id = %entry.id,
                            alert_id = %entry.alert_id,
                            next = %update.status,
                            "Recovering stalled delivery"
                        );
                        if update.status == QueueStatus::Dead {
                            report.exhausted += 1;
                        }
                        AlertQueueEntry::apply_update(tx, entry.id, &update).await?;
                        report.recovered += 1;
                    }

                    let failed =
                        AlertQueueEntry::lock_by_status_updated_before(tx, QueueStatus::Failed, now)
                            .await?;
                    for entry in &failed {
                        let delay = backoff_with_jitter(entry.retry_count.max(1) as u32, base, max);
                        let update = resolve_failed(entry, now, delay);
                        match update.status {
                            QueueStatus::Dead => report.exhausted += 1,
                            _ => report.retried += 1,
                        }
                        AlertQueueEntry::apply_update(tx, entry.id, &update).await?;
                    }

                    Ok(report)
                })
            })
            .await?;

        info!(
            recovered = report.recovered,
            retried = report.retried,
            exhausted = report.exhausted,
            "Queue sweep complete"
        );
        Ok(report)
    }
}
