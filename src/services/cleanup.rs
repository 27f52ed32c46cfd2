// Alert data retention
// Marks old alerts read and prunes settled queue rows

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::{
    app_config::AlertConfig,
    db::DieselPool,
    models::{Alert, AlertQueueEntry, QueueStatus},
    utils::ServiceError,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub alerts_marked_read: usize,
    pub queue_entries_deleted: usize,
}

/// Queue statuses eligible for deletion. `dead` and `skipped` rows are kept
/// for audit unless `delete_dead` is set.
pub fn deletable_statuses(delete_dead: bool) -> Vec<QueueStatus> {
    let mut statuses = vec![QueueStatus::Sent, QueueStatus::Failed];
    if delete_dead {
        statuses.extend([QueueStatus::Dead, QueueStatus::Skipped]);
    }
    statuses
}

pub struct AlertCleanup {
    pool: DieselPool,
    config: AlertConfig,
}

impl AlertCleanup {
    pub fn new(pool: DieselPool, config: AlertConfig) -> Self {
        Self { pool, config }
    }

    #[instrument(skip(self))]
    pub async fn cleanup_old_alerts(&self) -> Result<CleanupReport, ServiceError> {
        self.cleanup_as_of(Utc::now()).await
    }

    /// Apply retention relative to `now`
    pub async fn cleanup_as_of(&self, now: DateTime<Utc>) -> Result<CleanupReport, ServiceError> {
        let read_cutoff = now - Duration::days(self.config.read_alert_retention_days);
        let queue_cutoff = now - Duration::days(self.config.queue_retention_days);
        let statuses = deletable_statuses(self.config.cleanup_delete_dead);

        let mut conn = self.pool.get().await?;
        let alerts_marked_read = Alert::mark_read_created_before(&mut conn, read_cutoff).await?;
        let queue_entries_deleted =
            AlertQueueEntry::delete_created_before(&mut conn, queue_cutoff, &statuses).await?;

        info!(
            alerts_marked_read,
            queue_entries_deleted, "Alert cleanup complete"
        );
        Ok(CleanupReport {
            alerts_marked_read,
            queue_entries_deleted,
        })
    }
}
