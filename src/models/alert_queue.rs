// Alert Queue Model
// One row per (alert, recipient); the status column is the delivery state machine

use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql};
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_query;
use diesel::sql_types::{BigInt, Text, Timestamptz};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::schema::alert_queue;

/// Delivery state of a queue entry
///
/// ```text
/// pending -> processing -> sent
///                       -> failed -> pending (after backoff)
///                       -> failed -> dead (retry cap)
/// pending/processing    -> skipped (below the user's email floor)
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    diesel::expression::AsExpression,
    diesel::deserialize::FromSqlRow,
)]
#[diesel(sql_type = Text)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Sent,
    Failed,
    Dead,
    Skipped,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Sent => "sent",
            QueueStatus::Failed => "failed",
            QueueStatus::Dead => "dead",
            QueueStatus::Skipped => "skipped",
        }
    }

    /// Sent, dead and skipped entries never move again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            QueueStatus::Sent | QueueStatus::Dead | QueueStatus::Skipped
        )
    }
}

impl std::fmt::Display for QueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QueueStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueStatus::Pending),
            "processing" => Ok(QueueStatus::Processing),
            "sent" => Ok(QueueStatus::Sent),
            "failed" => Ok(QueueStatus::Failed),
            "dead" => Ok(QueueStatus::Dead),
            "skipped" => Ok(QueueStatus::Skipped),
            _ => Err(format!("Invalid queue status: {}", s)),
        }
    }
}

impl<DB> FromSql<Text, DB> for QueueStatus
where
    DB: diesel::backend::Backend,
    String: FromSql<Text, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
        let value = String::from_sql(bytes)?;
        Self::from_str(&value).map_err(|e| e.into())
    }
}

impl<DB> ToSql<Text, DB> for QueueStatus
where
    DB: diesel::backend::Backend,
    str: ToSql<Text, DB>,
{
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, DB>) -> serialize::Result {
        self.as_str().to_sql(out)
    }
}

#[derive(
    Debug, Clone, Queryable, QueryableByName, Selectable, Identifiable, Serialize, Deserialize,
)]
#[diesel(table_name = alert_queue)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct AlertQueueEntry {
    pub id: Uuid,
    pub alert_id: Uuid,
    pub user_id: Uuid,
    /// Snapshot taken at queue time so later email changes don't redirect history
    pub recipient_email: String,
    pub recipient_name: String,
    /// 1 = most urgent
    pub priority: i32,
    pub status: QueueStatus,
    pub retry_count: i32,
    pub max_retries: i32,
    pub scheduled_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = alert_queue)]
pub struct NewAlertQueueEntry {
    pub alert_id: Uuid,
    pub user_id: Uuid,
    pub recipient_email: String,
    pub recipient_name: String,
    pub priority: i32,
    pub status: QueueStatus,
    pub max_retries: i32,
    pub scheduled_at: DateTime<Utc>,
}

/// Changes written back after a state transition.
/// `None` leaves a column untouched; `error_message: Some(None)` clears it.
#[derive(Debug, Clone, PartialEq, AsChangeset)]
#[diesel(table_name = alert_queue)]
pub struct QueueStatusUpdate {
    pub status: QueueStatus,
    pub retry_count: Option<i32>,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub sent_at: Option<DateTime<Utc>>,
    pub error_message: Option<Option<String>>,
    pub updated_at: DateTime<Utc>,
}

impl QueueStatusUpdate {
    pub fn status(status: QueueStatus, now: DateTime<Utc>) -> Self {
        Self {
            status,
            retry_count: None,
            scheduled_at: None,
            sent_at: None,
            error_message: None,
            updated_at: now,
        }
    }
}

/// Claims pending rows for delivery and flips them to `processing` in one
/// statement. `SKIP LOCKED` lets concurrent workers take disjoint batches.
/// Only `pending` rows are ever claimed.
const CLAIM_PENDING_BATCH: &str = r#"
WITH picked AS (
    SELECT q.id
    FROM alert_queue q
    JOIN user_alert_preferences p ON p.user_id = q.user_id
    WHERE q.status = 'pending'
      AND p.email_enabled = TRUE
      AND q.retry_count < q.max_retries
      AND q.scheduled_at <= $1
    ORDER BY q.priority ASC, q.scheduled_at ASC
    LIMIT $2
    FOR UPDATE OF q SKIP LOCKED
)
UPDATE alert_queue
SET status = 'processing',
    updated_at = $1
FROM picked
WHERE alert_queue.id = picked.id
RETURNING alert_queue.*
"#;

impl AlertQueueEntry {
    pub async fn insert_batch(
        conn: &mut AsyncPgConnection,
        entries: &[NewAlertQueueEntry],
    ) -> QueryResult<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        diesel::insert_into(alert_queue::table)
            .values(entries)
            .on_conflict((alert_queue::alert_id, alert_queue::user_id))
            .do_nothing()
            .execute(conn)
            .await
    }

    /// Claim up to `limit` due entries, returned in `(priority, scheduled_at)` order
    pub async fn claim_pending_batch(
        conn: &mut AsyncPgConnection,
        limit: i64,
        now: DateTime<Utc>,
    ) -> QueryResult<Vec<AlertQueueEntry>> {
        let mut claimed: Vec<AlertQueueEntry> = sql_query(CLAIM_PENDING_BATCH)
            .bind::<Timestamptz, _>(now)
            .bind::<BigInt, _>(limit)
            .load(conn)
            .await?;

        // RETURNING does not preserve the CTE ordering
        claimed.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(a.scheduled_at.cmp(&b.scheduled_at))
        });
        Ok(claimed)
    }

    /// Lock rows in `status` last touched at or before `updated_before`, skipping rows
    /// another sweeper already holds. Must run inside a transaction.
    pub async fn lock_by_status_updated_before(
        conn: &mut AsyncPgConnection,
        status: QueueStatus,
        updated_before: DateTime<Utc>,
    ) -> QueryResult<Vec<AlertQueueEntry>> {
        alert_queue::table
            .filter(alert_queue::status.eq(status))
            .filter(alert_queue::updated_at.le(updated_before))
            .order((alert_queue::priority.asc(), alert_queue::scheduled_at.asc()))
            .select(AlertQueueEntry::as_select())
            .for_update()
            .skip_locked()
            .load(conn)
            .await
    }

    pub async fn apply_update(
        conn: &mut AsyncPgConnection,
        entry_id: Uuid,
        update: &QueueStatusUpdate,
    ) -> QueryResult<usize> {
        diesel::update(alert_queue::table.find(entry_id))
            .set(update)
            .execute(conn)
            .await
    }

    /// Apply `update` only while the row is still in `expected`.
    /// Returns 0 when another process moved the row first.
    pub async fn apply_update_if_status(
        conn: &mut AsyncPgConnection,
        entry_id: Uuid,
        expected: QueueStatus,
        update: &QueueStatusUpdate,
    ) -> QueryResult<usize> {
        diesel::update(
            alert_queue::table
                .find(entry_id)
                .filter(alert_queue::status.eq(expected)),
        )
        .set(update)
        .execute(conn)
        .await
    }

    /// Hard-delete rows created before `cutoff` whose status is in `statuses`
    pub async fn delete_created_before(
        conn: &mut AsyncPgConnection,
        cutoff: DateTime<Utc>,
        statuses: &[QueueStatus],
    ) -> QueryResult<usize> {
        if statuses.is_empty() {
            return Ok(0);
        }

        diesel::delete(
            alert_queue::table
                .filter(alert_queue::created_at.lt(cutoff))
                .filter(alert_queue::status.eq_any(statuses.to_vec())),
        )
        .execute(conn)
        .await
    }

    pub async fn find(conn: &mut AsyncPgConnection, entry_id: Uuid) -> QueryResult<AlertQueueEntry> {
        alert_queue::table
            .find(entry_id)
            .select(AlertQueueEntry::as_select())
            .first(conn)
            .await
    }

    pub async fn find_by_alert(
        conn: &mut AsyncPgConnection,
        alert_id: Uuid,
    ) -> QueryResult<Vec<AlertQueueEntry>> {
        alert_queue::table
            .filter(alert_queue::alert_id.eq(alert_id))
            .order(alert_queue::created_at.asc())
            .select(AlertQueueEntry::as_select())
            .load(conn)
            .await
    }
}
