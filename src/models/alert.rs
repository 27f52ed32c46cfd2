// Alert Database Model
// One alert per disaster; fanned out to recipients through alert_queue

use chrono::{DateTime, Utc};
use diesel::deserialize::{self, FromSql};
use diesel::pg::{Pg, PgValue};
use diesel::prelude::*;
use diesel::serialize::{self, Output, ToSql};
use diesel::sql_types::{Jsonb, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::Disaster;
use crate::schema::alerts;

/// Kind of alert, chosen from the disaster severity
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
pub enum AlertType {
    NewCrisis,
    HighSeverity,
    SeverityChange,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::NewCrisis => "new_crisis",
            AlertType::HighSeverity => "high_severity",
            AlertType::SeverityChange => "severity_change",
        }
    }
}

impl std::fmt::Display for AlertType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlertType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new_crisis" => Ok(AlertType::NewCrisis),
            "high_severity" => Ok(AlertType::HighSeverity),
            "severity_change" => Ok(AlertType::SeverityChange),
            _ => Err(format!("Invalid alert type: {}", s)),
        }
    }
}

impl<DB> FromSql<Text, DB> for AlertType
where
    DB: diesel::backend::Backend,
    String: FromSql<Text, DB>,
{
    fn from_sql(bytes: DB::RawValue<'_>) -> deserialize::Result<Self> {
        let value = String::from_sql(bytes)?;
        Self::from_str(&value).map_err(|e| e.into())
    }
}

impl<DB> ToSql<Text, DB> for AlertType
where
    DB: diesel::backend::Backend,
    str: ToSql<Text, DB>,
{
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, DB>) -> serialize::Result {
        self.as_str().to_sql(out)
    }
}

/// Snapshot of the disaster taken when the alert is created.
/// Stored as JSONB so the column can grow without a migration.
#[derive(
    Debug,
    Clone,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
    diesel::expression::AsExpression,
    diesel::deserialize::FromSqlRow,
)]
#[diesel(sql_type = Jsonb)]
pub struct AlertMetadata {
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_population: Option<i64>,
}

impl From<&Disaster> for AlertMetadata {
    fn from(disaster: &Disaster) -> Self {
        Self {
            location: disaster.location_name.clone(),
            latitude: disaster.latitude,
            longitude: disaster.longitude,
            event_time: disaster.event_time,
            affected_population: disaster.affected_population,
        }
    }
}

impl FromSql<Jsonb, Pg> for AlertMetadata {
    fn from_sql(bytes: PgValue<'_>) -> deserialize::Result<Self> {
        let value = <serde_json::Value as FromSql<Jsonb, Pg>>::from_sql(bytes)?;
        Ok(serde_json::from_value(value)?)
    }
}

impl ToSql<Jsonb, Pg> for AlertMetadata {
    fn to_sql<'b>(&'b self, out: &mut Output<'b, '_, Pg>) -> serialize::Result {
        let value = serde_json::to_value(self)?;
        <serde_json::Value as ToSql<Jsonb, Pg>>::to_sql(&value, &mut out.reborrow())
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize, PartialEq)]
#[diesel(table_name = alerts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Alert {
    pub id: Uuid,
    pub disaster_id: Uuid,
    pub alert_type: AlertType,
    /// Copied from the disaster at creation time, never live-updated
    pub severity: i32,
    pub title: String,
    pub message: String,
    pub alert_metadata: AlertMetadata,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = alerts)]
pub struct NewAlert {
    pub disaster_id: Uuid,
    pub alert_type: AlertType,
    pub severity: i32,
    pub title: String,
    pub message: String,
    pub alert_metadata: AlertMetadata,
}

impl Alert {
    /// Insert an alert unless one already exists for the disaster.
    /// Returns `None` when another generator won the race.
    pub async fn insert_if_absent(
        conn: &mut AsyncPgConnection,
        new_alert: &NewAlert,
    ) -> QueryResult<Option<Alert>> {
        diesel::insert_into(alerts::table)
            .values(new_alert)
            .on_conflict(alerts::disaster_id)
            .do_nothing()
            .returning(Alert::as_returning())
            .get_result(conn)
            .await
            .optional()
    }

    /// Mark unread alerts created before `cutoff` as read
    pub async fn mark_read_created_before(
        conn: &mut AsyncPgConnection,
        cutoff: DateTime<Utc>,
    ) -> QueryResult<usize> {
        diesel::update(
            alerts::table
                .filter(alerts::created_at.lt(cutoff))
                .filter(alerts::is_read.eq(false)),
        )
        .set(alerts::is_read.eq(true))
        .execute(conn)
        .await
    }

    pub async fn find_by_disaster(
        conn: &mut AsyncPgConnection,
        disaster_id: Uuid,
    ) -> QueryResult<Option<Alert>> {
        alerts::table
            .filter(alerts::disaster_id.eq(disaster_id))
            .select(Alert::as_select())
            .first(conn)
            .await
            .optional()
    }

    pub async fn find_many(
        conn: &mut AsyncPgConnection,
        ids: &[Uuid],
    ) -> QueryResult<Vec<Alert>> {
        alerts::table
            .filter(alerts::id.eq_any(ids))
            .select(Alert::as_select())
            .load(conn)
            .await
    }
}
