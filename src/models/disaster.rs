// Disaster Database Model
// Rows are written by the extraction pipeline; this crate only reads them

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::{alerts, disasters};

/// A disaster event extracted from social-media posts
#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize, PartialEq)]
#[diesel(table_name = disasters)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Disaster {
    pub id: Uuid,
    pub location_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub severity: i32,
    pub disaster_type: String,
    pub description: Option<String>,
    pub affected_population: Option<i64>,
    pub event_time: Option<DateTime<Utc>>,
    pub extracted_at: DateTime<Utc>,
    pub archived: bool,
}

/// Insert shape, used by the extraction pipeline and by tests
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = disasters)]
pub struct NewDisaster {
    pub location_name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub severity: i32,
    pub disaster_type: String,
    pub description: Option<String>,
    pub affected_population: Option<i64>,
    pub event_time: Option<DateTime<Utc>>,
    pub extracted_at: DateTime<Utc>,
}

impl Disaster {
    /// Disasters extracted at or after `since` that have no alert yet.
    /// Archived disasters are never alerted.
    pub async fn find_unalerted_since(
        conn: &mut AsyncPgConnection,
        since: DateTime<Utc>,
    ) -> QueryResult<Vec<Disaster>> {
        disasters::table
            .filter(disasters::extracted_at.ge(since))
            .filter(disasters::archived.eq(false))
            .filter(diesel::dsl::not(diesel::dsl::exists(
                alerts::table.filter(alerts::disaster_id.eq(disasters::id)),
            )))
            .order(disasters::extracted_at.asc())
            .select(Disaster::as_select())
            .load(conn)
            .await
    }
}
