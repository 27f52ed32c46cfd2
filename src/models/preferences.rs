// User Alert Preferences Model
// One row per user; a missing row means the user receives no alerts

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema::user_alert_preferences;

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize, PartialEq)]
#[diesel(table_name = user_alert_preferences)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct UserAlertPreferences {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Floor for alert creation
    pub min_severity: i32,
    /// Gate for email delivery consideration
    pub email_enabled: bool,
    /// Floor for the email send itself
    pub email_min_severity: i32,
    /// Free-text region names used when the radius check fails
    pub regions: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = user_alert_preferences)]
pub struct NewUserAlertPreferences {
    pub user_id: Uuid,
    pub min_severity: i32,
    pub email_enabled: bool,
    pub email_min_severity: i32,
    pub regions: Vec<String>,
}

impl NewUserAlertPreferences {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            min_severity: 3,
            email_enabled: true,
            email_min_severity: 4,
            regions: Vec::new(),
        }
    }
}

impl UserAlertPreferences {
    pub async fn find_for_users(
        conn: &mut AsyncPgConnection,
        user_ids: &[Uuid],
    ) -> QueryResult<Vec<UserAlertPreferences>> {
        user_alert_preferences::table
            .filter(user_alert_preferences::user_id.eq_any(user_ids))
            .select(UserAlertPreferences::as_select())
            .load(conn)
            .await
    }
}
