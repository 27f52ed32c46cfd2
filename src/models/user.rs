// User Database Model
// Owned by the auth service; read-only here

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::UserAlertPreferences;
use crate::schema::{user_alert_preferences, users};

#[derive(Debug, Clone, Queryable, Selectable, Identifiable, Serialize, Deserialize, PartialEq)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = users)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl User {
    /// Every user together with their alert preferences (if any).
    /// Users without a preferences row are returned with `None`.
    pub async fn load_all_with_preferences(
        conn: &mut AsyncPgConnection,
    ) -> QueryResult<Vec<(User, Option<UserAlertPreferences>)>> {
        users::table
            .left_join(user_alert_preferences::table)
            .order(users::created_at.asc())
            .select((
                User::as_select(),
                Option::<UserAlertPreferences>::as_select(),
            ))
            .load(conn)
            .await
    }
}
