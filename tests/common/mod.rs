// Common test utilities and helper structs
// Shared across all test files to avoid duplication

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crisis_alert_engine::{
    app_config::AlertConfig,
    db::{create_diesel_pool, DieselDatabaseConfig, DieselPool},
    migrations::run_all_migrations,
    models::{
        AlertQueueEntry, Disaster, NewDisaster, NewUser, NewUserAlertPreferences, QueueStatus,
        User, UserAlertPreferences,
    },
    schema::{alert_queue, alerts, disasters, user_alert_preferences, users},
    services::{AlertEmailRequest, AlertSender, DeliveryReceipt},
};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};
use std::sync::Mutex;
use uuid::Uuid;

/// Connect to the test database, apply migrations and empty the alert tables.
/// Returns `None` when `DATABASE_URL` is not set so DB tests skip cleanly.
pub async fn setup_test_db() -> Option<DieselPool> {
    dotenv::from_filename(".env.test").ok();
    dotenv::dotenv().ok();

    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping database test");
        return None;
    };

    run_all_migrations(&database_url)
        .await
        .expect("Failed to run migrations");
    let pool = create_diesel_pool(DieselDatabaseConfig::for_url(database_url))
        .await
        .expect("Failed to create test pool");

    {
        let mut conn = pool.get().await.expect("Failed to get connection");
        diesel::sql_query(
            "TRUNCATE alert_queue, alerts, user_alert_preferences, disasters, users CASCADE",
        )
        .execute(&mut conn)
        .await
        .expect("Failed to truncate alert tables");
    }

    Some(pool)
}

/// Alert config with zero backoff so retried rows are due immediately
pub fn test_alert_config() -> AlertConfig {
    AlertConfig {
        retry_backoff_base_secs: 0,
        retry_backoff_max_secs: 0,
        send_timeout_secs: 5,
        ..AlertConfig::default()
    }
}

pub async fn insert_user(
    conn: &mut AsyncPgConnection,
    name: &str,
    coords: Option<(f64, f64)>,
) -> User {
    let new_user = NewUser {
        email: format!("{}+{}@example.com", name.to_lowercase(), Uuid::new_v4().simple()),
        name: name.to_string(),
        latitude: coords.map(|c| c.0),
        longitude: coords.map(|c| c.1),
    };

    diesel::insert_into(users::table)
        .values(&new_user)
        .returning(User::as_returning())
        .get_result(conn)
        .await
        .expect("Failed to insert user")
}

pub async fn insert_preferences(
    conn: &mut AsyncPgConnection,
    prefs: NewUserAlertPreferences,
) -> UserAlertPreferences {
    diesel::insert_into(user_alert_preferences::table)
        .values(&prefs)
        .returning(UserAlertPreferences::as_returning())
        .get_result(conn)
        .await
        .expect("Failed to insert preferences")
}

/// User with default preferences (min 3, email floor 4)
pub async fn insert_subscriber(
    conn: &mut AsyncPgConnection,
    name: &str,
    coords: Option<(f64, f64)>,
) -> User {
    let user = insert_user(conn, name, coords).await;
    insert_preferences(conn, NewUserAlertPreferences::new(user.id)).await;
    user
}

pub fn new_disaster(location: &str, coords: Option<(f64, f64)>, severity: i32) -> NewDisaster {
    NewDisaster {
        location_name: location.to_string(),
        latitude: coords.map(|c| c.0),
        longitude: coords.map(|c| c.1),
        severity,
        disaster_type: "hurricane".to_string(),
        description: None,
        affected_population: None,
        event_time: None,
        extracted_at: Utc::now(),
    }
}

pub async fn insert_disaster(conn: &mut AsyncPgConnection, disaster: NewDisaster) -> Disaster {
    diesel::insert_into(disasters::table)
        .values(&disaster)
        .returning(Disaster::as_returning())
        .get_result(conn)
        .await
        .expect("Failed to insert disaster")
}

pub async fn queue_entries(conn: &mut AsyncPgConnection) -> Vec<AlertQueueEntry> {
    alert_queue::table
        .order(alert_queue::created_at.asc())
        .select(AlertQueueEntry::as_select())
        .load(conn)
        .await
        .expect("Failed to load queue")
}

pub async fn count_alerts(conn: &mut AsyncPgConnection) -> i64 {
    alerts::table
        .count()
        .get_result(conn)
        .await
        .expect("Failed to count alerts")
}

pub async fn set_queue_status(
    conn: &mut AsyncPgConnection,
    entry_id: Uuid,
    status: QueueStatus,
    at: DateTime<Utc>,
) {
    diesel::update(alert_queue::table.find(entry_id))
        .set((
            alert_queue::status.eq(status),
            alert_queue::created_at.eq(at),
            alert_queue::updated_at.eq(at),
        ))
        .execute(conn)
        .await
        .expect("Failed to update queue entry");
}

/// Records every request; fails all sends when `fail` is set
#[derive(Default)]
pub struct RecordingSender {
    pub fail: bool,
    pub requests: Mutex<Vec<AlertEmailRequest>>,
}

impl RecordingSender {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<AlertEmailRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertSender for RecordingSender {
    async fn send_alert_email(&self, request: &AlertEmailRequest) -> DeliveryReceipt {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail {
            DeliveryReceipt::failed("provider returned 503")
        } else {
            DeliveryReceipt::delivered(format!("msg_{}", Uuid::new_v4().simple()))
        }
    }
}
