mod common;

use chrono::{Duration, Utc};
use common::*;
use crisis_alert_engine::{
    app_config::AlertConfig,
    models::{AlertQueueEntry, NewUserAlertPreferences, QueueStatus},
    services::{AlertDeliveryWorker, AlertGenerator, AlertQueueManager},
};
use serial_test::serial;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

const MIAMI: (f64, f64) = (25.76, -80.19);

async fn generate(pool: &crisis_alert_engine::DieselPool) {
    AlertGenerator::new(pool.clone(), test_alert_config())
        .generate_alerts()
        .await
        .expect("generation succeeds");
}

#[tokio::test]
#[serial]
async fn test_miami_alert_is_delivered() {
    let Some(pool) = setup_test_db().await else { return };
    let mut conn = pool.get().await.unwrap();

    let resident = insert_subscriber(&mut conn, "Resident", Some((25.70, -80.20))).await;
    insert_disaster(&mut conn, new_disaster("Miami, FL, USA", Some(MIAMI), 5)).await;
    generate(&pool).await;

    let sender = Arc::new(RecordingSender::default());
    let worker = AlertDeliveryWorker::new(pool.clone(), sender.clone(), test_alert_config());
    let report = worker.process_deliveries().await.unwrap();

    assert_eq!(report.sent, 1);
    assert_eq!(report.total_processed, 1);

    let requests = sender.sent();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].to, resident.email);
    assert_eq!(requests[0].title, "HIGH SEVERITY ALERT: Miami, FL, USA");
    assert_eq!(requests[0].location, "Miami, FL, USA");
    assert_eq!(requests[0].latitude, Some(MIAMI.0));

    let entry = &queue_entries(&mut conn).await[0];
    assert_eq!(entry.status, QueueStatus::Sent);
    assert!(entry.sent_at.is_some());
    assert_eq!(entry.retry_count, 0);

    // Nothing left to claim
    let again = worker.process_deliveries().await.unwrap();
    assert_eq!(again.total_processed, 0);
    assert_eq!(sender.sent().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_below_email_floor_is_skipped_without_sending() {
    let Some(pool) = setup_test_db().await else { return };
    let mut conn = pool.get().await.unwrap();

    // min_severity 3, email floor 4
    insert_subscriber(&mut conn, "Resident", Some((25.70, -80.20))).await;
    insert_disaster(&mut conn, new_disaster("Miami, FL, USA", Some(MIAMI), 3)).await;
    generate(&pool).await;

    let sender = Arc::new(RecordingSender::default());
    let worker = AlertDeliveryWorker::new(pool.clone(), sender.clone(), test_alert_config());
    let report = worker.process_deliveries().await.unwrap();

    assert_eq!(report.skipped, 1);
    assert_eq!(report.sent, 0);
    assert_eq!(report.failed, 0);
    assert!(sender.sent().is_empty());

    let entry = &queue_entries(&mut conn).await[0];
    assert_eq!(entry.status, QueueStatus::Skipped);
    assert_eq!(entry.retry_count, 0);
}

#[tokio::test]
#[serial]
async fn test_concurrent_claims_are_disjoint() {
    let Some(pool) = setup_test_db().await else { return };
    let mut conn = pool.get().await.unwrap();

    for i in 0..40 {
        let offset = i as f64 * 0.001;
        insert_subscriber(&mut conn, &format!("Resident{}", i), Some((25.70 + offset, -80.20))).await;
    }
    insert_disaster(&mut conn, new_disaster("Miami, FL, USA", Some(MIAMI), 5)).await;
    generate(&pool).await;
    assert_eq!(queue_entries(&mut conn).await.len(), 40);

    let config = AlertConfig {
        delivery_batch_size: 25,
        ..test_alert_config()
    };
    let sender = Arc::new(RecordingSender::default());
    let worker_a = AlertDeliveryWorker::new(pool.clone(), sender.clone(), config.clone());
    let worker_b = AlertDeliveryWorker::new(pool.clone(), sender.clone(), config.clone());

    let (a, b) = tokio::join!(worker_a.claim_batch(), worker_b.claim_batch());
    let a: HashSet<Uuid> = a.unwrap().into_iter().map(|e| e.id).collect();
    let b: HashSet<Uuid> = b.unwrap().into_iter().map(|e| e.id).collect();

    assert!(a.is_disjoint(&b), "two workers claimed the same entry");
    assert!(a.len() <= 25 && b.len() <= 25);

    let rest: HashSet<Uuid> = worker_a
        .claim_batch()
        .await
        .unwrap()
        .into_iter()
        .map(|e| e.id)
        .collect();
    assert!(rest.is_disjoint(&a) && rest.is_disjoint(&b));
    assert_eq!(a.len() + b.len() + rest.len(), 40);

    let entries = queue_entries(&mut conn).await;
    assert!(entries.iter().all(|e| e.status == QueueStatus::Processing));
}

#[tokio::test]
#[serial]
async fn test_claim_follows_priority() {
    let Some(pool) = setup_test_db().await else { return };
    let mut conn = pool.get().await.unwrap();

    let user = insert_user(&mut conn, "Resident", Some((25.70, -80.20))).await;
    insert_preferences(
        &mut conn,
        NewUserAlertPreferences {
            min_severity: 1,
            email_min_severity: 1,
            ..NewUserAlertPreferences::new(user.id)
        },
    )
    .await;
    insert_disaster(&mut conn, new_disaster("Miami, FL, USA", Some(MIAMI), 3)).await;
    insert_disaster(&mut conn, new_disaster("Miami Beach, FL, USA", Some(MIAMI), 5)).await;
    generate(&pool).await;

    let worker = AlertDeliveryWorker::new(
        pool.clone(),
        Arc::new(RecordingSender::default()),
        test_alert_config(),
    );
    let claimed = worker.claim_batch().await.unwrap();

    let priorities: Vec<i32> = claimed.iter().map(|e| e.priority).collect();
    assert_eq!(priorities, vec![1, 3]);
}

#[tokio::test]
#[serial]
async fn test_always_failing_delivery_goes_dead_after_max_retries() {
    let Some(pool) = setup_test_db().await else { return };
    let mut conn = pool.get().await.unwrap();

    insert_subscriber(&mut conn, "Resident", Some((25.70, -80.20))).await;
    insert_disaster(&mut conn, new_disaster("Miami, FL, USA", Some(MIAMI), 5)).await;
    generate(&pool).await;

    let sender = Arc::new(RecordingSender::failing());
    let worker = AlertDeliveryWorker::new(pool.clone(), sender.clone(), test_alert_config());
    let manager = AlertQueueManager::new(pool.clone(), test_alert_config());

    for _ in 0..10 {
        worker.process_deliveries().await.unwrap();
        manager.process_queue().await.unwrap();
        if queue_entries(&mut conn).await[0].status == QueueStatus::Dead {
            break;
        }
    }

    let entry = &queue_entries(&mut conn).await[0];
    assert_eq!(entry.status, QueueStatus::Dead);
    assert_eq!(entry.retry_count, 3);
    assert_eq!(entry.error_message.as_deref(), Some("provider returned 503"));
    assert_eq!(sender.sent().len(), 3);

    // Dead rows are never claimed again
    let report = worker.process_deliveries().await.unwrap();
    assert_eq!(report.total_processed, 0);
}

#[tokio::test]
#[serial]
async fn test_failed_delivery_is_rearmed_with_backoff() {
    let Some(pool) = setup_test_db().await else { return };
    let mut conn = pool.get().await.unwrap();

    insert_subscriber(&mut conn, "Resident", Some((25.70, -80.20))).await;
    insert_disaster(&mut conn, new_disaster("Miami, FL, USA", Some(MIAMI), 5)).await;
    generate(&pool).await;

    let config = AlertConfig {
        retry_backoff_base_secs: 600,
        retry_backoff_max_secs: 3600,
        ..test_alert_config()
    };
    let worker = AlertDeliveryWorker::new(pool.clone(), Arc::new(RecordingSender::failing()), config.clone());
    let report = worker.process_deliveries().await.unwrap();
    assert_eq!(report.failed, 1);

    let sweep = AlertQueueManager::new(pool.clone(), config)
        .process_queue()
        .await
        .unwrap();
    assert_eq!(sweep.retried, 1);

    let entry = &queue_entries(&mut conn).await[0];
    assert_eq!(entry.status, QueueStatus::Pending);
    assert_eq!(entry.retry_count, 1);
    assert!(entry.scheduled_at >= Utc::now() + Duration::seconds(590));

    // Not due yet
    let report = worker.process_deliveries().await.unwrap();
    assert_eq!(report.total_processed, 0);
}

#[tokio::test]
#[serial]
async fn test_stalled_processing_rows_are_recovered() {
    let Some(pool) = setup_test_db().await else { return };
    let mut conn = pool.get().await.unwrap();

    insert_subscriber(&mut conn, "Resident", Some((25.70, -80.20))).await;
    insert_disaster(&mut conn, new_disaster("Miami, FL, USA", Some(MIAMI), 5)).await;
    generate(&pool).await;

    let entry = queue_entries(&mut conn).await.remove(0);
    set_queue_status(
        &mut conn,
        entry.id,
        QueueStatus::Processing,
        Utc::now() - Duration::minutes(20),
    )
    .await;

    let manager = AlertQueueManager::new(pool.clone(), test_alert_config());
    let report = manager.process_queue().await.unwrap();
    assert_eq!(report.recovered, 1);

    let entry = AlertQueueEntry::find(&mut conn, entry.id).await.unwrap();
    assert_eq!(entry.retry_count, 1);
    assert_eq!(entry.error_message.as_deref(), Some("delivery stalled"));
    // Recovered and re-armed in the same sweep
    assert_eq!(entry.status, QueueStatus::Pending);
    assert_eq!(report.retried, 1);
}

#[tokio::test]
#[serial]
async fn test_recent_processing_rows_are_left_alone() {
    let Some(pool) = setup_test_db().await else { return };
    let mut conn = pool.get().await.unwrap();

    insert_subscriber(&mut conn, "Resident", Some((25.70, -80.20))).await;
    insert_disaster(&mut conn, new_disaster("Miami, FL, USA", Some(MIAMI), 5)).await;
    generate(&pool).await;

    let worker = AlertDeliveryWorker::new(
        pool.clone(),
        Arc::new(RecordingSender::default()),
        test_alert_config(),
    );
    assert_eq!(worker.claim_batch().await.unwrap().len(), 1);

    let report = AlertQueueManager::new(pool.clone(), test_alert_config())
        .process_queue()
        .await
        .unwrap();
    assert_eq!(report, Default::default());
    assert_eq!(queue_entries(&mut conn).await[0].status, QueueStatus::Processing);
}
