// Alert engine wiring
// Bundles the four jobs behind one runner the scheduler can drive

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    app_config::AlertConfig,
    db::DieselPool,
    services::{
        alert_generator::AlertGenerator, alert_sender::AlertSender, cleanup::AlertCleanup,
        delivery_worker::AlertDeliveryWorker, queue_manager::AlertQueueManager,
    },
    utils::ServiceError,
};

/// The periodic jobs of the alert engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Job {
    GenerateAlerts,
    ProcessQueue,
    DeliverAlerts,
    Cleanup,
}

impl Job {
    pub const ALL: [Job; 4] = [
        Job::GenerateAlerts,
        Job::ProcessQueue,
        Job::DeliverAlerts,
        Job::Cleanup,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Job::GenerateAlerts => "generate_alerts",
            Job::ProcessQueue => "process_queue",
            Job::DeliverAlerts => "deliver_alerts",
            Job::Cleanup => "cleanup",
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Runs one job to completion and returns its report as JSON
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn run(&self, job: Job) -> Result<serde_json::Value, ServiceError>;
}

pub struct AlertEngine {
    pub generator: AlertGenerator,
    pub queue_manager: AlertQueueManager,
    pub worker: AlertDeliveryWorker,
    pub cleanup: AlertCleanup,
}

impl AlertEngine {
    pub fn new(pool: DieselPool, sender: Arc<dyn AlertSender>, config: &AlertConfig) -> Self {
        Self {
            generator: AlertGenerator::new(pool.clone(), config.clone()),
            queue_manager: AlertQueueManager::new(pool.clone(), config.clone()),
            worker: AlertDeliveryWorker::new(pool.clone(), sender, config.clone()),
            cleanup: AlertCleanup::new(pool, config.clone()),
        }
    }
}

#[async_trait]
impl JobRunner for AlertEngine {
    async fn run(&self, job: Job) -> Result<serde_json::Value, ServiceError> {
        let report = match job {
            Job::GenerateAlerts => serde_json::to_value(self.generator.generate_alerts().await?)?,
            Job::ProcessQueue => serde_json::to_value(self.queue_manager.process_queue().await?)?,
            Job::DeliverAlerts => {
                serde_json::to_value(self.worker.process_deliveries().await?)?
            },
            Job::Cleanup => serde_json::to_value(self.cleanup.cleanup_old_alerts().await?)?,
        };
        Ok(report)
    }
}
