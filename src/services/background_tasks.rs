// Background task scheduler
// Periodic loops for every alert job plus on-demand runs tracked by handle

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::app_config::SchedulerConfig;
use crate::services::engine::{Job, JobRunner};

/// Finished handles kept for lookup before older ones are dropped
const MAX_TRACKED_TASKS: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskState {
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Handle to one on-demand job run
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: Uuid,
    job: Job,
    state: watch::Receiver<TaskState>,
}

impl TaskHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn job(&self) -> Job {
        self.job
    }

    pub fn status(&self) -> TaskStatus {
        self.state.borrow().status
    }

    /// The JSON report or the error text, once the run has finished
    pub fn result(&self) -> Option<Result<serde_json::Value, String>> {
        let state = self.state.borrow();
        match state.status {
            TaskStatus::Succeeded => Some(Ok(state.result.clone().unwrap_or_default())),
            TaskStatus::Failed => Some(Err(state.error.clone().unwrap_or_default())),
            TaskStatus::Pending | TaskStatus::Running => None,
        }
    }

    pub fn snapshot(&self) -> TaskState {
        self.state.borrow().clone()
    }

    /// Wait until the run finishes and return its final status
    pub async fn wait(&self) -> TaskStatus {
        let mut rx = self.state.clone();
        let status = match rx.wait_for(|s| s.status.is_finished()).await {
            Ok(state) => state.status,
            Err(_) => self.status(),
        };
        status
    }
}

/// Interval of each job
pub fn job_period(job: Job, schedule: &SchedulerConfig) -> Duration {
    let secs = match job {
        Job::GenerateAlerts => schedule.generate_interval_secs,
        Job::ProcessQueue => schedule.queue_interval_secs,
        Job::DeliverAlerts => schedule.delivery_interval_secs,
        Job::Cleanup => schedule.cleanup_interval_secs,
    };
    Duration::from_secs(secs.max(1))
}

/// Background task manager for the alert engine
pub struct BackgroundTaskManager {
    runner: Arc<dyn JobRunner>,
    schedule: SchedulerConfig,
    tasks: RwLock<HashMap<Uuid, TaskHandle>>,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl BackgroundTaskManager {
    pub fn new(runner: Arc<dyn JobRunner>, schedule: SchedulerConfig) -> Self {
        Self {
            runner,
            schedule,
            tasks: RwLock::new(HashMap::new()),
            loops: Mutex::new(Vec::new()),
        }
    }

    /// Spawn one interval loop per job. The first run of each job starts
    /// immediately; ticks missed while a run is in flight are skipped.
    pub fn start_all_tasks(&self) {
        info!("Starting alert engine background tasks");

        let mut loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
        for job in Job::ALL {
            let period = job_period(job, &self.schedule);
            let runner = Arc::clone(&self.runner);
            info!(%job, period_secs = period.as_secs(), "Scheduling job");
            loops.push(tokio::spawn(run_periodically(runner, job, period)));
        }
    }

    /// Run `job` once in the background
    #[instrument(skip(self))]
    pub fn run_now(&self, job: Job) -> TaskHandle {
        let id = Uuid::new_v4();
        let (tx, rx) = watch::channel(TaskState {
            status: TaskStatus::Pending,
            result: None,
            error: None,
            created_at: Utc::now(),
            finished_at: None,
        });
        let handle = TaskHandle { id, job, state: rx };
        self.track(handle.clone());

        let runner = Arc::clone(&self.runner);
        tokio::spawn(async move {
            tx.send_modify(|s| s.status = TaskStatus::Running);

            // Run in its own task so a panic is reported as a failure
            let outcome = tokio::spawn(async move { runner.run(job).await }).await;

            tx.send_modify(|s| {
                s.finished_at = Some(Utc::now());
                match outcome {
                    Ok(Ok(report)) => {
                        s.status = TaskStatus::Succeeded;
                        s.result = Some(report);
                    },
                    Ok(Err(e)) => {
                        error!(%job, task_id = %id, error = %e, "On-demand job failed");
                        s.status = TaskStatus::Failed;
                        s.error = Some(e.to_string());
                    },
                    Err(join_error) => {
                        error!(%job, task_id = %id, error = %join_error, "On-demand job panicked");
                        s.status = TaskStatus::Failed;
                        s.error = Some(join_error.to_string());
                    },
                }
            });
        });

        handle
    }

    pub fn task(&self, id: Uuid) -> Option<TaskHandle> {
        self.tasks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    fn track(&self, handle: TaskHandle) {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        if tasks.len() >= MAX_TRACKED_TASKS {
            tasks.retain(|_, h| !h.status().is_finished());
        }
        tasks.insert(handle.id, handle);
    }

    /// Stop the periodic loops and wait for them to unwind
    pub async fn shutdown(&self) {
        let loops: Vec<JoinHandle<()>> = {
            let mut loops = self.loops.lock().unwrap_or_else(|e| e.into_inner());
            loops.drain(..).collect()
        };
        for handle in &loops {
            handle.abort();
        }
        join_all(loops).await;
        info!("Background tasks stopped");
    }
}

async fn run_periodically(runner: Arc<dyn JobRunner>, job: Job, period: Duration) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        match runner.run(job).await {
            Ok(report) => info!(%job, %report, "Scheduled job finished"),
            Err(e) => error!(%job, error = %e, "Scheduled job failed"),
        }
    }
}
