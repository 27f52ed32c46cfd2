// Services module for the alert engine
// Generation, queue maintenance, delivery, retention and scheduling

pub mod alert_generator;
pub mod alert_sender;
pub mod background_tasks;
pub mod cleanup;
pub mod delivery_worker;
pub mod email;
pub mod engine;
pub mod matcher;
pub mod queue_manager;

// Re-export commonly used services
pub use alert_generator::{AlertContent, AlertGenerator, CreatedAlert, GenerationReport};
pub use alert_sender::{AlertEmailRequest, AlertSender, DeliveryReceipt, LogAlertSender};
pub use background_tasks::{BackgroundTaskManager, TaskHandle, TaskStatus};
pub use cleanup::{AlertCleanup, CleanupReport};
pub use delivery_worker::{AlertDeliveryWorker, DeliveryReport};
pub use email::{EmailError, EmailService};
pub use engine::{AlertEngine, Job, JobRunner};
pub use matcher::{should_alert_user_for_disaster, RecipientMatcher};
pub use queue_manager::{AlertQueueManager, QueueSweepReport};
