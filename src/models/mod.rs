pub mod alert;
pub mod alert_queue;
pub mod disaster;
pub mod preferences;
pub mod user;

// Re-export common types
pub use alert::{Alert, AlertMetadata, AlertType, NewAlert};
pub use alert_queue::{AlertQueueEntry, NewAlertQueueEntry, QueueStatus, QueueStatusUpdate};
pub use disaster::{Disaster, NewDisaster};
pub use preferences::{NewUserAlertPreferences, UserAlertPreferences};
pub use user::{NewUser, User};
