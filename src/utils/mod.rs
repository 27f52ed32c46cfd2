// Utility modules for the alert engine

pub mod geo;
pub mod priority;
pub mod service_error;

pub use geo::haversine_distance;
pub use priority::{backoff_delay, backoff_with_jitter, severity_to_priority};
pub use service_error::ServiceError;
