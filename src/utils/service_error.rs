// Service error type shared by the alert engine jobs

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Connection pool error: {0}")]
    PoolError(String),

    #[error("Resource not found")]
    NotFound,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Task failed: {0}")]
    TaskFailed(String),
}

// Conversion from various error types
impl From<diesel::result::Error> for ServiceError {
    fn from(error: diesel::result::Error) -> Self {
        match error {
            diesel::result::Error::NotFound => ServiceError::NotFound,
            _ => ServiceError::DatabaseError(error.to_string()),
        }
    }
}

impl<E: std::error::Error + 'static> From<bb8::RunError<E>> for ServiceError {
    fn from(error: bb8::RunError<E>) -> Self {
        ServiceError::PoolError(error.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(error: serde_json::Error) -> Self {
        ServiceError::Serialization(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_maps_to_not_found() {
        let error: ServiceError = diesel::result::Error::NotFound.into();
        assert!(matches!(error, ServiceError::NotFound));
    }

    #[test]
    fn test_other_diesel_errors_keep_message() {
        let error: ServiceError = diesel::result::Error::RollbackTransaction.into();
        match error {
            ServiceError::DatabaseError(msg) => assert!(!msg.is_empty()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
