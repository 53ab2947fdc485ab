//! Error types for slicer

use thiserror::Error;

/// Main error type for slicer
#[derive(Error, Debug)]
pub enum SliceError {
    /// Configuration error, including invalid workload resource requests
    #[error("Configuration error: {0}")]
    Config(String),

    /// Optimistic-concurrency write rejected because the record moved on
    #[error("Conflict on {key}: expected version {expected}, found {actual}")]
    Conflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// Inventory record not found
    #[error("Inventory record not found: {0}")]
    RecordNotFound(String),

    /// Workload not found
    #[error("Workload not found: {0}")]
    WorkloadNotFound(String),

    /// Object already exists
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Placement strategy declared but not implemented
    #[error("Placement policy not implemented: {0}")]
    PolicyUnimplemented(String),

    /// Health oracle error
    #[error("Health check error: {0}")]
    Health(String),

    /// Malformed resource quantity
    #[error("Invalid quantity '{0}'")]
    Quantity(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SliceError {
    /// Whether the error is a lost optimistic-concurrency race
    pub fn is_conflict(&self) -> bool {
        matches!(self, SliceError::Conflict { .. })
    }

    /// Whether the error reports a missing object
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            SliceError::RecordNotFound(_) | SliceError::WorkloadNotFound(_)
        )
    }
}

/// Result type for slicer operations
pub type SliceResult<T> = Result<T, SliceError>;

impl From<serde_json::Error> for SliceError {
    fn from(err: serde_json::Error) -> Self {
        SliceError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for SliceError {
    fn from(err: toml::de::Error) -> Self {
        SliceError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SliceError::Config("multiple containers".to_string());
        assert_eq!(err.to_string(), "Configuration error: multiple containers");

        let err = SliceError::Conflict {
            key: "node-1".to_string(),
            expected: 3,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "Conflict on node-1: expected version 3, found 4"
        );
    }

    #[test]
    fn test_error_classification() {
        let conflict = SliceError::Conflict {
            key: "node-1".to_string(),
            expected: 1,
            actual: 2,
        };
        assert!(conflict.is_conflict());
        assert!(!conflict.is_not_found());
        assert!(SliceError::RecordNotFound("node-1".to_string()).is_not_found());
        assert!(SliceError::WorkloadNotFound("default/w1".to_string()).is_not_found());
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: SliceError = io_err.into();
        assert!(matches!(err, SliceError::Io(_)));
    }
}
