//! Error types shared by every object store

use thiserror::Error;

/// Result type alias for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Kind of record an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Job,
    Worker,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectKind::Job => write!(f, "job"),
            ObjectKind::Worker => write!(f, "worker"),
        }
    }
}

/// Failures an object store can report
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record does not exist (or vanished since it was read)
    #[error("{kind} {name} not found")]
    NotFound { kind: ObjectKind, name: String },

    /// A create targeted a name that is already taken
    #[error("{kind} {name} already exists")]
    AlreadyExists { kind: ObjectKind, name: String },

    /// The record changed since it was read
    #[error("job {name} was modified concurrently (read at version {read_version})")]
    Conflict { name: String, read_version: u64 },

    /// The store could not be reached or failed internally
    #[error("store unavailable: {0}")]
    Transient(String),
}

impl StoreError {
    pub fn not_found(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    pub fn already_exists(kind: ObjectKind, name: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            name: name.into(),
        }
    }

    pub fn conflict(name: impl Into<String>, read_version: u64) -> Self {
        Self::Conflict {
            name: name.into(),
            read_version,
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::Transient(message.into())
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = StoreError::not_found(ObjectKind::Worker, "bell-worker-0");
        assert_eq!(err.to_string(), "worker bell-worker-0 not found");
        assert!(err.is_not_found());

        let err = StoreError::conflict("bell", 7);
        assert!(err.is_conflict());
        assert!(err.to_string().contains("version 7"));
    }
}
