//! Error types for lineage-db
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)
//!
//! Variants fall into five classes: configuration, not-found, invalid state,
//! conflicts (`AlreadyExists`, `DuplicateKey`, `CycleDetected`) and transient
//! store failures. Only the last class is ever retried.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// lineage-db error types
#[derive(Error, Debug)]
pub enum Error {
    /// Required tracking configuration is missing or unusable
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Referenced run, artifact, model, version or alias does not exist
    #[error("{kind} not found: {name}")]
    NotFound {
        /// What was looked up ("run", "artifact", "model version", ...)
        kind: &'static str,
        /// Identifier that was looked up
        name: String,
    },

    /// Mutation attempted against an entity whose lifecycle forbids it
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Caller-supplied identifier or value is malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Write-once key was written a second time
    #[error("Already exists: {0}\nArtifacts are immutable; write to a new path instead")]
    AlreadyExists(String),

    /// Write-once run parameter was logged a second time
    #[error("Duplicate key '{key}' for run {run_id}")]
    DuplicateKey {
        /// Run the parameter belongs to
        run_id: String,
        /// Parameter key
        key: String,
    },

    /// Lineage edge would make a run its own ancestor
    #[error("Cycle detected: {parent} is already a descendant of {child}")]
    CycleDetected {
        /// Proposed child run
        child: String,
        /// Proposed parent run
        parent: String,
    },

    /// Run id does not reference a run usable for this operation
    #[error("Unknown run: {0}")]
    UnknownRun(String),

    /// Backing store I/O failure unrelated to logical state
    #[error("Transient store error: {0}\nThe operation may be retried")]
    TransientStore(String),

    /// Stored document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error outside the backing store (CI output file, local files)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::NotFound`].
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Whether retrying the same operation could succeed.
    ///
    /// Logical failures never become valid on retry, so only
    /// [`Error::TransientStore`] qualifies.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientStore(_))
    }

    /// Whether this error is one of the invariant-violation conflicts.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(
            self,
            Self::AlreadyExists(_) | Self::DuplicateKey { .. } | Self::CycleDetected { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transient_is_retryable() {
        assert!(Error::TransientStore("disk".into()).is_retryable());
        assert!(!Error::AlreadyExists("x".into()).is_retryable());
        assert!(!Error::not_found("run", "abc").is_retryable());
        assert!(!Error::InvalidState("finished".into()).is_retryable());
    }

    #[test]
    fn test_conflict_classification() {
        assert!(Error::AlreadyExists("k".into()).is_conflict());
        assert!(Error::DuplicateKey {
            run_id: "r".into(),
            key: "k".into()
        }
        .is_conflict());
        assert!(Error::CycleDetected {
            child: "a".into(),
            parent: "b".into()
        }
        .is_conflict());
        assert!(!Error::UnknownRun("r".into()).is_conflict());
    }
}
