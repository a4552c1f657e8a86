//! Error types for the declarative crate.
//!
//! Every failure a resource can report is returned to the orchestrator,
//! never swallowed. Variants are grouped into kinds so the orchestrator
//! can decide what to do with them without matching every variant.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Categories of resource errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The definition is structurally wrong or its target does not exist
    InvalidDefinition,
    /// Reading or writing the managed value failed
    IoFailure,
    /// The change subscription failed or closed unexpectedly
    WatchFailure,
    /// Two definitions could not be compared or are not equivalent
    ContractMismatch,
    /// A lifecycle step was called out of order
    Lifecycle,
}

impl ErrorKind {
    /// Whether the resource can never be deployed as defined.
    pub fn is_fatal_to_deployment(&self) -> bool {
        matches!(self, Self::InvalidDefinition)
    }

    /// Whether the resource is no longer being monitored after this error.
    pub fn stops_monitoring(&self) -> bool {
        matches!(self, Self::WatchFailure)
    }

    /// Short label used in reports.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidDefinition => "invalid definition",
            Self::IoFailure => "I/O failure",
            Self::WatchFailure => "watch failure",
            Self::ContractMismatch => "mismatch",
            Self::Lifecycle => "lifecycle",
        }
    }
}

/// Errors that can occur while managing a resource.
#[derive(Debug, Error)]
pub enum Error {
    /// Precondition failure found by `validate` or while decoding
    #[error("invalid {kind} definition '{name}': {reason}")]
    InvalidDefinition {
        kind: String,
        name: String,
        reason: String,
    },

    /// A definition field could not be decoded
    #[error("cannot decode {kind} '{name}': {message}")]
    Decode {
        kind: String,
        name: String,
        message: String,
    },

    /// No resource variant is registered under this kind
    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    /// Two resources share the same kind and name
    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    /// Read or write against the managed namespace failed
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The change subscription failed
    #[error("watch failed on {}: {message}", .path.display())]
    Watch { path: PathBuf, message: String },

    /// `cmp` was called against a different resource variant
    #[error("not a {expected} resource (got {found})")]
    KindMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// `cmp` found a differing field
    #[error("the {field} differs")]
    Mismatch { field: &'static str },

    /// A lifecycle step was called out of order
    #[error("lifecycle error: {0}")]
    Init(String),

    /// A spawned task could not be joined
    #[error("task failed: {0}")]
    Task(String),
}

impl Error {
    /// Get the error kind for reporting and policy decisions.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidDefinition { .. }
            | Error::Decode { .. }
            | Error::UnknownKind(_)
            | Error::DuplicateResource(_) => ErrorKind::InvalidDefinition,
            Error::Io { .. } => ErrorKind::IoFailure,
            Error::Watch { .. } => ErrorKind::WatchFailure,
            Error::KindMismatch { .. } | Error::Mismatch { .. } => ErrorKind::ContractMismatch,
            Error::Init(_) | Error::Task(_) => ErrorKind::Lifecycle,
        }
    }

    /// Build an `InvalidDefinition` error.
    pub fn invalid(kind: &str, name: &str, reason: impl Into<String>) -> Self {
        Error::InvalidDefinition {
            kind: kind.to_string(),
            name: name.to_string(),
            reason: reason.into(),
        }
    }

    /// Build an `Io` error for a path.
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        Error::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    /// Build a `Watch` error for a path.
    pub fn watch(path: &Path, message: impl Into<String>) -> Self {
        Error::Watch {
            path: path.to_path_buf(),
            message: message.into(),
        }
    }
}

/// Result type for resource operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::invalid("sysctl", "x", "value is empty").kind(),
            ErrorKind::InvalidDefinition
        );
        assert_eq!(
            Error::io(Path::new("/proc/sys/x"), std::io::Error::other("boom")).kind(),
            ErrorKind::IoFailure
        );
        assert_eq!(
            Error::watch(Path::new("/proc/sys/x"), "unexpected close").kind(),
            ErrorKind::WatchFailure
        );
        assert_eq!(
            Error::Mismatch { field: "value" }.kind(),
            ErrorKind::ContractMismatch
        );
        assert_eq!(Error::Init("twice".into()).kind(), ErrorKind::Lifecycle);
    }

    #[test]
    fn test_kind_policies() {
        assert!(ErrorKind::InvalidDefinition.is_fatal_to_deployment());
        assert!(!ErrorKind::IoFailure.is_fatal_to_deployment());
        assert!(ErrorKind::WatchFailure.stops_monitoring());
        assert!(!ErrorKind::ContractMismatch.stops_monitoring());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::KindMismatch {
            expected: "sysctl",
            found: "file",
        };
        assert_eq!(err.to_string(), "not a sysctl resource (got file)");

        let err = Error::watch(Path::new("/proc/sys/vm/swappiness"), "unexpected close");
        assert_eq!(
            err.to_string(),
            "watch failed on /proc/sys/vm/swappiness: unexpected close"
        );
    }
}
