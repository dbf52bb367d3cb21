//! Crate error types.
//!
//! A single [`Error`] covers address planning, deferred-value composition and
//! resource declaration. It is `Clone` because a failed deferred value hands
//! the same failure to every observer attached to it.

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid address block: {0}")]
    InvalidAddress(String),

    #[error("Invalid partition: {0}")]
    InvalidPartition(String),

    #[error("Insufficient address space in {base}: need {required} sub-blocks, only {available} usable")]
    InsufficientAddressSpace {
        base: String,
        required: u128,
        available: u128,
    },

    #[error("Dependency of '{label}' failed: {source}")]
    DependencyFailed {
        label: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Resolver for '{label}' invoked more than once")]
    DoubleResolve { label: String },

    #[error("Timed out after {after:?} waiting for '{label}'")]
    Timeout { label: String, after: Duration },

    #[error("Blocking wait on '{label}' from inside a continuation")]
    AwaitInsideContinuation { label: String },

    #[error("Backend error for {kind} '{name}': {message}")]
    Backend {
        kind: String,
        name: String,
        message: String,
    },

    #[error("Missing attribute '{attribute}' on {kind}")]
    MissingAttribute { kind: String, attribute: String },

    #[error("Continuation for '{label}' failed: {message}")]
    Continuation { label: String, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Wrap `self` as the failed parent of the deferred value `label`.
    pub fn dependency_of(self, label: impl Into<String>) -> Error {
        Error::DependencyFailed {
            label: label.into(),
            source: Box::new(self),
        }
    }

    /// Follow `DependencyFailed` links down to the failure that started the chain.
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::DependencyFailed { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_root_cause_unwraps_dependency_chain() {
        let origin = Error::Backend {
            kind: "certificate".to_string(),
            name: "acm-cert".to_string(),
            message: "quota exceeded".to_string(),
        };
        let chained = origin
            .clone()
            .dependency_of("validation-records")
            .dependency_of("certificate-validation");

        assert_eq!(chained.root_cause(), &origin);
        assert!(chained.source().is_some());
        assert!(chained
            .to_string()
            .starts_with("Dependency of 'certificate-validation' failed"));
    }

    #[test]
    fn test_insufficient_space_message() {
        let err = Error::InsufficientAddressSpace {
            base: "10.0.0.0/16".to_string(),
            required: 8,
            available: 3,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient address space in 10.0.0.0/16: need 8 sub-blocks, only 3 usable"
        );
    }
}
