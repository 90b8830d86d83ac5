//! Resolver error type.

use thiserror::Error;

/// Errors returned by an [`ApproverResolver`](crate::ApproverResolver).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// The rule names a role the directory knows nothing about.
    #[error("unknown approver role: {0}")]
    UnknownRole(String),

    /// "Manager of subject" could not be resolved for this subject.
    #[error("no manager found for subject '{0}'")]
    NoManager(String),

    /// The directory backend could not be reached.
    #[error("approver directory unavailable: {0}")]
    Unavailable(String),
}
