//! Domain error types for ownership and authorization operations.

use thiserror::Error;

/// Domain-specific errors for authorization operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Identity handed in by the authentication layer is unusable.
    #[error("invalid identity: {message}")]
    InvalidIdentity { message: String },

    /// Role name is not part of the role hierarchy.
    #[error("invalid role: {value}")]
    InvalidRole { value: String },

    /// Resource type is not one of the supported CRM resources.
    #[error("unknown resource type: {value}")]
    UnknownResourceType { value: String },

    /// Permission flag name is not part of the permission overlay.
    #[error("unknown permission: {value}")]
    UnknownPermission { value: String },

    /// A filter was requested for a scope the identity cannot reach.
    #[error("scope '{scope}' not permitted: {message}")]
    ScopeViolation { scope: String, message: String },

    /// A filter could not be rendered for the requested backend.
    #[error("invalid filter: {message}")]
    InvalidFilter { message: String },

    /// The underlying store failed while serving a point read or upsert.
    #[error("storage failure: {message}")]
    StorageFailure { message: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
