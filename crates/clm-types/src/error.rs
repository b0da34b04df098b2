//! Error types for clm-types

use thiserror::Error;

/// Errors raised while parsing or validating core types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// Process group id does not follow `<class>-<ordinal>`.
    #[error("invalid process group id: {0}")]
    InvalidProcessGroupId(String),

    /// Unrecognised process class name.
    #[error("unknown process class: {0}")]
    UnknownProcessClass(String),

    /// Unrecognised image type.
    #[error("unknown image type: {0}")]
    UnknownImageType(String),
}
