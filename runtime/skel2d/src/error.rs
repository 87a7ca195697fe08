use thiserror::Error;

/// Error types for skeleton data construction and validation
///
/// Errors are only produced while building [`crate::skeleton::SkeletonData`].
/// The per-frame pose pipeline is infallible: name lookups return `Option`
/// and out-of-range numeric inputs are clamped at the point of use.
#[derive(Error, Debug)]
pub enum SkelError {
    /// Error during structural validation of skeleton data
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Reference error: an index points outside the skeleton data
    #[error("Reference error: {0}")]
    ReferenceError(String),

    /// A name is used more than once where names must be unique
    #[error("Duplicate name: {0}")]
    DuplicateName(String),

    /// Timeline keyframes are not strictly increasing in time
    #[error("Timeline error: {0}")]
    TimelineError(String),
}

/// Result type using SkelError
pub type Result<T> = std::result::Result<T, SkelError>;
