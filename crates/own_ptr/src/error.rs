use thiserror::Error;

// -----------------------------------------------------------------------------
// Error

/// Failure to access a value through an owner.
///
/// Both cases are programmer errors surfaced synchronously to the caller;
/// access never falls back to a default value.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AccessError {
    #[error("owner holds no resource")]
    NullAccess,

    #[error("index {index} out of range for sequence of length {len}")]
    OutOfRange { index: usize, len: usize },
}
