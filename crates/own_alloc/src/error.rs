use thiserror::Error;

// -----------------------------------------------------------------------------
// Error

/// Failure to produce the backing allocation for a resource.
///
/// Always surfaced to the caller of the allocation entry point; no partial
/// resource or owner is produced alongside it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum AllocError {
    #[error("backing allocation of {size} bytes (align {align}) failed")]
    Exhausted { size: usize, align: usize },

    #[error("sequence of {len} items exceeds the maximum allocation size")]
    Oversized { len: usize },
}
