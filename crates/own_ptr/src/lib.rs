//! Owning pointer types over the raw resource layer in `own_alloc`.
//!
//! Both owners manage a heap resource (one value or a contiguous sequence)
//! and guarantee it is released exactly once, through the release strategy
//! fixed when the resource was allocated.
//!
//! **Exclusive**
//!
//! [`Exclusive<T>`] is the single owner of its resource. It cannot be
//! cloned; ownership moves with [`transfer`](Exclusive::transfer), which
//! empties the source. The resource is released when the holding owner is
//! dropped or [`reset`](Exclusive::reset).
//!
//! **Shared**
//!
//! [`Shared<T>`] is one of any number of owners of the same resource,
//! coordinated through a reference-counted control block. Cloning increments
//! the strong count; dropping or [`reset`](Shared::reset) decrements it, and
//! the owner that observes the count reach zero releases the resource.
//!
//! Access through either owner is fallible rather than panicking: an empty
//! owner reports [`AccessError::NullAccess`], an index past the end of a
//! sequence reports [`AccessError::OutOfRange`].
#![expect(unsafe_code, reason = "Owning pointers manage raw allocations.")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod error;
mod exclusive;
mod shared;

// -----------------------------------------------------------------------------
// Top-level exports

pub use error::AccessError;
pub use exclusive::Exclusive;
pub use shared::Shared;
