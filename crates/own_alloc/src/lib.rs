//! The raw resource layer underneath the owning pointer types.
//!
//! A *resource* is a heap allocation holding either one value of `T` or `len`
//! contiguously laid-out values of `T`. The distinction is recorded in a
//! [`Shape`], chosen exactly once by the allocation entry point and carried
//! unchanged through every owner that later manages the resource. Because
//! [`RawResource::release`] reads the shape the resource was allocated with,
//! releasing with a mismatched strategy is structurally impossible rather
//! than runtime-checked.
//!
//! **Entry points**
//!
//! [`alloc_scalar`] and [`alloc_sequence_with`] are the only places a shape
//! is selected. Both fail with [`AllocError`] when the backing allocation
//! cannot be performed; no partially-built resource escapes.
//!
//! **RawResource**
//!
//! [`RawResource<T>`] does not track whether it has been released and has no
//! `Drop` impl. The owner types in `own_ptr` are responsible for calling
//! [`release`](RawResource::release) exactly once; this crate only makes the
//! pairing between allocation and release unbreakable.
#![expect(unsafe_code, reason = "Manual allocation is inherently unsafe.")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

#[cfg(feature = "std")]
extern crate std;

extern crate alloc;

// -----------------------------------------------------------------------------
// Modules

mod error;
mod raw;
mod shape;

// -----------------------------------------------------------------------------
// Top-level exports

pub use error::AllocError;
pub use raw::{RawResource, alloc_scalar, alloc_sequence_with};
pub use shape::Shape;
