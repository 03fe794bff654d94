#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![no_std]

pub use own_alloc as raw;
pub use own_ptr as ptr;

pub use own_alloc::{AllocError, RawResource, Shape};
pub use own_ptr::{AccessError, Exclusive, Shared};
