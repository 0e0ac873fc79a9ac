//! stratalloc: the core of a three-tier caching memory allocator.
//!
//! Allocations up to 256 KiB walk a tiered cache hierarchy:
//! - per-thread caches (fast path, no locks),
//! - a central cache (one span list and lock per size class),
//! - a page cache (span splitting and coalescing over OS memory).
//!
//! Larger requests go straight to the page cache as whole-page spans.
//! The crate exposes the tiered mechanism, not a public allocator: an
//! enclosing allocator builds on [`allocate`]/[`deallocate`] or the four
//! per-tier entry points in [`api`].

extern crate libc;

pub mod allocator;
pub mod api;
pub mod heap;
pub mod init;
pub mod platform;
pub mod sync;
pub mod util;

pub use api::{
    allocate, deallocate, page_allocate_large, page_free_large, thread_allocate,
    thread_deallocate,
};
pub use util::{MAX_BYTES, NFREELIST, NPAGES, PAGE_SHIFT, PAGE_SIZE};
