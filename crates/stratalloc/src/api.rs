//! Upward façade: the four tier entry points plus a size dispatcher, for an
//! enclosing allocator to build on. Failure is a null pointer (the OS ran
//! out); invalid frees and size misuse are unrecoverable and abort.

use crate::allocator::central_cache::CENTRAL_CACHE;
use crate::allocator::thread_cache::with_thread_cache;
use crate::heap::free_list::FreeObject;
use crate::heap::page_cache::{self, PAGE_CACHE};
use crate::heap::size_class;
use crate::init::ensure_initialized;
use crate::util::{MAX_BYTES, PAGE_SHIFT};
use core::ptr;

/// Allocate `size` bytes, dispatching on the small-object limit.
/// Zero-byte requests are served as one byte.
pub unsafe fn allocate(size: usize) -> *mut u8 {
    let size = size.max(1);
    if size > MAX_BYTES {
        page_allocate_large(size)
    } else {
        thread_allocate(size)
    }
}

/// Free `ptr`, previously allocated with the same `size`.
pub unsafe fn deallocate(ptr: *mut u8, size: usize) {
    if ptr.is_null() {
        return;
    }
    let size = size.max(1);
    if size > MAX_BYTES {
        page_free_large(ptr);
    } else {
        thread_deallocate(ptr, size);
    }
}

/// Small-path allocation (`size <= MAX_BYTES`) through this thread's cache.
pub unsafe fn thread_allocate(size: usize) -> *mut u8 {
    if size == 0 || size > MAX_BYTES {
        crate::util::die("stratalloc: size outside the small-object range\n");
    }
    ensure_initialized();
    match with_thread_cache(|tc| tc.allocate(size)) {
        Some(ptr) => ptr,
        // TLS gone (thread teardown): fetch one object straight from the
        // central cache.
        None => {
            let aligned = size_class::round_up(size);
            let class = size_class::index(size);
            let (start, _end, actual) = CENTRAL_CACHE.fetch_range(class, aligned, 1);
            if actual == 0 {
                ptr::null_mut()
            } else {
                start as *mut u8
            }
        }
    }
}

/// Small-path deallocation through this thread's cache.
pub unsafe fn thread_deallocate(ptr: *mut u8, size: usize) {
    if size == 0 || size > MAX_BYTES {
        crate::util::die("stratalloc: size outside the small-object range\n");
    }
    if with_thread_cache(|tc| tc.deallocate(ptr, size)).is_none() {
        // TLS gone: release a one-object chain straight to the central cache.
        let obj = ptr as *mut FreeObject;
        (*obj).next = ptr::null_mut();
        CENTRAL_CACHE.release_list(obj, size_class::round_up(size));
    }
}

/// Large-path allocation (`size > MAX_BYTES`): whole pages straight from the
/// page cache, bypassing both upper tiers.
pub unsafe fn page_allocate_large(size: usize) -> *mut u8 {
    debug_assert!(size > MAX_BYTES);
    ensure_initialized();
    let aligned = size_class::round_up(size);
    let span = PAGE_CACHE.allocate_span(aligned >> PAGE_SHIFT, aligned);
    if span.is_null() {
        ptr::null_mut()
    } else {
        (*span).base()
    }
}

/// Large-path free. The span (and with it the size) is recovered from the
/// address→span index, so only the pointer is needed.
pub unsafe fn page_free_large(ptr: *mut u8) {
    let span = page_cache::map_object_to_span(ptr);
    PAGE_CACHE.release_span(span);
}
