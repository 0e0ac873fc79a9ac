//! The thread cache: per-thread front end.
//!
//! One intrusive free list per size class, touched only by the owning
//! thread, so the common-case allocate and deallocate take no lock at all.
//! Misses pull a slow-start-sized batch from the central cache; overflows
//! push a batch back. Thread exit drains every list so no memory is
//! stranded in dead threads.

use crate::allocator::central_cache::CENTRAL_CACHE;
use crate::heap::free_list::FreeList;
use crate::heap::size_class;
use crate::util::{die, MAX_BYTES, NFREELIST};
use std::cell::RefCell;

pub struct ThreadCache {
    lists: [FreeList; NFREELIST],
}

impl ThreadCache {
    pub const fn new() -> Self {
        const EMPTY: FreeList = FreeList::new();
        Self {
            lists: [EMPTY; NFREELIST],
        }
    }

    /// Allocate `size` bytes (`1..=MAX_BYTES`). Null only on OS exhaustion.
    #[inline]
    pub unsafe fn allocate(&mut self, size: usize) -> *mut u8 {
        if size == 0 || size > MAX_BYTES {
            die("stratalloc: size outside the small-object range\n");
        }
        let aligned = size_class::round_up(size);
        let class = size_class::index(size);
        if !self.lists[class].is_empty() {
            return self.lists[class].pop();
        }
        self.fetch_from_central(class, aligned)
    }

    /// Return `ptr`, previously allocated at `size`, to this thread's list.
    #[inline]
    pub unsafe fn deallocate(&mut self, ptr: *mut u8, size: usize) {
        debug_assert!(!ptr.is_null());
        if size == 0 || size > MAX_BYTES {
            die("stratalloc: size outside the small-object range\n");
        }
        let aligned = size_class::round_up(size);
        let class = size_class::index(size);
        let list = &mut self.lists[class];
        list.push(ptr);
        if list.len() >= list.max_size() {
            Self::list_too_long(list, aligned);
        }
    }

    /// Refill from the central cache with slow start: the allowance is the
    /// smaller of this list's cap and the per-size transfer bound, and a
    /// fully used allowance grows the cap by one for next time.
    #[cold]
    unsafe fn fetch_from_central(&mut self, class: usize, aligned: usize) -> *mut u8 {
        let list = &mut self.lists[class];
        let batch = list.max_size().min(size_class::num_move_size(aligned));
        if batch == list.max_size() {
            list.grow_max_size();
        }

        let (start, end, actual) = CENTRAL_CACHE.fetch_range(class, aligned, batch);
        if actual == 0 {
            return core::ptr::null_mut();
        }
        // First object goes to the caller, the rest stock the list.
        if actual > 1 {
            list.push_range((*start).next, end, actual - 1);
        }
        start as *mut u8
    }

    /// The list hit its cap: peel off one cap's worth and hand the whole
    /// chain to the central cache at once.
    unsafe fn list_too_long(list: &mut FreeList, aligned: usize) {
        let (start, _end) = list.pop_range(list.max_size());
        CENTRAL_CACHE.release_list(start, aligned);
    }
}

impl Drop for ThreadCache {
    fn drop(&mut self) {
        for class in 0..NFREELIST {
            let list = &mut self.lists[class];
            if list.is_empty() {
                continue;
            }
            unsafe {
                let (start, _n) = list.pop_all();
                CENTRAL_CACHE.release_list(start, size_class::class_to_size(class));
            }
        }
    }
}

thread_local! {
    static THREAD_CACHE: RefCell<ThreadCache> = const { RefCell::new(ThreadCache::new()) };
}

/// Run `f` against this thread's cache. `None` when the slot is unavailable
/// (thread teardown, or a reentrant call from inside the cache itself);
/// callers then fall back to the central cache directly.
#[inline]
pub fn with_thread_cache<R>(f: impl FnOnce(&mut ThreadCache) -> R) -> Option<R> {
    THREAD_CACHE
        .try_with(|cell| cell.try_borrow_mut().ok().map(|mut cache| f(&mut cache)))
        .ok()
        .flatten()
}
