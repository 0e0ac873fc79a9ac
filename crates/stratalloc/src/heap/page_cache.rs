//! The page cache: process-wide bottom tier.
//!
//! Owns every span. Free spans sit in per-page-count buckets; a request is
//! served by exact fit, by splitting the smallest larger span, or by pulling
//! a fresh maximal chunk from the OS. Released spans coalesce with free
//! neighbors through the address→span index before rejoining a bucket.
//!
//! A single mutex guards all of it, and it is a leaf lock: nothing is
//! acquired while it is held. Callers in the central cache drop their
//! bucket lock before calling in here.

use crate::heap::page_map::PageMap;
use crate::heap::span::{Span, SpanList, SpanPool};
use crate::platform;
use crate::sync::Mutex;
use crate::util::{die, NPAGES, PAGE_SHIFT};
use core::ptr;

pub static PAGE_CACHE: PageCache = PageCache::new();

/// Address→span index. Written only under the page-cache lock; read
/// lock-free by the deallocation paths.
static PAGE_MAP: PageMap = PageMap::new();

/// Resolve an object pointer to its owning span via the lock-free index.
/// A miss means a wild or double free; that is unrecoverable corruption.
#[inline]
pub unsafe fn map_object_to_span(obj: *mut u8) -> *mut Span {
    let span = PAGE_MAP.get(obj as usize >> PAGE_SHIFT);
    if span.is_null() {
        die("stratalloc: pointer does not belong to the allocator (invalid free)\n");
    }
    span
}

pub struct PageCache {
    inner: Mutex<PageCacheInner>,
}

struct PageCacheInner {
    /// `lists[k]` holds free spans of exactly `k` pages, `1 <= k < NPAGES`.
    lists: [SpanList; NPAGES],
    /// Control-block pool; all span creation and destruction funnels through
    /// here, under the page-cache lock.
    pool: SpanPool,
}

unsafe impl Send for PageCacheInner {}

impl PageCache {
    pub const fn new() -> Self {
        const EMPTY: SpanList = SpanList::new();
        Self {
            inner: Mutex::new(PageCacheInner {
                lists: [EMPTY; NPAGES],
                pool: SpanPool::new(),
            }),
        }
    }

    /// Reserve the index root and link every bucket's sentinel.
    /// Runs once, single-threaded, behind the init gate.
    pub(crate) unsafe fn init(&self) -> bool {
        if !PAGE_MAP.init() {
            return false;
        }
        let mut inner = self.inner.lock();
        for k in 0..NPAGES {
            let sentinel = inner.pool.alloc();
            if sentinel.is_null() {
                return false;
            }
            inner.lists[k].attach_sentinel(sentinel);
        }
        true
    }

    /// Hand out a span control block for use as a list sentinel elsewhere
    /// (the central cache's buckets, during init).
    pub(crate) unsafe fn alloc_span_block(&self) -> *mut Span {
        self.inner.lock().pool.alloc()
    }

    /// Take a `k`-page span out of the page cache, marked as owned upward.
    /// `obj_size` is the slice size the caller will cut it into (for large
    /// allocations, the rounded request itself). Null on OS exhaustion.
    pub unsafe fn allocate_span(&self, k: usize, obj_size: usize) -> *mut Span {
        debug_assert!(k > 0);
        let mut inner = self.inner.lock();
        let span = Self::new_span(&mut inner, k);
        if !span.is_null() {
            (*span).in_use = true;
            (*span).obj_size = obj_size;
        }
        span
    }

    unsafe fn new_span(inner: &mut PageCacheInner, k: usize) -> *mut Span {
        if k >= NPAGES {
            // Jumbo: straight from the OS. Only the first page is indexed;
            // the large-free path only ever queries the original pointer,
            // whose page id is the span's first.
            let addr = platform::map_pages(k);
            if addr.is_null() {
                return ptr::null_mut();
            }
            let span = inner.pool.alloc();
            if span.is_null() {
                platform::unmap_pages(addr, k);
                return ptr::null_mut();
            }
            (*span).page_id = addr as usize >> PAGE_SHIFT;
            (*span).n = k;
            PAGE_MAP.set((*span).page_id, span);
            return span;
        }

        loop {
            // Exact fit. Index every page so interior object pointers can
            // find their span while it is sliced up.
            if !inner.lists[k].is_empty() {
                let span = inner.lists[k].pop_front();
                PAGE_MAP.set_range((*span).page_id, (*span).n, span);
                return span;
            }

            // Split the smallest larger free span: the front `k` pages leave,
            // the remainder goes back to its new bucket with fresh boundary
            // index entries.
            let mut j = k + 1;
            while j < NPAGES && inner.lists[j].is_empty() {
                j += 1;
            }
            if j < NPAGES {
                let rest = inner.lists[j].pop_front();
                let span = inner.pool.alloc();
                if span.is_null() {
                    inner.lists[j].push_front(rest);
                    return ptr::null_mut();
                }
                (*span).page_id = (*rest).page_id;
                (*span).n = k;
                (*rest).page_id += k;
                (*rest).n -= k;
                inner.lists[(*rest).n].push_front(rest);
                PAGE_MAP.set((*rest).page_id, rest);
                PAGE_MAP.set((*rest).page_id + (*rest).n - 1, rest);
                PAGE_MAP.set_range((*span).page_id, k, span);
                return span;
            }

            // Nothing cached: pull one maximal chunk and retry. The retry
            // lands in one of the branches above since k < NPAGES.
            let addr = platform::map_pages(NPAGES - 1);
            if addr.is_null() {
                return ptr::null_mut();
            }
            let chunk = inner.pool.alloc();
            if chunk.is_null() {
                platform::unmap_pages(addr, NPAGES - 1);
                return ptr::null_mut();
            }
            (*chunk).page_id = addr as usize >> PAGE_SHIFT;
            (*chunk).n = NPAGES - 1;
            inner.lists[NPAGES - 1].push_front(chunk);
            PAGE_MAP.set((*chunk).page_id, chunk);
            PAGE_MAP.set((*chunk).page_id + (*chunk).n - 1, chunk);
        }
    }

    /// Return a fully unused span. Jumbo spans go back to the OS with their
    /// true byte length; cacheable spans coalesce with free neighbors as far
    /// as the bucket range allows, then rejoin a bucket with only their
    /// boundary pages indexed.
    pub unsafe fn release_span(&self, span: *mut Span) {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;

        if (*span).n >= NPAGES {
            // Drop the index entry before the pages go away, or a later
            // neighbor probe at this address could chase a dead span.
            PAGE_MAP.set((*span).page_id, ptr::null_mut());
            platform::unmap_pages((*span).base(), (*span).n);
            inner.pool.free(span);
            return;
        }

        // Absorb free left neighbors while the merge stays cacheable.
        while (*span).page_id > 0 {
            let prev = PAGE_MAP.get((*span).page_id - 1);
            if prev.is_null() || (*prev).in_use || (*prev).n + (*span).n > NPAGES - 1 {
                break;
            }
            inner.lists[(*prev).n].erase(prev);
            (*span).page_id = (*prev).page_id;
            (*span).n += (*prev).n;
            inner.pool.free(prev);
        }

        // Mirror to the right.
        loop {
            let next = PAGE_MAP.get((*span).page_id + (*span).n);
            if next.is_null() || (*next).in_use || (*next).n + (*span).n > NPAGES - 1 {
                break;
            }
            inner.lists[(*next).n].erase(next);
            (*span).n += (*next).n;
            inner.pool.free(next);
        }

        (*span).in_use = false;
        (*span).obj_size = 0;
        (*span).free_list = ptr::null_mut();
        (*span).use_count = 0;
        inner.lists[(*span).n].push_front(span);
        // Boundary pages suffice while the span is free: coalescing only
        // ever probes the pages immediately beside a span.
        PAGE_MAP.set((*span).page_id, span);
        PAGE_MAP.set((*span).page_id + (*span).n - 1, span);
    }
}
