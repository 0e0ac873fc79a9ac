//! The central cache: process-wide middle tier.
//!
//! One span list per size class, each behind its own bucket lock, so two
//! threads refilling different classes never contend. Spans arrive from the
//! page cache, get sliced into fixed-size objects, and hand out batches to
//! thread caches; once every object of a span comes home, the span returns
//! to the page cache.
//!
//! Lock discipline: a bucket lock is never held across a page-cache call.
//! Both slow paths release the bucket lock, talk to the page cache (a leaf
//! lock), then reacquire. While the lock is down another thread may service
//! the same class; `get_one_span` rescans after reacquiring so a racing
//! refill is used instead of duplicated.

use crate::heap::free_list::FreeObject;
use crate::heap::page_cache::{self, PAGE_CACHE};
use crate::heap::size_class;
use crate::heap::span::{Span, SpanList};
use crate::sync::RawMutex;
use crate::util::NFREELIST;
use core::cell::UnsafeCell;
use core::ptr;

pub static CENTRAL_CACHE: CentralCache = CentralCache::new();

struct Bucket {
    lock: RawMutex,
    spans: UnsafeCell<SpanList>,
}

impl Bucket {
    const fn new() -> Self {
        Self {
            lock: RawMutex::new(),
            spans: UnsafeCell::new(SpanList::new()),
        }
    }
}

pub struct CentralCache {
    buckets: [Bucket; NFREELIST],
}

unsafe impl Send for CentralCache {}
unsafe impl Sync for CentralCache {}

impl CentralCache {
    pub const fn new() -> Self {
        const EMPTY: Bucket = Bucket::new();
        Self {
            buckets: [EMPTY; NFREELIST],
        }
    }

    /// Link every bucket's sentinel. Runs once behind the init gate.
    pub(crate) unsafe fn init(&self) -> bool {
        for bucket in &self.buckets {
            let sentinel = PAGE_CACHE.alloc_span_block();
            if sentinel.is_null() {
                return false;
            }
            (*bucket.spans.get()).attach_sentinel(sentinel);
        }
        true
    }

    /// Detach up to `batch` objects of size `obj_size` for class `class`.
    /// Returns `(start, end, actual)` with `actual >= 1` on success and a
    /// null chain with `actual == 0` on OS exhaustion. The chain is
    /// null-terminated at `end`.
    pub unsafe fn fetch_range(
        &self,
        class: usize,
        obj_size: usize,
        batch: usize,
    ) -> (*mut FreeObject, *mut FreeObject, usize) {
        debug_assert!(batch >= 1);
        let bucket = &self.buckets[class];
        bucket.lock.lock();

        let span = Self::get_one_span(bucket, obj_size);
        if span.is_null() {
            bucket.lock.unlock();
            return (ptr::null_mut(), ptr::null_mut(), 0);
        }
        debug_assert!(!(*span).free_list.is_null());

        // Walk up to batch - 1 links; the span may hold fewer.
        let start = (*span).free_list;
        let mut end = start;
        let mut actual = 1;
        while actual < batch && !(*end).next.is_null() {
            end = (*end).next;
            actual += 1;
        }
        (*span).free_list = (*end).next;
        (*end).next = ptr::null_mut();
        (*span).use_count += actual;

        bucket.lock.unlock();
        (start, end, actual)
    }

    /// Find a span with objects left, refilling from the page cache on a
    /// miss. Called and returns with the bucket lock held; drops it around
    /// the page-cache call.
    unsafe fn get_one_span(bucket: &Bucket, obj_size: usize) -> *mut Span {
        loop {
            let list = &mut *bucket.spans.get();
            let mut it = list.begin();
            while it != list.end() {
                if !(*it).free_list.is_null() {
                    return it;
                }
                it = (*it).next;
            }

            // Miss. The page lock is a leaf lock, so let go of the bucket
            // while we fetch.
            bucket.lock.unlock();
            let span = PAGE_CACHE.allocate_span(size_class::num_move_page(obj_size), obj_size);
            bucket.lock.lock();
            if span.is_null() {
                return ptr::null_mut();
            }

            // Slice the page range into obj_size objects; a trailing
            // partial slot is dropped.
            let base = (*span).base();
            let count = (*span).bytes() / obj_size;
            debug_assert!(count >= 1);
            let mut tail = base as *mut FreeObject;
            for i in 1..count {
                let next = base.add(i * obj_size) as *mut FreeObject;
                (*tail).next = next;
                tail = next;
            }
            (*tail).next = ptr::null_mut();
            (*span).free_list = base as *mut FreeObject;

            (&mut *bucket.spans.get()).push_front(span);
            // Rescan rather than returning: another thread may have pushed
            // its own span while the lock was down, and the loop picks up
            // whichever now has objects.
        }
    }

    /// Take back a null-terminated chain of objects of size `obj_size`.
    /// Objects may belong to different spans of the class; any span whose
    /// use count reaches zero is handed back to the page cache.
    pub unsafe fn release_list(&self, start: *mut FreeObject, obj_size: usize) {
        let class = size_class::index(obj_size);
        let bucket = &self.buckets[class];
        bucket.lock.lock();

        let mut cur = start;
        while !cur.is_null() {
            let next = (*cur).next;
            let span = page_cache::map_object_to_span(cur as *mut u8);
            debug_assert_eq!((*span).obj_size, obj_size);

            (*cur).next = (*span).free_list;
            (*span).free_list = cur;
            debug_assert!((*span).use_count > 0);
            (*span).use_count -= 1;

            if (*span).use_count == 0 {
                // Every object is home; the whole span goes down a tier.
                (&mut *bucket.spans.get()).erase(span);
                (*span).free_list = ptr::null_mut();
                bucket.lock.unlock();
                PAGE_CACHE.release_span(span);
                bucket.lock.lock();
            }
            cur = next;
        }

        bucket.lock.unlock();
    }
}
