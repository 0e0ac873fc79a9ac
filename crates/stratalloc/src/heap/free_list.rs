//! Intrusive free lists of sliced objects.
//!
//! A free object stores the next-pointer in its own first machine word, so
//! the minimum size class (8 bytes) is exactly one pointer. The same
//! `FreeObject` chains thread a span's per-span free list, the ranges moved
//! between thread and central caches, and the per-thread free lists.

use core::ptr;

#[repr(C)]
pub struct FreeObject {
    pub next: *mut FreeObject,
}

/// Per-class LIFO of free objects in a thread cache.
///
/// `max_size` is the slow-start batch cap: it starts at one and grows by one
/// each time a central-cache refill uses the full allowance, so short-lived
/// threads never claim large batches while steady-state threads warm up to
/// the per-size transfer limit.
pub struct FreeList {
    head: *mut FreeObject,
    size: usize,
    max_size: usize,
}

impl FreeList {
    pub const fn new() -> Self {
        Self {
            head: ptr::null_mut(),
            size: 0,
            max_size: 1,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    #[inline]
    pub fn grow_max_size(&mut self) {
        self.max_size += 1;
    }

    #[inline]
    pub unsafe fn push(&mut self, obj: *mut u8) {
        debug_assert!(!obj.is_null());
        let obj = obj as *mut FreeObject;
        (*obj).next = self.head;
        self.head = obj;
        self.size += 1;
    }

    #[inline]
    pub unsafe fn pop(&mut self) -> *mut u8 {
        debug_assert!(!self.head.is_null());
        let obj = self.head;
        self.head = (*obj).next;
        self.size -= 1;
        obj as *mut u8
    }

    /// Splice a pre-linked chain of `n` objects onto the front.
    /// `end` must be the last object of the chain starting at `start`.
    #[inline]
    pub unsafe fn push_range(&mut self, start: *mut FreeObject, end: *mut FreeObject, n: usize) {
        debug_assert!(!start.is_null() && !end.is_null());
        (*end).next = self.head;
        self.head = start;
        self.size += n;
    }

    /// Detach the first `n` objects as a null-terminated chain.
    /// Returns `(start, end)`.
    pub unsafe fn pop_range(&mut self, n: usize) -> (*mut FreeObject, *mut FreeObject) {
        debug_assert!(n >= 1 && n <= self.size);
        let start = self.head;
        let mut end = start;
        for _ in 0..n - 1 {
            end = (*end).next;
        }
        self.head = (*end).next;
        (*end).next = ptr::null_mut();
        self.size -= n;
        (start, end)
    }

    /// Detach the whole list. Used by the thread-exit drain.
    pub unsafe fn pop_all(&mut self) -> (*mut FreeObject, usize) {
        let start = self.head;
        let n = self.size;
        self.head = ptr::null_mut();
        self.size = 0;
        (start, n)
    }
}
