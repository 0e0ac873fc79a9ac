//! Two-level radix tree mapping page ids to their owning `Span`.
//!
//! This is how a deallocated pointer finds its span without holding any
//! lock: writers (the page cache, under its mutex) publish entries with
//! release stores, readers chase two acquire loads.
//!
//! Root: 2^24 slots reserved lazily as one anonymous mapping at init; only
//! touched root pages consume physical memory. Leaves: 2^11 entries each,
//! allocated on first write to their range. 24 + 11 + PAGE_SHIFT(13) covers
//! the 48-bit address space.

use crate::heap::span::Span;
use crate::platform;
use core::mem;
use core::ptr;
use core::sync::atomic::{AtomicPtr, Ordering};

const LEAF_BITS: usize = 11;
const LEAF_LEN: usize = 1 << LEAF_BITS;

const ROOT_BITS: usize = 24;
const ROOT_LEN: usize = 1 << ROOT_BITS;

#[repr(C)]
struct Leaf {
    entries: [AtomicPtr<Span>; LEAF_LEN],
}

pub struct PageMap {
    root: AtomicPtr<AtomicPtr<Leaf>>,
}

unsafe impl Send for PageMap {}
unsafe impl Sync for PageMap {}

impl PageMap {
    pub const fn new() -> Self {
        Self {
            root: AtomicPtr::new(ptr::null_mut()),
        }
    }

    /// Reserve the root table. Must run once before any `set`.
    /// Mapped memory is zeroed, and a null pointer is all zero bits, so the
    /// fresh table is already a valid empty root.
    pub unsafe fn init(&self) -> bool {
        let bytes = ROOT_LEN * mem::size_of::<AtomicPtr<Leaf>>();
        let mem = platform::map_anonymous(bytes);
        if mem.is_null() {
            return false;
        }
        self.root.store(mem as *mut AtomicPtr<Leaf>, Ordering::Release);
        true
    }

    #[inline(always)]
    fn split(page_id: usize) -> (usize, usize) {
        let root_idx = (page_id >> LEAF_BITS) & (ROOT_LEN - 1);
        let leaf_idx = page_id & (LEAF_LEN - 1);
        (root_idx, leaf_idx)
    }

    /// Lock-free lookup. Null when no span covers the page.
    #[inline(always)]
    pub unsafe fn get(&self, page_id: usize) -> *mut Span {
        let root = self.root.load(Ordering::Acquire);
        if root.is_null() {
            return ptr::null_mut();
        }
        let (root_idx, leaf_idx) = Self::split(page_id);
        let leaf = (*root.add(root_idx)).load(Ordering::Acquire);
        if leaf.is_null() {
            return ptr::null_mut();
        }
        (*leaf).entries[leaf_idx].load(Ordering::Acquire)
    }

    /// Record `page_id -> span`. Callers hold the page-cache lock.
    pub unsafe fn set(&self, page_id: usize, span: *mut Span) {
        let root = self.root.load(Ordering::Acquire);
        debug_assert!(!root.is_null());
        let (root_idx, leaf_idx) = Self::split(page_id);
        let leaf = self.leaf_for(root, root_idx);
        (*leaf).entries[leaf_idx].store(span, Ordering::Release);
    }

    /// Record `first .. first + n -> span` for every page of a span that is
    /// about to hand out interior object pointers.
    pub unsafe fn set_range(&self, first: usize, n: usize, span: *mut Span) {
        for page_id in first..first + n {
            self.set(page_id, span);
        }
    }

    #[inline]
    unsafe fn leaf_for(&self, root: *mut AtomicPtr<Leaf>, root_idx: usize) -> *mut Leaf {
        let slot = &*root.add(root_idx);
        let leaf = slot.load(Ordering::Acquire);
        if !leaf.is_null() {
            return leaf;
        }
        self.alloc_leaf(slot)
    }

    #[cold]
    unsafe fn alloc_leaf(&self, slot: &AtomicPtr<Leaf>) -> *mut Leaf {
        let mem = platform::map_anonymous(mem::size_of::<Leaf>());
        if mem.is_null() {
            // Metadata exhaustion: a span we cannot index would later look
            // like a wild free, so fail loudly here instead.
            crate::util::die("stratalloc: out of memory growing the page map\n");
        }
        // Zeroed mapping doubles as an all-null leaf.
        let fresh = mem as *mut Leaf;
        match slot.compare_exchange(ptr::null_mut(), fresh, Ordering::AcqRel, Ordering::Acquire) {
            Ok(_) => fresh,
            Err(existing) => {
                platform::unmap(mem, mem::size_of::<Leaf>());
                existing
            }
        }
    }
}
