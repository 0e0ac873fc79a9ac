#[cfg(target_os = "linux")]
pub mod linux;
#[cfg(target_os = "linux")]
pub use linux as sys;

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(target_os = "macos")]
pub use macos as sys;

#[cfg(target_os = "windows")]
pub mod windows;
#[cfg(target_os = "windows")]
pub use windows as sys;

/// Map anonymous read-write memory at host-page granularity.
/// Returns null on failure. Used for metadata (page-map leaves, span pool
/// chunks) where allocator-page alignment does not matter.
///
/// # Safety
/// `size` must be a multiple of the host page size and non-zero.
#[inline]
pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    sys::map_anonymous(size)
}

/// Unmap previously mapped memory.
///
/// # Safety
/// `ptr` must have been returned by `map_anonymous` and `size` must match.
#[inline]
pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    sys::unmap(ptr, size);
}

/// Map `count` allocator pages (`count << PAGE_SHIFT` bytes) of anonymous
/// read-write memory, aligned to `PAGE_SIZE`. Returns null on exhaustion.
/// This is the OS primitive the page cache draws spans from; the alignment
/// guarantee is what makes `address >> PAGE_SHIFT` page ids well formed.
///
/// # Safety
/// `count` must be non-zero.
#[inline]
pub unsafe fn map_pages(count: usize) -> *mut u8 {
    sys::map_pages(count)
}

/// Release `count` allocator pages previously obtained from `map_pages`.
///
/// # Safety
/// `(ptr, count)` must denote exactly a range returned by `map_pages`.
#[inline]
pub unsafe fn unmap_pages(ptr: *mut u8, count: usize) {
    sys::unmap(ptr, count << crate::util::PAGE_SHIFT);
}
