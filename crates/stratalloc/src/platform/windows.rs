use crate::util::PAGE_SHIFT;
use core::ffi::c_void;
use core::ptr;

const MEM_COMMIT: u32 = 0x1000;
const MEM_RESERVE: u32 = 0x2000;
const MEM_RELEASE: u32 = 0x8000;
const PAGE_READWRITE: u32 = 0x04;

extern "system" {
    fn VirtualAlloc(addr: *mut c_void, size: usize, kind: u32, protect: u32) -> *mut c_void;
    fn VirtualFree(addr: *mut c_void, size: usize, kind: u32) -> i32;
}

pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    VirtualAlloc(ptr::null_mut(), size, MEM_COMMIT | MEM_RESERVE, PAGE_READWRITE) as *mut u8
}

/// VirtualFree(MEM_RELEASE) frees the whole reservation; the size is implied.
pub unsafe fn unmap(ptr: *mut u8, _size: usize) {
    VirtualFree(ptr as *mut c_void, 0, MEM_RELEASE);
}

/// VirtualAlloc reservations are 64 KiB-granular, so PAGE_SIZE (8 KiB)
/// alignment holds without trimming.
pub unsafe fn map_pages(count: usize) -> *mut u8 {
    map_anonymous(count << PAGE_SHIFT)
}
