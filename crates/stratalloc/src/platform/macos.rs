use crate::util::{align_up, PAGE_SHIFT, PAGE_SIZE};
use core::ptr;

pub unsafe fn map_anonymous(size: usize) -> *mut u8 {
    let result = libc::mmap(
        ptr::null_mut(),
        size,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
    );
    if result == libc::MAP_FAILED {
        ptr::null_mut()
    } else {
        result as *mut u8
    }
}

pub unsafe fn unmap(ptr: *mut u8, size: usize) {
    libc::munmap(ptr as *mut libc::c_void, size);
}

fn host_page_size() -> usize {
    unsafe {
        let n = libc::sysconf(libc::_SC_PAGESIZE);
        if n < 1 {
            4096
        } else {
            n as usize
        }
    }
}

/// Map `count` allocator pages aligned to PAGE_SIZE (8 KiB).
/// On Apple Silicon the host page is 16 KiB, which already satisfies the
/// alignment; on 4 KiB hosts we over-map and trim as on Linux.
pub unsafe fn map_pages(count: usize) -> *mut u8 {
    let bytes = count << PAGE_SHIFT;
    if host_page_size() >= PAGE_SIZE {
        return map_anonymous(bytes);
    }

    let raw = map_anonymous(bytes + PAGE_SIZE);
    if raw.is_null() {
        return raw;
    }
    let base = align_up(raw as usize, PAGE_SIZE);
    let lead = base - raw as usize;
    if lead > 0 {
        unmap(raw, lead);
    }
    let tail = PAGE_SIZE - lead;
    if tail > 0 {
        unmap((base + bytes) as *mut u8, tail);
    }
    base as *mut u8
}
