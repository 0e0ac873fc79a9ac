//! One-shot lazy initialization of the shared tiers.
//!
//! Every façade entry goes through `ensure_initialized`. The first caller
//! reserves the page-map root, seeds the span pool, and links the sentinel
//! heads of all central and page-cache span lists; racers spin until the
//! winner flips the gate to READY.

use crate::allocator::central_cache::CENTRAL_CACHE;
use crate::heap::page_cache::PAGE_CACHE;
use crate::util::die;
use core::sync::atomic::{AtomicU8, Ordering};

const UNINIT: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

static INIT_STATE: AtomicU8 = AtomicU8::new(UNINIT);

#[inline(always)]
pub fn ensure_initialized() {
    if INIT_STATE.load(Ordering::Acquire) == READY {
        return;
    }
    init_slow();
}

#[cold]
#[inline(never)]
fn init_slow() {
    match INIT_STATE.compare_exchange(UNINIT, INITIALIZING, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {
            let ok = unsafe { PAGE_CACHE.init() && CENTRAL_CACHE.init() };
            if !ok {
                // The process cannot allocate at all; nothing to recover.
                die("stratalloc: initialization failed (out of memory)\n");
            }
            INIT_STATE.store(READY, Ordering::Release);
        }
        Err(INITIALIZING) => {
            while INIT_STATE.load(Ordering::Acquire) == INITIALIZING {
                core::hint::spin_loop();
            }
        }
        Err(_) => {}
    }
}
