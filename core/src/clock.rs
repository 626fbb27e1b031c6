//! Process-wide dispatch clock.
//!
//! Every mutation that can change a dispatch outcome stamps itself with a
//! fresh tick. Caches remember the highest tick they observed and compare
//! on the fast path.

use std::sync::atomic::{AtomicU64, Ordering};

static DISPATCH_CLOCK: AtomicU64 = AtomicU64::new(1);

/// Advances the clock and returns the new stamp.
#[inline]
pub fn tick() -> u64 {
    DISPATCH_CLOCK.fetch_add(1, Ordering::SeqCst) + 1
}

#[inline]
pub fn now() -> u64 {
    DISPATCH_CLOCK.load(Ordering::SeqCst)
}
