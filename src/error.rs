//! Error taxonomy.
//!
//! Only *user failures* are a `Result`-shaped concern for callers of this
//! crate: they travel through [`crate::frame::ResultSlot`] exactly like a
//! returned value. Every other category — contract violations, resource
//! exhaustion, scheduler misbehaviour — is fatal and never
//! recoverable, so it is expressed as a panic or process abort rather than
//! an `enum` variant a caller could match on and continue past.

use std::alloc::Layout;

/// Aborts the process after logging a diagnostic for an allocation failure.
///
/// Mirrors how Rust's own global allocator handles OOM
/// (`std::alloc::handle_alloc_error`): the runtime does not attempt
/// graceful degradation on resource exhaustion.
#[cold]
#[inline(never)]
pub fn stacklet_alloc_failed(layout: Layout) -> ! {
    log::error!(
        "cactus stack exhausted: failed to allocate {} bytes (align {})",
        layout.size(),
        layout.align()
    );
    std::alloc::handle_alloc_error(layout)
}

/// Panics with a diagnostic for a cactus-stack LIFO-order violation.
///
/// Freeing out of order is a contract violation: the caller is misusing
/// the allocator API, not something the allocator can route around.
#[cold]
#[inline(never)]
pub fn lifo_violation(expected: *mut u8, got: *mut u8) -> ! {
    panic!(
        "cactus stack contract violation: deallocate() out of LIFO order \
         (expected top {:p}, got {:p})",
        expected, got
    )
}

/// Panics with a diagnostic when `finalize` is called with outstanding work.
#[cold]
#[inline(never)]
pub fn finalize_not_quiescent(deque_len: usize, has_submissions: bool) -> ! {
    panic!(
        "finalize() called on a worker context that is not quiescent \
         (deque holds {} frame(s), pending submissions: {})",
        deque_len, has_submissions
    )
}

/// Panics when `sync_wait` is (mis)used from inside a running frame.
#[cold]
#[inline(never)]
pub fn sync_wait_reentrant() -> ! {
    panic!("sync_wait() called from inside a running frame; this blocks the worker forever")
}

/// Panics on an attempt to submit a null handle.
#[cold]
#[inline(never)]
pub fn null_submission() -> ! {
    panic!("contract violation: submitted a null handle")
}
