//! Completion latches used to let a worker block (while still stealing)
//! until a forked closure it's waiting on has run.
//!
//! Grounded in `rayon-core`'s `Latch`/`SpinLatch`/`LockLatch`
//! (`examples/other_examples/1b095b3f_antoinewdg-rayon__src-thread_pool.rs.rs`):
//! a cheap atomic flag for the common case, with a `Condvar` fallback for
//! a thread that has genuinely run out of other work to steal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

/// A one-shot, set-once completion flag.
pub trait Latch {
    /// Marks the latch as set. May be called from any thread, at most once.
    fn set(&self);

    /// Returns whether the latch has been set yet.
    fn is_set(&self) -> bool;
}

/// A latch that parks the waiting thread on a condition variable once it
/// decides to stop spinning. Cheap to poll (`is_set` is a relaxed atomic
/// load); `wait` blocks only when explicitly asked to.
pub struct LockLatch {
    flag: AtomicBool,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl LockLatch {
    pub fn new() -> Self {
        LockLatch {
            flag: AtomicBool::new(false),
            lock: Mutex::new(()),
            cvar: Condvar::new(),
        }
    }

    /// Blocks the calling thread until the latch is set.
    pub fn wait(&self) {
        if self.flag.load(Ordering::Acquire) {
            return;
        }
        let mut guard = self.lock.lock().unwrap();
        while !self.flag.load(Ordering::Acquire) {
            guard = self.cvar.wait(guard).unwrap();
        }
    }
}

impl Latch for LockLatch {
    fn set(&self) {
        let _guard = self.lock.lock().unwrap();
        self.flag.store(true, Ordering::Release);
        self.cvar.notify_all();
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}
