//! Thread-local current worker/frame state, grounded in `libfork`'s
//! `tls.hpp` pattern: rather than
//! threading a `&WorkerContext` and "what frame am I inside" through every
//! call in `ops.rs`, each participating OS thread stashes a pointer to its
//! own state once, at worker start, and looks it up from wherever it is.

use std::cell::Cell;
use std::ptr::NonNull;

use crate::context::{TaskHandle, WorkerContext};
use crate::deque::Stealer;
use crate::frame::FrameHeader;

thread_local! {
    static CURRENT: Cell<*const WorkerThread> = Cell::new(std::ptr::null());
}

/// Everything about "what am I, right now" that code deep inside `ops.rs`
/// needs without having it passed down explicitly.
pub struct WorkerThread {
    context: NonNull<WorkerContext>,
    /// Stealers for every other worker in the pool, for the steal loop.
    /// Empty for a lone, unscheduled worker such as the inline
    /// single-thread pool.
    peers: Vec<Stealer<TaskHandle>>,
    current_frame: Cell<Option<NonNull<FrameHeader>>>,
}

impl WorkerThread {
    pub fn context(&self) -> &WorkerContext {
        unsafe { self.context.as_ref() }
    }

    pub fn peers(&self) -> &[Stealer<TaskHandle>] {
        &self.peers
    }

    pub fn current_frame(&self) -> Option<NonNull<FrameHeader>> {
        self.current_frame.get()
    }

    /// Runs `f` with `frame` installed as the current frame, restoring
    /// whatever was current before on the way out (including on unwind).
    pub fn with_frame<R>(&self, frame: NonNull<FrameHeader>, f: impl FnOnce() -> R) -> R {
        let prev = self.current_frame.replace(Some(frame));
        struct Restore<'a> {
            cell: &'a Cell<Option<NonNull<FrameHeader>>>,
            prev: Option<NonNull<FrameHeader>>,
        }
        impl<'a> Drop for Restore<'a> {
            fn drop(&mut self) {
                self.cell.set(self.prev);
            }
        }
        let _restore = Restore {
            cell: &self.current_frame,
            prev,
        };
        f()
    }

    /// Returns the currently running worker, panicking if called from a
    /// thread that never had [`install`] run on it: calling a runtime
    /// primitive off the worker threads is a contract violation.
    pub fn current() -> &'static WorkerThread {
        CURRENT.with(|cell| {
            let ptr = cell.get();
            assert!(
                !ptr.is_null(),
                "contract violation: no worker installed on this thread"
            );
            unsafe { &*ptr }
        })
    }

    pub fn try_current() -> Option<&'static WorkerThread> {
        CURRENT.with(|cell| {
            let ptr = cell.get();
            if ptr.is_null() {
                None
            } else {
                Some(unsafe { &*ptr })
            }
        })
    }
}

/// Installs `context` as the current thread's worker state for the
/// duration of `f`. The scheduler's worker-loop entry point is expected to
/// call this exactly once per OS thread, wrapping the whole run loop.
pub fn install<R>(context: &WorkerContext, f: impl FnOnce() -> R) -> R {
    install_with_peers(context, Vec::new(), f)
}

/// Like [`install`], additionally registering stealers for every other
/// worker in the pool, used by the steal loop in `scheduler.rs`.
pub fn install_with_peers<R>(
    context: &WorkerContext,
    peers: Vec<Stealer<TaskHandle>>,
    f: impl FnOnce() -> R,
) -> R {
    let worker = WorkerThread {
        context: NonNull::from(context),
        peers,
        current_frame: Cell::new(None),
    };
    let prev = CURRENT.with(|cell| cell.replace(&worker as *const WorkerThread));
    struct Restore(*const WorkerThread);
    impl Drop for Restore {
        fn drop(&mut self) {
            CURRENT.with(|cell| cell.set(self.0));
        }
    }
    let _restore = Restore(prev);
    f()
}
