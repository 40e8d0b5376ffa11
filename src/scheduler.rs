//! Scheduler protocol: the free functions and steal loop a concrete
//! scheduler implementation builds on. This crate ships no
//! scheduler itself — only the worker-side half of the protocol — the
//! same split as `libfork`'s `context.hpp`/`unit_pool.hpp` boundary:
//! `unit_pool.hpp` is a *consumer* of the context API, not part of it.
//! `tests/support` provides two reference implementations.

use std::sync::atomic::Ordering;
use std::time::Duration;

use rand::Rng;

use crate::config::STEAL_SPIN_LIMIT;
use crate::context::{NotifyFn, SubmitHandle, WorkerContext};
use crate::latch::Latch;
use crate::submission::SubmitNode;
use crate::worker::WorkerThread;

/// What a scheduler implementation provides: a way to hand a freshly
/// submitted root job to some worker. Everything else (the deque, the
/// submission list, the steal loop) is provided by this crate.
pub trait Scheduler {
    /// Queues `handle` for execution, waking a worker if necessary.
    fn schedule(&self, handle: SubmitHandle);
}

/// Builds a fresh worker context for a scheduler implementer.
/// The caller is expected to then run [`crate::worker::install_with_peers`]
/// (or [`crate::worker::install`] for a single-worker scheduler) around its
/// run loop before resuming any submissions.
pub fn worker_init(notify: NotifyFn) -> WorkerContext {
    log::trace!("worker_init");
    WorkerContext::new(notify)
}

/// Tears a worker context down. Panics if work is still outstanding —
/// calling `finalize` while the deque or submission list is non-empty is a
/// contract violation.
pub fn finalize(ctx: WorkerContext) {
    log::trace!("finalize");
    ctx.assert_quiescent();
}

/// Runs one previously queued root submission to completion. Must be
/// called with a worker installed on the current thread: calling `resume`
/// off a worker thread is a contract violation, enforced by
/// `WorkerThread::current`'s panic.
pub fn resume(handle: SubmitHandle) {
    log::trace!("resume");
    let run = unsafe { handle.as_ref() }.take_run();
    run();
}

/// The work-first steal loop: drain this worker's own
/// submissions first, then its own deque, then attempt a random steal from
/// a peer. Used both as the idle loop a scheduler's worker threads run and
/// — via [`help_until`] — as what a worker does while waiting on a latch
/// inside `join`/`JoinHandle::join`.
///
/// Returns `true` if any work was found and run this pass.
pub fn run_one_pass(worker: &WorkerThread) -> bool {
    if let Some(submissions) = worker.context().try_pop_all() {
        let mut cur = Some(submissions);
        while let Some(handle) = cur {
            let next = unsafe { handle.as_ref() }.next_ptr().load(Ordering::Relaxed)
                as *mut crate::context::SubmitNodeImpl;
            resume(handle);
            cur = std::ptr::NonNull::new(next);
        }
        return true;
    }

    if let Some(task) = worker.context().pop() {
        unsafe { task.as_ref() }.run();
        return true;
    }

    let peers = worker.peers();
    if peers.is_empty() {
        return false;
    }
    let start = rand::thread_rng().gen_range(0, peers.len());
    for offset in 0..peers.len() {
        let victim = &peers[(start + offset) % peers.len()];
        match victim.steal() {
            crate::deque::Steal::Success(task) => {
                unsafe { task.as_ref() }.run();
                return true;
            }
            crate::deque::Steal::Empty | crate::deque::Steal::Retry => continue,
        }
    }
    false
}

/// Spins `run_one_pass` (with bounded backoff) until `latch` is set. This
/// is what a worker does instead of blocking outright while one of its
/// forked children is off running on another worker.
pub fn help_until(latch: &dyn Latch) {
    let worker = WorkerThread::current();
    let mut idle_spins = 0usize;
    while !latch.is_set() {
        if run_one_pass(worker) {
            idle_spins = 0;
            continue;
        }
        idle_spins += 1;
        if idle_spins > STEAL_SPIN_LIMIT {
            std::thread::yield_now();
        } else {
            std::thread::sleep(Duration::from_micros(0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::WorkerContext;
    use crate::latch::LockLatch;
    use crate::worker;

    #[test]
    fn help_until_returns_once_already_set() {
        let ctx = WorkerContext::new(Box::new(|| {}));
        worker::install(&ctx, || {
            let latch = LockLatch::new();
            latch.set();
            help_until(&latch);
        });
    }

    #[test]
    fn run_one_pass_drains_own_deque_first() {
        use crate::context::{ForkFrame, TaskHandle};
        use crate::frame::{FrameHeader, FrameTag};
        use std::ptr::NonNull;
        use std::sync::atomic::{AtomicBool, Ordering as O};
        use std::sync::Arc;

        let ctx = WorkerContext::new(Box::new(|| {}));
        worker::install(&ctx, || {
            let ran = Arc::new(AtomicBool::new(false));
            let ran2 = ran.clone();
            let header = FrameHeader::new(FrameTag::Fork, None);
            let frame = Box::new(ForkFrame::new(header, move || ran2.store(true, O::SeqCst)));
            let handle = TaskHandle::new(NonNull::from(Box::leak(frame)));
            ctx.push(handle);
            assert!(run_one_pass(worker::WorkerThread::current()));
            assert!(ran.load(O::SeqCst));
            unsafe {
                drop(Box::from_raw(handle.as_ptr()));
            }
        });
    }
}
