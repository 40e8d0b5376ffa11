//! Fork/join primitives: `call`, `join`, `Scope::fork`, and `migrate`.
//!
//! Rust has no portable stackful-coroutine primitive to resume a
//! half-executed native stack frame on a foreign thread, so "the
//! continuation" is reified as an ordinary `Send` closure instead of
//! "whatever code follows the call". `join(a, b)` pushes `b` as the
//! stealable unit and dives into `a` inline — a work-first dive that never
//! needs a thief to resume a frame it didn't start. Grounded in
//! `rayon-core`'s `join()`
//! (`examples/other_examples/1b095b3f_antoinewdg-rayon__src-thread_pool.rs.rs`
//! and the wider rayon-core join/scope pattern); see `DESIGN.md` Open
//! Question 1.

use std::alloc::Layout;
use std::cell::Cell;
use std::panic::AssertUnwindSafe;
use std::ptr::NonNull;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use crate::context::{ForkFrame, TaskHandle, WorkerContext};
use crate::frame::{FrameHeader, FrameTag, ResultSlot};
use crate::latch::{Latch, LockLatch};
use crate::scheduler;
use crate::worker::WorkerThread;

/// Adjusts a frame's outstanding-children count by `delta` (`+1` when a
/// fork is pushed, `-1` when that child's body finishes). A no-op when
/// there is no current frame to charge (bare `join`/`fork` calls made
/// outside any `call`/root frame, as in some unit tests below). Never
/// touches the permanent "+1 for self" bit `FrameHeader::new` sets, since
/// a single frame may fork+join more than once across its lifetime —
/// only the last join's completion should ever bring the count to zero,
/// and this crate's completion signal is the accompanying `Latch`, not a
/// zero-crossing read of this counter.
fn bump_join_count(frame: Option<NonNull<FrameHeader>>, delta: isize) {
    if let Some(f) = frame {
        let prev = unsafe { f.as_ref() }.join_count.fetch_add(delta, Ordering::AcqRel);
        debug_assert!(prev + delta >= 1, "join_count underflowed below the self-reference");
    }
}

/// Runs `f` as an inline, non-stealable call. `call` frames live on the
/// cactus stack and are freed strictly LIFO on return — they never leave
/// the calling worker, so no atomics are needed on their join accounting
/// (see `DESIGN.md` Open Question 2).
///
/// `f` runs under `catch_unwind`, same as every other primitive in this
/// file: a panicking `f` must not skip the header drop / cactus
/// deallocation below, or the next `deallocate` on this worker sees a
/// stale top-of-stack pointer and reports a LIFO violation for a frame
/// that was never actually misused. The panic resumes only after cleanup.
pub fn call<F, R>(f: F) -> R
where
    F: FnOnce() -> R,
{
    let worker = WorkerThread::current();
    let parent = worker.current_frame();
    let layout = Layout::new::<FrameHeader>();
    let raw = worker.context().cactus.allocate(layout).cast::<FrameHeader>();
    let stacklet = worker.context().cactus.current_stacklet();
    unsafe {
        let mut header = FrameHeader::new(FrameTag::Call, parent);
        header.stacklet = stacklet;
        raw.as_ptr().write(header);
    }

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| worker.with_frame(raw, f)));

    unsafe {
        std::ptr::drop_in_place(raw.as_ptr());
        worker.context().cactus.deallocate(raw.cast(), layout);
    }

    match outcome {
        Ok(result) => result,
        Err(payload) => std::panic::resume_unwind(payload),
    }
}

/// Runs `a` and `b` to completion and returns both results. `b` is pushed
/// onto this worker's deque before `a` begins; if nobody
/// steals it, it is reclaimed and run directly once `a` returns (the fast
/// path, no synchronization beyond the deque itself). If a thief took it,
/// this worker instead helps the scheduler make progress (stealing other
/// work) until `b`'s completion latch fires.
pub fn join<A, B, RA, RB>(a: A, b: B) -> (RA, RB)
where
    A: FnOnce() -> RA,
    B: FnOnce() -> RB + Send,
    RA: Send,
    RB: Send,
{
    let worker = WorkerThread::current();
    let parent = worker.current_frame();
    bump_join_count(parent, 1);

    let slot: Arc<Mutex<ResultSlot<RB>>> = Arc::new(Mutex::new(ResultSlot::Empty));
    let latch = Arc::new(LockLatch::new());

    let header = FrameHeader::new(FrameTag::Fork, parent);
    let body_slot = Arc::clone(&slot);
    let body_latch = Arc::clone(&latch);
    let body = move || {
        let outcome = std::panic::catch_unwind(AssertUnwindSafe(b));
        *body_slot.lock().unwrap() = match outcome {
            Ok(value) => ResultSlot::Value(value),
            Err(payload) => ResultSlot::Failure(payload),
        };
        bump_join_count(parent, -1);
        body_latch.set();
    };

    let fork_frame = Box::new(ForkFrame::new(header, body));
    let task_handle = TaskHandle::new(NonNull::from(Box::leak(fork_frame)));
    worker.context().push(task_handle);

    // `a` keeps running under the caller's own current frame; the fork
    // frame just pushed belongs to `b`, which may finish on another
    // worker entirely.
    let result_a = std::panic::catch_unwind(AssertUnwindSafe(a));

    reclaim(worker, task_handle, &latch);
    unsafe {
        drop(Box::from_raw(task_handle.as_ptr()));
    }

    let value_b = {
        let mut guard = slot.lock().unwrap();
        std::mem::replace(&mut *guard, ResultSlot::Empty)
    }
    .unwrap_or_resume();
    let value_a = result_a.unwrap_or_else(|payload| std::panic::resume_unwind(payload));

    (value_a, value_b)
}

/// Pops `task_handle` back off the deque if nobody stole it and runs it
/// directly; otherwise blocks (while stealing other work) until its latch
/// fires.
fn reclaim(worker: &WorkerThread, task_handle: TaskHandle, latch: &LockLatch) {
    let ran_locally = worker
        .context()
        .pop()
        .map(|popped| {
            debug_assert_eq!(popped.as_ptr(), task_handle.as_ptr());
            true
        })
        .unwrap_or(false);

    if ran_locally {
        unsafe { task_handle.as_ref() }.run();
    } else {
        scheduler::help_until(latch);
    }
}

/// A forked child awaiting collection, returned by [`Scope::fork`].
/// Dropping without calling [`JoinHandle::join`] still waits for the
/// child and reclaims its frame, discarding the result — matching the
/// deque's invariant that every pushed frame is eventually popped or
/// stolen exactly once.
pub struct JoinHandle<R> {
    task_handle: TaskHandle,
    slot: Arc<Mutex<ResultSlot<R>>>,
    latch: Arc<LockLatch>,
    finished: Cell<bool>,
}

impl<R> JoinHandle<R> {
    fn reclaim_once(&self) {
        if self.finished.get() {
            return;
        }
        reclaim(WorkerThread::current(), self.task_handle, &self.latch);
        self.finished.set(true);
    }

    /// Waits for the child to finish and returns its result, resuming its
    /// panic if it failed.
    pub fn join(self) -> R {
        self.reclaim_once();
        let slot = {
            let mut guard = self.slot.lock().unwrap();
            std::mem::replace(&mut *guard, ResultSlot::Empty)
        };
        slot.unwrap_or_resume()
    }
}

impl<R> Drop for JoinHandle<R> {
    fn drop(&mut self) {
        self.reclaim_once();
        unsafe {
            drop(Box::from_raw(self.task_handle.as_ptr()));
        }
    }
}

/// A fork scope: lets a frame fork an arbitrary number of children instead
/// of exactly the two `join` takes.
pub struct Scope<'s> {
    _marker: std::marker::PhantomData<&'s ()>,
}

impl<'s> Scope<'s> {
    /// Pushes `f` as a stealable child and returns a handle to collect its
    /// result. Does not block — call [`JoinHandle::join`] on each handle
    /// to wait.
    ///
    /// Unlike `join`/`call`, `f` must be `'static`. `JoinHandle::drop` is
    /// what guarantees a forked child has finished before its captures
    /// could go out of scope, and safe code can skip a `Drop` impl outright
    /// with `std::mem::forget` — so, unlike `join` (which always runs both
    /// sides to completion before returning and can therefore safely erase
    /// a non-`'static` lifetime), a leaked `JoinHandle` here must not be
    /// able to outlive the data its frame closed over.
    pub fn fork<F, R>(&self, f: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        let worker = WorkerThread::current();
        let parent = worker.current_frame();
        bump_join_count(parent, 1);

        let slot: Arc<Mutex<ResultSlot<R>>> = Arc::new(Mutex::new(ResultSlot::Empty));
        let latch = Arc::new(LockLatch::new());
        let body_slot = Arc::clone(&slot);
        let body_latch = Arc::clone(&latch);
        let body = move || {
            let outcome = std::panic::catch_unwind(AssertUnwindSafe(f));
            *body_slot.lock().unwrap() = match outcome {
                Ok(value) => ResultSlot::Value(value),
                Err(payload) => ResultSlot::Failure(payload),
            };
            bump_join_count(parent, -1);
            body_latch.set();
        };

        let header = FrameHeader::new(FrameTag::Fork, parent);
        let fork_frame = Box::new(ForkFrame::new(header, body));
        let task_handle = TaskHandle::new(NonNull::from(Box::leak(fork_frame)));
        worker.context().push(task_handle);

        JoinHandle {
            task_handle,
            slot,
            latch,
            finished: Cell::new(false),
        }
    }
}

/// Opens a fork scope rooted at the calling frame.
pub fn scope<'s, F, R>(f: F) -> R
where
    F: FnOnce(&Scope<'s>) -> R,
{
    let s = Scope {
        _marker: std::marker::PhantomData,
    };
    f(&s)
}

/// Explicit context migration (spec.md §4.4): submits `f` to `target`'s
/// submission list as a fresh root-tagged frame, then yields to the
/// calling worker's own steal loop instead of blocking outright — the
/// calling worker keeps helping (popping its own deque, stealing from its
/// peers) until `f` completes on `target`. Used to route NUMA-affine or
/// I/O-bound work onto a specific worker context without giving up the
/// calling worker's ability to make progress elsewhere in the meantime.
///
/// `f` must be `'static`: unlike `join`/`fork`, which guarantee the
/// spawning frame is still on the stack to own any borrows by the time the
/// child runs, a migrated closure is queued and may run arbitrarily later,
/// after this call returns control to `help_until`'s loop on a completely
/// different worker than the one that enqueued it.
pub fn migrate<F, R>(target: &WorkerContext, f: F) -> R
where
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    let slot: Arc<Mutex<ResultSlot<R>>> = Arc::new(Mutex::new(ResultSlot::Empty));
    let latch = Arc::new(LockLatch::new());
    let body_slot = Arc::clone(&slot);
    let body_latch = Arc::clone(&latch);

    let run: Box<dyn FnOnce() + Send> = Box::new(move || {
        let worker = WorkerThread::current();
        let header = FrameHeader::new(FrameTag::Root, None);
        let header_ptr = NonNull::from(&header);
        let outcome =
            worker.with_frame(header_ptr, || std::panic::catch_unwind(AssertUnwindSafe(f)));
        *body_slot.lock().unwrap() = match outcome {
            Ok(value) => ResultSlot::Value(value),
            Err(payload) => ResultSlot::Failure(payload),
        };
        body_latch.set();
    });

    log::trace!("migrate: submitting to target context");
    let handle = crate::context::submission_handle(run);
    target.submit(handle);

    scheduler::help_until(&*latch);

    let result = {
        let mut guard = slot.lock().unwrap();
        std::mem::replace(&mut *guard, ResultSlot::Empty)
    };
    result.unwrap_or_resume()
}
