//! Worker context.
//!
//! Three visibility tiers over one struct, mirroring `libfork`'s
//! `context`/`worker_context`/`full_context` split
//! (`examples/original_source/include/libfork/core/ext/context.hpp`) via
//! plain Rust visibility instead of C++ friend classes:
//!
//! - user/submitter-facing: [`WorkerContext::submit`]
//! - scheduler-implementer-facing: [`WorkerContext::try_pop_all`],
//!   [`WorkerContext::try_steal`], [`WorkerContext::stealer`]
//! - runtime-internal (`pub(crate)`): [`WorkerContext::push`],
//!   [`WorkerContext::pop`], [`WorkerContext::is_empty`]

use std::cell::UnsafeCell;
use std::fmt;
use std::ptr::NonNull;
use std::sync::atomic::AtomicPtr;
use std::thread::ThreadId;

use crate::cactus::CactusStack;
use crate::config::{CactusConfig, DequeConfig};
use crate::deque::{self, Steal};
use crate::error;
use crate::frame::FrameHeader;
use crate::submission::{SubmissionList, SubmitNode};

/// A type-erased function object taking no arguments, called (possibly
/// concurrently, by other workers) to wake a parked worker up.
pub type NotifyFn = Box<dyn Fn() + Send + Sync>;

/// One forked, potentially-stealable unit of work living in a worker's
/// deque.
///
/// Type-erased via a monomorphized function pointer plus an opaque data
/// pointer (the `JobRef` pattern from `rayon-core`'s `job.rs`) rather than
/// `Box<dyn FnOnce() + Send>`: a trait object would force the closure to
/// be `'static`, which rules out forking over borrowed data such as a
/// slice being reduced in place. `join`/`JoinHandle::join` guarantee the
/// frame has finished running before they return the borrows to their
/// caller, so the erased lifetime never escapes past where it's valid.
pub struct ForkFrame {
    pub header: FrameHeader,
    execute: UnsafeCell<Option<unsafe fn(*mut ())>>,
    drop_unrun: unsafe fn(*mut ()),
    data: *mut (),
}

unsafe impl Send for ForkFrame {}

unsafe fn call_and_drop<F: FnOnce()>(data: *mut ()) {
    let boxed = Box::from_raw(data as *mut F);
    boxed();
}

unsafe fn drop_without_running<F>(data: *mut ()) {
    drop(Box::from_raw(data as *mut F));
}

impl ForkFrame {
    /// Crate-private: the only safe callers are `join`/`Scope::fork`, which
    /// guarantee the frame runs to completion before the borrows `body`
    /// captured could go out of scope. A `pub` constructor here would let
    /// external code build a frame it could leak without ever running it.
    pub(crate) fn new<F>(header: FrameHeader, body: F) -> ForkFrame
    where
        F: FnOnce() + Send,
    {
        let data = Box::into_raw(Box::new(body)) as *mut ();
        ForkFrame {
            header,
            execute: UnsafeCell::new(Some(call_and_drop::<F>)),
            drop_unrun: drop_without_running::<F>,
            data,
        }
    }

    /// Runs the body exactly once. Safe to call from whichever worker ends
    /// up owning this frame (original owner on the fast path, or a thief).
    pub fn run(&self) {
        let execute = unsafe { &mut *self.execute.get() }
            .take()
            .expect("ForkFrame::run called more than once");
        unsafe { execute(self.data) }
    }
}

impl Drop for ForkFrame {
    fn drop(&mut self) {
        // Normal operation always runs a pushed frame before dropping it;
        // this only fires if a frame is discarded unused (e.g. in a test).
        if unsafe { &*self.execute.get() }.is_some() {
            unsafe { (self.drop_unrun)(self.data) }
        }
    }
}

/// Handle to a `fork`-tagged frame sitting in a deque. Raw, non-owning,
/// `Copy` so it can live in the deque's slot array directly.
///
/// Wraps `NonNull` rather than aliasing it bare: `NonNull<T>` opts out of
/// `Send`/`Sync` unconditionally, regardless of `T`, which is exactly
/// wrong here — a stolen frame's ownership is meant to transfer to the
/// thief's thread, and `deque::Worker`/`Stealer` need `TaskHandle: Send`
/// to themselves be `Send`/`Sync` and cross into other worker threads.
/// Soundness: the frame's memory is published via the deque push's
/// release fence before a matching steal's acquire load can observe this
/// handle, so hand-off between threads is race-free.
#[derive(Clone, Copy)]
pub struct TaskHandle(NonNull<ForkFrame>);

unsafe impl Send for TaskHandle {}

impl TaskHandle {
    pub(crate) fn new(ptr: NonNull<ForkFrame>) -> TaskHandle {
        TaskHandle(ptr)
    }

    pub fn as_ptr(self) -> *mut ForkFrame {
        self.0.as_ptr()
    }

    /// # Safety
    /// The pointee must still be alive: the caller must not have already
    /// reclaimed (dropped) the frame this handle refers to.
    pub unsafe fn as_ref(&self) -> &ForkFrame {
        self.0.as_ref()
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaskHandle({:p})", self.0.as_ptr())
    }
}

/// A type-erased root submission: a boxed closure plus the intrusive link
/// the submission list threads through. Heap-allocated and leaked as a raw
/// pointer by `sync_wait`/external submitters, reclaimed by whichever
/// worker calls [`crate::scheduler::resume`] on it.
pub struct SubmitNodeImpl {
    next: AtomicPtr<()>,
    run: UnsafeCell<Option<Box<dyn FnOnce() + Send>>>,
}

unsafe impl Send for SubmitNodeImpl {}
unsafe impl Sync for SubmitNodeImpl {}

impl SubmitNodeImpl {
    pub fn new(run: Box<dyn FnOnce() + Send>) -> SubmitNodeImpl {
        SubmitNodeImpl {
            next: AtomicPtr::new(std::ptr::null_mut()),
            run: UnsafeCell::new(Some(run)),
        }
    }

    pub(crate) fn take_run(&self) -> Box<dyn FnOnce() + Send> {
        unsafe { &mut *self.run.get() }
            .take()
            .expect("submit handle run more than once")
    }
}

impl SubmitNode for SubmitNodeImpl {
    fn next_ptr(&self) -> &AtomicPtr<()> {
        &self.next
    }
}

/// A handle to a queued root job, as passed to `Scheduler::schedule` and
/// `resume`.
pub type SubmitHandle = NonNull<SubmitNodeImpl>;

/// Per-worker state: its deque, its submission list, its notify callback,
/// its cactus stack, and the id of the thread that owns it.
pub struct WorkerContext {
    tasks: deque::Worker<TaskHandle>,
    submit: SubmissionList<SubmitNodeImpl>,
    notify: NotifyFn,
    owner: ThreadId,
    pub(crate) cactus: CactusStack,
}

impl WorkerContext {
    pub fn new(notify: NotifyFn) -> WorkerContext {
        Self::with_config(notify, DequeConfig::default(), CactusConfig::default())
    }

    pub fn with_config(
        notify: NotifyFn,
        deque_cfg: DequeConfig,
        cactus_cfg: CactusConfig,
    ) -> WorkerContext {
        WorkerContext {
            tasks: deque::new(deque_cfg.initial_capacity),
            submit: SubmissionList::new(),
            notify,
            owner: std::thread::current().id(),
            cactus: CactusStack::new(cactus_cfg),
        }
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    // ---- user/submitter-facing ----

    /// Appends a submission and wakes this worker if it is parked.
    pub fn submit(&self, handle: SubmitHandle) {
        self.submit.push(handle.as_ptr());
        (self.notify)();
    }

    // ---- scheduler-implementer-facing ----

    /// A stealer other workers use to steal in-flight fork frames from
    /// this context.
    pub fn stealer(&self) -> deque::Stealer<TaskHandle> {
        self.tasks.stealer()
    }

    /// Detaches the accumulated submission chain, in push order.
    pub fn try_pop_all(&self) -> Option<SubmitHandle> {
        self.submit
            .try_pop_all()
            .map(|p| NonNull::new(p).expect("submission list yielded a null handle"))
    }

    /// Attempts one FIFO steal from this context's deque.
    pub fn try_steal(&self) -> Steal<TaskHandle> {
        self.tasks.stealer().steal()
    }

    // ---- runtime-internal ----

    pub(crate) fn push(&self, task: TaskHandle) {
        self.tasks.push(task);
    }

    pub(crate) fn pop(&self) -> Option<TaskHandle> {
        self.tasks.pop()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Asserts quiescence: used by `finalize`, since calling it with work
    /// outstanding is a contract violation.
    pub(crate) fn assert_quiescent(&self) {
        if !self.is_empty() || !self.submit.is_empty() {
            error::finalize_not_quiescent(self.tasks.len(), !self.submit.is_empty());
        }
    }
}

/// Appends a non-null submission handle built from an arbitrary closure.
/// Convenience used by `sync_wait` and tests; leaks the node until whoever
/// calls [`crate::scheduler::resume`] reclaims it.
pub fn submission_handle(run: Box<dyn FnOnce() + Send>) -> SubmitHandle {
    let boxed = Box::new(SubmitNodeImpl::new(run));
    NonNull::new(Box::into_raw(boxed)).expect("Box::into_raw never null")
}
