//! Synchronous entry point, grounded in `libfork`'s `sync_wait.hpp`: a root
//! block pairs a frame with a semaphore and a result cell so a plain
//! synchronous caller can submit a root job to a scheduler and block until
//! it completes. The "semaphore" here is a `crossbeam-channel` `bounded(1)`
//! rendezvous channel rather than an OS primitive (`DESIGN.md` Open
//! Question 3) — this workspace already depends on `crossbeam-channel`,
//! and a channel gives the same "release once, wait once" shape without
//! `libc` bindings.

use std::panic::AssertUnwindSafe;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex};

use crate::context;
use crate::error;
use crate::frame::{FrameHeader, FrameTag, ResultSlot};
use crate::scheduler::Scheduler;
use crate::worker::WorkerThread;

/// Submits `f` as a root job to `scheduler` and blocks the calling thread
/// until it completes, returning its result (or resuming its panic).
///
/// Panics if called from inside a frame that is already running on a
/// worker — that would mean a worker blocking on itself, which never
/// completes.
pub fn sync_wait<S, F, R>(scheduler: &S, f: F) -> R
where
    S: Scheduler,
    F: FnOnce() -> R + Send + 'static,
    R: Send + 'static,
{
    if WorkerThread::try_current().is_some() {
        error::sync_wait_reentrant();
    }

    let (release, acquire) = crossbeam_channel::bounded::<()>(1);
    let slot: Arc<Mutex<ResultSlot<R>>> = Arc::new(Mutex::new(ResultSlot::Empty));
    let slot_for_run = Arc::clone(&slot);

    let run: Box<dyn FnOnce() + Send> = Box::new(move || {
        let worker = WorkerThread::current();
        let header = FrameHeader::new(FrameTag::Root, None);
        let header_ptr = NonNull::from(&header);
        let outcome =
            worker.with_frame(header_ptr, || std::panic::catch_unwind(AssertUnwindSafe(f)));
        *slot_for_run.lock().unwrap() = match outcome {
            Ok(value) => ResultSlot::Value(value),
            Err(payload) => ResultSlot::Failure(payload),
        };
        // Best-effort: the channel is rendezvous-sized, so a failed send
        // here only happens if the receiver already gave up, which never
        // happens on this path.
        let _ = release.try_send(());
    });

    log::trace!("sync_wait: submitting root job");
    let handle = context::submission_handle(run);
    scheduler.schedule(handle);

    acquire
        .recv()
        .expect("scheduler dropped the root job without running it");

    let result = {
        let mut guard = slot.lock().unwrap();
        std::mem::replace(&mut *guard, ResultSlot::Empty)
    };
    result.unwrap_or_resume()
}
