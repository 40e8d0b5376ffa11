//! Reference schedulers shared by the integration tests.
//!
//! `InlinePool` mirrors `libfork`'s `unit_pool`: exactly one worker,
//! running every submission inline on the calling thread. `StaticPool` is
//! a minimal multi-threaded scheduler grounded on `rayon-core`'s
//! `Registry` worker-loop pattern, used to check that the scenarios in
//! this suite hold independent of worker count.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use forkjoin_core::context::{NotifyFn, SubmitHandle, WorkerContext};
use forkjoin_core::{scheduler, worker, Scheduler};

fn no_op_notify() -> NotifyFn {
    Box::new(|| {})
}

/// One worker, no background thread: `schedule` runs the job to
/// completion before returning.
///
/// `ctx` is `Option`-wrapped purely so `Drop` can `take()` it and hand an
/// owned `WorkerContext` to `scheduler::finalize`, matching `unit_pool`'s
/// own destructor (`examples/original_source/include/libfork/schedule/unit_pool.hpp`
/// — `~unit_pool() noexcept { lf::finalize(m_context); }`).
pub struct InlinePool {
    ctx: Option<WorkerContext>,
}

impl InlinePool {
    pub fn new() -> Self {
        InlinePool {
            ctx: Some(scheduler::worker_init(no_op_notify())),
        }
    }
}

impl Scheduler for InlinePool {
    fn schedule(&self, handle: SubmitHandle) {
        let ctx = self.ctx.as_ref().expect("InlinePool used after drop");
        worker::install(ctx, || scheduler::resume(handle));
    }
}

impl Drop for InlinePool {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            scheduler::finalize(ctx);
        }
    }
}

/// `n` OS threads, each running the work-first steal loop. Deliberately a
/// busy-poll loop rather than a park/notify loop: this is test scaffolding
/// for exercising worker-count independence, not a production scheduler.
pub struct StaticPool {
    contexts: Vec<Arc<WorkerContext>>,
    threads: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    next: AtomicUsize,
}

impl StaticPool {
    pub fn new(workers: usize) -> Self {
        assert!(workers >= 1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let contexts: Vec<Arc<WorkerContext>> = (0..workers)
            .map(|_| Arc::new(scheduler::worker_init(no_op_notify())))
            .collect();
        let stealers: Vec<_> = contexts.iter().map(|c| c.stealer()).collect();

        let threads = contexts
            .iter()
            .enumerate()
            .map(|(i, ctx)| {
                let ctx = Arc::clone(ctx);
                let peers: Vec<_> = stealers
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, s)| s.clone())
                    .collect();
                let shutdown = Arc::clone(&shutdown);
                thread::spawn(move || {
                    worker::install_with_peers(&ctx, peers, || loop {
                        let did_work = scheduler::run_one_pass(worker::WorkerThread::current());
                        if !did_work {
                            if shutdown.load(Ordering::Acquire) {
                                break;
                            }
                            thread::yield_now();
                        }
                    });
                })
            })
            .collect();

        StaticPool {
            contexts,
            threads,
            shutdown,
            next: AtomicUsize::new(0),
        }
    }
}

impl Scheduler for StaticPool {
    fn schedule(&self, handle: SubmitHandle) {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.contexts.len();
        self.contexts[i].submit(handle);
    }
}

impl Drop for StaticPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        for t in self.threads.drain(..) {
            let _ = t.join();
        }
        // Every worker thread has exited and dropped its own `Arc` clone by
        // now, so each context's only remaining strong reference is the one
        // in `self.contexts` — `try_unwrap` hands back the owned
        // `WorkerContext` `finalize` needs to assert quiescence on.
        for ctx in self.contexts.drain(..) {
            match Arc::try_unwrap(ctx) {
                Ok(ctx) => scheduler::finalize(ctx),
                Err(_) => panic!("worker context still shared after its thread joined"),
            }
        }
    }
}
