//! Core of a fork/join task-parallelism runtime.
//!
//! This crate provides the pieces a work-stealing scheduler is built out
//! of — the frame/task model, the cactus stack, the work-stealing deque,
//! the worker context and its submission protocol, and the `call`/`join`/
//! `scope` primitives a user's recursive, structured-parallel code is
//! written against. It does not provide a scheduler: launching OS threads,
//! pinning them, and deciding how many workers to run is the concern of
//! whatever binds this crate together, the same division `libfork` draws
//! between its `core` headers and a concrete pool such as `unit_pool`.
//!
//! Persists no state and reads no environment variables; every tunable is
//! a construction-time parameter (see [`config`]). Diagnostics go through
//! the `log` facade — bring your own subscriber.
//!
//! ```no_run
//! use forkjoin_core::ops::{call, join};
//!
//! fn fib(n: u64) -> u64 {
//!     if n < 2 {
//!         return n;
//!     }
//!     if n < 16 {
//!         // Below a grain-size threshold, recurse inline rather than
//!         // paying for a fork frame.
//!         return call(|| fib(n - 1)) + call(|| fib(n - 2));
//!     }
//!     let (a, b) = join(move || fib(n - 1), move || fib(n - 2));
//!     a + b
//! }
//! ```

pub mod cactus;
pub mod config;
pub mod context;
pub mod deque;
pub mod error;
pub mod frame;
pub mod latch;
pub mod ops;
pub mod scheduler;
pub mod submission;
pub mod sync_wait;
pub mod worker;

pub use context::{NotifyFn, SubmitHandle, WorkerContext};
pub use ops::{call, join, migrate, scope, JoinHandle, Scope};
pub use scheduler::Scheduler;
pub use sync_wait::sync_wait;
