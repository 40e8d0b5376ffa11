//! Frame/task record.
//!
//! A `Frame` is the per-suspendable-call record the rest of the runtime
//! passes around by pointer: a parent back-reference, a join counter, the
//! cactus segment its locals live on, and (via [`ResultSlot`]) wherever its
//! eventual value or failure lands. `fork`-tagged frames are the unit the
//! deque and steal protocol operate on (see `ops.rs`); `call`-tagged frames
//! never leave the spawning worker and use plain stores on `join_count`
//! rather than atomics (see `DESIGN.md` Open Question 2).

use std::any::Any;
use std::ptr::NonNull;
use std::sync::atomic::AtomicIsize;

use crate::cactus::StackletId;

/// Which of the three call shapes a frame represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameTag {
    /// The frame backing a `sync_wait` entry point.
    Root,
    /// A spawn whose continuation may be stolen.
    Fork,
    /// An inline spawn that never leaves the spawning worker.
    Call,
}

/// The outcome of a frame's body: not yet finished, a value, or a
/// propagated user failure: failures travel exactly along the data path
/// of the missing return value.
pub enum ResultSlot<T> {
    Empty,
    Value(T),
    /// A panic payload caught with `catch_unwind`, this runtime's
    /// realization of "a failure signalled inside an async function".
    Failure(Box<dyn Any + Send>),
}

impl<T> ResultSlot<T> {
    pub fn is_empty(&self) -> bool {
        matches!(self, ResultSlot::Empty)
    }

    /// Consumes the slot, resuming the original panic if it held a
    /// failure. Callers that want to inspect failures instead of
    /// propagating them should match on the slot directly.
    pub fn unwrap_or_resume(self) -> T {
        match self {
            ResultSlot::Value(t) => t,
            ResultSlot::Failure(payload) => std::panic::resume_unwind(payload),
            ResultSlot::Empty => unreachable!("result observed before join_count reached zero"),
        }
    }
}

/// Metadata shared by every frame shape. `parent` is a non-owning
/// back-reference — a lookup/relation, not an ownership edge; the child
/// does not extend the parent's lifetime past the join point, it only
/// reads it to find out which join counter to decrement.
pub struct FrameHeader {
    pub parent: Option<NonNull<FrameHeader>>,
    pub join_count: AtomicIsize,
    pub tag: FrameTag,
    pub stacklet: Option<StackletId>,
}

impl FrameHeader {
    pub fn new(tag: FrameTag, parent: Option<NonNull<FrameHeader>>) -> FrameHeader {
        FrameHeader {
            parent,
            // +1 for "self still running its own body".
            join_count: AtomicIsize::new(1),
            tag,
            stacklet: None,
        }
    }
}
