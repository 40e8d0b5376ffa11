//! Work-stealing deque.
//!
//! A Chase–Lev deque: the owner pushes/pops LIFO at `bottom`, thieves steal
//! FIFO from `top`. Shaped after `crossbeam-deque`'s public API
//! (`Worker`/`Stealer`/`Steal<T>`, `new_fifo`/`new_lifo` — see
//! `crossbeam-deque/src/std_deque.rs` kept alongside this crate) but scoped
//! to `T: Copy` since the only thing this runtime ever pushes is a raw task
//! pointer, which sidesteps move-semantics hazards in the racy steal path.
//! Retired (grown) buffers are reclaimed through `crossbeam-epoch` rather
//! than leaked until process exit.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;

use crossbeam_epoch::{self as epoch, Atomic, Owned};
use crossbeam_utils::CachePadded;

struct Buffer<T> {
    /// `capacity - 1`; capacity is always a power of two.
    mask: isize,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

unsafe impl<T: Send> Send for Buffer<T> {}
unsafe impl<T: Send> Sync for Buffer<T> {}

impl<T: Copy> Buffer<T> {
    fn alloc(capacity: usize) -> Buffer<T> {
        debug_assert!(capacity.is_power_of_two());
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Buffer {
            mask: capacity as isize - 1,
            slots,
        }
    }

    fn capacity(&self) -> isize {
        self.mask + 1
    }

    unsafe fn write(&self, index: isize, value: T) {
        let slot = &self.slots[(index & self.mask) as usize];
        slot.get().write(MaybeUninit::new(value));
    }

    unsafe fn read(&self, index: isize) -> T {
        let slot = &self.slots[(index & self.mask) as usize];
        slot.get().read().assume_init()
    }
}

/// Result of a steal attempt: distinguishes empty from lost-the-race so
/// callers can retry the latter.
pub enum Steal<T> {
    /// No task was available.
    Empty,
    /// A concurrent operation interfered; try again.
    Retry,
    /// A task was stolen.
    Success(T),
}

impl<T> Steal<T> {
    pub fn is_retry(&self) -> bool {
        matches!(self, Steal::Retry)
    }

    pub fn success(self) -> Option<T> {
        match self {
            Steal::Success(t) => Some(t),
            _ => None,
        }
    }
}

impl<T> fmt::Debug for Steal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Steal::Empty => f.write_str("Empty"),
            Steal::Retry => f.write_str("Retry"),
            Steal::Success(_) => f.write_str("Success(..)"),
        }
    }
}

struct Inner<T> {
    top: CachePadded<AtomicIsize>,
    bottom: CachePadded<AtomicIsize>,
    buffer: Atomic<Buffer<T>>,
}

/// The owning, single-producer end of a deque. Push and pop may only be
/// called by the thread that created the `Worker`.
pub struct Worker<T: Copy> {
    inner: Arc<Inner<T>>,
}

/// A cloneable, shareable handle that may steal from the owning `Worker`.
pub struct Stealer<T: Copy> {
    inner: Arc<Inner<T>>,
}

impl<T: Copy> Clone for Stealer<T> {
    fn clone(&self) -> Self {
        Stealer {
            inner: self.inner.clone(),
        }
    }
}

unsafe impl<T: Copy + Send> Send for Worker<T> {}
unsafe impl<T: Copy + Send> Send for Stealer<T> {}
unsafe impl<T: Copy + Send> Sync for Stealer<T> {}

/// Creates a new empty work-stealing deque with the given initial capacity
/// (rounded up to a power of two).
pub fn new<T: Copy>(initial_capacity: usize) -> Worker<T> {
    let capacity = initial_capacity.max(2).next_power_of_two();
    let buffer = Buffer::alloc(capacity);
    let inner = Arc::new(Inner {
        top: CachePadded::new(AtomicIsize::new(0)),
        bottom: CachePadded::new(AtomicIsize::new(0)),
        buffer: Atomic::new(buffer),
    });
    Worker { inner }
}

impl<T: Copy> Worker<T> {
    /// Creates a handle that other threads can use to steal from this
    /// deque.
    pub fn stealer(&self) -> Stealer<T> {
        Stealer {
            inner: self.inner.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        let b = self.inner.bottom.load(Ordering::Relaxed);
        let t = self.inner.top.load(Ordering::Relaxed);
        b.wrapping_sub(t) <= 0
    }

    pub fn len(&self) -> usize {
        let b = self.inner.bottom.load(Ordering::Relaxed);
        let t = self.inner.top.load(Ordering::Relaxed);
        b.wrapping_sub(t).max(0) as usize
    }

    /// Pushes a task onto the bottom of the deque (owner, LIFO). Grows the
    /// backing buffer if full; the retired buffer is reclaimed through
    /// epoch-based GC rather than freed immediately, since racing thieves
    /// may still be reading from it.
    pub fn push(&self, task: T) {
        let guard = &epoch::pin();
        let b = self.inner.bottom.load(Ordering::Relaxed);
        let t = self.inner.top.load(Ordering::Acquire);

        let mut buf_shared = self.inner.buffer.load(Ordering::Relaxed, guard);
        let buf = unsafe { buf_shared.deref() };

        if b.wrapping_sub(t) >= buf.capacity() - 1 {
            let new_buf = Owned::new(Buffer::alloc((buf.capacity() as usize) * 2));
            let new_buf = new_buf.into_shared(guard);
            let new_ref = unsafe { new_buf.deref() };
            for i in t..b {
                unsafe { new_ref.write(i, buf.read(i)) };
            }
            self.inner.buffer.store(new_buf, Ordering::Release);
            unsafe {
                guard.defer_destroy(buf_shared);
            }
            buf_shared = new_buf;
        }

        let buf = unsafe { buf_shared.deref() };
        unsafe { buf.write(b, task) };
        std::sync::atomic::fence(Ordering::Release);
        self.inner.bottom.store(b.wrapping_add(1), Ordering::Relaxed);
    }

    /// Pops from the bottom of the deque (owner, LIFO).
    pub fn pop(&self) -> Option<T> {
        let b = self.inner.bottom.load(Ordering::Relaxed);
        let b = b.wrapping_sub(1);
        self.inner.bottom.store(b, Ordering::Relaxed);
        std::sync::atomic::fence(Ordering::SeqCst);
        let t = self.inner.top.load(Ordering::Relaxed);

        if t > b {
            // Deque was empty; restore `bottom`.
            self.inner.bottom.store(b.wrapping_add(1), Ordering::Relaxed);
            return None;
        }

        let guard = &epoch::pin();
        let buf = unsafe { self.inner.buffer.load(Ordering::Relaxed, guard).deref() };
        let mut task = Some(unsafe { buf.read(b) });

        if t == b {
            // Last element: race with potential thieves via CAS on `top`.
            if self
                .inner
                .top
                .compare_exchange(t, t.wrapping_add(1), Ordering::SeqCst, Ordering::Relaxed)
                .is_err()
            {
                task = None;
            }
            self.inner.bottom.store(b.wrapping_add(1), Ordering::Relaxed);
        }

        task
    }
}

impl<T: Copy> Stealer<T> {
    pub fn is_empty(&self) -> bool {
        let t = self.inner.top.load(Ordering::Acquire);
        std::sync::atomic::fence(Ordering::SeqCst);
        let b = self.inner.bottom.load(Ordering::Acquire);
        b.wrapping_sub(t) <= 0
    }

    /// Attempts to steal one task from the top of the deque (thief, FIFO).
    pub fn steal(&self) -> Steal<T> {
        let t = self.inner.top.load(Ordering::Acquire);
        std::sync::atomic::fence(Ordering::SeqCst);
        let b = self.inner.bottom.load(Ordering::Acquire);

        if b.wrapping_sub(t) <= 0 {
            return Steal::Empty;
        }

        let guard = &epoch::pin();
        let buf = unsafe { self.inner.buffer.load(Ordering::Acquire, guard).deref() };
        let task = unsafe { buf.read(t) };

        match self.inner.top.compare_exchange(
            t,
            t.wrapping_add(1),
            Ordering::SeqCst,
            Ordering::Relaxed,
        ) {
            Ok(_) => Steal::Success(task),
            Err(_) => Steal::Retry,
        }
    }
}

impl<T: Copy> fmt::Debug for Worker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker").finish()
    }
}

impl<T: Copy> fmt::Debug for Stealer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stealer").finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn push_pop_lifo() {
        let w: Worker<i32> = new(8);
        w.push(1);
        w.push(2);
        w.push(3);
        assert_eq!(w.pop(), Some(3));
        assert_eq!(w.pop(), Some(2));
        assert_eq!(w.pop(), Some(1));
        assert_eq!(w.pop(), None);
    }

    #[test]
    fn steal_fifo() {
        let w: Worker<i32> = new(8);
        w.push(1);
        w.push(2);
        w.push(3);
        let s = w.stealer();
        assert!(matches!(s.steal(), Steal::Success(1)));
        assert!(matches!(s.steal(), Steal::Success(2)));
        assert_eq!(w.pop(), Some(3));
    }

    #[test]
    fn grows_under_many_pushes() {
        let w: Worker<i32> = new(2);
        for i in 0..100 {
            w.push(i);
        }
        let mut seen = Vec::new();
        while let Some(v) = w.pop() {
            seen.push(v);
        }
        assert_eq!(seen.len(), 100);
    }

    #[test]
    fn concurrent_steal_never_duplicates() {
        let w: Worker<i32> = new(8);
        for i in 0..10_000 {
            w.push(i);
        }
        let s1 = w.stealer();
        let s2 = w.stealer();

        let t1 = thread::spawn(move || {
            let mut got = Vec::new();
            loop {
                match s1.steal() {
                    Steal::Success(v) => got.push(v),
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
            got
        });
        let t2 = thread::spawn(move || {
            let mut got = Vec::new();
            loop {
                match s2.steal() {
                    Steal::Success(v) => got.push(v),
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
            got
        });

        let mut all = Vec::new();
        while let Some(v) = w.pop() {
            all.push(v);
        }
        all.extend(t1.join().unwrap());
        all.extend(t2.join().unwrap());

        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 10_000);
    }
}
