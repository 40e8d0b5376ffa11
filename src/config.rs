//! Tunable constants.
//!
//! The core takes no environment variables and persists no state (see the
//! crate's top-level docs). Everything here is a construction-time
//! parameter: callers either use the defaults or pass their own values when
//! building a [`crate::cactus::CactusStack`] or [`crate::deque`] pair.

/// Default size, in bytes, of a freshly allocated stacklet.
///
/// Chosen to comfortably hold a handful of small frames before the
/// allocator has to chain a new segment; tuned, not load-bearing for
/// correctness.
pub const DEFAULT_STACKLET_SIZE: usize = 64 * 1024;

/// Extra bytes reserved per stacklet for its header.
pub const STACKLET_HEADER_SIZE: usize = 64;

/// Initial capacity of a worker's deque array. Must be a power of two.
pub const DEFAULT_DEQUE_CAPACITY: usize = 1024;

/// Bounded number of spin iterations a thief performs before yielding the
/// OS thread while backing off from a failed steal.
pub const STEAL_SPIN_LIMIT: usize = 64;

/// Per-worker, per-call configuration for the cactus stack allocator.
///
/// Mirrors the shape of `rayon-core`'s `Configuration` builder: a small
/// `Copy` struct with a `Default` impl rather than a config file or
/// environment layer.
#[derive(Debug, Clone, Copy)]
pub struct CactusConfig {
    /// Size, in bytes, of a freshly allocated stacklet.
    pub stacklet_size: usize,
}

impl Default for CactusConfig {
    fn default() -> Self {
        CactusConfig {
            stacklet_size: DEFAULT_STACKLET_SIZE,
        }
    }
}

/// Per-worker configuration for the work-stealing deque.
#[derive(Debug, Clone, Copy)]
pub struct DequeConfig {
    /// Initial backing array capacity. Rounded up to a power of two.
    pub initial_capacity: usize,
}

impl Default for DequeConfig {
    fn default() -> Self {
        DequeConfig {
            initial_capacity: DEFAULT_DEQUE_CAPACITY,
        }
    }
}
