//! Scheduling policy.
//!
//! The strategy owns the runnable pool; the kernel treats it as an opaque
//! policy object and only talks to it through this trait.

use std::collections::VecDeque;
use weft_core::Context;

/// Policy object owning the runnable pool.
///
/// Every method is called with the scheduler lock held. Implementations
/// must not block and must not take the scheduler lock themselves.
pub trait Strategy: Send + 'static {
    /// Insert a runnable context into the pool.
    fn push_ctx(&mut self, ctx: Context);

    /// Remove and return the next context to run.
    ///
    /// Precondition: `pool_size() > 0`. Popping an empty pool is a
    /// precondition violation and panics.
    fn pop_ctx(&mut self) -> Context;

    /// Number of contexts currently in the pool.
    fn pool_size(&self) -> usize;
}

/// The default strategy: strict FIFO.
///
/// Contexts run in the order they became runnable; a re-offered context
/// goes to the back of the queue. The order is stable: nothing reorders
/// entries between push and pop.
#[derive(Default)]
pub struct FifoStrategy {
    pool: VecDeque<Context>,
}

impl FifoStrategy {
    /// Create an empty pool.
    pub fn new() -> FifoStrategy {
        FifoStrategy {
            pool: VecDeque::new(),
        }
    }
}

impl Strategy for FifoStrategy {
    fn push_ctx(&mut self, ctx: Context) {
        self.pool.push_back(ctx);
    }

    fn pop_ctx(&mut self) -> Context {
        self.pool.pop_front().expect("pop_ctx called on an empty pool")
    }

    fn pool_size(&self) -> usize {
        self.pool.len()
    }
}
