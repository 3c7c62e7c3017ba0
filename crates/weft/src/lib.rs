//! M:N user-thread scheduler.
//!
//! Many lightweight, stackful user threads are multiplexed onto a small
//! fixed pool of kernel workers. A [`Strategy`] owns the runnable pool and
//! decides which user thread runs next; a dedicated reactor thread parks
//! user threads blocked on file descriptors and hands them back on
//! readiness. Scheduling is cooperative: a user thread runs until it
//! yields, waits on a descriptor, or returns.
//!
//! ```no_run
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! let scheduler = weft::Scheduler::new(4);
//! let counter = Arc::new(AtomicUsize::new(0));
//!
//! for _ in 0..100 {
//!     let counter = Arc::clone(&counter);
//!     scheduler
//!         .add_thread(move || {
//!             weft::yield_now();
//!             counter.fetch_add(1, Ordering::SeqCst);
//!         })
//!         .unwrap();
//! }
//!
//! scheduler.join_all();
//! assert_eq!(counter.load(Ordering::SeqCst), 100);
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod io;
mod reactor;
mod scheduler;
mod strategy;

pub use scheduler::Scheduler;
pub use strategy::{FifoStrategy, Strategy};
pub use weft_core::{Context, Events, DEFAULT_STACK_SIZE};

/// Errors surfaced to embedders.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Allocating the stack for a new user-thread context failed.
    #[error("failed to allocate a context stack")]
    StackAllocation(#[source] std::io::Error),
}

/// Cooperatively yield the calling user thread back to its worker.
///
/// The thread is re-offered to the strategy, so it runs again after
/// anything already runnable. No-op outside a user thread.
pub fn yield_now() {
    if let Some(cur) = weft_core::current::current() {
        cur.suspend();
    }
}
