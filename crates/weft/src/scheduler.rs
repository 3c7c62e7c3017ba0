//! Scheduler kernel.
//!
//! Owns the worker pool, the single scheduler lock and its condition
//! variable, the strategy's runnable pool, and the reactor registration
//! state. Workers wait for runnable work, resume one context at a time
//! with the lock released, and route the context on return: discard when
//! finished, hand to the reactor when it parked on a descriptor, re-offer
//! to the strategy otherwise.
//!
//! Condition-variable discipline: one waiter is notified when a context
//! becomes runnable; everyone is notified when termination is set and, to
//! let `join_all` observe the drain, whenever a context is routed while
//! the join flag is up.

use crate::reactor::{self, reactor_loop, ReactorState};
use crate::strategy::{FifoStrategy, Strategy};
use crate::Error;
use parking_lot::{Condvar, Mutex};
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use weft_core::current::CurrentGuard;
use weft_core::{Context, DEFAULT_STACK_SIZE};

/// Everything guarded by the scheduler lock.
pub(crate) struct State<S: Strategy> {
    pub(crate) terminate: bool,
    pub(crate) join: bool,
    /// Live user threads: runnable, mid-resume on a worker, or parked in
    /// the reactor.
    pub(crate) users: usize,
    pub(crate) strategy: S,
    pub(crate) reactor: ReactorState,
}

/// Shared between the scheduler handle, the workers, and the reactor.
pub(crate) struct Inner<S: Strategy> {
    pub(crate) lock: Mutex<State<S>>,
    pub(crate) cond: Condvar,
}

/// M:N user-thread scheduler.
///
/// Many stackful user threads are multiplexed onto a fixed pool of kernel
/// workers. User threads yield cooperatively; a thread blocked on a file
/// descriptor is parked in the reactor and re-enqueued on readiness.
///
/// Dropping a scheduler that still owns user threads aborts the process,
/// mirroring the destruction of a joinable thread handle: call
/// [`join_all`](Scheduler::join_all) first.
pub struct Scheduler<S: Strategy = FifoStrategy> {
    inner: Arc<Inner<S>>,
    /// Worker table keyed by worker id; populated once at construction,
    /// drained at drop.
    workers: FxHashMap<usize, JoinHandle<()>>,
    reactor: Option<JoinHandle<()>>,
}

impl Scheduler<FifoStrategy> {
    /// Create a scheduler with `workers` kernel threads and the default
    /// FIFO strategy. `0` selects the number of CPU cores.
    pub fn new(workers: usize) -> Scheduler<FifoStrategy> {
        Scheduler::with_strategy(workers, FifoStrategy::new())
    }
}

impl<S: Strategy> Scheduler<S> {
    /// Create a scheduler with a custom scheduling policy.
    pub fn with_strategy(workers: usize, strategy: S) -> Scheduler<S> {
        let count = if workers == 0 { num_cpus::get() } else { workers };

        let reactor_state = ReactorState::new().expect("failed to create the reactor self-pipe");
        let inner = Arc::new(Inner {
            lock: Mutex::new(State {
                terminate: false,
                join: false,
                users: 0,
                strategy,
                reactor: reactor_state,
            }),
            cond: Condvar::new(),
        });

        let mut table = FxHashMap::default();
        for id in 0..count {
            let inner = Arc::clone(&inner);
            let handle = thread::Builder::new()
                .name(format!("weft-worker-{}", id))
                .spawn(move || worker_loop(inner))
                .expect("failed to spawn worker thread");
            table.insert(id, handle);
        }

        let reactor = {
            let inner = Arc::clone(&inner);
            thread::Builder::new()
                .name("weft-reactor".to_string())
                .spawn(move || reactor_loop(inner))
                .expect("failed to spawn reactor thread")
        };

        Scheduler {
            inner,
            workers: table,
            reactor: Some(reactor),
        }
    }

    /// Enqueue a new user thread with the default stack size.
    pub fn add_thread<F>(&self, f: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        self.add_thread_with_stack(DEFAULT_STACK_SIZE, f)
    }

    /// Enqueue a new user thread with an explicit stack size.
    ///
    /// The context is primed before it is published: its entry wrapper
    /// runs to the initial suspend here, so the first worker resume drops
    /// straight into the functor.
    pub fn add_thread_with_stack<F>(&self, stack_size: usize, f: F) -> Result<(), Error>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut ctx = Context::new(stack_size, f).map_err(Error::StackAllocation)?;
        ctx.start();

        let mut state = self.inner.lock.lock();
        state.users += 1;
        state.strategy.push_ctx(ctx);
        drop(state);
        self.inner.cond.notify_one();
        Ok(())
    }

    /// Block until every user thread has finished.
    ///
    /// Must be called from an embedder thread, never from inside a user
    /// thread: a user thread waiting for its own drain would deadlock.
    pub fn join_all(&self) {
        let mut state = self.inner.lock.lock();
        state.join = true;
        while state.users > 0 {
            self.inner.cond.wait(&mut state);
            // Hand the token on: a wake meant for a worker may have landed
            // here, so keep the drain chain moving.
            self.inner.cond.notify_one();
        }
        state.join = false;
    }

    /// True while at least one user thread exists, whether runnable,
    /// running, or parked on I/O.
    pub fn joinable(&self) -> bool {
        self.inner.lock.lock().users != 0
    }

    /// Number of kernel workers.
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Number of user threads currently parked in the reactor.
    pub fn parked_count(&self) -> usize {
        self.inner.lock.lock().reactor.parked_count()
    }
}

impl Default for Scheduler<FifoStrategy> {
    fn default() -> Scheduler<FifoStrategy> {
        Scheduler::new(num_cpus::get())
    }
}

impl<S: Strategy> Drop for Scheduler<S> {
    fn drop(&mut self) {
        // Destroying a scheduler that still owns user threads mirrors
        // dropping a joinable std::thread handle: there is no way to
        // continue safely.
        if self.joinable() {
            std::process::abort();
        }

        {
            let mut state = self.inner.lock.lock();
            state.terminate = true;
            state.reactor.wake();
        }
        self.inner.cond.notify_all();

        for (_, handle) in self.workers.drain() {
            let _ = handle.join();
        }
        if let Some(handle) = self.reactor.take() {
            let _ = handle.join();
        }
    }
}

/// Scoped ownership of a context taken out of the pool for execution.
///
/// On drop the context is routed exactly once, whatever path control takes
/// out of the resume: discarded when finished, handed to the reactor when
/// it requested a descriptor park, re-offered to the strategy otherwise.
struct ContextGuard<'a, S: Strategy> {
    inner: &'a Inner<S>,
    ctx: Option<Context>,
}

impl<'a, S: Strategy> ContextGuard<'a, S> {
    fn new(inner: &'a Inner<S>, ctx: Context) -> ContextGuard<'a, S> {
        ContextGuard {
            inner,
            ctx: Some(ctx),
        }
    }

    /// Resume the context with the current-context slot installed. The
    /// slot is cleared on every exit path out of the resume.
    fn resume(&mut self) {
        let ctx = self.ctx.as_mut().expect("guard already drained");
        let _current = CurrentGuard::new(ctx.handle());
        ctx.resume();
    }
}

impl<S: Strategy> Drop for ContextGuard<'_, S> {
    fn drop(&mut self) {
        let ctx = match self.ctx.take() {
            Some(ctx) => ctx,
            None => return,
        };
        let finished = ctx.is_finished();
        let park = reactor::take_park_request();

        let mut state = self.inner.lock.lock();
        if finished {
            state.users -= 1;
            let join = state.join;
            drop(state);
            drop(ctx);
            if join {
                // join_all must wake to observe the drained count.
                self.inner.cond.notify_all();
            }
        } else if let Some(req) = park {
            state.reactor.park(ctx, req);
        } else {
            state.strategy.push_ctx(ctx);
            let join = state.join;
            drop(state);
            if join {
                self.inner.cond.notify_all();
            } else {
                self.inner.cond.notify_one();
            }
        }
    }
}

/// Worker thread body: wait for runnable work or termination, resume one
/// context with the lock released, let the guard route it.
fn worker_loop<S: Strategy>(inner: Arc<Inner<S>>) {
    'run: loop {
        let ctx = {
            let mut state = inner.lock.lock();
            loop {
                if state.terminate {
                    break 'run;
                }
                if state.strategy.pool_size() > 0 {
                    break;
                }
                inner.cond.wait(&mut state);
            }
            state.strategy.pop_ctx()
        };

        let mut guard = ContextGuard::new(&inner, ctx);
        guard.resume();
    }

    #[cfg(debug_assertions)]
    eprintln!(
        "weft: {} shutting down",
        thread::current().name().unwrap_or("weft-worker")
    );
}
