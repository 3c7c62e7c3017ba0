//! Stackful user-thread contexts.
//!
//! A [`Context`] owns a dedicated stack and the saved execution state of
//! one user thread, backed by a `corosensei` coroutine. Its entry wrapper
//! suspends immediately, before any user code runs; [`Context::start`]
//! drives it to that first suspend. This primes the context: construction
//! and first scheduling are separated, and the first worker resume drops
//! straight into the functor's frame.
//!
//! Code running inside a user thread suspends itself through a
//! [`CurrentContext`] handle, published in the [`current`](crate::current)
//! thread-local slot for the duration of every resume.

use corosensei::stack::DefaultStack;
use corosensei::{Coroutine, CoroutineResult, Yielder};
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;

/// Default stack size for a user-thread context.
pub const DEFAULT_STACK_SIZE: usize = 128 * 1024;

type Coro = Coroutine<(), (), ()>;

/// A stackful user-thread execution context.
pub struct Context {
    coro: Coro,
    /// Published by the entry wrapper on first entry, before the priming
    /// suspend; valid for as long as the coroutine is alive.
    yielder: Arc<AtomicPtr<Yielder<(), ()>>>,
}

// The yielder pointer is only dereferenced through a CurrentContext handle,
// on the OS thread that is currently resuming this context.
unsafe impl Send for Context {}

impl Context {
    /// Create a context for `f` with a dedicated stack of `stack_size`
    /// bytes. No user code runs here; call [`start`](Context::start) to
    /// prime the context.
    pub fn new<F>(stack_size: usize, f: F) -> io::Result<Context>
    where
        F: FnOnce() + Send + 'static,
    {
        let stack = DefaultStack::new(stack_size)?;
        let yielder = Arc::new(AtomicPtr::new(std::ptr::null_mut()));
        let slot = Arc::clone(&yielder);

        let coro = Coroutine::with_stack(stack, move |y: &Yielder<(), ()>, ()| {
            slot.store(y as *const Yielder<(), ()> as *mut _, Ordering::Release);
            y.suspend(());

            // A functor that exits abnormally is treated as finished;
            // nothing propagates across user threads.
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
                let msg = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned());
                eprintln!(
                    "weft: user thread panicked: {}",
                    msg.as_deref().unwrap_or("<non-string payload>")
                );
            }
        });

        Ok(Context { coro, yielder })
    }

    /// Run the entry wrapper up to its priming suspend. Must be called
    /// exactly once, before the first [`resume`](Context::resume).
    pub fn start(&mut self) {
        debug_assert!(!self.coro.started(), "context already started");
        match self.coro.resume(()) {
            CoroutineResult::Yield(()) => {}
            CoroutineResult::Return(()) => unreachable!("context finished during priming"),
        }
    }

    /// Transfer control into the context. Returns when the user thread
    /// suspends or when its functor returns.
    ///
    /// Precondition: the context is started and not finished.
    pub fn resume(&mut self) {
        debug_assert!(self.coro.started(), "context not started");
        debug_assert!(!self.coro.done(), "context already finished");
        let _ = self.coro.resume(());
    }

    /// Terminal state test: true once the functor has returned (or exited
    /// abnormally).
    pub fn is_finished(&self) -> bool {
        self.coro.done()
    }

    /// Handle through which code running inside this context suspends
    /// itself. Valid only after [`start`](Context::start).
    pub fn handle(&self) -> CurrentContext {
        let ptr = self.yielder.load(Ordering::Acquire);
        CurrentContext {
            yielder: NonNull::new(ptr).expect("context not started"),
        }
    }
}

/// Copyable handle to a live context, used from inside the user thread to
/// suspend it.
///
/// Handles are published through the current-context thread-local slot
/// while the owning context is being resumed, and must only be used from
/// there: the slot is the guarantee that the context is live and running
/// on this thread.
#[derive(Clone, Copy)]
pub struct CurrentContext {
    yielder: NonNull<Yielder<(), ()>>,
}

impl CurrentContext {
    /// Suspend the running user thread, returning control to the worker
    /// that resumed it.
    pub fn suspend(self) {
        // The slot discipline above makes the pointer valid here: the
        // coroutine this yielder belongs to is currently executing on
        // this thread.
        unsafe { self.yielder.as_ref() }.suspend(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::current::{self, CurrentGuard};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_priming_runs_no_user_code() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let mut ctx = Context::new(DEFAULT_STACK_SIZE, move || {
            h.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        ctx.start();
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert!(!ctx.is_finished());

        ctx.resume();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(ctx.is_finished());
    }

    #[test]
    fn test_suspend_splits_execution() {
        let steps = Arc::new(AtomicUsize::new(0));
        let s = Arc::clone(&steps);
        let mut ctx = Context::new(DEFAULT_STACK_SIZE, move || {
            s.fetch_add(1, Ordering::SeqCst);
            current::current().unwrap().suspend();
            s.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        ctx.start();
        {
            let _cur = CurrentGuard::new(ctx.handle());
            ctx.resume();
        }
        assert_eq!(steps.load(Ordering::SeqCst), 1);
        assert!(!ctx.is_finished());

        {
            let _cur = CurrentGuard::new(ctx.handle());
            ctx.resume();
        }
        assert_eq!(steps.load(Ordering::SeqCst), 2);
        assert!(ctx.is_finished());
    }

    #[test]
    fn test_panicking_functor_is_finished() {
        let mut ctx = Context::new(DEFAULT_STACK_SIZE, || panic!("boom")).unwrap();
        ctx.start();
        ctx.resume();
        assert!(ctx.is_finished());
    }

    #[test]
    fn test_dropping_primed_context_unwinds_cleanly() {
        let mut ctx = Context::new(DEFAULT_STACK_SIZE, || {}).unwrap();
        ctx.start();
        drop(ctx);
    }
}
