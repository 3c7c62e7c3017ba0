//! Current-context thread-local slot.
//!
//! Each worker installs a handle to the context it is about to resume and
//! clears it when the resume returns, so code running inside a user thread
//! can discover its own context to suspend itself.

use crate::context::CurrentContext;
use std::cell::Cell;

thread_local! {
    static CURRENT_CONTEXT: Cell<Option<CurrentContext>> = const { Cell::new(None) };
}

/// Handle to the user-thread context currently executing on this OS
/// thread, or `None` outside a resume.
pub fn current() -> Option<CurrentContext> {
    CURRENT_CONTEXT.with(|slot| slot.get())
}

/// Scoped installation of the current-context handle.
///
/// The slot is cleared on drop, so every exit path out of a resume leaves
/// it empty.
pub struct CurrentGuard {
    _priv: (),
}

impl CurrentGuard {
    /// Install `handle` as the current context of this thread.
    pub fn new(handle: CurrentContext) -> CurrentGuard {
        CURRENT_CONTEXT.with(|slot| slot.set(Some(handle)));
        CurrentGuard { _priv: () }
    }
}

impl Drop for CurrentGuard {
    fn drop(&mut self) {
        CURRENT_CONTEXT.with(|slot| slot.set(None));
    }
}
