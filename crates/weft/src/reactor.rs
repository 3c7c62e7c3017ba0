//! Async I/O reactor.
//!
//! A dedicated thread waits on the descriptors of parked user threads and
//! hands them back to the strategy on readiness. The registration state is
//! two index-aligned vectors guarded by the scheduler lock: the descriptor
//! records and the parked contexts, with index 0 reserved for the reactor's
//! self-pipe. The reactor snapshots the records under the lock, polls
//! without it, and applies the results under it again, so registrants never
//! race the syscall. Registration wakes a blocked poll through the
//! self-pipe; teardown sets the terminate flag and does the same.

use crate::scheduler::Inner;
use crate::strategy::Strategy;
use std::cell::Cell;
use std::io::{self, ErrorKind};
use std::os::unix::io::RawFd;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use weft_core::{poll_fds, Context, Events, Pipe, PollFd};

/// Backoff applied when poll reports an error other than `EINTR`, so a
/// persistent error cannot spin the reactor thread.
const POLL_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// A pending descriptor wait, recorded by an I/O wrapper just before the
/// user thread suspends and consumed by the worker once the suspend
/// returns control.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ParkRequest {
    pub(crate) fd: RawFd,
    pub(crate) events: Events,
}

thread_local! {
    static PARK_REQUEST: Cell<Option<ParkRequest>> = const { Cell::new(None) };
}

pub(crate) fn set_park_request(req: ParkRequest) {
    PARK_REQUEST.with(|slot| slot.set(Some(req)));
}

pub(crate) fn take_park_request() -> Option<ParkRequest> {
    PARK_REQUEST.with(|slot| slot.take())
}

/// Registration state of the reactor, guarded by the scheduler lock.
///
/// `pfds` and `parked` are index-aligned: `parked[i]` is the context
/// waiting on `pfds[i]`. Index 0 is the self-pipe read end; `parked[0]` is
/// a sentinel and never taken.
pub(crate) struct ReactorState {
    pipe: Pipe,
    pfds: Vec<PollFd>,
    parked: Vec<Option<Context>>,
}

impl ReactorState {
    pub(crate) fn new() -> io::Result<ReactorState> {
        let pipe = Pipe::new()?;
        let pfds = vec![PollFd::new(pipe.read_fd(), Events::IN)];
        let parked = vec![None];
        Ok(ReactorState { pipe, pfds, parked })
    }

    /// Append a parked context and its descriptor record, then wake the
    /// poller so the new descriptor is picked up.
    pub(crate) fn park(&mut self, ctx: Context, req: ParkRequest) {
        self.pfds.push(PollFd::new(req.fd, req.events));
        self.parked.push(Some(ctx));
        debug_assert_eq!(self.pfds.len(), self.parked.len());
        self.pipe.wake();
    }

    /// Wake a blocked poll. The caller is responsible for having set
    /// whatever state the woken reactor should observe.
    pub(crate) fn wake(&self) {
        self.pipe.wake();
    }

    /// Number of parked user threads.
    pub(crate) fn parked_count(&self) -> usize {
        self.parked.len() - 1
    }

    /// Copy of the descriptor records for an unlocked poll.
    fn snapshot(&self) -> Vec<PollFd> {
        self.pfds.clone()
    }

    /// Copy the kernel's results back into the canonical records. Entries
    /// appended after the snapshot was taken are untouched; only the
    /// reactor erases entries, so indices below the snapshot length are
    /// stable across the poll.
    fn absorb(&mut self, snapshot: &[PollFd]) {
        let upto = snapshot.len().min(self.pfds.len());
        for i in 1..upto {
            debug_assert_eq!(self.pfds[i].fd(), snapshot[i].fd());
            self.pfds[i].set_revents(snapshot[i].revents());
        }
    }

    /// Stable partition over the aligned vectors: extract the contexts
    /// whose descriptors are ready, preserving the order of everything
    /// else and the sentinel at index 0, and erase their entries.
    fn take_ready(&mut self) -> Vec<Context> {
        debug_assert_eq!(self.pfds.len(), self.parked.len());
        let mut ready = Vec::new();

        let tail_pfds = self.pfds.split_off(1);
        let tail_parked = self.parked.split_off(1);
        for (mut pfd, slot) in tail_pfds.into_iter().zip(tail_parked) {
            if pfd.is_ready() {
                ready.push(slot.expect("parked entry missing its context"));
            } else {
                pfd.clear_revents();
                self.pfds.push(pfd);
                self.parked.push(slot);
            }
        }
        self.pfds[0].clear_revents();

        debug_assert_eq!(self.pfds.len(), self.parked.len());
        ready
    }

    fn drain_pipe(&self) {
        self.pipe.drain();
    }
}

/// Reactor thread body. Exits once the scheduler sets the terminate flag;
/// teardown wakes a blocked poll through the self-pipe.
pub(crate) fn reactor_loop<S: Strategy>(inner: Arc<Inner<S>>) {
    loop {
        let mut snapshot = {
            let state = inner.lock.lock();
            if state.terminate {
                break;
            }
            state.reactor.snapshot()
        };

        match poll_fds(&mut snapshot, None) {
            Ok(_) => {}
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(_) => {
                // Treated as no readiness this iteration.
                thread::sleep(POLL_ERROR_BACKOFF);
                continue;
            }
        }

        let newly_runnable = {
            let mut state = inner.lock.lock();
            if state.terminate {
                break;
            }
            if snapshot[0].is_ready() {
                state.reactor.drain_pipe();
            }
            state.reactor.absorb(&snapshot);
            let ready = state.reactor.take_ready();
            let count = ready.len();
            for ctx in ready {
                state.strategy.push_ctx(ctx);
            }
            count
        };

        for _ in 0..newly_runnable {
            inner.cond.notify_one();
        }
    }

    #[cfg(debug_assertions)]
    eprintln!("weft: reactor shutting down");
}
