//! Descriptor-wait wrappers: the user-thread side of reactor registration.
//!
//! A user thread that would block on a file descriptor records the wait
//! and suspends; its worker hands the context to the reactor under the
//! scheduler lock, and the reactor re-enqueues it once the descriptor is
//! ready.

use crate::reactor::{self, ParkRequest};
use std::os::unix::io::RawFd;
use weft_core::{current, Events};

/// Park the calling user thread until `fd` reports any of `events`.
///
/// Error conditions on the descriptor also wake the thread; the caller's
/// next I/O attempt surfaces the actual error. Returns `false` without
/// blocking when the caller is not running on a user thread.
pub fn wait_fd(fd: RawFd, events: Events) -> bool {
    let Some(cur) = current::current() else {
        return false;
    };
    reactor::set_park_request(ParkRequest { fd, events });
    cur.suspend();
    true
}

/// Park the calling user thread until `fd` is readable.
pub fn wait_readable(fd: RawFd) -> bool {
    wait_fd(fd, Events::IN)
}

/// Park the calling user thread until `fd` is writable.
pub fn wait_writable(fd: RawFd) -> bool {
    wait_fd(fd, Events::OUT)
}
