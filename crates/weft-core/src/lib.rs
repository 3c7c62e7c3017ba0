//! OS-boundary and stackful-context primitives for the weft scheduler.
//!
//! This crate provides the pieces the scheduler kernel builds on:
//! - A uniform descriptor-set wait over `poll(2)` ([`poll_fds`])
//! - The self-pipe primitive used to interrupt a blocked poller ([`Pipe`])
//! - Stackful user-thread contexts with cooperative suspend/resume
//!   ([`Context`])
//! - The current-context thread-local slot ([`current`])
//!
//! Unix only: the poll abstraction and the pipe talk to the OS through
//! `libc` directly.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod context;
pub mod current;
pub mod pipe;
pub mod poll;

pub use context::{Context, CurrentContext, DEFAULT_STACK_SIZE};
pub use pipe::Pipe;
pub use poll::{poll_fds, Events, PollFd};
