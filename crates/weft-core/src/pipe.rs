//! Self-pipe primitive.
//!
//! The reactor registers the read end in its descriptor set; writing one
//! byte to the write end makes a blocked poll return. Used both to pick up
//! freshly registered descriptors and to deliver the shutdown signal.

use std::io;
use std::os::unix::io::RawFd;

/// A unidirectional pipe owning both endpoints.
///
/// Both ends are non-blocking and close-on-exec. Endpoints are closed on
/// drop; [`close_read`](Pipe::close_read) and
/// [`close_write`](Pipe::close_write) close them early.
#[derive(Debug)]
pub struct Pipe {
    read_fd: RawFd,
    write_fd: RawFd,
}

impl Pipe {
    /// Create a fresh pipe.
    pub fn new() -> io::Result<Pipe> {
        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } != 0 {
            return Err(io::Error::last_os_error());
        }
        for &fd in &fds {
            unsafe {
                libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK);
                libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
            }
        }
        Ok(Pipe {
            read_fd: fds[0],
            write_fd: fds[1],
        })
    }

    /// The read endpoint.
    pub fn read_fd(&self) -> RawFd {
        self.read_fd
    }

    /// The write endpoint.
    pub fn write_fd(&self) -> RawFd {
        self.write_fd
    }

    /// Write one byte to the write end so a poller watching the read end
    /// wakes up. A full pipe already carries a pending wake, so a short
    /// write is ignored.
    pub fn wake(&self) {
        if self.write_fd < 0 {
            return;
        }
        let byte = 1u8;
        unsafe {
            let _ = libc::write(self.write_fd, &byte as *const u8 as *const libc::c_void, 1);
        }
    }

    /// Read pending wake bytes off the read end until it is empty.
    pub fn drain(&self) {
        if self.read_fd < 0 {
            return;
        }
        let mut buf = [0u8; 64];
        loop {
            let n = unsafe {
                libc::read(self.read_fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len())
            };
            if n < buf.len() as isize {
                break;
            }
        }
    }

    /// Close the read end. Idempotent.
    pub fn close_read(&mut self) {
        if self.read_fd >= 0 {
            unsafe {
                libc::close(self.read_fd);
            }
            self.read_fd = -1;
        }
    }

    /// Close the write end. Idempotent. A poller watching the read end
    /// observes `POLLHUP` once the write end is gone.
    pub fn close_write(&mut self) {
        if self.write_fd >= 0 {
            unsafe {
                libc::close(self.write_fd);
            }
            self.write_fd = -1;
        }
    }
}

impl Drop for Pipe {
    fn drop(&mut self) {
        self.close_read();
        self.close_write();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::{poll_fds, Events, PollFd};
    use std::time::Duration;

    #[test]
    fn test_wake_then_drain_leaves_pipe_empty() {
        let pipe = Pipe::new().unwrap();
        pipe.wake();
        pipe.wake();
        pipe.wake();
        pipe.drain();

        let mut fds = [PollFd::new(pipe.read_fd(), Events::IN)];
        let n = poll_fds(&mut fds, Some(Duration::from_millis(10))).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut pipe = Pipe::new().unwrap();
        pipe.close_read();
        pipe.close_read();
        pipe.close_write();
        pipe.close_write();
        pipe.wake();
        pipe.drain();
    }

    #[test]
    fn test_closing_write_end_hangs_up_reader() {
        let mut pipe = Pipe::new().unwrap();
        pipe.close_write();

        let mut fds = [PollFd::new(pipe.read_fd(), Events::IN)];
        let n = poll_fds(&mut fds, Some(Duration::from_secs(1))).unwrap();
        assert_eq!(n, 1);
        assert!(fds[0].is_ready());
    }
}
