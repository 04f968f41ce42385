//! epoll-backed readiness poller
//!
//! Tracks every descriptor created through the runtime verbs and holds at
//! most one awaiting fiber per (descriptor, direction). Registration is
//! edge-triggered; fibers only park after observing EAGAIN, so a consumed
//! edge is never lost.

use std::collections::HashMap;
use std::os::fd::RawFd;

use fibril_core::error::PollError;
use fibril_core::kfatal;

use crate::fiber::Fiber;

/// Readiness direction a fiber can await.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    Readable,
    Writable,
}

/// Awaiter slots for one tracked descriptor.
#[derive(Default)]
pub struct Parked {
    pub reader: Option<*mut Fiber>,
    pub writer: Option<*mut Fiber>,
}

/// Readiness poller over epoll.
pub struct IoPoll {
    epfd: RawFd,
    fds: HashMap<RawFd, Parked>,
    events: Vec<libc::epoll_event>,
}

impl IoPoll {
    pub fn new(poll_events: usize) -> Result<Self, PollError> {
        let epfd = unsafe { libc::epoll_create1(libc::EPOLL_CLOEXEC) };
        if epfd < 0 {
            return Err(PollError::CreateFailed(errno::errno().0));
        }
        Ok(Self {
            epfd,
            fds: HashMap::new(),
            events: vec![libc::epoll_event { events: 0, u64: 0 }; poll_events],
        })
    }

    /// Begin tracking readiness for `fd`.
    ///
    /// Regular files cannot be polled (`epoll_ctl` reports EPERM); they are
    /// still tracked so the descriptor discipline holds, but they never
    /// produce readiness events. Their syscalls never report EAGAIN either,
    /// so no fiber ever parks on them.
    pub fn register(&mut self, fd: RawFd) -> Result<(), PollError> {
        debug_assert!(!self.fds.contains_key(&fd), "descriptor {} already tracked", fd);

        let mut event = libc::epoll_event {
            events: (libc::EPOLLIN | libc::EPOLLOUT | libc::EPOLLRDHUP | libc::EPOLLET) as u32,
            u64: fd as u64,
        };
        let ret = unsafe { libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_ADD, fd, &mut event) };
        if ret < 0 && errno::errno().0 != libc::EPERM {
            return Err(PollError::RegisterFailed(errno::errno().0));
        }

        self.fds.insert(fd, Parked::default());
        Ok(())
    }

    /// Stop tracking `fd`, returning any awaiters that were parked on it.
    /// The caller must wake them with an error.
    pub fn unregister(&mut self, fd: RawFd) -> Parked {
        // The descriptor is usually closed by now, which already removed it
        // from the epoll set; a failing DEL is expected.
        unsafe {
            libc::epoll_ctl(self.epfd, libc::EPOLL_CTL_DEL, fd, std::ptr::null_mut());
        }
        self.fds.remove(&fd).unwrap_or_default()
    }

    /// Whether `fd` is currently tracked.
    pub fn has(&self, fd: RawFd) -> bool {
        self.fds.contains_key(&fd)
    }

    /// Subscribe `fiber` as the sole awaiter of (`fd`, `interest`).
    pub fn park(&mut self, fiber: *mut Fiber, fd: RawFd, interest: Interest) {
        let parked = self
            .fds
            .get_mut(&fd)
            .expect("park on untracked descriptor");
        let slot = match interest {
            Interest::Readable => &mut parked.reader,
            Interest::Writable => &mut parked.writer,
        };
        assert!(slot.is_none(), "second awaiter parked on fd {} ({:?})", fd, interest);
        *slot = Some(fiber);
    }

    /// Undo a prior park without waking.
    pub fn unpark(&mut self, fd: RawFd, interest: Interest) {
        if let Some(parked) = self.fds.get_mut(&fd) {
            match interest {
                Interest::Readable => parked.reader = None,
                Interest::Writable => parked.writer = None,
            }
        }
    }

    /// Block until at least one readiness event or the timeout.
    ///
    /// Appends each woken awaiter's fiber to `out` and returns true. Returns
    /// false only when the wait was interrupted and should be repeated.
    /// `timeout_ms` of -1 waits forever.
    pub fn wait(&mut self, timeout_ms: i32, out: &mut Vec<*mut Fiber>) -> bool {
        let n = unsafe {
            libc::epoll_wait(
                self.epfd,
                self.events.as_mut_ptr(),
                self.events.len() as i32,
                timeout_ms,
            )
        };
        if n < 0 {
            if errno::errno().0 == libc::EINTR {
                return false;
            }
            kfatal!("epoll_wait failed: errno {}", errno::errno().0);
        }

        for i in 0..n as usize {
            let event = self.events[i];
            let fd = event.u64 as RawFd;
            let Some(parked) = self.fds.get_mut(&fd) else {
                continue;
            };
            let flags = event.events as i32;
            if flags & (libc::EPOLLIN | libc::EPOLLRDHUP | libc::EPOLLHUP | libc::EPOLLERR) != 0 {
                if let Some(fiber) = parked.reader.take() {
                    out.push(fiber);
                }
            }
            if flags & (libc::EPOLLOUT | libc::EPOLLHUP | libc::EPOLLERR) != 0 {
                if let Some(fiber) = parked.writer.take() {
                    out.push(fiber);
                }
            }
        }
        true
    }

    /// Number of tracked descriptors.
    pub fn len(&self) -> usize {
        self.fds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fds.is_empty()
    }
}

impl Drop for IoPoll {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epfd);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fiber(n: usize) -> *mut Fiber {
        // Opaque token; the poller never dereferences parked fibers
        n as *mut Fiber
    }

    fn pipe() -> (RawFd, RawFd) {
        let mut fds = [0 as RawFd; 2];
        let ret = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_NONBLOCK) };
        assert_eq!(ret, 0);
        (fds[0], fds[1])
    }

    fn close(fd: RawFd) {
        unsafe {
            libc::close(fd);
        }
    }

    #[test]
    fn test_register_has_unregister() {
        let mut poll = IoPoll::new(16).unwrap();
        let (r, w) = pipe();

        assert!(!poll.has(r));
        poll.register(r).unwrap();
        poll.register(w).unwrap();
        assert!(poll.has(r));
        assert!(poll.has(w));
        assert_eq!(poll.len(), 2);

        let parked = poll.unregister(r);
        assert!(parked.reader.is_none());
        assert!(parked.writer.is_none());
        assert!(!poll.has(r));

        poll.unregister(w);
        close(r);
        close(w);
    }

    #[test]
    fn test_unregister_returns_parked_awaiters() {
        let mut poll = IoPoll::new(16).unwrap();
        let (r, w) = pipe();
        poll.register(r).unwrap();

        poll.park(fiber(7), r, Interest::Readable);
        let parked = poll.unregister(r);
        assert_eq!(parked.reader, Some(fiber(7)));
        assert!(parked.writer.is_none());

        close(r);
        close(w);
    }

    #[test]
    fn test_wait_wakes_reader_when_readable() {
        let mut poll = IoPoll::new(16).unwrap();
        let (r, w) = pipe();
        poll.register(r).unwrap();
        poll.park(fiber(9), r, Interest::Readable);

        let n = unsafe { libc::write(w, b"x".as_ptr() as *const libc::c_void, 1) };
        assert_eq!(n, 1);

        let mut woken = Vec::new();
        assert!(poll.wait(1000, &mut woken));
        assert_eq!(woken, vec![fiber(9)]);

        // The awaiter slot was consumed
        let parked = poll.unregister(r);
        assert!(parked.reader.is_none());
        close(r);
        close(w);
    }

    #[test]
    fn test_wait_timeout_reports_progress() {
        let mut poll = IoPoll::new(16).unwrap();
        let mut woken = Vec::new();
        // Timeout expiry is progress (the caller's timers may be due)
        assert!(poll.wait(10, &mut woken));
        assert!(woken.is_empty());
    }

    #[test]
    fn test_unpark_clears_slot() {
        let mut poll = IoPoll::new(16).unwrap();
        let (r, w) = pipe();
        poll.register(r).unwrap();
        poll.park(fiber(3), r, Interest::Readable);
        poll.unpark(r, Interest::Readable);

        let parked = poll.unregister(r);
        assert!(parked.reader.is_none());
        close(r);
        close(w);
    }

    #[test]
    #[should_panic(expected = "second awaiter")]
    fn test_double_park_asserts() {
        let mut poll = IoPoll::new(16).unwrap();
        let (r, w) = pipe();
        poll.register(r).unwrap();
        poll.park(fiber(1), r, Interest::Readable);
        poll.park(fiber(2), r, Interest::Readable);
        // unreachable
        close(r);
        close(w);
    }
}
