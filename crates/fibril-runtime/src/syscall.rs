//! # Blocking-style syscall verbs for fibers
//!
//! Each verb runs the syscall on the calling fiber and suspends the fiber
//! through the scheduler when the kernel reports EAGAIN, instead of blocking
//! the OS thread. From the fiber's perspective these look like regular
//! blocking calls.
//!
//! Shared contract:
//! - The descriptor must be tracked by the poller, else the verb fails with
//!   EBADF (catches use-after-close and unmanaged descriptors).
//! - EINTR retries the syscall.
//! - EAGAIN/EWOULDBLOCK parks the fiber until readiness, timeout, or close.
//! - Everything else surfaces unchanged through errno.
//!
//! Descriptor-creating verbs force the nonblocking kernel flag and register
//! the new descriptor(s) before returning; a registration failure closes the
//! descriptor again, so tracking is never partial.
//!
//! timeout_ms semantics: negative = no timeout; 0 = single attempt (EAGAIN
//! if it would block); positive = millisecond budget (ETIMEDOUT on expiry).

use std::ffi::CStr;
use std::os::fd::RawFd;

use fibril_core::error::{PollError, RuntimeError};

use crate::iopoll::Interest;
use crate::scheduler::Scheduler;
use crate::tls;

/// Register a freshly created descriptor, closing it again on failure.
fn watch_new_fd(sched: *mut Scheduler, fd: RawFd) -> i32 {
    match unsafe { (*sched).watch_io(fd) } {
        Ok(()) => 0,
        Err(e) => {
            let err = match e {
                RuntimeError::Poll(PollError::RegisterFailed(n)) => n,
                _ => libc::EINVAL,
            };
            unsafe {
                libc::close(fd);
            }
            errno::set_errno(errno::Errno(err));
            -1
        }
    }
}

/// Open a file. The descriptor is opened O_NONBLOCK and tracked.
pub fn open(path: &CStr, flags: i32, mode: libc::mode_t) -> RawFd {
    let sched = tls::scheduler();
    let fd = loop {
        let fd = unsafe { libc::open(path.as_ptr(), flags | libc::O_NONBLOCK, mode as libc::c_uint) };
        if fd >= 0 {
            break fd;
        }
        if errno::errno().0 != libc::EINTR {
            return -1;
        }
    };
    if watch_new_fd(sched, fd) < 0 {
        return -1;
    }
    fd
}

/// Create a pipe. Both ends are nonblocking and tracked.
pub fn pipe2(fds: &mut [RawFd; 2], flags: i32) -> i32 {
    let sched = tls::scheduler();
    if unsafe { libc::pipe2(fds.as_mut_ptr(), flags | libc::O_NONBLOCK) } < 0 {
        return -1;
    }
    if watch_new_fd(sched, fds[0]) < 0 {
        unsafe {
            libc::close(fds[1]);
        }
        return -1;
    }
    if watch_new_fd(sched, fds[1]) < 0 {
        unsafe {
            (*sched).unwatch_io(fds[0]);
            libc::close(fds[0]);
        }
        return -1;
    }
    0
}

/// Create a socket. SOCK_NONBLOCK is forced and the descriptor tracked.
pub fn socket(domain: i32, ty: i32, protocol: i32) -> RawFd {
    let sched = tls::scheduler();
    let fd = unsafe { libc::socket(domain, ty | libc::SOCK_NONBLOCK, protocol) };
    if fd < 0 {
        return -1;
    }
    if watch_new_fd(sched, fd) < 0 {
        return -1;
    }
    fd
}

/// Create an eventfd. EFD_NONBLOCK is forced and the descriptor tracked.
pub fn eventfd(initval: libc::c_uint, flags: i32) -> RawFd {
    let sched = tls::scheduler();
    let fd = unsafe { libc::eventfd(initval, flags | libc::EFD_NONBLOCK) };
    if fd < 0 {
        return -1;
    }
    if watch_new_fd(sched, fd) < 0 {
        return -1;
    }
    fd
}

/// Close a tracked descriptor.
///
/// The descriptor is untracked whether or not close succeeds; fibers parked
/// on it wake with EBADF.
pub fn close(fd: RawFd) -> i32 {
    let sched = tls::scheduler();
    unsafe {
        if !(*sched).io_is_watched(fd) {
            errno::set_errno(errno::Errno(libc::EBADF));
            return -1;
        }
        let result = loop {
            let result = libc::close(fd);
            if result >= 0 {
                break result;
            }
            if errno::errno().0 != libc::EINTR {
                break result;
            }
        };
        (*sched).unwatch_io(fd);
        if result < 0 {
            return -1;
        }
    }
    0
}

/// Read from a tracked descriptor, suspending until data, timeout, or
/// close.
pub fn read(fd: RawFd, buf: &mut [u8], timeout_ms: i32) -> isize {
    let sched = tls::scheduler();
    unsafe {
        if !(*sched).io_is_watched(fd) {
            errno::set_errno(errno::Errno(libc::EBADF));
            return -1;
        }
        loop {
            let n = libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len());
            if n >= 0 {
                return n;
            }
            let err = errno::errno().0;
            if err == libc::EWOULDBLOCK {
                if (*sched).await_io(fd, Interest::Readable, timeout_ms) < 0 {
                    return -1;
                }
            } else if err != libc::EINTR {
                return -1;
            }
        }
    }
}

/// Write to a tracked descriptor, suspending until space, timeout, or
/// close.
pub fn write(fd: RawFd, buf: &[u8], timeout_ms: i32) -> isize {
    let sched = tls::scheduler();
    unsafe {
        if !(*sched).io_is_watched(fd) {
            errno::set_errno(errno::Errno(libc::EBADF));
            return -1;
        }
        loop {
            let n = libc::write(fd, buf.as_ptr() as *const libc::c_void, buf.len());
            if n >= 0 {
                return n;
            }
            let err = errno::errno().0;
            if err == libc::EWOULDBLOCK {
                if (*sched).await_io(fd, Interest::Writable, timeout_ms) < 0 {
                    return -1;
                }
            } else if err != libc::EINTR {
                return -1;
            }
        }
    }
}

/// Accept a connection, suspending until one arrives. The accepted
/// descriptor is made nonblocking and tracked like any runtime-created
/// descriptor.
pub fn accept4(
    fd: RawFd,
    addr: *mut libc::sockaddr,
    addrlen: *mut libc::socklen_t,
    flags: i32,
    timeout_ms: i32,
) -> RawFd {
    let sched = tls::scheduler();
    unsafe {
        if !(*sched).io_is_watched(fd) {
            errno::set_errno(errno::Errno(libc::EBADF));
            return -1;
        }
        let subfd = loop {
            let subfd = libc::accept4(fd, addr, addrlen, flags | libc::SOCK_NONBLOCK);
            if subfd >= 0 {
                break subfd;
            }
            let err = errno::errno().0;
            if err == libc::EWOULDBLOCK {
                if (*sched).await_io(fd, Interest::Readable, timeout_ms) < 0 {
                    return -1;
                }
            } else if err != libc::EINTR {
                return -1;
            }
        };
        if watch_new_fd(sched, subfd) < 0 {
            return -1;
        }
        subfd
    }
}

/// Connect a socket, suspending through the in-progress handshake. The
/// socket's pending error is surfaced through errno after the wait.
pub fn connect(
    fd: RawFd,
    addr: *const libc::sockaddr,
    addrlen: libc::socklen_t,
    timeout_ms: i32,
) -> i32 {
    let sched = tls::scheduler();
    unsafe {
        if !(*sched).io_is_watched(fd) {
            errno::set_errno(errno::Errno(libc::EBADF));
            return -1;
        }
        if libc::connect(fd, addr, addrlen) < 0 {
            let err = errno::errno().0;
            if err != libc::EINTR && err != libc::EINPROGRESS {
                return -1;
            }
            if (*sched).await_io(fd, Interest::Writable, timeout_ms) < 0 {
                return -1;
            }
            let mut optval: i32 = 0;
            let mut optlen = std::mem::size_of::<i32>() as libc::socklen_t;
            if libc::getsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_ERROR,
                &mut optval as *mut i32 as *mut libc::c_void,
                &mut optlen,
            ) < 0
            {
                return -1;
            }
            if optval != 0 {
                errno::set_errno(errno::Errno(optval));
                return -1;
            }
        }
    }
    0
}
