//! # fibril - cooperative fiber runtime
//!
//! Blocking-style I/O for many fibers multiplexed onto one OS thread.
//!
//! Fibers are spawned with ordinary closures and written as ordinary
//! sequential code; the runtime suspends a fiber whenever a descriptor
//! would block or a sleep is requested, and resumes it on readiness,
//! deadline, or cancellation.
//!
//! ## Quick Start
//!
//! ```ignore
//! use fibril::{Runtime, RuntimeConfig, spawn, sleep};
//!
//! fn main() {
//!     let mut rt = Runtime::new(RuntimeConfig::from_env());
//!     rt.run(|| {
//!         spawn(|| {
//!             let mut fds = [0; 2];
//!             assert_eq!(fibril::pipe2(&mut fds, 0), 0);
//!             spawn(move || {
//!                 let mut buf = [0u8; 16];
//!                 let n = fibril::read(fds[0], &mut buf, -1);
//!                 println!("got {} bytes", n);
//!             });
//!             fibril::write(fds[1], b"hello", -1);
//!         });
//!     });
//! }
//! ```
//!
//! The runtime is strictly single-threaded and cooperative: fibers only
//! switch at `yield_now`, `sleep`, `exit`, and the I/O verbs. CPU-bound
//! code that never reaches a suspension point starves its siblings; place
//! `yield_now()` calls where that matters.

pub mod net;

// Re-export core support
pub use fibril_core::{kdebug, kerror, kinfo, kwarn};
pub use fibril_core::{LogLevel, RuntimeError, RuntimeResult};

// Re-export the runtime surface
pub use fibril_runtime::config::RuntimeConfig;
pub use fibril_runtime::syscall::{
    accept4, close, connect, eventfd, open, pipe2, read, socket, write,
};
pub use fibril_runtime::Interest;

use fibril_core::kfatal;
use fibril_runtime::scheduler::Scheduler;
use fibril_runtime::tls;

/// Owns one scheduler and binds it to the current thread for the duration
/// of `run`.
///
/// One `Runtime` per thread; nested installs abort. Distinct threads may
/// each run their own `Runtime` (the scheduler handle is thread-local).
pub struct Runtime {
    scheduler: Box<Scheduler>,
}

impl Runtime {
    /// Create a runtime. Aborts on poller initialization failure.
    pub fn new(config: RuntimeConfig) -> Self {
        let scheduler = Scheduler::new(config)
            .unwrap_or_else(|e| kfatal!("runtime initialization failed: {}", e));
        Self {
            scheduler: Box::new(scheduler),
        }
    }

    /// Install the scheduler on this thread, run `setup` (which typically
    /// spawns the initial fibers), then drive the run loop until no fibers
    /// remain, and uninstall.
    pub fn run<F>(&mut self, setup: F)
    where
        F: FnOnce(),
    {
        tls::install(&mut *self.scheduler as *mut Scheduler);
        setup();
        self.scheduler.run();
        tls::uninstall();
    }
}

/// Spawn a fiber for `f` on the current thread's scheduler.
pub fn spawn<F>(f: F)
where
    F: FnOnce() + 'static,
{
    unsafe { (*tls::scheduler()).spawn(Box::new(f)) }
}

/// Move the current fiber to the back of the ready queue and run the next
/// one. No-op when no other fiber is ready.
pub fn yield_now() {
    unsafe { (*tls::scheduler()).yield_current() }
}

/// Suspend the current fiber for at least `duration_ms` milliseconds.
/// `sleep(0)` still passes through the scheduler once.
pub fn sleep(duration_ms: i32) {
    unsafe { (*tls::scheduler()).sleep_current(duration_ms) }
}

/// Terminate the current fiber, unwinding its stack so destructors run.
pub fn exit() -> ! {
    unsafe { (*tls::scheduler()).exit_current() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::time::Instant;

    fn runtime() -> Runtime {
        Runtime::new(RuntimeConfig::from_env())
    }

    #[test]
    fn test_echo_pipe() {
        let mut rt = runtime();
        let read_result = Rc::new(Cell::new(0isize));
        let write_result = Rc::new(Cell::new(0isize));
        let data = Rc::new(RefCell::new(Vec::new()));

        {
            let read_result = read_result.clone();
            let write_result = write_result.clone();
            let data = data.clone();
            rt.run(move || {
                let mut fds = [0; 2];
                assert_eq!(pipe2(&mut fds, 0), 0);
                let (r, w) = (fds[0], fds[1]);

                // Reader first, so it parks before any data exists
                spawn(move || {
                    let mut buf = [0u8; 5];
                    let n = read(r, &mut buf, -1);
                    read_result.set(n);
                    data.borrow_mut().extend_from_slice(&buf);
                    close(r);
                });
                spawn(move || {
                    let n = write(w, b"hello", -1);
                    write_result.set(n);
                    close(w);
                });
            });
        }

        assert_eq!(read_result.get(), 5);
        assert_eq!(write_result.get(), 5);
        assert_eq!(&*data.borrow(), b"hello");
    }

    #[test]
    fn test_read_timeout() {
        let mut rt = runtime();
        let result = Rc::new(Cell::new((0isize, 0i32)));

        let start = Instant::now();
        {
            let result = result.clone();
            rt.run(move || {
                let mut fds = [0; 2];
                assert_eq!(pipe2(&mut fds, 0), 0);
                let (r, w) = (fds[0], fds[1]);

                spawn(move || {
                    let mut buf = [0u8; 1];
                    let n = read(r, &mut buf, 50);
                    result.set((n, errno::errno().0));
                    close(r);
                    close(w);
                });
            });
        }
        let elapsed = start.elapsed().as_millis();

        assert_eq!(result.get(), (-1, libc::ETIMEDOUT));
        assert!(elapsed >= 50, "returned early: {} ms", elapsed);
        assert!(elapsed < 200, "returned late: {} ms", elapsed);
    }

    #[test]
    fn test_close_wakes_waiter_with_ebadf() {
        let mut rt = runtime();
        let result = Rc::new(Cell::new((0isize, 0i32)));

        {
            let result = result.clone();
            rt.run(move || {
                let mut fds = [0; 2];
                assert_eq!(pipe2(&mut fds, 0), 0);
                let (r, w) = (fds[0], fds[1]);

                spawn(move || {
                    let mut buf = [0u8; 1];
                    let n = read(r, &mut buf, -1);
                    result.set((n, errno::errno().0));
                });
                spawn(move || {
                    sleep(20);
                    close(r);
                    close(w);
                });
            });
        }

        assert_eq!(result.get(), (-1, libc::EBADF));
    }

    #[test]
    fn test_cooperative_fairness() {
        let mut rt = runtime();
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let log = log.clone();
            rt.run(move || {
                for id in 1..=3 {
                    let log = log.clone();
                    spawn(move || {
                        for _ in 0..10 {
                            log.borrow_mut().push(id);
                            yield_now();
                        }
                    });
                }
            });
        }

        let expected: Vec<i32> = (0..10).flat_map(|_| [1, 2, 3]).collect();
        assert_eq!(*log.borrow(), expected);
    }

    #[test]
    fn test_exit_unwinds_destructors() {
        struct Guard(Rc<Cell<bool>>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let mut rt = runtime();
        let dropped = Rc::new(Cell::new(false));

        {
            let dropped = dropped.clone();
            rt.run(move || {
                spawn(move || {
                    let _guard = Guard(dropped.clone());
                    exit();
                });
            });
        }

        assert!(dropped.get(), "guard destructor did not run");
    }

    #[test]
    fn test_connect_refused() {
        // Grab an ephemeral port and free it again; connecting there is
        // refused
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut rt = runtime();
        let result = Rc::new(Cell::new((0i32, 0i32)));

        let start = Instant::now();
        {
            let result = result.clone();
            rt.run(move || {
                spawn(move || {
                    let fd = socket(libc::AF_INET, libc::SOCK_STREAM, 0);
                    assert!(fd >= 0);
                    let addr = libc::sockaddr_in {
                        sin_family: libc::AF_INET as libc::sa_family_t,
                        sin_port: port.to_be(),
                        sin_addr: libc::in_addr {
                            s_addr: u32::from(std::net::Ipv4Addr::LOCALHOST).to_be(),
                        },
                        sin_zero: [0; 8],
                    };
                    let ret = connect(
                        fd,
                        &addr as *const libc::sockaddr_in as *const libc::sockaddr,
                        std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
                        1000,
                    );
                    result.set((ret, errno::errno().0));
                    close(fd);
                });
            });
        }
        let elapsed = start.elapsed().as_millis();

        assert_eq!(result.get(), (-1, libc::ECONNREFUSED));
        assert!(elapsed <= 1000, "took {} ms", elapsed);
    }

    #[test]
    fn test_yield_alone_is_noop() {
        let mut rt = runtime();
        let ran = Rc::new(Cell::new(false));

        {
            let ran = ran.clone();
            rt.run(move || {
                spawn(move || {
                    yield_now();
                    yield_now();
                    ran.set(true);
                });
            });
        }

        assert!(ran.get());
    }

    #[test]
    fn test_sleep_zero_yields() {
        let mut rt = runtime();
        let log = Rc::new(RefCell::new(Vec::new()));

        {
            let log = log.clone();
            rt.run(move || {
                {
                    let log = log.clone();
                    spawn(move || {
                        sleep(0);
                        log.borrow_mut().push('a');
                    });
                }
                spawn(move || {
                    log.borrow_mut().push('b');
                });
            });
        }

        // sleep(0) lets the other ready fiber run first
        assert_eq!(*log.borrow(), vec!['b', 'a']);
    }

    #[test]
    fn test_untracked_descriptor_fails_with_ebadf() {
        let mut rt = runtime();
        let result = Rc::new(Cell::new((0isize, 0i32)));

        {
            let result = result.clone();
            rt.run(move || {
                spawn(move || {
                    // Created behind the runtime's back: not tracked
                    let mut raw = [0 as libc::c_int; 2];
                    assert_eq!(unsafe { libc::pipe(raw.as_mut_ptr()) }, 0);
                    let mut buf = [0u8; 1];
                    let n = read(raw[0], &mut buf, -1);
                    result.set((n, errno::errno().0));
                    unsafe {
                        libc::close(raw[0]);
                        libc::close(raw[1]);
                    }
                });
            });
        }

        assert_eq!(result.get(), (-1, libc::EBADF));
    }

    #[test]
    fn test_open_read_close() {
        let mut rt = runtime();
        let result = Rc::new(Cell::new((0isize, 0i32)));

        {
            let result = result.clone();
            rt.run(move || {
                spawn(move || {
                    let fd = open(c"/dev/null", libc::O_RDONLY, 0);
                    assert!(fd >= 0);
                    let mut buf = [0u8; 8];
                    let n = read(fd, &mut buf, -1);
                    result.set((n, close(fd)));
                });
            });
        }

        // /dev/null reads EOF immediately; close succeeds
        assert_eq!(result.get(), (0, 0));
    }

    #[test]
    fn test_open_missing_path_sets_errno() {
        let mut rt = runtime();
        let result = Rc::new(Cell::new((0i32, 0i32)));

        {
            let result = result.clone();
            rt.run(move || {
                spawn(move || {
                    let fd = open(c"/nonexistent/fibril-test", libc::O_RDONLY, 0);
                    result.set((fd, errno::errno().0));
                });
            });
        }

        assert_eq!(result.get(), (-1, libc::ENOENT));
    }

    #[test]
    fn test_zero_timeout_reports_eagain() {
        let mut rt = runtime();
        let result = Rc::new(Cell::new((0isize, 0i32)));

        {
            let result = result.clone();
            rt.run(move || {
                let mut fds = [0; 2];
                assert_eq!(pipe2(&mut fds, 0), 0);
                let (r, w) = (fds[0], fds[1]);

                spawn(move || {
                    let mut buf = [0u8; 1];
                    // Single attempt on an empty pipe: would block
                    let n = read(r, &mut buf, 0);
                    result.set((n, errno::errno().0));
                    close(r);
                    close(w);
                });
            });
        }

        assert_eq!(result.get(), (-1, libc::EAGAIN));
    }

    #[test]
    fn test_eventfd_wakes_reader() {
        let mut rt = runtime();
        let result = Rc::new(Cell::new((0isize, 0u64)));

        {
            let result = result.clone();
            rt.run(move || {
                let efd = eventfd(0, 0);
                assert!(efd >= 0);

                {
                    let result = result.clone();
                    spawn(move || {
                        let mut buf = [0u8; 8];
                        let n = read(efd, &mut buf, -1);
                        result.set((n, u64::from_ne_bytes(buf)));
                        close(efd);
                    });
                }
                spawn(move || {
                    sleep(10);
                    let n = write(efd, &1u64.to_ne_bytes(), -1);
                    assert_eq!(n, 8);
                });
            });
        }

        assert_eq!(result.get(), (8, 1));
    }

    #[test]
    fn test_tcp_echo_roundtrip() {
        let mut rt = runtime();
        let echoed = Rc::new(RefCell::new(Vec::new()));

        {
            let echoed = echoed.clone();
            rt.run(move || {
                let listener = net::TcpListener::bind(0).expect("bind failed");
                let port = listener.local_port().expect("getsockname failed");

                spawn(move || {
                    let stream = listener.accept(-1).expect("accept failed");
                    let mut buf = [0u8; 16];
                    let n = stream.read(&mut buf, -1);
                    assert!(n > 0);
                    stream.write_all(&buf[..n as usize], -1);
                });
                spawn(move || {
                    let stream =
                        net::TcpStream::connect(std::net::Ipv4Addr::LOCALHOST, port, 1000)
                            .expect("connect failed");
                    assert_eq!(stream.write_all(b"ping", -1), 4);
                    let mut buf = [0u8; 4];
                    let mut got = 0usize;
                    while got < 4 {
                        let n = stream.read(&mut buf[got..], 1000);
                        assert!(n > 0);
                        got += n as usize;
                    }
                    echoed.borrow_mut().extend_from_slice(&buf);
                });
            });
        }

        assert_eq!(&*echoed.borrow(), b"ping");
    }
}
