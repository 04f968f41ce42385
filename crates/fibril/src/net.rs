//! # TCP convenience layer over the runtime verbs
//!
//! `TcpListener` and `TcpStream` wrap raw descriptors created through the
//! runtime, so every operation cooperates with the scheduler:
//!
//! ```ignore
//! let listener = fibril::net::TcpListener::bind(8080)?;
//! loop {
//!     let stream = listener.accept(-1)?;
//!     fibril::spawn(move || handle_connection(stream));
//! }
//! ```
//!
//! Errors are returned as raw errno values; the verbs underneath follow the
//! errno convention throughout.

use std::net::Ipv4Addr;
use std::os::fd::RawFd;

use fibril_runtime::tls;

/// A listening TCP socket, tracked by the runtime.
pub struct TcpListener {
    fd: RawFd,
}

impl TcpListener {
    /// Bind to `0.0.0.0:port` and listen. Port 0 picks an ephemeral port
    /// (see `local_port`).
    pub fn bind(port: u16) -> Result<Self, i32> {
        let fd = crate::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0);
        if fd < 0 {
            return Err(errno::errno().0);
        }

        unsafe {
            let opt: i32 = 1;
            libc::setsockopt(
                fd,
                libc::SOL_SOCKET,
                libc::SO_REUSEADDR,
                &opt as *const i32 as *const libc::c_void,
                std::mem::size_of::<i32>() as libc::socklen_t,
            );

            let addr = sockaddr_v4(Ipv4Addr::UNSPECIFIED, port);
            if libc::bind(
                fd,
                &addr as *const libc::sockaddr_in as *const libc::sockaddr,
                std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            ) != 0
            {
                let err = errno::errno().0;
                crate::close(fd);
                return Err(err);
            }

            if libc::listen(fd, 1024) != 0 {
                let err = errno::errno().0;
                crate::close(fd);
                return Err(err);
            }
        }

        Ok(Self { fd })
    }

    /// The port actually bound (useful after binding port 0).
    pub fn local_port(&self) -> Result<u16, i32> {
        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let ret = unsafe {
            libc::getsockname(
                self.fd,
                &mut addr as *mut libc::sockaddr_in as *mut libc::sockaddr,
                &mut len,
            )
        };
        if ret != 0 {
            return Err(errno::errno().0);
        }
        Ok(u16::from_be(addr.sin_port))
    }

    /// Accept a connection, suspending the calling fiber until one arrives
    /// or `timeout_ms` expires.
    pub fn accept(&self, timeout_ms: i32) -> Result<TcpStream, i32> {
        let mut addr: libc::sockaddr_in = unsafe { std::mem::zeroed() };
        let mut len = std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t;
        let fd = crate::accept4(
            self.fd,
            &mut addr as *mut libc::sockaddr_in as *mut libc::sockaddr,
            &mut len,
            libc::SOCK_CLOEXEC,
            timeout_ms,
        );
        if fd < 0 {
            return Err(errno::errno().0);
        }
        Ok(TcpStream { fd })
    }

    /// The raw descriptor.
    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for TcpListener {
    fn drop(&mut self) {
        close_tracked(self.fd);
    }
}

/// A connected TCP stream, tracked by the runtime.
pub struct TcpStream {
    fd: RawFd,
}

impl TcpStream {
    /// Connect to `ip:port`, suspending the calling fiber through the
    /// handshake.
    pub fn connect(ip: Ipv4Addr, port: u16, timeout_ms: i32) -> Result<Self, i32> {
        let fd = crate::socket(libc::AF_INET, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0);
        if fd < 0 {
            return Err(errno::errno().0);
        }

        let addr = sockaddr_v4(ip, port);
        let ret = crate::connect(
            fd,
            &addr as *const libc::sockaddr_in as *const libc::sockaddr,
            std::mem::size_of::<libc::sockaddr_in>() as libc::socklen_t,
            timeout_ms,
        );
        if ret < 0 {
            let err = errno::errno().0;
            crate::close(fd);
            return Err(err);
        }

        Ok(Self { fd })
    }

    /// Read into `buf`. Returns bytes read, 0 at EOF, or -1 with errno set.
    pub fn read(&self, buf: &mut [u8], timeout_ms: i32) -> isize {
        crate::read(self.fd, buf, timeout_ms)
    }

    /// Write from `buf` once. Returns bytes written or -1 with errno set.
    pub fn write(&self, buf: &[u8], timeout_ms: i32) -> isize {
        crate::write(self.fd, buf, timeout_ms)
    }

    /// Write all of `buf`, retrying partial writes. Returns the total or -1
    /// with errno set.
    pub fn write_all(&self, mut buf: &[u8], timeout_ms: i32) -> isize {
        let mut total: isize = 0;
        while !buf.is_empty() {
            let n = crate::write(self.fd, buf, timeout_ms);
            if n < 0 {
                return -1;
            }
            total += n;
            buf = &buf[n as usize..];
        }
        total
    }

    /// The raw descriptor.
    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for TcpStream {
    fn drop(&mut self) {
        close_tracked(self.fd);
    }
}

fn sockaddr_v4(ip: Ipv4Addr, port: u16) -> libc::sockaddr_in {
    libc::sockaddr_in {
        sin_family: libc::AF_INET as libc::sa_family_t,
        sin_port: port.to_be(),
        sin_addr: libc::in_addr {
            s_addr: u32::from(ip).to_be(),
        },
        sin_zero: [0; 8],
    }
}

/// Close through the runtime when a scheduler is installed (waiters must be
/// cancelled); fall back to a plain close otherwise.
fn close_tracked(fd: RawFd) {
    if tls::is_installed() {
        crate::close(fd);
    } else {
        unsafe {
            libc::close(fd);
        }
    }
}
