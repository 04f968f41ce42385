//! # fibril-runtime
//!
//! Single-threaded cooperative fiber runtime for nonblocking I/O.
//!
//! This crate provides:
//! - Stackful fiber context switching (architecture-specific assembly)
//! - Fiber stack mapping (mmap)
//! - A min-heap timer and an epoll readiness poller
//! - The scheduler: ready/dead queues, run loop, suspension primitives
//! - Syscall verbs that suspend the calling fiber instead of blocking

pub mod arch;
pub mod config;
pub mod fiber;
pub mod iopoll;
pub mod memory;
pub mod scheduler;
pub mod syscall;
pub mod timer;
pub mod tls;

pub use config::RuntimeConfig;
pub use iopoll::Interest;
pub use scheduler::Scheduler;

// Architecture detection
cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub use arch::x86_64 as current_arch;
    } else if #[cfg(target_arch = "aarch64")] {
        pub use arch::aarch64 as current_arch;
    } else {
        compile_error!("Unsupported architecture");
    }
}
