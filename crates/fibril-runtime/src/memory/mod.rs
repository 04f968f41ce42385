//! Fiber stack memory management
//!
//! Each fiber owns a fixed-size private anonymous mapping used as its stack.
//! The fiber control block is placed at the high end of the same mapping, so
//! one mmap/munmap pair covers the whole fiber lifetime.

#[cfg(unix)]
mod unix;

#[cfg(unix)]
pub use unix::{map_stack, unmap_stack};
