//! Compile-time configuration defaults

/// Fiber stack mapping size (64 KiB, control block included)
pub const STACK_SIZE: usize = 64 * 1024;

/// Minimum allowed fiber stack size
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Host page size assumed for stack alignment checks
pub const PAGE_SIZE: usize = 4096;

/// Readiness events drained per poll
pub const POLL_EVENTS: usize = 256;
