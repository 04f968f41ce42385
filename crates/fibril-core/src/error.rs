//! Error types for the fibril runtime

use core::fmt;

/// Result type for runtime setup and bookkeeping operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Errors surfaced by the runtime's own machinery.
///
/// Syscall failures inside the I/O verbs are not represented here; those
/// follow the errno convention. Runtime misuse (verb without an installed
/// scheduler, nested installs) is not represented either: it aborts the
/// process instead of returning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Invalid configuration value
    InvalidConfig(&'static str),

    /// Fiber stack mapping failed
    Memory(MemoryError),

    /// Readiness poller failed
    Poll(PollError),
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::InvalidConfig(what) => write!(f, "invalid configuration: {}", what),
            RuntimeError::Memory(e) => write!(f, "memory error: {}", e),
            RuntimeError::Poll(e) => write!(f, "poll error: {}", e),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Fiber stack mapping errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap failed (errno attached)
    MapFailed(i32),

    /// munmap failed (errno attached)
    UnmapFailed(i32),

    /// Requested stack size too small to hold a fiber control block
    StackTooSmall,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::MapFailed(errno) => write!(f, "mmap failed (errno {})", errno),
            MemoryError::UnmapFailed(errno) => write!(f, "munmap failed (errno {})", errno),
            MemoryError::StackTooSmall => write!(f, "stack size too small for fiber"),
        }
    }
}

impl From<MemoryError> for RuntimeError {
    fn from(e: MemoryError) -> Self {
        RuntimeError::Memory(e)
    }
}

/// Readiness poller errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollError {
    /// Poller backend creation failed (errno attached)
    CreateFailed(i32),

    /// Descriptor registration failed (errno attached)
    RegisterFailed(i32),
}

impl fmt::Display for PollError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PollError::CreateFailed(errno) => write!(f, "poller creation failed (errno {})", errno),
            PollError::RegisterFailed(errno) => write!(f, "descriptor registration failed (errno {})", errno),
        }
    }
}

impl From<PollError> for RuntimeError {
    fn from(e: PollError) -> Self {
        RuntimeError::Poll(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = RuntimeError::InvalidConfig("stack_size below minimum");
        assert_eq!(
            format!("{}", e),
            "invalid configuration: stack_size below minimum"
        );

        let e = RuntimeError::Memory(MemoryError::MapFailed(12));
        assert_eq!(format!("{}", e), "memory error: mmap failed (errno 12)");
    }

    #[test]
    fn test_error_conversion() {
        let mem_err = MemoryError::StackTooSmall;
        let rt_err: RuntimeError = mem_err.into();
        assert!(matches!(rt_err, RuntimeError::Memory(MemoryError::StackTooSmall)));

        let poll_err = PollError::CreateFailed(24);
        let rt_err: RuntimeError = poll_err.into();
        assert!(matches!(rt_err, RuntimeError::Poll(PollError::CreateFailed(24))));
    }
}
