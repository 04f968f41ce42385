//! Runtime configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use fibril_runtime::config::RuntimeConfig;
//!
//! // Use defaults with env overrides
//! let config = RuntimeConfig::from_env();
//!
//! // Or customize programmatically
//! let config = RuntimeConfig::from_env().stack_size(128 * 1024);
//! ```

pub mod defaults;

use fibril_core::env::env_get;
use fibril_core::error::{RuntimeError, RuntimeResult};

/// Runtime configuration with builder-style setters.
///
/// Use `from_env()` to start with compile-time defaults and apply
/// any environment variable overrides.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Size of each fiber's stack mapping (control block included)
    pub stack_size: usize,
    /// Readiness events drained per poll
    pub poll_events: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `FIBRIL_STACK_SIZE` - Fiber stack size in bytes
    /// - `FIBRIL_POLL_EVENTS` - Readiness events drained per poll
    pub fn from_env() -> Self {
        Self {
            stack_size: env_get("FIBRIL_STACK_SIZE", defaults::STACK_SIZE),
            poll_events: env_get("FIBRIL_POLL_EVENTS", defaults::POLL_EVENTS),
        }
    }

    /// Set the fiber stack size
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    /// Set the per-poll event capacity
    pub fn poll_events(mut self, n: usize) -> Self {
        self.poll_events = n;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.stack_size < defaults::MIN_STACK_SIZE {
            return Err(RuntimeError::InvalidConfig("stack_size below minimum"));
        }
        if self.stack_size % defaults::PAGE_SIZE != 0 {
            return Err(RuntimeError::InvalidConfig("stack_size not page-aligned"));
        }
        if self.poll_events == 0 {
            return Err(RuntimeError::InvalidConfig("poll_events must be nonzero"));
        }
        Ok(())
    }
}
