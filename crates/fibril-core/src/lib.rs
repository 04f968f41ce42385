//! # fibril-core
//!
//! Platform-independent support for the fibril runtime:
//! - Error types shared by the runtime crates
//! - Environment variable helpers for configuration
//! - Thread-tagged leveled log macros (`kerror!`, `kwarn!`, `kinfo!`,
//!   `kdebug!`, `kfatal!`)

pub mod env;
pub mod error;
pub mod kprint;

pub use env::{env_get, env_get_bool};
pub use error::{MemoryError, PollError, RuntimeError, RuntimeResult};
pub use kprint::LogLevel;
