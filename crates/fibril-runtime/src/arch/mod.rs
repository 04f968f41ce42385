//! Architecture-specific context switching
//!
//! Three primitives implement stackful fiber switching:
//!
//! - `save_context` records the callee-saved register state and returns 0.
//!   When another context later resumes it, the same call returns again
//!   with the nonzero status delivered by `restore_context`.
//! - `restore_context` jumps to a previously saved context, delivering a
//!   nonzero status value. It never returns.
//! - `enter_fiber` installs a fresh stack pointer and calls the fiber start
//!   function. This is the only switch path that does not resume a saved
//!   context. It never returns.
//!
//! Status convention: 1 = normal wake; negative = errno to report (the
//! suspended operation reports `errno = -status`). Zero is reserved for the
//! "just saved" return of `save_context` and is never delivered as a wake.

#[cfg(target_arch = "x86_64")]
pub mod x86_64;

#[cfg(target_arch = "aarch64")]
pub mod aarch64;

#[cfg(target_arch = "x86_64")]
pub use x86_64::{enter_fiber, restore_context, save_context, Context};

#[cfg(target_arch = "aarch64")]
pub use aarch64::{enter_fiber, restore_context, save_context, Context};
