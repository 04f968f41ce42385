//! Leveled stderr logging for the runtime
//!
//! Each line carries the emitting thread's name. The runtime hosts one
//! scheduler per thread, so the thread name is what tells concurrent
//! schedulers apart in interleaved output.
//!
//! A whole line is formatted into one buffer and written with a single
//! call, so lines from different threads never shear.
//!
//! # Environment Variables
//!
//! - `FIBRIL_LOG_LEVEL=<level>` - off, error, warn, info, debug (default: info)
//! - `FIBRIL_LOG_FLUSH=1` - flush stderr after every line
//!
//! # Usage
//!
//! ```ignore
//! use fibril_core::{kdebug, kinfo, kerror};
//!
//! kinfo!("echo server listening on port {}", port);
//! kdebug!("close cancelled {} waiter(s)", n);
//! kerror!("mmap failed: {}", err);
//! ```

use std::fmt::{self, Write as _};
use std::io::Write as _;
use std::sync::OnceLock;

/// Log levels, most severe first
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
}

impl LogLevel {
    fn prefix(self) -> &'static str {
        match self {
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN ]",
            LogLevel::Info => "[INFO ]",
            LogLevel::Debug => "[DEBUG]",
        }
    }
}

struct LogConfig {
    /// Highest level that gets written; 0 silences everything
    max_level: u8,
    flush: bool,
}

static CONFIG: OnceLock<LogConfig> = OnceLock::new();

fn config() -> &'static LogConfig {
    CONFIG.get_or_init(|| LogConfig {
        max_level: std::env::var("FIBRIL_LOG_LEVEL")
            .map(|raw| parse_level(&raw))
            .unwrap_or(LogLevel::Info as u8),
        flush: crate::env::env_get_bool("FIBRIL_LOG_FLUSH", false),
    })
}

fn parse_level(raw: &str) -> u8 {
    match raw.to_lowercase().as_str() {
        "off" | "0" => 0,
        "error" | "1" => LogLevel::Error as u8,
        "warn" | "2" => LogLevel::Warn as u8,
        "info" | "3" => LogLevel::Info as u8,
        "debug" | "4" => LogLevel::Debug as u8,
        _ => LogLevel::Info as u8,
    }
}

/// Whether lines at `level` are currently written.
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level as u8 <= config().max_level
}

/// Internal: format and write one tagged line.
#[doc(hidden)]
pub fn log(level: LogLevel, args: fmt::Arguments<'_>) {
    if !level_enabled(level) {
        return;
    }

    let thread = std::thread::current();
    let mut line = String::with_capacity(96);
    let _ = write!(
        line,
        "{} fibril[{}] ",
        level.prefix(),
        thread.name().unwrap_or("-")
    );
    let _ = line.write_fmt(args);
    line.push('\n');

    let stderr = std::io::stderr();
    let mut handle = stderr.lock();
    let _ = handle.write_all(line.as_bytes());
    if config().flush {
        let _ = handle.flush();
    }
}

/// Error level log
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => {{
        $crate::kprint::log($crate::kprint::LogLevel::Error, format_args!($($arg)*));
    }};
}

/// Warning level log
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => {{
        $crate::kprint::log($crate::kprint::LogLevel::Warn, format_args!($($arg)*));
    }};
}

/// Info level log
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => {{
        $crate::kprint::log($crate::kprint::LogLevel::Info, format_args!($($arg)*));
    }};
}

/// Debug level log (most verbose)
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => {{
        $crate::kprint::log($crate::kprint::LogLevel::Debug, format_args!($($arg)*));
    }};
}

/// Log an error and abort the process.
///
/// Used for unrecoverable host failures (stack mapping, poller setup)
/// and for runtime misuse that must not continue.
#[macro_export]
macro_rules! kfatal {
    ($($arg:tt)*) => {{
        $crate::kprint::log($crate::kprint::LogLevel::Error, format_args!($($arg)*));
        ::std::process::abort();
    }};
}
