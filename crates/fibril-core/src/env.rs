//! Environment-driven configuration helpers
//!
//! Every runtime knob (`FIBRIL_*`) is read through here. A variable that is
//! set but does not parse falls back to the default and logs a warning, so
//! a typo in a deployment environment surfaces instead of silently running
//! with defaults.

use std::str::FromStr;

use crate::kwarn;

/// Read `key` parsed as `T`, or return `default`.
///
/// Unset returns the default silently; set-but-invalid returns the default
/// with a warning.
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                kwarn!("{}={:?} did not parse, using the default", key, raw);
                default
            }
        },
        Err(_) => default,
    }
}

/// Read `key` as a boolean.
///
/// "1", "true", "yes", "on" (case-insensitive) are true; any other set
/// value is false; unset returns the default.
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(raw) => matches!(raw.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
