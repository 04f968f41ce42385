//! Basic fibril example
//!
//! Spawns a handful of fibers that yield and sleep cooperatively.
//!
//! # Environment Variables
//!
//! - `FIBRIL_FIBERS=<n>` - Number of fibers to spawn (default: 3)
//! - `FIBRIL_YIELDS=<n>` - Number of yields per fiber (default: 3)
//! - `FIBRIL_LOG_LEVEL=<level>` - off, error, warn, info, debug
//! - `FIBRIL_LOG_FLUSH=1` - Flush output immediately

use fibril::{sleep, spawn, yield_now, Runtime, RuntimeConfig};
use fibril_core::env_get;

fn main() {
    println!("=== fibril basic example ===\n");

    let num_fibers: usize = env_get("FIBRIL_FIBERS", 3);
    let num_yields: usize = env_get("FIBRIL_YIELDS", 3);

    println!("Configuration:");
    println!("  Fibers: {}, yields per fiber: {}", num_fibers, num_yields);
    println!();

    let mut runtime = Runtime::new(RuntimeConfig::from_env());

    runtime.run(|| {
        for i in 1..=num_fibers {
            spawn(move || {
                println!("fiber {} started", i);
                for j in 0..num_yields {
                    println!("fiber {} iteration {}", i, j);
                    yield_now();
                }
                sleep(10 * i as i32);
                println!("fiber {} finished", i);
            });
        }
    });

    println!("\n=== all fibers completed ===");
}
