//! TCP echo server on the fibril runtime
//!
//! One fiber accepts connections; each connection gets its own fiber that
//! echoes until EOF. Everything runs on a single OS thread.
//!
//! # Environment Variables
//!
//! - `FIBRIL_ECHO_PORT=<port>` - Listen port (default: 7777)
//! - `FIBRIL_LOG_LEVEL=<level>` - off, error, warn, info, debug
//!
//! Try it: `cargo run --bin echo` then `nc 127.0.0.1 7777`.

use fibril::net::TcpListener;
use fibril::{kinfo, spawn, Runtime, RuntimeConfig};
use fibril_core::env_get;

fn main() {
    let port: u16 = env_get("FIBRIL_ECHO_PORT", 7777);

    let mut runtime = Runtime::new(RuntimeConfig::from_env());

    runtime.run(move || {
        spawn(move || {
            let listener = match TcpListener::bind(port) {
                Ok(listener) => listener,
                Err(err) => {
                    eprintln!("bind failed: errno {}", err);
                    return;
                }
            };
            kinfo!("echo server listening on port {}", port);

            loop {
                match listener.accept(-1) {
                    Ok(stream) => {
                        spawn(move || {
                            let mut buf = [0u8; 4096];
                            loop {
                                let n = stream.read(&mut buf, -1);
                                if n <= 0 {
                                    break;
                                }
                                if stream.write_all(&buf[..n as usize], -1) < 0 {
                                    break;
                                }
                            }
                        });
                    }
                    Err(err) => {
                        eprintln!("accept failed: errno {}", err);
                        return;
                    }
                }
            }
        });
    });
}
