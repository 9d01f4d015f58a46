//! The websockify bridge.
//!
//! Browser clients speak WebSocket; VNC servers speak raw TCP. This module
//! splices the two together:
//!
//! - `factory`: upgrades the HTTP request, picks and resolves the target
//!   address, dials it, and starts the session.
//! - `session`: the paired WebSocket + TCP connection and the two
//!   forwarding loops that relay bytes until either side fails.

pub mod factory;
pub mod session;

pub use factory::ws_handler;

use std::time::Duration;

/// Settings for the websockify bridge, fixed at process startup.
#[derive(Clone, Debug)]
pub struct BridgeConfig {
    /// Target TCP address used when the request does not name one.
    pub default_target: String,
    /// Size of the TCP read buffer; one read becomes one WebSocket message.
    pub buffer_size: usize,
    /// Applied to the initial dial and to every redial.
    pub dial_timeout: Duration,
    /// Deadline for a single TCP read; zero disables it.
    pub read_timeout: Duration,
    /// Deadline for a single TCP write; zero disables it.
    pub write_timeout: Duration,
    /// Cadence of WebSocket Ping frames; zero disables them.
    pub heartbeat_interval: Duration,
    /// Whether the `host` query parameter may override the default target.
    pub allow_custom_target: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_target: "localhost:5900".to_string(),
            buffer_size: 65536,
            dial_timeout: Duration::from_secs(10),
            read_timeout: Duration::ZERO,
            write_timeout: Duration::ZERO,
            heartbeat_interval: Duration::ZERO,
            allow_custom_target: true,
        }
    }
}
