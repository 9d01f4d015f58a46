//! WebVNC Gateway Library Crate
//!
//! This library contains all the core logic for the WebVNC gateway service:
//! the WebSocket-to-TCP bridge that carries VNC sessions into the browser,
//! plus the surrounding REST surface for file transfer, printing, and the
//! persisted VNC connection list. The `bin/server.rs` binary is a thin
//! wrapper around this library.

pub mod bridge;
pub mod config;
pub mod handlers;
pub mod models;
pub mod print;
pub mod router;
pub mod state;
pub mod store;
