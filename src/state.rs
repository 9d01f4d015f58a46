//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared
//! resources: the loaded configuration, the bridge settings, the connection
//! store, and the print service.

use crate::bridge::BridgeConfig;
use crate::config::Config;
use crate::print::PrintService;
use crate::store::ConnectionStore;
use std::sync::Arc;

/// The shared application state, created once at startup and passed to all
/// handlers behind an `Arc`.
pub struct AppState {
    pub config: Arc<Config>,
    pub bridge: BridgeConfig,
    pub store: ConnectionStore,
    pub printer: PrintService,
}
