//! Turns an HTTP upgrade request into a running bridge session.
//!
//! Ordering matters here: the protocol upgrade happens first, then target
//! resolution, then the TCP dial. Anything that fails after the upgrade can
//! no longer produce an HTTP error, so it is reported to the client as a
//! WebSocket text frame before the socket is closed.

use super::{BridgeConfig, session::BridgeSession};
use crate::state::AppState;
use axum::{
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures_util::SinkExt;
use serde::Deserialize;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::lookup_host;
use tracing::{Instrument, info, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct BridgeQuery {
    /// Target `host:port`; honored only when custom targets are allowed.
    pub host: Option<String>,
}

/// Origin policy for the websockify endpoint. Every origin is accepted;
/// deployments that need an allow-list swap this predicate.
fn accept_origin(_origin: Option<&str>) -> bool {
    true
}

/// Axum handler for the websockify route.
///
/// Negotiates the `binary` subprotocol, picks the target address, and hands
/// the upgraded socket to [`handle_socket`]. Returns as soon as the upgrade
/// response is produced; the session runs in its own task.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<BridgeQuery>,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    if !accept_origin(origin) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let config = state.bridge.clone();
    let target = select_target(query.host.as_deref(), &config);
    let session_id = Uuid::new_v4();
    info!(%session_id, upstream = %target, "websockify connection requested");

    let span = tracing::info_span!("bridge_session", %session_id, upstream = %target);
    ws.protocols(["binary"])
        .on_upgrade(move |socket| handle_socket(socket, target, config).instrument(span))
}

/// Applies the custom-target policy: a non-empty `host` parameter wins when
/// allowed, otherwise the configured default is used.
fn select_target(requested: Option<&str>, config: &BridgeConfig) -> String {
    match requested {
        Some(host) if !host.is_empty() => {
            if config.allow_custom_target {
                host.to_string()
            } else {
                warn!(
                    requested = host,
                    "custom target requested but disabled, using default"
                );
                config.default_target.clone()
            }
        }
        _ => config.default_target.clone(),
    }
}

/// Runs once the upgrade completes: resolve, dial, then forward until the
/// session tears down.
async fn handle_socket(socket: WebSocket, target: String, config: BridgeConfig) {
    let addr = match resolve_target(&target).await {
        Ok(addr) => addr,
        Err(e) => {
            warn!(error = %e, upstream = %target, "failed to resolve target address");
            fail_socket(socket, format!("invalid target address {}: {}", target, e)).await;
            return;
        }
    };

    let mut session = match BridgeSession::connect(addr, &config).await {
        Ok(session) => session,
        Err(e) => {
            warn!(error = %e, %addr, "failed to dial target");
            fail_socket(socket, format!("dialing fail: {}", e)).await;
            return;
        }
    };
    session.set_buffer_size(config.buffer_size);

    info!(%addr, "bridge established");
    session.run(socket).await;
}

async fn resolve_target(target: &str) -> io::Result<SocketAddr> {
    lookup_host(target).await?.next().ok_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, "hostname resolved to no addresses")
    })
}

/// Reports a post-upgrade failure as a text frame, then closes the socket.
async fn fail_socket(mut socket: WebSocket, message: String) {
    let _ = socket.send(Message::Text(message.into())).await;
    let _ = socket.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(allow_custom_target: bool) -> BridgeConfig {
        BridgeConfig {
            default_target: "localhost:5900".to_string(),
            allow_custom_target,
            ..BridgeConfig::default()
        }
    }

    #[test]
    fn select_target_defaults_when_no_host_given() {
        assert_eq!(select_target(None, &config(true)), "localhost:5900");
    }

    #[test]
    fn select_target_defaults_when_host_is_empty() {
        assert_eq!(select_target(Some(""), &config(true)), "localhost:5900");
    }

    #[test]
    fn select_target_honors_custom_host() {
        assert_eq!(
            select_target(Some("10.0.0.5:5901"), &config(true)),
            "10.0.0.5:5901"
        );
    }

    #[test]
    fn select_target_ignores_custom_host_when_disabled() {
        assert_eq!(
            select_target(Some("10.0.0.5:5901"), &config(false)),
            "localhost:5900"
        );
    }

    #[test]
    fn origin_policy_accepts_everything() {
        assert!(accept_origin(None));
        assert!(accept_origin(Some("https://anywhere.example")));
    }

    #[tokio::test]
    async fn resolve_target_rejects_malformed_addresses() {
        assert!(resolve_target("not an address").await.is_err());
    }

    #[tokio::test]
    async fn resolve_target_accepts_host_port() {
        let addr = resolve_target("127.0.0.1:5900").await.unwrap();
        assert_eq!(addr.port(), 5900);
    }
}
