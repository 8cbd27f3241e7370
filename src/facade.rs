// Copyright (c) 2022-2023 Yuki Kishimoto
// Copyright (c) 2023-2024 Rust Nostr Developers
// Distributed under the MIT software license

//! HTTP/WebSocket transport façade (spec §6)
//!
//! Grounded in `nostr-relay-builder/examples/hyper.rs`: a `hyper` `Service`
//! that inspects the `Connection`/`Upgrade` headers and performs the
//! WebSocket handshake by hand via `derive_accept_key`, rather than going
//! through `tungstenite`'s own handshake helper. Everything past the
//! handshake (the per-connection read/write loop) is grounded in
//! `nostr-relay-builder/src/local/internal.rs::handle_connection`'s
//! `tokio::select!` shape.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;

use base64::prelude::*;
use futures_util::{SinkExt, StreamExt};
use hyper::body::Incoming;
use hyper::header::{ACCEPT, CONNECTION, CONTENT_TYPE, HOST, SEC_WEBSOCKET_ACCEPT, UPGRADE};
use hyper::service::Service;
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use sha1::{Digest, Sha1};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::{Message, Role};
use tokio_tungstenite::WebSocketStream;

use crate::broadcast::Registry;
use crate::config::Config;
use crate::connection::{router, Connection, ConnectionId};
use crate::message::RelayMessage;
use crate::store::Store;

/// RFC 6455 §1.3 handshake GUID
const WS_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

const LANDING_PAGE: &str =
    "<html><body><h1>A Nostr relay</h1><p>Speak the protocol on this same URL.</p></body></html>";

/// Derive the `Sec-WebSocket-Accept` response header from the client's
/// `Sec-WebSocket-Key`, ported from
/// `nostr-relay-builder/examples/hyper.rs::derive_accept_key`.
fn derive_accept_key(request_key: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(request_key);
    hasher.update(WS_GUID);
    BASE64_STANDARD.encode(hasher.finalize())
}

/// State shared by every connection and every request (spec §5 "shared
/// resources")
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<Store>,
    pub registry: Arc<Registry>,
}

/// The hyper [`Service`] answering every request on the relay's single root
/// path (spec §6 "Transport")
#[derive(Clone)]
pub struct RelayService {
    pub state: AppState,
    pub remote: SocketAddr,
    /// The relay's own listen address, used as the AUTH relay-url fallback
    /// when a request carries no `Host` header (spec §4.6 "On open").
    pub listen_addr: SocketAddr,
}

impl Service<Request<Incoming>> for RelayService {
    type Response = Response<String>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        if is_websocket_upgrade(req.headers()) {
            return self.upgrade(req);
        }

        if req.uri().path() == "/health" {
            return Box::pin(async move {
                Ok(Response::builder().status(200).body("OK".to_string()).unwrap())
            });
        }

        if wants_nip11(req.headers()) {
            let document = self.state.config.nip11_document().to_string();
            return Box::pin(async move {
                Ok(Response::builder()
                    .status(200)
                    .header(CONTENT_TYPE, "application/nostr+json")
                    .header("access-control-allow-origin", "*")
                    .body(document)
                    .unwrap())
            });
        }

        Box::pin(async move {
            Ok(Response::builder()
                .status(200)
                .header(CONTENT_TYPE, "text/html")
                .body(LANDING_PAGE.to_string())
                .unwrap())
        })
    }
}

impl RelayService {
    fn upgrade(&self, req: Request<Incoming>) -> Pin<Box<dyn Future<Output = Result<Response<String>, Infallible>> + Send>> {
        let Some(accept_key) = req
            .headers()
            .get("sec-websocket-key")
            .map(|k| derive_accept_key(k.as_bytes()))
        else {
            return Box::pin(async move {
                Ok(Response::builder()
                    .status(400)
                    .body("missing Sec-WebSocket-Key".to_string())
                    .unwrap())
            });
        };

        let relay_url = relay_url_from_host(req.headers(), self.listen_addr);

        let state = self.state.clone();
        tokio::spawn(async move {
            match hyper::upgrade::on(req).await {
                Ok(upgraded) => {
                    let io = TokioIo::new(upgraded);
                    let ws = WebSocketStream::from_raw_socket(io, Role::Server, None).await;
                    serve_connection(ws, state, relay_url).await;
                }
                Err(err) => tracing::error!(%err, "websocket upgrade failed"),
            }
        });

        Box::pin(async move {
            Ok(Response::builder()
                .status(101)
                .header(CONNECTION, "upgrade")
                .header(UPGRADE, "websocket")
                .header(SEC_WEBSOCKET_ACCEPT, accept_key)
                .body(String::new())
                .unwrap())
        })
    }
}

/// The relay URL a client signs into its AUTH event's `relay` tag is the
/// dialed address, i.e. this request's `Host` header — never the remote peer
/// address, which is the *client's* socket (spec §4.6 "On open": "the relay
/// URL derived from the request"). Fall back to the relay's own bind address
/// when a request carries no `Host` header.
fn relay_url_from_host(headers: &hyper::HeaderMap, listen_addr: SocketAddr) -> String {
    headers
        .get(HOST)
        .and_then(|v| v.to_str().ok())
        .map(|host| format!("ws://{host}"))
        .unwrap_or_else(|| format!("ws://{listen_addr}"))
}

fn is_websocket_upgrade(headers: &hyper::HeaderMap) -> bool {
    let connection_upgrade = headers
        .get(CONNECTION)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_lowercase().contains("upgrade"))
        .unwrap_or(false);
    let upgrade_websocket = headers
        .get(UPGRADE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);
    connection_upgrade && upgrade_websocket
}

fn wants_nip11(headers: &hyper::HeaderMap) -> bool {
    headers
        .get(ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/nostr+json"))
        .unwrap_or(false)
}

/// Drive one upgraded WebSocket connection end to end: register it, send the
/// opening AUTH challenge, then alternate between inbound frames and
/// outbound frames produced by the router or the broadcast engine until
/// either side closes (spec §4.6 "On open", §5 "per-connection ordering").
async fn serve_connection<S>(ws: WebSocketStream<S>, state: AppState, relay_url: String)
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
    let (mut tx, mut rx) = ws.split();
    let (sender, mut outbound) = mpsc::unbounded_channel::<String>();

    let id = ConnectionId::next();
    let connection = Arc::new(Connection::new(
        id,
        sender,
        relay_url,
        state.config.limits.events_per_minute,
    ));
    state.registry.register(connection.clone());

    connection.send(
        RelayMessage::Auth {
            challenge: &connection.challenge(),
        }
        .to_json(),
    );

    let limits = state.config.limits.clone();
    loop {
        tokio::select! {
            frame = outbound.recv() => {
                match frame {
                    Some(frame) => {
                        if tx.send(Message::Text(frame)).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            message = rx.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        if text.len() > limits.max_message_length {
                            connection.send(
                                RelayMessage::Notice("error: message too large".to_string()).to_json(),
                            );
                            continue;
                        }
                        router::handle_frame(&connection, &state.store, &state.registry, &limits, &text).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        connection.send(
                            RelayMessage::Notice("error: binary messages are not supported".to_string())
                                .to_json(),
                        );
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = tx.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(Message::Pong(_) | Message::Frame(_))) => {}
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(err)) => {
                        tracing::debug!(%err, "websocket read error");
                        break;
                    }
                }
            }
        }
    }

    state.registry.unregister(id);
}

/// Run the periodic, non-overlapping expiration sweep (spec §4.4
/// `cleanup-expired-events`, §5 "scheduled every 3600 s")
pub async fn run_expiration_sweep(store: Arc<Store>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(3600));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        interval.tick().await;
        match store.cleanup_expired_events() {
            Ok(deleted) => {
                if deleted > 0 {
                    tracing::info!(deleted, "expiration sweep removed events");
                }
            }
            Err(err) => tracing::warn!(%err, "expiration sweep failed, retrying next tick"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// RFC 6455 §1.3's own worked example
    #[test]
    fn derives_accept_key_per_rfc6455_example() {
        let accept = derive_accept_key(b"dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn websocket_upgrade_headers_are_case_insensitive() {
        let req = Request::builder()
            .header(CONNECTION, "Upgrade")
            .header(UPGRADE, "WebSocket")
            .body(())
            .unwrap();
        assert!(is_websocket_upgrade(req.headers()));
    }

    #[test]
    fn missing_upgrade_header_is_not_a_websocket_request() {
        let req = Request::builder().header(CONNECTION, "keep-alive").body(()).unwrap();
        assert!(!is_websocket_upgrade(req.headers()));
    }

    #[test]
    fn nip11_accept_header_is_detected() {
        let req = Request::builder()
            .header(ACCEPT, "application/nostr+json")
            .body(())
            .unwrap();
        assert!(wants_nip11(req.headers()));
    }

    #[test]
    fn plain_accept_header_does_not_request_nip11() {
        let req = Request::builder().header(ACCEPT, "text/html").body(()).unwrap();
        assert!(!wants_nip11(req.headers()));
    }

    #[test]
    fn relay_url_is_derived_from_host_header_not_listen_addr() {
        let req = Request::builder().header(HOST, "relay.example.com").body(()).unwrap();
        let listen_addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        assert_eq!(
            relay_url_from_host(req.headers(), listen_addr),
            "ws://relay.example.com"
        );
    }

    #[test]
    fn relay_url_falls_back_to_listen_addr_without_host_header() {
        let req = Request::builder().body(()).unwrap();
        let listen_addr: SocketAddr = "0.0.0.0:8080".parse().unwrap();
        assert_eq!(
            relay_url_from_host(req.headers(), listen_addr),
            "ws://0.0.0.0:8080"
        );
    }
}
