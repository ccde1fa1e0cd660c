//! Network-facing surfaces: HTTP configuration API and WebSocket transport.
//!
//! # Components
//!
//! - [`ApiRouter`] - request handling for the configuration API and portal
//! - [`HttpServer`] - `tiny_http` front end for the router
//! - [`WebSocketTransport`] - command producer and event broadcaster
//! - [`WsServer`] - `tungstenite` sessions feeding the transport
//! - [`ClientRegistry`] - connected WebSocket clients

mod api;
mod clients;
mod http;
mod ws;
mod ws_server;

pub use api::{ApiError, ApiResponse, ApiRouter, WifiControl, NO_CACHE_HEADERS, PORTAL_PAGE};
pub use clients::{ClientRegistry, Outgoing};
pub use http::{HttpServer, HTTP_PORT};
pub use ws::{ClientSession, Rejection, WebSocketTransport, BROADCAST_RETRY_DELAY};
pub use ws_server::{WsServer, MAX_SESSIONS, WS_PATHS, WS_PORT};
