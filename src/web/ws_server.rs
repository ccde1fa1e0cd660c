//! WebSocket server over blocking `std::net` sockets.
//!
//! One accept thread plus one thread per session. Each session thread
//! alternates between a short socket read and draining the text queued for
//! its client, so replies and broadcasts never need a second writer.

use super::clients::Outgoing;
use super::ws::WebSocketTransport;
use log::{debug, info, warn};
use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::TryRecvError;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tungstenite::http::StatusCode;
use tungstenite::{Message, WebSocket};

/// Default WebSocket port.
pub const WS_PORT: u16 = 81;

/// Accepted upgrade paths.
pub const WS_PATHS: [&str; 2] = ["/ws", "/ws/hid"];

/// Concurrent sessions; further connections are dropped.
pub const MAX_SESSIONS: usize = 4;

const ACCEPT_POLL: Duration = Duration::from_millis(100);
const SOCKET_POLL: Duration = Duration::from_millis(50);
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Background WebSocket listener. Drop it to stop.
pub struct WsServer {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    port: u16,
}

impl WsServer {
    pub fn start(port: u16, transport: Arc<WebSocketTransport>) -> io::Result<Self> {
        let listener = TcpListener::bind(("0.0.0.0", port))?;
        listener.set_nonblocking(true)?;
        let port = listener.local_addr()?.port();
        info!("[ws] listening on port {} ({})", port, WS_PATHS.join(", "));

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handle = thread::Builder::new()
            .name("ws-accept".into())
            .stack_size(6 * 1024)
            .spawn(move || accept_loop(listener, transport, shutdown_clone))?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop accepting and ask session threads to close.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            info!("[ws] stopped");
        }
    }
}

impl Drop for WsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn accept_loop(listener: TcpListener, transport: Arc<WebSocketTransport>, shutdown: Arc<AtomicBool>) {
    let sessions = Arc::new(AtomicUsize::new(0));

    while !shutdown.load(Ordering::Acquire) {
        let (stream, peer) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                thread::sleep(ACCEPT_POLL);
                continue;
            }
            Err(e) => {
                warn!("[ws] accept failed: {}", e);
                thread::sleep(ACCEPT_POLL);
                continue;
            }
        };

        if sessions.load(Ordering::Acquire) >= MAX_SESSIONS {
            warn!("[ws] session limit reached, dropping {}", peer);
            continue;
        }

        sessions.fetch_add(1, Ordering::AcqRel);
        let transport = transport.clone();
        let shutdown = shutdown.clone();
        let counter = sessions.clone();
        let spawned = thread::Builder::new()
            .name("ws-session".into())
            .stack_size(10 * 1024)
            .spawn(move || {
                serve_session(stream, peer, &transport, &shutdown);
                counter.fetch_sub(1, Ordering::AcqRel);
            });
        if let Err(e) = spawned {
            warn!("[ws] could not spawn session thread: {}", e);
            sessions.fetch_sub(1, Ordering::AcqRel);
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> ErrorResponse {
    let mut response = ErrorResponse::new(Some(message.to_string()));
    *response.status_mut() = status;
    response
}

fn handshake(
    stream: TcpStream,
    transport: &WebSocketTransport,
) -> Result<WebSocket<TcpStream>, String> {
    stream.set_nonblocking(false).map_err(|e| e.to_string())?;
    stream
        .set_read_timeout(Some(HANDSHAKE_TIMEOUT))
        .map_err(|e| e.to_string())?;

    let check = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        if !WS_PATHS.contains(&request.uri().path()) {
            return Err(error_response(StatusCode::NOT_FOUND, "Not found"));
        }
        if !transport.is_enabled() {
            return Err(error_response(
                StatusCode::SERVICE_UNAVAILABLE,
                "WebSocket disabled",
            ));
        }
        Ok(response)
    };
    tungstenite::accept_hdr(stream, check).map_err(|e| e.to_string())
}

fn would_block(e: &tungstenite::Error) -> bool {
    matches!(
        e,
        tungstenite::Error::Io(err) if matches!(err.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut)
    )
}

fn serve_session(
    stream: TcpStream,
    peer: SocketAddr,
    transport: &WebSocketTransport,
    shutdown: &AtomicBool,
) {
    let mut ws = match handshake(stream, transport) {
        Ok(ws) => ws,
        Err(e) => {
            debug!("[ws] handshake with {} refused: {}", peer, e);
            return;
        }
    };
    let session = match transport.open_client() {
        Ok(session) => session,
        Err(rejection) => {
            debug!("[ws] {} refused: {}", peer, rejection.message());
            let _ = ws.close(None);
            let _ = ws.flush();
            return;
        }
    };
    if let Err(e) = ws.get_mut().set_read_timeout(Some(SOCKET_POLL)) {
        warn!("[ws] {}: cannot set read timeout: {}", session.id, e);
    }
    debug!("[ws] session {} from {}", session.id, peer);

    let mut unsent: Option<String> = None;
    'session: loop {
        loop {
            match session.outgoing.try_recv() {
                Ok(Outgoing::Reply(text)) => {
                    if let Err(e) = ws.send(Message::Text(text)) {
                        debug!("[ws] reply to {} failed: {}", session.id, e);
                        break 'session;
                    }
                }
                Ok(Outgoing::Event(text)) => {
                    if let Err(e) = ws.send(Message::Text(text.clone())) {
                        debug!("[ws] event to {} failed: {}", session.id, e);
                        unsent = Some(text);
                        break 'session;
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    // Registry closed us (transport switched away)
                    let _ = ws.close(None);
                    let _ = ws.flush();
                    break 'session;
                }
            }
        }

        if shutdown.load(Ordering::Acquire) {
            let _ = ws.close(None);
            let _ = ws.flush();
            break;
        }

        match ws.read() {
            Ok(Message::Text(text)) => {
                transport.on_text(session.id, &text);
            }
            Ok(Message::Binary(data)) => {
                debug!("[ws] {}: ignoring {} byte binary frame", session.id, data.len());
            }
            // Pongs to pings are queued by tungstenite and go out on flush
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
            Ok(Message::Close(_)) => {
                debug!("[ws] {} sent close", session.id);
                let _ = ws.flush();
                break;
            }
            Err(e) if would_block(&e) => {}
            Err(e) => {
                debug!("[ws] {} read ended: {}", session.id, e);
                break;
            }
        }

        if let Err(e) = ws.flush() {
            if !would_block(&e) {
                debug!("[ws] {} flush failed: {}", session.id, e);
                break;
            }
        }
    }

    transport.close_client(session.id);
    let mut undelivered: Vec<String> = unsent.into_iter().collect();
    undelivered.extend(session.take_undelivered_events());
    transport.requeue_undelivered(undelivered);
}
