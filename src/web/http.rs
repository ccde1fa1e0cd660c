//! HTTP server for the configuration API and captive portal page.
//!
//! Uses `tiny_http`, which works on both host and ESP32 (via std::net).
//! Requests are served one at a time from a single thread; a scan holds
//! the loop for at most [`SCAN_REPLY_TIMEOUT`](crate::wifi::SCAN_REPLY_TIMEOUT).

use super::api::{ApiResponse, ApiRouter, NO_CACHE_HEADERS};
use log::{debug, error, info, warn};
use std::io::{self, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tiny_http::{Header, Response, Server};

/// Default HTTP port.
pub const HTTP_PORT: u16 = 80;

/// Request bodies beyond this are truncated (and fail JSON parsing).
const MAX_BODY_LEN: u64 = 4096;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Background HTTP server. Drop it to stop.
pub struct HttpServer {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    port: u16,
}

impl HttpServer {
    /// Bind `0.0.0.0:port` and start serving `router`.
    pub fn start(port: u16, router: Arc<ApiRouter>) -> io::Result<Self> {
        let addr = format!("0.0.0.0:{}", port);
        let server = Server::http(&addr)
            .map_err(|e| io::Error::new(io::ErrorKind::AddrInUse, format!("{}", e)))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|a| a.port())
            .unwrap_or(port);

        info!("[http] listening on port {}", port);

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handle = thread::Builder::new()
            .name("http".into())
            .stack_size(12 * 1024)
            .spawn(move || run_server(server, router, shutdown_clone))?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            port,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Stop the server. May take up to the poll interval.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
            info!("[http] stopped");
        }
    }
}

impl Drop for HttpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_server(server: Server, router: Arc<ApiRouter>, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        let mut request = match server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                error!("[http] server error: {}", e);
                break;
            }
        };

        let mut body = String::new();
        if let Err(e) = request
            .as_reader()
            .take(MAX_BODY_LEN)
            .read_to_string(&mut body)
        {
            debug!("[http] unreadable body: {}", e);
            body.clear();
        }

        let method = request.method().clone();
        let url = request.url().to_string();
        let response = router.handle(&method, &url, &body);
        debug!("[http] {} {} -> {}", method, url, response.status);

        if let Err(e) = request.respond(to_tiny(response)) {
            warn!("[http] failed to send response: {}", e);
        }
    }
}

fn header(name: &str, value: &str) -> Option<Header> {
    Header::from_bytes(name.as_bytes(), value.as_bytes()).ok()
}

fn to_tiny(response: ApiResponse) -> Response<io::Cursor<Vec<u8>>> {
    let mut out = Response::from_data(response.body.into_bytes()).with_status_code(response.status);

    let mut headers: Vec<Option<Header>> = vec![header("Content-Type", response.content_type)];
    headers.extend(NO_CACHE_HEADERS.iter().map(|(n, v)| header(n, v)));
    if let Some(location) = response.location.as_deref() {
        headers.push(header("Location", location));
    }
    if let Some(allow) = response.allow {
        headers.push(header("Allow", allow));
    }
    for h in headers.into_iter().flatten() {
        out.add_header(h);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outbound::RecordingSink;
    use crate::session::SessionState;
    use crate::store::{ConfigStore, MemoryStore};
    use crate::wifi::{wifi_channel, WifiStatus};
    use std::io::Write;
    use std::net::TcpStream;
    use std::sync::Mutex;

    fn start() -> HttpServer {
        let session = SessionState::load(ConfigStore::new(MemoryStore::new()));
        let status = Arc::new(Mutex::new(WifiStatus::default()));
        let (handle, _requests) = wifi_channel(status);
        let router = ApiRouter::new(session, Arc::new(handle), RecordingSink::new());
        HttpServer::start(0, Arc::new(router)).unwrap()
    }

    fn request(port: u16, raw: &str) -> String {
        let mut stream = TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        stream.write_all(raw.as_bytes()).unwrap();
        let mut reply = String::new();
        stream.read_to_string(&mut reply).unwrap();
        reply
    }

    #[test]
    fn test_serves_config_with_no_cache_headers() {
        let server = start();
        let reply = request(
            server.port(),
            "GET /api/transport HTTP/1.0\r\nHost: x\r\n\r\n",
        );
        assert!(reply.starts_with("HTTP/1.0 200") || reply.starts_with("HTTP/1.1 200"));
        assert!(reply.contains("Cache-Control: no-store, no-cache, must-revalidate"));
        assert!(reply.contains("Content-Type: application/json"));
        assert!(reply.contains(r#""mode":"uart""#));
    }

    #[test]
    fn test_post_body_reaches_router() {
        let server = start();
        let body = r#"{"uart":{"baud":12345}}"#;
        let raw = format!(
            "POST /api/config HTTP/1.0\r\nHost: x\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{}",
            body.len(),
            body
        );
        let reply = request(server.port(), &raw);
        assert!(reply.contains(" 400 "));
        assert!(reply.contains("Unsupported baud rate: 12345"));
    }

    #[test]
    fn test_stop_joins_thread() {
        let mut server = start();
        server.stop();
        assert!(server.handle.is_none());
    }
}
