//! Wildcard DNS responder.

use super::PortalError;
use log::{debug, info, warn};
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

pub const DNS_PORT: u16 = 53;

const HEADER_LEN: usize = 12;
const TYPE_A: u16 = 1;
const TYPE_ANY: u16 = 255;
const CLASS_IN: u16 = 1;
const ANSWER_TTL: u32 = 60;

/// Build a response to `query` that resolves every A question to `ip`.
///
/// Returns `None` for anything that is not a well-formed standard query;
/// such packets are dropped. Only the first question is answered.
pub fn build_response(query: &[u8], ip: Ipv4Addr) -> Option<Vec<u8>> {
    if query.len() < HEADER_LEN {
        return None;
    }
    // QR must be 0 (query) and OPCODE 0 (standard query)
    if query[2] & 0xF8 != 0 {
        return None;
    }
    let qdcount = u16::from_be_bytes([query[4], query[5]]);
    if qdcount == 0 {
        return None;
    }

    // Walk the QNAME labels
    let mut pos = HEADER_LEN;
    loop {
        let len = *query.get(pos)? as usize;
        if len == 0 {
            pos += 1;
            break;
        }
        // Compression pointers are not valid in a question
        if len & 0xC0 != 0 {
            return None;
        }
        pos += 1 + len;
    }
    let question_end = pos + 4;
    if query.len() < question_end {
        return None;
    }
    let qtype = u16::from_be_bytes([query[pos], query[pos + 1]]);
    let qclass = u16::from_be_bytes([query[pos + 2], query[pos + 3]]);
    let answer = (qtype == TYPE_A || qtype == TYPE_ANY) && qclass == CLASS_IN;

    let mut out = Vec::with_capacity(question_end + 16);
    out.extend_from_slice(&query[0..2]);
    // QR + AA, echo RD
    out.push(0x84 | (query[2] & 0x01));
    out.push(0x00);
    out.extend_from_slice(&1u16.to_be_bytes());
    out.extend_from_slice(&(answer as u16).to_be_bytes());
    out.extend_from_slice(&[0, 0, 0, 0]);
    out.extend_from_slice(&query[HEADER_LEN..question_end]);

    if answer {
        // Name: pointer to the question at offset 12
        out.extend_from_slice(&[0xC0, 0x0C]);
        out.extend_from_slice(&TYPE_A.to_be_bytes());
        out.extend_from_slice(&CLASS_IN.to_be_bytes());
        out.extend_from_slice(&ANSWER_TTL.to_be_bytes());
        out.extend_from_slice(&4u16.to_be_bytes());
        out.extend_from_slice(&ip.octets());
    }
    Some(out)
}

/// UDP server thread answering with [`build_response`].
///
/// Stops on drop.
pub struct DnsResponder {
    handle: Option<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    local_port: u16,
}

impl DnsResponder {
    pub fn start(ip: Ipv4Addr, port: u16) -> Result<Self, PortalError> {
        let socket = UdpSocket::bind(SocketAddr::from(([0, 0, 0, 0], port)))
            .map_err(PortalError::Bind)?;
        socket.set_read_timeout(Some(Duration::from_millis(100)))?;
        let local_port = socket.local_addr()?.port();

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let handle = thread::Builder::new()
            .name("dns".into())
            .stack_size(8192)
            .spawn(move || Self::run(socket, ip, shutdown_clone))
            .map_err(PortalError::Io)?;

        Ok(Self {
            handle: Some(handle),
            shutdown,
            local_port,
        })
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    fn run(socket: UdpSocket, ip: Ipv4Addr, shutdown: Arc<AtomicBool>) {
        let mut buf = [0u8; 512];
        while !shutdown.load(Ordering::Acquire) {
            match socket.recv_from(&mut buf) {
                Ok((len, peer)) => {
                    let Some(response) = build_response(&buf[..len], ip) else {
                        debug!("[portal] ignoring malformed query from {}", peer);
                        continue;
                    };
                    if let Err(e) = socket.send_to(&response, peer) {
                        debug!("[portal] reply to {} failed: {}", peer, e);
                    }
                }
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                    ) => {}
                Err(e) => {
                    warn!("[portal] DNS socket error: {}", e);
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }
        info!("[portal] DNS responder exiting");
    }

    /// Stop the thread and release the socket.
    ///
    /// May take up to 100ms due to the receive timeout.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for DnsResponder {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AP_IP: Ipv4Addr = Ipv4Addr::new(192, 168, 4, 1);

    fn query(name: &str, qtype: u16) -> Vec<u8> {
        let mut q = vec![0xAB, 0xCD, 0x01, 0x00, 0, 1, 0, 0, 0, 0, 0, 0];
        for label in name.split('.') {
            q.push(label.len() as u8);
            q.extend_from_slice(label.as_bytes());
        }
        q.push(0);
        q.extend_from_slice(&qtype.to_be_bytes());
        q.extend_from_slice(&CLASS_IN.to_be_bytes());
        q
    }

    #[test]
    fn test_a_query_answered_with_ap_ip() {
        let q = query("connectivitycheck.gstatic.com", TYPE_A);
        let r = build_response(&q, AP_IP).unwrap();

        assert_eq!(&r[0..2], &[0xAB, 0xCD]);
        assert_eq!(r[2] & 0x80, 0x80, "QR set");
        assert_eq!(r[2] & 0x01, 0x01, "RD echoed");
        assert_eq!(u16::from_be_bytes([r[6], r[7]]), 1, "one answer");
        assert_eq!(&r[HEADER_LEN..q.len()], &q[HEADER_LEN..]);
        assert_eq!(&r[r.len() - 4..], &AP_IP.octets());
    }

    #[test]
    fn test_aaaa_query_gets_empty_answer() {
        let q = query("example.com", 28);
        let r = build_response(&q, AP_IP).unwrap();
        assert_eq!(u16::from_be_bytes([r[6], r[7]]), 0);
        assert_eq!(r.len(), q.len());
    }

    #[test]
    fn test_malformed_queries_dropped() {
        assert!(build_response(&[0u8; 5], AP_IP).is_none());

        let mut response = query("example.com", TYPE_A);
        response[2] |= 0x80;
        assert!(build_response(&response, AP_IP).is_none());

        let mut truncated = query("example.com", TYPE_A);
        truncated.truncate(truncated.len() - 3);
        assert!(build_response(&truncated, AP_IP).is_none());

        let mut no_questions = query("example.com", TYPE_A);
        no_questions[5] = 0;
        assert!(build_response(&no_questions, AP_IP).is_none());
    }
}
