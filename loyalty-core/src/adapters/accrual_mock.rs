//! Mock accrual authority for tests and local runs
//!
//! A tiny HTTP server on 127.0.0.1 that answers
//! `GET /api/orders/{number}` from a script of per-order replies. Orders
//! without a scripted reply get the default reply (204 unless changed).

use std::collections::HashMap;
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use rust_decimal::Decimal;
use serde_json::json;

use crate::domain::AccrualStatus;

/// What the mock answers for one order
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    /// 200 with a JSON report
    Report {
        status: AccrualStatus,
        accrual: Option<Decimal>,
    },
    /// 204, order not registered
    NotRegistered,
    /// 429 with an optional `Retry-After` in seconds
    RateLimited { retry_after_secs: Option<u64> },
    /// Any other status with a plain-text body
    Status(u16),
    /// 200 with a body that is not a report
    Malformed,
}

impl MockReply {
    pub fn processed(accrual: Decimal) -> Self {
        MockReply::Report {
            status: AccrualStatus::Processed,
            accrual: Some(accrual),
        }
    }

    pub fn status(status: AccrualStatus) -> Self {
        MockReply::Report {
            status,
            accrual: None,
        }
    }
}

#[derive(Debug)]
struct Script {
    replies: HashMap<String, MockReply>,
    default: MockReply,
    delay: Duration,
}

#[derive(Debug)]
struct Shared {
    script: Mutex<Script>,
    requests: AtomicUsize,
}

impl Shared {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Scriptable stand-in for the accrual authority
pub struct MockAccrualServer {
    port: u16,
    shared: Arc<Shared>,
    running: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

impl MockAccrualServer {
    /// Start on a random free port
    pub fn start() -> std::io::Result<Self> {
        Self::start_on_port(0)
    }

    /// Start on `port` (0 for random)
    pub fn start_on_port(port: u16) -> std::io::Result<Self> {
        let listener = TcpListener::bind(format!("127.0.0.1:{}", port))?;
        let actual_port = listener.local_addr()?.port();
        listener.set_nonblocking(true)?;

        let shared = Arc::new(Shared {
            script: Mutex::new(Script {
                replies: HashMap::new(),
                default: MockReply::NotRegistered,
                delay: Duration::ZERO,
            }),
            requests: AtomicUsize::new(0),
        });
        let running = Arc::new(AtomicBool::new(true));

        let thread_shared = Arc::clone(&shared);
        let thread_running = Arc::clone(&running);
        let thread_handle = thread::spawn(move || {
            while thread_running.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let shared = Arc::clone(&thread_shared);
                        thread::spawn(move || handle_connection(stream, &shared));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port: actual_port,
            shared,
            running,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Script the reply for one order
    pub fn set_reply(&self, order_id: &str, reply: MockReply) {
        self.shared
            .script()
            .replies
            .insert(order_id.to_string(), reply);
    }

    /// Reply used for orders without a scripted reply
    pub fn set_default_reply(&self, reply: MockReply) {
        self.shared.script().default = reply;
    }

    /// Delay every response, e.g. to trigger client timeouts
    pub fn set_delay(&self, delay: Duration) {
        self.shared.script().delay = delay;
    }

    /// Number of order queries served so far
    pub fn request_count(&self) -> usize {
        self.shared.requests.load(Ordering::SeqCst)
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockAccrualServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn handle_connection(mut stream: TcpStream, shared: &Shared) {
    let _ = stream.set_nonblocking(false);
    let mut buffer = [0; 4096];
    let Ok(n) = stream.read(&mut buffer) else {
        return;
    };
    let request = String::from_utf8_lossy(&buffer[..n]);

    let first_line = request.lines().next().unwrap_or("");
    let parts: Vec<&str> = first_line.split_whitespace().collect();
    if parts.len() < 2 || parts[0] != "GET" {
        send_response(&mut stream, 405, "Method Not Allowed", &[], "");
        return;
    }

    let Some(order_id) = parts[1].strip_prefix("/api/orders/") else {
        send_response(&mut stream, 404, "Not Found", &[], "");
        return;
    };
    shared.requests.fetch_add(1, Ordering::SeqCst);

    let (reply, delay) = {
        let script = shared.script();
        let reply = script
            .replies
            .get(order_id)
            .cloned()
            .unwrap_or_else(|| script.default.clone());
        (reply, script.delay)
    };
    if !delay.is_zero() {
        thread::sleep(delay);
    }

    match reply {
        MockReply::Report { status, accrual } => {
            let mut body = json!({ "order": order_id, "status": status });
            if let Some(accrual) = accrual {
                // a JSON number, as the real authority sends it
                body["accrual"] = serde_json::from_str(&accrual.to_string()).unwrap_or_default();
            }
            send_response(&mut stream, 200, "OK", &[], &body.to_string());
        }
        MockReply::NotRegistered => send_response(&mut stream, 204, "No Content", &[], ""),
        MockReply::RateLimited { retry_after_secs } => {
            let header = retry_after_secs.map(|s| format!("Retry-After: {s}"));
            let headers: Vec<&str> = header.iter().map(String::as_str).collect();
            send_response(
                &mut stream,
                429,
                "Too Many Requests",
                &headers,
                "No more than N requests per minute allowed",
            );
        }
        MockReply::Status(code) => send_response(&mut stream, code, "Error", &[], "mock error"),
        MockReply::Malformed => send_response(&mut stream, 200, "OK", &[], "{\"order\":"),
    }
}

fn send_response(
    stream: &mut TcpStream,
    status: u16,
    status_text: &str,
    headers: &[&str],
    body: &str,
) {
    let mut response = format!("HTTP/1.1 {} {}\r\n", status, status_text);
    if status == 200 {
        response.push_str("Content-Type: application/json\r\n");
    } else if !body.is_empty() {
        response.push_str("Content-Type: text/plain\r\n");
    }
    for header in headers {
        response.push_str(header);
        response.push_str("\r\n");
    }
    if status != 204 {
        response.push_str(&format!("Content-Length: {}\r\n", body.len()));
    }
    response.push_str("Connection: close\r\n\r\n");
    if status != 204 {
        response.push_str(body);
    }
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}
