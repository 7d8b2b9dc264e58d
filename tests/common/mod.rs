//! Shared utilities for integration and load testing.
#![allow(dead_code)]

use futures_util::future::BoxFuture;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use tsdb_relay::backend::{BackendClient, ClientFactory, Consistency};
use tsdb_relay::config::{BackendConfig, ConfigError, GroupConfig, RelayConfig, RuleConfig};
use tsdb_relay::write::{Destination, Outcome, WriteRequest};

/// In-process backend whose outcomes are scripted by the test.
#[derive(Debug)]
pub struct ScriptedClient {
    state: Mutex<Script>,
    calls: AtomicUsize,
    probes: AtomicUsize,
}

#[derive(Debug)]
struct Script {
    /// Outcomes used first, one per send.
    queued: VecDeque<Outcome>,
    /// Outcome once `queued` is exhausted.
    default: Outcome,
    probe: Outcome,
    delay: Duration,
    /// Payloads of every send, in call order.
    received: Vec<String>,
}

impl ScriptedClient {
    fn new() -> Self {
        Self {
            state: Mutex::new(Script {
                queued: VecDeque::new(),
                default: Outcome::Accepted,
                probe: Outcome::Accepted,
                delay: Duration::ZERO,
                received: Vec::new(),
            }),
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn respond(&self, outcome: Outcome) {
        self.state.lock().unwrap().default = outcome;
    }

    pub fn respond_once(&self, outcome: Outcome) {
        self.state.lock().unwrap().queued.push_back(outcome);
    }

    pub fn probe_with(&self, outcome: Outcome) {
        self.state.lock().unwrap().probe = outcome;
    }

    pub fn delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = delay;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn received(&self) -> Vec<String> {
        self.state.lock().unwrap().received.clone()
    }
}

impl BackendClient for ScriptedClient {
    fn send<'a>(&'a self, write: &'a WriteRequest, _timeout: Duration) -> BoxFuture<'a, Outcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (outcome, delay) = {
            let mut state = self.state.lock().unwrap();
            let outcome = state.queued.pop_front().unwrap_or_else(|| state.default.clone());
            state
                .received
                .push(String::from_utf8_lossy(&write.payload).to_string());
            (outcome, state.delay)
        };
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            outcome
        })
    }

    fn probe(&self, _timeout: Duration) -> BoxFuture<'_, Outcome> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let outcome = self.state.lock().unwrap().probe.clone();
        Box::pin(async move { outcome })
    }
}

/// Hands out one [`ScriptedClient`] per backend name, reused across reloads.
#[derive(Debug, Default)]
pub struct ScriptedFactory {
    clients: Mutex<HashMap<String, Arc<ScriptedClient>>>,
}

impl ScriptedFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn client(&self, name: &str) -> Arc<ScriptedClient> {
        self.clients
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(ScriptedClient::new()))
            .clone()
    }

    /// Total sends across every backend.
    pub fn total_calls(&self) -> usize {
        self.clients.lock().unwrap().values().map(|c| c.calls()).sum()
    }
}

impl ClientFactory for ScriptedFactory {
    fn build(&self, config: &BackendConfig) -> Result<Arc<dyn BackendClient>, ConfigError> {
        Ok(self.client(&config.name))
    }
}

/// Config with one rule sending database `db` to a single group of `members`.
pub fn relay_config(members: &[&str], consistency: Consistency) -> RelayConfig {
    let mut config = RelayConfig::default();
    for name in members {
        config
            .backends
            .push(BackendConfig::new(*name, format!("http://{}.invalid:8086", name)));
    }
    config.groups.push(GroupConfig::new("main", members, consistency));
    config.rules.push(RuleConfig {
        name: "db".into(),
        database: Some("db".into()),
        groups: vec!["main".into()],
        ..RuleConfig::default()
    });

    // Background loops are driven explicitly unless a test opts in.
    config.health.probe_enabled = false;
    config.health.degraded_after = 1;
    config.health.down_after = 1;
    config.retry_buffer.drain_interval_secs = 3600;
    config
}

pub fn write(tag: &str) -> WriteRequest {
    WriteRequest::new(Destination::new("db"), format!("cpu value={}", tag))
}

/// Poll `check` until it holds or `timeout` passes.
pub async fn wait_for<F: Fn() -> bool>(timeout: Duration, check: F) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}

/// A request seen by a [`start_programmable_backend`] server.
#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub method: String,
    pub target: String,
    pub body: String,
}

/// Start a programmable HTTP backend on an ephemeral port.
///
/// `f` picks the status and body for each request; every request is recorded.
pub async fn start_programmable_backend<F, Fut>(f: F) -> (SocketAddr, Arc<Mutex<Vec<ReceivedRequest>>>)
where
    F: Fn(ReceivedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let received = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let log = received.clone();
    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    let f = f.clone();
                    let log = log.clone();
                    tokio::spawn(async move {
                        serve_connection(socket, f, log).await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, received)
}

async fn serve_connection<F, Fut>(mut socket: TcpStream, f: Arc<F>, log: Arc<Mutex<Vec<ReceivedRequest>>>)
where
    F: Fn(ReceivedRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    log.lock().unwrap().push(request.clone());

    let (status, body) = f(request).await;
    let status_text = match status {
        200 => "200 OK",
        204 => "204 No Content",
        400 => "400 Bad Request",
        404 => "404 Not Found",
        408 => "408 Request Timeout",
        429 => "429 Too Many Requests",
        500 => "500 Internal Server Error",
        503 => "503 Service Unavailable",
        _ => "200 OK",
    };
    let response = if status == 204 {
        format!("HTTP/1.1 {}\r\nConnection: close\r\n\r\n", status_text)
    } else {
        format!(
            "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_text,
            body.len(),
            body
        )
    };
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> Option<ReceivedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let content_length = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body_end = buf.len().min(header_end + content_length);
    let body = String::from_utf8_lossy(&buf[header_end..body_end]).to_string();

    Some(ReceivedRequest {
        method,
        target,
        body,
    })
}
