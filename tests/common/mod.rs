//! Shared utilities for integration testing.
#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use hotgate::config::loader::save_config;
use hotgate::config::schema::{GatewayConfig, Route};
use hotgate::{Gateway, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// What an echo backend saw.
pub const SEEN_TARGET: &str = "x-seen-target";
pub const SEEN_FORWARDED_FOR: &str = "x-seen-forwarded-for";

/// Read the request head and return (request target, headers).
async fn read_head(socket: &mut TcpStream) -> Option<(String, Vec<(String, String)>)> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let head = String::from_utf8_lossy(&buf).to_string();
    let mut lines = head.split("\r\n");
    let target = lines.next()?.split(' ').nth(1)?.to_string();
    let headers = lines
        .take_while(|l| !l.is_empty())
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();
    Some((target, headers))
}

async fn respond(socket: &mut TcpStream, status: u16, extra_headers: &str, body: &str) {
    let reason = StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("OK");
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n{extra_headers}\r\n{body}",
        body.len(),
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Start a backend on an ephemeral port that answers 200 with the request
/// target as the body, and reports the forwarding headers it received.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let Some((target, headers)) = read_head(&mut socket).await else {
                    return;
                };
                let forwarded_for = headers
                    .iter()
                    .find(|(k, _)| k == "x-forwarded-for")
                    .map(|(_, v)| v.as_str())
                    .unwrap_or("");
                let extra = format!("{SEEN_TARGET}: {target}\r\n{SEEN_FORWARDED_FOR}: {forwarded_for}\r\n");
                respond(&mut socket, 200, &extra, &target).await;
            });
        }
    });
    addr
}

/// Start a programmable backend on an ephemeral port.
pub async fn start_programmable_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = (u16, String)> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let f = f.clone();
            tokio::spawn(async move {
                if read_head(&mut socket).await.is_none() {
                    return;
                }
                let (status, body) = f().await;
                respond(&mut socket, status, "", &body).await;
            });
        }
    });
    addr
}

/// Start a plain-text listener that reports the first byte each connection
/// sends, then answers in clear text.
pub async fn start_first_byte_backend() -> (SocketAddr, tokio::sync::mpsc::UnboundedReceiver<u8>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let tx = tx.clone();
            tokio::spawn(async move {
                let mut first = [0u8; 1];
                if socket.read_exact(&mut first).await.is_ok() {
                    let _ = tx.send(first[0]);
                }
                respond(&mut socket, 200, "", "plain").await;
            });
        }
    });
    (addr, rx)
}

/// Send a raw GET for `target` and return the response head.
///
/// HTTP clients normalize dot segments before sending, so paths that must
/// reach the gateway verbatim go through here.
pub async fn raw_get(addr: SocketAddr, target: &str) -> String {
    let mut socket = TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {target} HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    socket.write_all(request.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    socket.read_to_end(&mut response).await.unwrap();
    let response = String::from_utf8_lossy(&response).to_string();
    match response.split_once("\r\n\r\n") {
        Some((head, _)) => head.to_string(),
        None => response,
    }
}

/// A port nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap()
}

/// Defaults tuned for tests: quiet metrics, short debounce and drain.
pub fn test_config(routes: Vec<Route>) -> GatewayConfig {
    let mut config = GatewayConfig {
        routes,
        ..GatewayConfig::default()
    };
    config.observability.metrics_enabled = false;
    config.watcher.debounce_ms = 100;
    config.timeouts.drain_secs = 2;
    config
}

pub fn write_config(path: &Path, config: &GatewayConfig) {
    save_config(path, config).unwrap();
}

pub struct RunningGateway {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub manager: Arc<hotgate::routing::RouterManager>,
    pub task: JoinHandle<Result<(), hotgate::StartupError>>,
    pub config_path: PathBuf,
    _dir: tempfile::TempDir,
}

impl RunningGateway {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

/// Write `config` to a temp file and serve it on an ephemeral port.
pub async fn start_gateway(config: GatewayConfig) -> RunningGateway {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("gateway.toml");
    write_config(&config_path, &config);

    let gateway = Gateway::load(&config_path).unwrap();
    let shutdown = gateway.shutdown_handle();
    let manager = Arc::clone(gateway.manager());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let task = tokio::spawn(gateway.serve(listener));
    tokio::time::sleep(Duration::from_millis(100)).await;

    RunningGateway {
        addr,
        shutdown,
        manager,
        task,
        config_path,
        _dir: dir,
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()
        .unwrap()
}

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}
