#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use pns_gateway::adapters::apns::transport::BoxedStream;
use pns_gateway::adapters::apns::{Connector, ReconnectPolicy};
use pns_gateway::domain::ServiceConfig;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;
use tokio::io::{AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("pns_gateway=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap())
            .add_directive("rustls=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub fn fast_reconnect() -> ReconnectPolicy {
    ReconnectPolicy {
        min_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(50),
        connect_timeout: Duration::from_millis(100),
    }
}

pub const TOKEN_A: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
pub const TOKEN_B: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

/// Hands the far end of every accepted connection to the test.
///
/// Refuses connections while `open` is false. After `stall_next`, the next
/// dial hangs forever.
#[derive(Debug)]
pub struct DuplexConnector {
    peers: mpsc::UnboundedSender<DuplexStream>,
    open: AtomicBool,
    stall_next: AtomicBool,
    attempts: AtomicUsize,
}

impl DuplexConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<DuplexStream>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let connector =
            Self { peers, open: AtomicBool::new(true), stall_next: AtomicBool::new(false), attempts: AtomicUsize::new(0) };
        (Arc::new(connector), rx)
    }

    pub fn stall_next(&self) {
        self.stall_next.store(true, Ordering::SeqCst);
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for DuplexConnector {
    async fn connect(&self) -> io::Result<BoxedStream> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.stall_next.swap(false, Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if !self.open.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "gateway offline"));
        }
        let (client, server) = tokio::io::duplex(64 * 1024);
        self.peers.send(server).map_err(|_| io::Error::other("test dropped the peer receiver"))?;
        Ok(Box::new(client))
    }
}

/// Never completes a connection attempt.
#[derive(Debug, Default)]
pub struct StalledConnector;

#[async_trait]
impl Connector for StalledConnector {
    async fn connect(&self) -> io::Result<BoxedStream> {
        std::future::pending().await
    }
}

/// Fails every connection attempt.
#[derive(Debug, Default)]
pub struct RefusingConnector;

#[async_trait]
impl Connector for RefusingConnector {
    async fn connect(&self) -> io::Result<BoxedStream> {
        Err(io::Error::new(io::ErrorKind::ConnectionRefused, "connection refused"))
    }
}

/// Serves a fixed byte stream and then closes, like the feedback service.
#[derive(Debug)]
pub struct FeedbackConnector {
    stream: Vec<u8>,
    hold_open: bool,
    held: Mutex<Vec<DuplexStream>>,
}

impl FeedbackConnector {
    pub fn closing(stream: Vec<u8>) -> Arc<Self> {
        Arc::new(Self { stream, hold_open: false, held: Mutex::new(Vec::new()) })
    }

    /// Writes the stream but never closes the connection.
    pub fn stalling(stream: Vec<u8>) -> Arc<Self> {
        Arc::new(Self { stream, hold_open: true, held: Mutex::new(Vec::new()) })
    }
}

#[async_trait]
impl Connector for FeedbackConnector {
    async fn connect(&self) -> io::Result<BoxedStream> {
        let (client, mut server) = tokio::io::duplex(64 * 1024);
        server.write_all(&self.stream).await?;
        if self.hold_open {
            self.held.lock().unwrap().push(server);
        }
        Ok(Box::new(client))
    }
}

pub fn feedback_record(timestamp: u32, token: &[u8; 32]) -> Vec<u8> {
    let mut record = Vec::with_capacity(38);
    record.extend_from_slice(&timestamp.to_be_bytes());
    record.extend_from_slice(&32u16.to_be_bytes());
    record.extend_from_slice(token);
    record
}

#[derive(Debug)]
struct MockGoogleState {
    logins: AtomicUsize,
    login_reply: Mutex<(u16, String)>,
    login_delay: Mutex<Duration>,
    send_replies: Mutex<VecDeque<(u16, String)>>,
    sends: Mutex<Vec<(String, String)>>,
}

/// In-process stand-in for ClientLogin and the C2DM send endpoint.
///
/// Every successful login issues `token-<n>`. Send replies are scripted and
/// fall back to `200 id=0:<n>`.
#[derive(Debug, Clone)]
pub struct MockGoogle {
    pub base_url: String,
    state: Arc<MockGoogleState>,
}

impl MockGoogle {
    pub async fn start() -> Self {
        setup_tracing();
        let state = Arc::new(MockGoogleState {
            logins: AtomicUsize::new(0),
            login_reply: Mutex::new((200, String::new())),
            login_delay: Mutex::new(Duration::ZERO),
            send_replies: Mutex::new(VecDeque::new()),
            sends: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/accounts/ClientLogin", post(login))
            .route("/c2dm/send", post(send))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url: format!("http://{addr}"), state }
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            email: Some("sender@example.com".into()),
            password: Some("hunter2".into()),
            login_url: Some(format!("{}/accounts/ClientLogin", self.base_url)),
            send_url: Some(format!("{}/c2dm/send", self.base_url)),
            timeout: Some(5),
            ..ServiceConfig::default()
        }
    }

    /// Overrides the login response; an empty body means the default token body.
    pub fn set_login_reply(&self, status: u16, body: &str) {
        *self.state.login_reply.lock().unwrap() = (status, body.to_string());
    }

    pub fn set_login_delay(&self, delay: Duration) {
        *self.state.login_delay.lock().unwrap() = delay;
    }

    pub fn push_send_reply(&self, status: u16, body: &str) {
        self.state.send_replies.lock().unwrap().push_back((status, body.to_string()));
    }

    pub fn logins(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    /// `(authorization header, form body)` of every send received.
    pub fn sends(&self) -> Vec<(String, String)> {
        self.state.sends.lock().unwrap().clone()
    }
}

async fn login(State(state): State<Arc<MockGoogleState>>) -> (StatusCode, String) {
    let delay = *state.login_delay.lock().unwrap();
    tokio::time::sleep(delay).await;

    let (status, body) = state.login_reply.lock().unwrap().clone();
    if status != 200 || !body.is_empty() {
        return (StatusCode::from_u16(status).unwrap(), body);
    }
    let n = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    (StatusCode::OK, format!("SID=sid-{n}\nLSID=lsid-{n}\nAuth=token-{n}\n"))
}

async fn send(State(state): State<Arc<MockGoogleState>>, headers: HeaderMap, body: Bytes) -> (StatusCode, String) {
    let auth = headers.get("authorization").and_then(|v| v.to_str().ok()).unwrap_or_default().to_string();
    let mut sends = state.sends.lock().unwrap();
    sends.push((auth, String::from_utf8_lossy(&body).into_owned()));
    let n = sends.len();
    drop(sends);

    match state.send_replies.lock().unwrap().pop_front() {
        Some((status, body)) => (StatusCode::from_u16(status).unwrap(), body),
        None => (StatusCode::OK, format!("id=0:{n}")),
    }
}
