use crate::adapters::apns::codec::{ERROR_RESPONSE_LEN, ErrorResponse};
use crate::adapters::apns::transport::{BoxedStream, Connector};
use crate::error::{PushError, Result};
use backon::{ExponentialBuilder, Retryable};
use bytes::Bytes;
use futures::future::BoxFuture;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::Instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound for a single dial, TCP connect and TLS handshake included.
    pub connect_timeout: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl ReconnectPolicy {
    fn backoff(self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_jitter()
            .without_max_times()
    }
}

#[derive(Clone, Debug)]
struct Metrics {
    sends_total: Counter<u64>,
    connections_total: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("pns-gateway");
        Self {
            sends_total: meter
                .u64_counter("apns_sends_total")
                .with_description("APNs frames handed to the transport, by outcome")
                .build(),
            connections_total: meter
                .u64_counter("apns_connections_total")
                .with_description("APNs gateway connection attempts, by outcome")
                .build(),
        }
    }
}

#[derive(Debug)]
struct PendingRequest {
    frame: Bytes,
    reply: oneshot::Sender<Result<()>>,
    deadline: Instant,
}

impl PendingRequest {
    fn is_abandoned(&self) -> bool {
        self.reply.is_closed() || Instant::now() >= self.deadline
    }
}

/// Handle to the long-lived push socket of one app.
///
/// The socket is owned by a background task that dials lazily on the first
/// send, queues frames while no connection exists and reconnects with
/// exponential backoff for as long as any handle is alive.
#[derive(Debug, Clone)]
pub struct PushConnection {
    tx: mpsc::UnboundedSender<PendingRequest>,
    state: watch::Receiver<ConnectionState>,
}

impl PushConnection {
    #[must_use]
    pub fn spawn(connector: Arc<dyn Connector>, policy: ReconnectPolicy) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let (state_tx, state) = watch::channel(ConnectionState::Disconnected);

        let actor = ConnectionActor {
            connector,
            policy,
            rx,
            closed: false,
            pending: VecDeque::new(),
            link: Link::Disconnected,
            state: state_tx,
            metrics: Metrics::new(),
        };
        tokio::spawn(actor.run().instrument(tracing::info_span!("apns_connection")));

        Self { tx, state }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Queues `frame` and returns a future that resolves once it is written.
    ///
    /// The frame is queued before this returns, and the returned future does
    /// not borrow the handle: the request still resolves if every handle is
    /// dropped while it waits. Resolution means the transport accepted the
    /// bytes. The gateway has no positive acknowledgement, so this is not a
    /// delivery receipt.
    ///
    /// # Errors
    /// Resolves to `PushError::Timeout` if the frame was not written within `timeout`.
    pub fn send(&self, frame: Bytes, timeout: Duration) -> impl Future<Output = Result<()>> + Send + use<> {
        let (reply, rx) = oneshot::channel();
        let deadline = Instant::now() + timeout;
        let queued = self.tx.send(PendingRequest { frame, reply, deadline }).is_ok();

        async move {
            if !queued {
                return Err(PushError::Connection("push connection task has stopped".into()));
            }
            wait_for_reply(rx, deadline, timeout).await
        }
    }
}

async fn wait_for_reply(rx: oneshot::Receiver<Result<()>>, deadline: Instant, timeout: Duration) -> Result<()> {
    match tokio::time::timeout_at(deadline, rx).await {
        Ok(Ok(result)) => result,
        Ok(Err(_)) => Err(PushError::Connection("push connection dropped the request".into())),
        Err(_) => {
            tracing::warn!(timeout_secs = timeout.as_secs_f64(), "Notification timed out waiting for connection");
            Err(PushError::Timeout(timeout))
        }
    }
}

enum Link {
    Disconnected,
    Connecting(BoxFuture<'static, io::Result<BoxedStream>>),
    Connected { writer: WriteHalf<BoxedStream>, lost: oneshot::Receiver<String>, reader: JoinHandle<()> },
}

enum Event {
    Request(PendingRequest),
    HandlesDropped,
    Established(io::Result<BoxedStream>),
    Lost(String),
    DeadlineReached,
}

struct ConnectionActor {
    connector: Arc<dyn Connector>,
    policy: ReconnectPolicy,
    rx: mpsc::UnboundedReceiver<PendingRequest>,
    closed: bool,
    pending: VecDeque<PendingRequest>,
    link: Link,
    state: watch::Sender<ConnectionState>,
    metrics: Metrics,
}

impl ConnectionActor {
    async fn run(mut self) {
        loop {
            self.pending.retain(|req| !req.is_abandoned());
            if self.closed && self.pending.is_empty() {
                break;
            }

            let next_deadline = self.pending.iter().map(|req| req.deadline).min();
            let event = match &mut self.link {
                Link::Disconnected => self.rx.recv().await.map_or(Event::HandlesDropped, Event::Request),
                Link::Connecting(connect) => tokio::select! {
                    req = self.rx.recv(), if !self.closed => req.map_or(Event::HandlesDropped, Event::Request),
                    stream = connect => Event::Established(stream),
                    () = tokio::time::sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {
                        Event::DeadlineReached
                    }
                },
                Link::Connected { lost, .. } => tokio::select! {
                    req = self.rx.recv(), if !self.closed => req.map_or(Event::HandlesDropped, Event::Request),
                    reason = lost => Event::Lost(reason.unwrap_or_else(|_| "reader stopped".into())),
                },
            };

            match event {
                Event::Request(req) => self.on_request(req).await,
                Event::HandlesDropped => {
                    tracing::debug!(pending = self.pending.len(), "All handles dropped, draining");
                    self.closed = true;
                }
                Event::Established(Ok(stream)) => self.on_established(stream).await,
                Event::Established(Err(e)) => {
                    tracing::warn!(error = %e, "Gateway dial loop ended with an error, restarting it");
                    self.start_connecting();
                }
                Event::Lost(reason) => self.on_lost(&reason),
                Event::DeadlineReached => {}
            }
        }

        self.disconnect();
        tracing::debug!("Push connection task finished");
    }

    async fn on_request(&mut self, req: PendingRequest) {
        match self.link {
            Link::Connected { .. } => {
                if let Err(req) = self.write(req).await {
                    self.pending.push_front(req);
                    self.on_lost("write failed");
                }
            }
            Link::Connecting(_) => self.pending.push_back(req),
            Link::Disconnected => {
                self.pending.push_back(req);
                self.start_connecting();
            }
        }
    }

    async fn on_established(&mut self, stream: BoxedStream) {
        self.metrics.connections_total.add(1, &[KeyValue::new("result", "connected")]);
        tracing::info!(pending = self.pending.len(), "Connected to APNs gateway");

        let (reader, writer) = tokio::io::split(stream);
        let (lost_tx, lost) = oneshot::channel();
        let reader = tokio::spawn(watch_for_close(reader, lost_tx).instrument(tracing::debug_span!("apns_reader")));
        self.link = Link::Connected { writer, lost, reader };
        self.state.send_replace(ConnectionState::Connected);

        while let Some(req) = self.pending.pop_front() {
            if req.is_abandoned() {
                continue;
            }
            if let Err(req) = self.write(req).await {
                self.pending.push_front(req);
                self.on_lost("write failed while flushing queued notifications");
                return;
            }
        }
    }

    /// Hands the frame back if the transport refused it.
    async fn write(&mut self, req: PendingRequest) -> std::result::Result<(), PendingRequest> {
        let Link::Connected { writer, .. } = &mut self.link else {
            return Err(req);
        };
        if req.reply.is_closed() {
            return Ok(());
        }

        let written = async {
            writer.write_all(&req.frame).await?;
            writer.flush().await
        }
        .await;

        match written {
            Ok(()) => {
                tracing::debug!(bytes = req.frame.len(), "Notification frame written");
                self.metrics.sends_total.add(1, &[KeyValue::new("status", "sent")]);
                let _ = req.reply.send(Ok(()));
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to write notification frame");
                self.metrics.sends_total.add(1, &[KeyValue::new("status", "write_failed")]);
                Err(req)
            }
        }
    }

    fn on_lost(&mut self, reason: &str) {
        tracing::warn!(reason = %reason, "Lost connection to APNs gateway");
        self.disconnect();
        self.start_connecting();
    }

    fn disconnect(&mut self) {
        if let Link::Connected { reader, .. } = std::mem::replace(&mut self.link, Link::Disconnected) {
            reader.abort();
        }
        self.state.send_replace(ConnectionState::Disconnected);
    }

    fn start_connecting(&mut self) {
        let connector = Arc::clone(&self.connector);
        let backoff = self.policy.backoff();
        let connect_timeout = self.policy.connect_timeout;
        let connections_total = self.metrics.connections_total.clone();

        self.link = Link::Connecting(Box::pin(async move {
            (|| {
                let connector = Arc::clone(&connector);
                async move {
                    tokio::time::timeout(connect_timeout, connector.connect()).await.map_err(|_| {
                        io::Error::new(io::ErrorKind::TimedOut, format!("no connection within {connect_timeout:?}"))
                    })?
                }
            })
            .retry(backoff)
                .notify(|e: &io::Error, delay: Duration| {
                    connections_total.add(1, &[KeyValue::new("result", "failed")]);
                    tracing::warn!(error = %e, retry_in = ?delay, "Gateway connection failed, retrying");
                })
                .await
        }));
        self.state.send_replace(ConnectionState::Connecting);
    }
}

/// Drains the read side until the gateway closes the socket.
async fn watch_for_close(mut reader: ReadHalf<BoxedStream>, lost: oneshot::Sender<String>) {
    let mut buf = [0u8; 256];
    let reason = loop {
        match reader.read(&mut buf).await {
            Ok(0) => break "closed by remote".to_string(),
            Ok(n) => {
                if n >= ERROR_RESPONSE_LEN
                    && let Some(response) = ErrorResponse::decode(&buf[..n])
                {
                    tracing::warn!(
                        status = response.status,
                        identifier = response.identifier,
                        description = response.description(),
                        "Gateway reported an error"
                    );
                } else {
                    tracing::debug!(bytes = n, "Ignoring unexpected bytes from gateway");
                }
            }
            Err(e) => break e.to_string(),
        }
    };
    let _ = lost.send(reason);
}
