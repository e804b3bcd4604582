use crate::adapters::apns::codec;
use crate::adapters::apns::transport::Connector;
use crate::domain::FeedbackRecord;
use crate::error::{PushError, Result};
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;

/// One-shot reader for the APNs feedback service.
///
/// The service streams fixed-size records and signals the end of the list by
/// closing the connection, so every fetch dials a fresh connection.
#[derive(Debug, Clone)]
pub struct FeedbackFetcher {
    connector: Arc<dyn Connector>,
    fetches_total: Counter<u64>,
}

impl FeedbackFetcher {
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        let fetches_total = global::meter("pns-gateway")
            .u64_counter("apns_feedback_fetches_total")
            .with_description("APNs feedback fetches, by outcome")
            .build();
        Self { connector, fetches_total }
    }

    /// Reads the whole feedback stream and decodes it.
    ///
    /// # Errors
    /// Returns `PushError::Connection` if the endpoint cannot be reached or the
    /// read fails, `PushError::Timeout` if the stream is not closed within
    /// `timeout`, and `PushError::TruncatedStream` for a partial trailing record.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, timeout: Duration) -> Result<Vec<FeedbackRecord>> {
        let result = match tokio::time::timeout(timeout, self.read_stream()).await {
            Ok(Ok(stream)) => codec::decode_feedback_stream(&stream),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(PushError::Timeout(timeout)),
        };

        let status = match &result {
            Ok(records) => {
                tracing::info!(count = records.len(), "Fetched feedback");
                "ok"
            }
            Err(PushError::Timeout(_)) => "timeout",
            Err(e) => {
                tracing::warn!(error = %e, "Feedback fetch failed");
                "error"
            }
        };
        self.fetches_total.add(1, &[KeyValue::new("status", status)]);

        result
    }

    async fn read_stream(&self) -> Result<Vec<u8>> {
        let mut stream = self
            .connector
            .connect()
            .await
            .map_err(|e| PushError::Connection(format!("feedback connect failed: {e}")))?;

        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => break,
                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                // The service may drop the socket without a TLS close_notify.
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(PushError::Connection(format!("feedback read failed: {e}"))),
            }
        }
        tracing::debug!(bytes = buf.len(), "Feedback stream closed by remote");
        Ok(buf)
    }
}
