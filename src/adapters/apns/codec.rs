//! Binary framing for the legacy APNs gateway and feedback protocols.
//!
//! All multi-byte integers are big-endian.

use crate::domain::device_token::DEVICE_TOKEN_LEN;
use crate::domain::notification::{self, Payload, Payloads, Targets};
use crate::domain::{DeviceToken, FeedbackRecord};
use crate::error::{PushError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};

const COMMAND_SIMPLE: u8 = 0;
const COMMAND_ERROR_RESPONSE: u8 = 8;
const FRAME_HEADER_LEN: usize = 1 + 2 + DEVICE_TOKEN_LEN + 2;
pub const FEEDBACK_RECORD_LEN: usize = 4 + 2 + DEVICE_TOKEN_LEN;
pub const ERROR_RESPONSE_LEN: usize = 6;

/// `[0][token_len=32][token][payload_len][payload]`
///
/// # Errors
/// Returns `PushError::Encoding` if the compact JSON payload does not fit the 16-bit length field.
pub fn encode_notification(token: &DeviceToken, payload: &Payload) -> Result<Bytes> {
    let mut frame = BytesMut::new();
    write_notification(&mut frame, token, payload)?;
    Ok(frame.freeze())
}

/// Concatenates one frame per token/payload pair, in input order.
///
/// # Errors
/// Returns `PushError::ArityMismatch` if the slices differ in length, or any encoding error.
pub fn encode_batch(tokens: &[DeviceToken], payloads: &[Payload]) -> Result<Bytes> {
    if tokens.len() != payloads.len() {
        return Err(PushError::ArityMismatch { tokens: tokens.len(), payloads: payloads.len() });
    }

    let mut frame = BytesMut::new();
    for (token, payload) in tokens.iter().zip(payloads) {
        write_notification(&mut frame, token, payload)?;
    }
    Ok(frame.freeze())
}

/// Parses hex targets and encodes them against their payloads.
///
/// # Errors
/// Returns `PushError::Encoding` for a malformed token and `PushError::ArityMismatch`
/// when the payload sequence does not line up with the targets.
pub fn encode_notifications(targets: Targets, payloads: Payloads) -> Result<Bytes> {
    let pairs = notification::pair(targets, payloads)?;
    if pairs.is_empty() {
        return Err(PushError::Encoding("no device tokens given".into()));
    }

    let mut frame = BytesMut::new();
    for (target, payload) in pairs {
        let token: DeviceToken = target.parse()?;
        write_notification(&mut frame, &token, &payload)?;
    }
    Ok(frame.freeze())
}

fn write_notification(frame: &mut BytesMut, token: &DeviceToken, payload: &Payload) -> Result<()> {
    let body = serde_json::to_vec(payload).map_err(|e| PushError::Encoding(e.to_string()))?;
    let body_len = u16::try_from(body.len())
        .map_err(|_| PushError::Encoding(format!("payload is {} bytes, limit is {}", body.len(), u16::MAX)))?;

    frame.reserve(FRAME_HEADER_LEN + body.len());
    frame.put_u8(COMMAND_SIMPLE);
    #[allow(clippy::cast_possible_truncation)]
    frame.put_u16(DEVICE_TOKEN_LEN as u16);
    frame.put_slice(token.as_bytes());
    frame.put_u16(body_len);
    frame.put_slice(&body);
    Ok(())
}

/// Splits a complete feedback stream into 38-byte `[timestamp:4][token_len:2][token:32]` records.
///
/// # Errors
/// Returns `PushError::TruncatedStream` if the stream ends inside a record, and
/// `PushError::Encoding` if a record announces a token length other than 32.
pub fn decode_feedback_stream(stream: &[u8]) -> Result<Vec<FeedbackRecord>> {
    let trailing = stream.len() % FEEDBACK_RECORD_LEN;
    if trailing != 0 {
        return Err(PushError::TruncatedStream(trailing));
    }

    let mut buf = stream;
    let mut records = Vec::with_capacity(stream.len() / FEEDBACK_RECORD_LEN);
    while buf.has_remaining() {
        let timestamp = buf.get_u32();
        let token_len = usize::from(buf.get_u16());
        if token_len != DEVICE_TOKEN_LEN {
            return Err(PushError::Encoding(format!("feedback record announces a {token_len} byte token")));
        }
        let token = DeviceToken::from_slice(&buf[..DEVICE_TOKEN_LEN])?;
        buf.advance(DEVICE_TOKEN_LEN);
        records.push(FeedbackRecord { timestamp, token });
    }
    Ok(records)
}

/// The 6-byte frame the gateway writes right before it drops a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorResponse {
    pub status: u8,
    pub identifier: u32,
}

impl ErrorResponse {
    #[must_use]
    pub fn decode(mut buf: &[u8]) -> Option<Self> {
        if buf.len() < ERROR_RESPONSE_LEN || buf[0] != COMMAND_ERROR_RESPONSE {
            return None;
        }
        buf.advance(1);
        let status = buf.get_u8();
        let identifier = buf.get_u32();
        Some(Self { status, identifier })
    }

    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self.status {
            0 => "no errors encountered",
            1 => "processing error",
            2 => "missing device token",
            3 => "missing topic",
            4 => "missing payload",
            5 => "invalid token size",
            6 => "invalid topic size",
            7 => "invalid payload size",
            8 => "invalid token",
            10 => "shutdown",
            _ => "unknown",
        }
    }
}
