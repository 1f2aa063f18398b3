//! # WebSocket Protocol
//!
//! The binary frame codec and per-client session policy consumed by the
//! socket frontend (the transport itself lives outside the core).
//!
//! Frame layout: `[opcode: u8][request_id: u32 LE][payload]`.

use crate::error::ApiError;
use std::time::{Duration, Instant};

/// Close codes used by the socket frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum WsCloseCode {
    Normal = 1000,
    ProtocolError = 1002,
    PolicyViolation = 1008,
    InternalError = 1011,
    Unauthorized = 3000,
}

/// A decoded binary frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub opcode: u8,
    pub request_id: u32,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Minimum encoded size: opcode plus request id.
    pub const HEADER_LEN: usize = 5;

    /// Encode to wire bytes.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::HEADER_LEN + self.payload.len());
        bytes.push(self.opcode);
        bytes.extend_from_slice(&self.request_id.to_le_bytes());
        bytes.extend_from_slice(&self.payload);
        bytes
    }

    /// Decode from wire bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, ApiError> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(ApiError::new("PROTOCOL_ERROR", "frame too short"));
        }
        let request_id = u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]);
        Ok(Self {
            opcode: bytes[0],
            request_id,
            payload: bytes[Self::HEADER_LEN..].to_vec(),
        })
    }
}

/// Protocol version this node speaks.
pub const WS_PROTOCOL_VERSION: u16 = 1;

/// The client handshake establishing protocol version and identity.
///
/// Payload layout: `[version: u16 LE][name_len: u8][name][version_str]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub protocol_version: u16,
    pub client_name: String,
    pub client_version: String,
}

impl Handshake {
    /// Encode to a frame payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let name = self.client_name.as_bytes();
        let version = self.client_version.as_bytes();
        let mut bytes = Vec::with_capacity(3 + name.len() + version.len());
        bytes.extend_from_slice(&self.protocol_version.to_le_bytes());
        bytes.push(name.len().min(255) as u8);
        bytes.extend_from_slice(&name[..name.len().min(255)]);
        bytes.extend_from_slice(version);
        bytes
    }

    /// Decode and validate a handshake payload. A protocol-version
    /// mismatch closes the connection with `ProtocolError`.
    pub fn decode(payload: &[u8]) -> Result<Self, ApiError> {
        if payload.len() < 3 {
            return Err(ApiError::new("PROTOCOL_ERROR", "handshake too short"));
        }
        let protocol_version = u16::from_le_bytes([payload[0], payload[1]]);
        if protocol_version != WS_PROTOCOL_VERSION {
            return Err(ApiError::new(
                "PROTOCOL_ERROR",
                format!("unsupported protocol version {protocol_version}"),
            ));
        }
        let name_len = payload[2] as usize;
        let name_end = 3 + name_len;
        let name = payload
            .get(3..name_end)
            .ok_or_else(|| ApiError::new("PROTOCOL_ERROR", "truncated client name"))?;
        let version = &payload[name_end..];
        Ok(Self {
            protocol_version,
            client_name: String::from_utf8_lossy(name).into_owned(),
            client_version: String::from_utf8_lossy(version).into_owned(),
        })
    }
}

/// Session policy configuration.
#[derive(Debug, Clone)]
pub struct SessionLimits {
    /// Requests per second per client.
    pub rate_per_second: u32,
    /// Maximum requests awaiting a response.
    pub max_pending_requests: usize,
    /// Maximum concurrent subscriptions.
    pub max_subscriptions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            rate_per_second: 50,
            max_pending_requests: 100,
            max_subscriptions: 10,
        }
    }
}

/// Per-client session state: token-bucket rate limiting, pending-request
/// accounting, and monotonic subscription ids starting at 1.
#[derive(Debug)]
pub struct SessionPolicy {
    limits: SessionLimits,
    tokens: f64,
    refilled_at: Instant,
    pending: usize,
    subscriptions: Vec<u32>,
    next_subscription_id: u32,
}

impl SessionPolicy {
    #[must_use]
    pub fn new(limits: SessionLimits) -> Self {
        Self {
            tokens: f64::from(limits.rate_per_second),
            limits,
            refilled_at: Instant::now(),
            pending: 0,
            subscriptions: Vec::new(),
            next_subscription_id: 1,
        }
    }

    /// Admit one request, consuming a rate token and a pending slot.
    pub fn admit_request(&mut self) -> Result<(), ApiError> {
        self.refill();
        if self.tokens < 1.0 {
            return Err(ApiError::new("RATE_LIMITED", "rate limit exceeded"));
        }
        if self.pending >= self.limits.max_pending_requests {
            return Err(ApiError::new("BACKPRESSURE", "too many pending requests"));
        }
        self.tokens -= 1.0;
        self.pending += 1;
        Ok(())
    }

    /// Release a pending slot once the response was sent.
    pub fn complete_request(&mut self) {
        self.pending = self.pending.saturating_sub(1);
    }

    /// Open a subscription; ids are monotonic from 1.
    pub fn subscribe(&mut self) -> Result<u32, ApiError> {
        if self.subscriptions.len() >= self.limits.max_subscriptions {
            return Err(ApiError::new("POLICY_VIOLATION", "too many subscriptions"));
        }
        let id = self.next_subscription_id;
        self.next_subscription_id += 1;
        self.subscriptions.push(id);
        Ok(id)
    }

    /// Close a subscription.
    pub fn unsubscribe(&mut self, id: u32) -> bool {
        let before = self.subscriptions.len();
        self.subscriptions.retain(|&existing| existing != id);
        self.subscriptions.len() != before
    }

    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending
    }

    fn refill(&mut self) {
        let elapsed = self.refilled_at.elapsed();
        if elapsed >= Duration::from_millis(1) {
            let capacity = f64::from(self.limits.rate_per_second);
            self.tokens = (self.tokens + elapsed.as_secs_f64() * capacity).min(capacity);
            self.refilled_at = Instant::now();
        }
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self::new(SessionLimits::default())
    }
}
