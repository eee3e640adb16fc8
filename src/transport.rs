//! Transport provider boundary.
//!
//! The wire protocol (framing, encryption, handshake) is owned by an external
//! library. This module pins down the shape this crate consumes: a provider
//! that opens one live connection at a time, a handle for outbound sends, and
//! the stream of lifecycle/message events emitted on that handle.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::Result;
use crate::credentials::{CredentialUpdate, SignalKeyCache};

/// Stream of events for one connection attempt. The receiver goes inert when
/// the handle that produced it is dropped.
pub type EventReceiver = mpsc::UnboundedReceiver<TransportEvent>;

/// Sender half used by provider implementations.
pub type EventSender = mpsc::UnboundedSender<TransportEvent>;

/// Close status code the transport reports for an explicit logout.
pub const LOGGED_OUT_CODE: u16 = 401;

/// External capability that speaks the messaging network's wire protocol.
#[async_trait]
pub trait TransportProvider: Send + Sync {
    /// Open a fresh connection using the supplied identity secrets and the
    /// caching wrapper around per-peer key material.
    ///
    /// Each call must yield a brand new handle; handles are never reused
    /// across attempts.
    async fn open(
        &self,
        creds: &Value,
        keys: SignalKeyCache,
    ) -> Result<(Box<dyn ConnectionHandle>, EventReceiver)>;
}

/// One attempt's live session object.
#[async_trait]
pub trait ConnectionHandle: Send + Sync {
    /// Send a text payload to a destination on the network.
    async fn send(&self, destination: &str, text: &str) -> Result<()>;
}

/// Events emitted on a connection handle, in transport order.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Pairing code to surface for out-of-band scanning.
    Qr(String),
    /// The session is established and usable.
    Open,
    /// Key material rotated; must be persisted or a future full
    /// re-authentication is forced.
    CredentialsUpdated(CredentialUpdate),
    /// A batch of inbound messages.
    Messages(MessageBatch),
    /// The connection closed. Terminal for this handle.
    Closed(CloseReason),
}

/// Structured reason attached to a close event.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseReason {
    /// Transport status code.
    pub code: u16,
    /// Free-form detail for logs.
    pub detail: String,
}

impl CloseReason {
    #[must_use]
    pub fn new<S: Into<String>>(code: u16, detail: S) -> Self {
        Self {
            code,
            detail: detail.into(),
        }
    }

    /// Classify this close into the retry decision.
    ///
    /// Only an explicit logout is terminal. Network errors, server-initiated
    /// restarts, and unknown codes all stay retryable; the bot must recover
    /// from arbitrarily long outages without operator help.
    #[must_use]
    pub fn disconnect_reason(&self) -> DisconnectReason {
        if self.code == LOGGED_OUT_CODE {
            DisconnectReason::LoggedOut
        } else {
            DisconnectReason::Retryable
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "close({}): {}", self.code, self.detail)
    }
}

/// Partition of close causes driving the lifecycle state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// Explicit logout; reconnecting requires fresh external credentials.
    LoggedOut,
    /// Everything else. Schedule another attempt.
    Retryable,
}

/// Uniquely identifies an inbound message and carries its origin flag.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageKey {
    /// Message id, unique per chat.
    pub id: String,
    /// Chat/peer the message belongs to.
    pub chat: String,
    /// Whether the bot itself sent this message.
    pub from_me: bool,
}

impl MessageKey {
    #[must_use]
    pub fn new<I: Into<String>, C: Into<String>>(id: I, chat: C, from_me: bool) -> Self {
        Self {
            id: id.into(),
            chat: chat.into(),
            from_me,
        }
    }
}

/// A unit from the message-event stream. Ownership transfers to the external
/// handler once dispatched; nothing here is persisted.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub key: MessageKey,
    pub payload: Value,
}

impl InboundMessage {
    #[must_use]
    pub fn new(key: MessageKey, payload: Value) -> Self {
        Self { key, payload }
    }
}

/// Why a batch of messages was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchKind {
    /// Newly arrived messages.
    LiveNotify,
    /// Replay of history after (re)connect. Never dispatched.
    HistorySync,
}

/// An event-stream batch of inbound messages.
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageBatch {
    pub kind: BatchKind,
    pub messages: Vec<InboundMessage>,
}

impl MessageBatch {
    #[must_use]
    pub fn new(kind: BatchKind, messages: Vec<InboundMessage>) -> Self {
        Self { kind, messages }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logout_is_terminal() {
        let reason = CloseReason::new(LOGGED_OUT_CODE, "logged out");
        assert_eq!(reason.disconnect_reason(), DisconnectReason::LoggedOut);
    }

    #[test]
    fn network_error_is_retryable() {
        let reason = CloseReason::new(408, "connection lost");
        assert_eq!(reason.disconnect_reason(), DisconnectReason::Retryable);
    }

    #[test]
    fn unknown_code_is_retryable() {
        let reason = CloseReason::new(999, "no idea");
        assert_eq!(reason.disconnect_reason(), DisconnectReason::Retryable);
    }

    #[test]
    fn close_reason_display() {
        let reason = CloseReason::new(515, "restart required");
        assert_eq!(reason.to_string(), "close(515): restart required");
    }
}
