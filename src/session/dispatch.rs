//! Inbound message dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error};

use crate::Result;
use crate::transport::{BatchKind, ConnectionHandle, InboundMessage, MessageBatch};

/// External collaborator that owns message-content business logic.
///
/// Invoked once per non-self message; calls arrive in per-connection order
/// but implementations must not assume any ordering across reconnects.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        connection: &dyn ConnectionHandle,
        message: InboundMessage,
    ) -> Result<()>;
}

/// Forwards live message batches to the handler, isolating its failures.
pub struct Dispatcher {
    handler: Arc<dyn MessageHandler>,
}

impl Dispatcher {
    #[must_use]
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    /// Dispatch one event batch. Returns the number of messages handed to
    /// the handler.
    ///
    /// Historical-sync batches are dropped wholesale so old messages are not
    /// reprocessed after a reconnect. Self-originated messages are skipped to
    /// prevent feedback loops. A handler failure is logged with the message
    /// key and does not interrupt the rest of the batch; delivery is
    /// at-most-once, never retried.
    pub async fn dispatch(&self, connection: &dyn ConnectionHandle, batch: MessageBatch) -> usize {
        if batch.kind == BatchKind::HistorySync {
            debug!(messages = batch.messages.len(), "ignoring history-sync batch");
            return 0;
        }

        let mut delivered = 0_usize;
        for message in batch.messages {
            if message.key.from_me {
                debug!(id = %message.key.id, "skipping self-originated message");
                continue;
            }

            let key = message.key.clone();
            delivered += 1;
            if let Err(e) = self.handler.handle(connection, message).await {
                error!(
                    id = %key.id,
                    chat = %key.chat,
                    error = %e,
                    "message handler failed; continuing with remaining messages"
                );
            }
        }
        delivered
    }
}
