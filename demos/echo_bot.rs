//! Runnable demonstration bot against an in-process loopback transport.
//!
//! The loopback "network" opens instantly, delivers a scripted peer message
//! every few seconds, and prints whatever the bot sends. Useful for watching
//! the session lifecycle (state changes, announcement, dispatch) without a
//! real transport provider:
//!
//! ```sh
//! DATASTORE_URI=memory cargo run --example echo_bot
//! ```

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser as _;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::info;

use chatline::app;
use chatline::config::Args;
use chatline::credentials::SignalKeyCache;
use chatline::session::MessageHandler;
use chatline::transport::{
    BatchKind, ConnectionHandle, EventReceiver, InboundMessage, MessageBatch, MessageKey,
    TransportEvent, TransportProvider,
};
use chatline::{Result, error::Error};

struct LoopbackProvider;

#[async_trait]
impl TransportProvider for LoopbackProvider {
    async fn open(
        &self,
        _creds: &Value,
        _keys: SignalKeyCache,
    ) -> Result<(Box<dyn ConnectionHandle>, EventReceiver)> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let feeder = events_tx.clone();
        tokio::spawn(async move {
            let _ = feeder.send(TransportEvent::Open);
            let mut n = 0_u64;
            loop {
                tokio::time::sleep(Duration::from_secs(5)).await;
                n += 1;
                let message = InboundMessage::new(
                    MessageKey::new(format!("demo-{n}"), "peer@loopback", false),
                    json!({ "text": format!("ping {n}") }),
                );
                if feeder
                    .send(TransportEvent::Messages(MessageBatch::new(
                        BatchKind::LiveNotify,
                        vec![message],
                    )))
                    .is_err()
                {
                    break;
                }
            }
        });

        Ok((Box::new(LoopbackConnection), events_rx))
    }
}

struct LoopbackConnection;

#[async_trait]
impl ConnectionHandle for LoopbackConnection {
    async fn send(&self, destination: &str, text: &str) -> Result<()> {
        info!(%destination, %text, "loopback send");
        Ok(())
    }
}

/// Replies to every inbound message with its own text.
struct EchoHandler;

#[async_trait]
impl MessageHandler for EchoHandler {
    async fn handle(
        &self,
        connection: &dyn ConnectionHandle,
        message: InboundMessage,
    ) -> Result<()> {
        let text = message.payload["text"]
            .as_str()
            .ok_or_else(|| Error::transport("message without text"))?;
        connection.send(&message.key.chat, text).await
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let args = Args::parse();
    app::init_tracing(&args.log_level);

    match app::run(args, Arc::new(LoopbackProvider), Arc::new(EchoHandler)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "startup failed");
            ExitCode::FAILURE
        }
    }
}
