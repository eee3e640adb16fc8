//! Connection lifecycle state machine.

use secrecy::SecretString;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::config::Config;
use super::dispatch::{Dispatcher, MessageHandler};
use crate::credentials::CredentialStore;
use crate::transport::{DisconnectReason, TransportEvent, TransportProvider};

/// Connection state, exactly one instance process-wide.
///
/// Transitions are driven solely by events on the current connection handle.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No attempt started yet
    Idle,
    /// An attempt is in flight
    Connecting,
    /// Session established and usable
    Open,
    /// Closed for a retryable cause; another attempt is scheduled
    ClosedRetryable,
    /// Logged out; no reconnect without fresh external credentials
    ClosedTerminal,
}

impl ConnectionState {
    /// Check if the session is currently usable.
    #[must_use]
    pub const fn is_open(self) -> bool {
        matches!(self, Self::Open)
    }

    /// Check if the state machine has stopped for good.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::ClosedTerminal)
    }
}

/// How one attempt ended.
enum AttemptEnd {
    /// Explicit logout; stop the loop.
    LoggedOut(String),
    /// Anything else: close, setup failure, timeout. Retry after the delay.
    Retry(String),
}

/// Drives (re)connection attempts and owns the only live connection handle.
///
/// One sequential loop: an attempt's handle is fully dropped, and its close
/// processed, before the next attempt begins, so two sockets never race on
/// the same credentials. Setup failures never escape; every non-logout end
/// folds into a fixed-delay retry.
pub struct Supervisor {
    provider: Arc<dyn TransportProvider>,
    credentials: CredentialStore,
    dispatcher: Dispatcher,
    config: Config,
    override_bundle: Option<SecretString>,
    /// Set once the override bundle was applied; suppresses QR surfacing
    /// for the rest of the process lifetime.
    override_active: bool,
    state_tx: watch::Sender<ConnectionState>,
    qr_tx: watch::Sender<Option<String>>,
}

impl Supervisor {
    #[must_use]
    pub fn new(
        provider: Arc<dyn TransportProvider>,
        credentials: CredentialStore,
        handler: Arc<dyn MessageHandler>,
        config: Config,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (qr_tx, _) = watch::channel(None);
        Self {
            provider,
            credentials,
            dispatcher: Dispatcher::new(handler),
            config,
            override_bundle: None,
            override_active: false,
            state_tx,
            qr_tx,
        }
    }

    /// Supply an encoded credential override bundle, applied once before the
    /// first connection attempt.
    #[must_use]
    pub fn with_override(mut self, bundle: Option<SecretString>) -> Self {
        self.override_bundle = bundle;
        self
    }

    /// Subscribe to connection state changes.
    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Subscribe to pairing codes for out-of-band scanning. Cleared to `None`
    /// once the session opens.
    #[must_use]
    pub fn qr_receiver(&self) -> watch::Receiver<Option<String>> {
        self.qr_tx.subscribe()
    }

    /// Run the retry loop until an explicit logout.
    ///
    /// An explicit loop rather than self-rescheduling: the process runs for
    /// months and retries are unbounded.
    pub async fn run(mut self) {
        let mut primed = false;
        if let Some(bundle) = self.override_bundle.take() {
            self.override_active = self.credentials.apply_override(&bundle);
            if self.override_active {
                // Written through so later attempts reload it. A failed write
                // must not cost the in-memory copy its first use, so the
                // first attempt skips the reload either way.
                if let Err(e) = self.credentials.persist_current().await {
                    warn!(error = %e, "failed to persist credential override");
                }
                primed = true;
            }
        }

        loop {
            _ = self.state_tx.send(ConnectionState::Connecting);

            let end = self.attempt(primed).await;
            primed = false;

            match end {
                AttemptEnd::LoggedOut(detail) => {
                    error!(
                        %detail,
                        "logged out; not reconnecting (fresh credentials or a new scan required)"
                    );
                    _ = self.state_tx.send(ConnectionState::ClosedTerminal);
                    break;
                }
                AttemptEnd::Retry(detail) => {
                    warn!(
                        %detail,
                        retry_in = ?self.config.retry_delay,
                        "connection ended; scheduling reconnect"
                    );
                    _ = self.state_tx.send(ConnectionState::ClosedRetryable);
                    sleep(self.config.retry_delay).await;
                }
            }
        }
    }

    /// One connection attempt: load credentials, open a fresh handle, consume
    /// its events until close.
    ///
    /// `primed` marks in-memory credentials as authoritative (a just-applied
    /// override); otherwise the attempt starts by reloading the store, so
    /// reconnects pick up key rotations persisted since the last attempt.
    async fn attempt(&mut self, primed: bool) -> AttemptEnd {
        let attempt_id = Uuid::new_v4();

        if primed {
            debug!(%attempt_id, "using override credentials without reload");
        } else if let Err(e) = self.credentials.load().await {
            return AttemptEnd::Retry(format!("credential load failed: {e}"));
        }

        let key_cache = self.credentials.key_cache();
        debug!(%attempt_id, cached_keys = key_cache.len(), "opening connection");

        let opened = timeout(
            self.config.connect_timeout,
            self.provider
                .open(&self.credentials.current().creds, key_cache),
        )
        .await;

        let (handle, mut events) = match opened {
            Ok(Ok(pair)) => pair,
            Ok(Err(e)) => return AttemptEnd::Retry(format!("connect failed: {e}")),
            Err(_) => {
                return AttemptEnd::Retry(format!(
                    "connect timed out after {:?}",
                    self.config.connect_timeout
                ));
            }
        };

        while let Some(event) = events.recv().await {
            match event {
                TransportEvent::Qr(code) => {
                    if self.override_active {
                        debug!(%attempt_id, "ignoring pairing code; override credentials in use");
                    } else {
                        info!(%attempt_id, code = %code, "pairing code received; scan to authenticate");
                        _ = self.qr_tx.send(Some(code));
                    }
                }

                TransportEvent::Open => {
                    info!(%attempt_id, "connection open");
                    _ = self.qr_tx.send(None);
                    _ = self.state_tx.send(ConnectionState::Open);

                    // Readiness announcement is best-effort; a failed send
                    // must never be treated as a connection failure.
                    if let Err(e) = handle
                        .send(&self.config.announce_destination, &self.config.announce_text)
                        .await
                    {
                        warn!(%attempt_id, error = %e, "readiness announcement failed");
                    }
                }

                TransportEvent::CredentialsUpdated(update) => {
                    // Sole path by which key material reaches durable
                    // storage; the in-memory copy is already updated even if
                    // the write fails.
                    if let Err(e) = self.credentials.persist(update).await {
                        warn!(%attempt_id, error = %e, "credential persist failed");
                    }
                }

                TransportEvent::Messages(batch) => {
                    self.dispatcher.dispatch(handle.as_ref(), batch).await;
                }

                TransportEvent::Closed(reason) => {
                    return match reason.disconnect_reason() {
                        DisconnectReason::LoggedOut => AttemptEnd::LoggedOut(reason.to_string()),
                        DisconnectReason::Retryable => AttemptEnd::Retry(reason.to_string()),
                    };
                }
            }
        }

        // Provider dropped the event sender without a close event; treat it
        // like any other retryable failure.
        AttemptEnd::Retry("event stream ended without a close event".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_state_reports_open() {
        assert!(ConnectionState::Open.is_open());
        assert!(!ConnectionState::Connecting.is_open());
    }

    #[test]
    fn only_closed_terminal_is_terminal() {
        assert!(ConnectionState::ClosedTerminal.is_terminal());
        assert!(!ConnectionState::ClosedRetryable.is_terminal());
        assert!(!ConnectionState::Idle.is_terminal());
    }
}
