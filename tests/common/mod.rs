#![allow(
    dead_code,
    reason = "Each test binary uses a different subset of these helpers"
)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use chatline::Result;
use chatline::credentials::SignalKeyCache;
use chatline::error::Error;
use chatline::session::MessageHandler;
use chatline::store::{DurableStore, MemoryStore};
use chatline::transport::{
    ConnectionHandle, EventReceiver, EventSender, InboundMessage, TransportEvent,
    TransportProvider,
};

const WAIT_BUDGET: Duration = Duration::from_secs(30);
const POLL: Duration = Duration::from_millis(10);

/// Transport provider driven from the outside by the test.
///
/// Every `open` records the supplied credentials and hands back a fresh
/// handle; the test pushes events into the newest attempt with [`emit`].
///
/// [`emit`]: ScriptedProvider::emit
pub struct ScriptedProvider {
    opens: AtomicUsize,
    /// Number of initial opens that fail before connections start succeeding.
    failing_opens: AtomicUsize,
    attempts: Mutex<Vec<EventSender>>,
    creds_seen: Mutex<Vec<Value>>,
    sent: Arc<Mutex<Vec<(String, String)>>>,
    fail_sends: Arc<AtomicBool>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            opens: AtomicUsize::new(0),
            failing_opens: AtomicUsize::new(0),
            attempts: Mutex::new(Vec::new()),
            creds_seen: Mutex::new(Vec::new()),
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_sends: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Make the first `n` calls to `open` fail.
    pub fn fail_first_opens(&self, n: usize) {
        self.failing_opens.store(n, Ordering::SeqCst);
    }

    /// Make every `send` on every handle fail.
    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Number of successful and failed `open` calls so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Identity secrets passed to each successful open, oldest first.
    pub fn creds_seen(&self) -> Vec<Value> {
        self.creds_seen.lock().unwrap().clone()
    }

    /// Everything sent on any handle, as (destination, text) pairs.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }

    /// Push an event into the newest attempt's stream. Returns `false` once
    /// that attempt's receiver has been dropped.
    pub fn emit(&self, event: TransportEvent) -> bool {
        let attempts = self.attempts.lock().unwrap();
        match attempts.last() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Drop the newest attempt's sender, ending its event stream without a
    /// close event.
    pub fn drop_attempt(&self) {
        self.attempts.lock().unwrap().pop();
    }

    /// Block until at least `n` opens happened.
    pub async fn wait_for_opens(&self, n: usize) {
        tokio::time::timeout(WAIT_BUDGET, async {
            while self.open_count() < n {
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .expect("timed out waiting for connection attempts");
    }
}

#[async_trait]
impl TransportProvider for ScriptedProvider {
    async fn open(
        &self,
        creds: &Value,
        _keys: SignalKeyCache,
    ) -> Result<(Box<dyn ConnectionHandle>, EventReceiver)> {
        self.opens.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failing_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(Error::transport("scripted open failure"));
        }

        self.creds_seen.lock().unwrap().push(creds.clone());

        let (tx, rx) = mpsc::unbounded_channel();
        self.attempts.lock().unwrap().push(tx);

        let handle = ScriptedConnection {
            sent: Arc::clone(&self.sent),
            fail_sends: Arc::clone(&self.fail_sends),
        };
        Ok((Box::new(handle), rx))
    }
}

struct ScriptedConnection {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    fail_sends: Arc<AtomicBool>,
}

#[async_trait]
impl ConnectionHandle for ScriptedConnection {
    async fn send(&self, destination: &str, text: &str) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(Error::transport("scripted send failure"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((destination.to_owned(), text.to_owned()));
        Ok(())
    }
}

/// Store whose reads work but whose writes always fail.
#[derive(Default)]
pub struct ReadOnlyStore {
    inner: MemoryStore,
}

impl ReadOnlyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableStore for ReadOnlyStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.inner.get(key).await
    }

    async fn put(&self, _key: &str, _value: &[u8]) -> Result<()> {
        Err(Error::storage("store is read-only"))
    }

    async fn delete(&self, _key: &str) -> Result<()> {
        Err(Error::storage("store is read-only"))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }
}

/// Handler that records message ids and fails on the poisoned ones.
pub struct CountingHandler {
    seen: Mutex<Vec<String>>,
    poison: Vec<String>,
}

impl CountingHandler {
    pub fn new(poison: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(Vec::new()),
            poison: poison.iter().map(|s| (*s).to_owned()).collect(),
        })
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }

    /// Block until the handler has been invoked at least `n` times.
    pub async fn wait_for_handled(&self, n: usize) {
        tokio::time::timeout(WAIT_BUDGET, async {
            while self.seen.lock().unwrap().len() < n {
                tokio::time::sleep(POLL).await;
            }
        })
        .await
        .expect("timed out waiting for handled messages");
    }
}

#[async_trait]
impl MessageHandler for CountingHandler {
    async fn handle(
        &self,
        _connection: &dyn ConnectionHandle,
        message: InboundMessage,
    ) -> Result<()> {
        self.seen.lock().unwrap().push(message.key.id.clone());
        if self.poison.contains(&message.key.id) {
            return Err(Error::transport("poisoned message"));
        }
        Ok(())
    }
}
