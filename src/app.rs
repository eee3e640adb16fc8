//! Process bootstrap and shutdown.
//!
//! Everything a bot binary needs around the session core: logging setup,
//! store selection, the health endpoint, the liveness prober, and signal
//! handling. The embedder supplies the two external capabilities, a
//! transport provider and a message handler, and calls [`run`]:
//!
//! ```rust, no_run
//! use std::process::ExitCode;
//! use std::sync::Arc;
//!
//! use chatline::app;
//! use chatline::config::Args;
//! use clap::Parser as _;
//!
//! # fn provider() -> Arc<dyn chatline::transport::TransportProvider> { unimplemented!() }
//! # fn handler() -> Arc<dyn chatline::session::MessageHandler> { unimplemented!() }
//! #[tokio::main]
//! async fn main() -> ExitCode {
//!     let _ = dotenvy::dotenv();
//!     let args = Args::parse();
//!     app::init_tracing(&args.log_level);
//!
//!     match app::run(args, provider(), handler()).await {
//!         Ok(()) => ExitCode::SUCCESS,
//!         Err(e) => {
//!             tracing::error!(error = %e, "startup failed");
//!             ExitCode::FAILURE
//!         }
//!     }
//! }
//! ```

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;

use crate::Result;
use crate::config::Args;
use crate::credentials::CredentialStore;
use crate::probe::{LivenessProber, ProbeConfig};
use crate::server::HealthServer;
use crate::session::{Config as SessionConfig, MessageHandler, Supervisor};
use crate::store::{DurableStore, MemoryStore, MongoStore};
use crate::transport::TransportProvider;

/// Install the global tracing subscriber with an env-filter fallback.
pub fn init_tracing(log_level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("chatline={log_level},info").into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Pick and connect the durable store from configuration.
///
/// The second element keeps a MongoDB handle for graceful disconnect; it is
/// `None` for the memory store. An unreachable MongoDB is an error here and
/// fatal at boot: without state persistence the bot cannot safely operate.
pub async fn select_store(args: &Args) -> Result<(Arc<dyn DurableStore>, Option<MongoStore>)> {
    if args.wants_memory_store() {
        warn!("using in-process store; credentials will not survive a restart");
        return Ok((Arc::new(MemoryStore::new()), None));
    }

    let mongo = MongoStore::connect(&args.datastore_uri, &args.datastore_db).await?;
    Ok((Arc::new(mongo.clone()), Some(mongo)))
}

/// Run the bot process until SIGINT.
///
/// Startup failures (bad config, unreachable datastore, health port taken)
/// return `Err` before any connection attempt; the caller exits non-zero.
/// After startup nothing terminates the process except the signal: a logout
/// stops the session supervisor but the health endpoint stays up, and a
/// failed background task is logged and left dead rather than crashing the
/// process.
pub async fn run(
    args: Args,
    provider: Arc<dyn TransportProvider>,
    handler: Arc<dyn MessageHandler>,
) -> Result<()> {
    args.validate()?;

    info!("======================================");
    info!("  chatline {}", env!("CARGO_PKG_VERSION"));
    info!("======================================");
    info!("Datastore: {}", args.datastore_uri);
    info!("Health port: {}", args.port);
    info!(
        "Credential override: {}",
        if args.session_data().is_some() {
            "supplied"
        } else {
            "none"
        }
    );
    info!("======================================");

    let (store, mongo) = select_store(&args).await?;

    let server = HealthServer::bind(args.port).await?;
    let port = server.local_addr()?.port();

    let supervisor = Supervisor::new(
        provider,
        CredentialStore::new(store),
        handler,
        SessionConfig::default(),
    )
    .with_override(args.session_data());
    let mut state_rx = supervisor.state_receiver();

    let mut server_task = tokio::spawn(server.run());
    let mut probe_task = tokio::spawn(LivenessProber::new(ProbeConfig::local(port)).run());
    let mut supervisor_task = tokio::spawn(supervisor.run());

    let mut server_done = false;
    let mut probe_done = false;
    let mut supervisor_done = false;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    error!(error = %e, "signal listener failed; shutting down");
                } else {
                    info!("SIGINT received; shutting down");
                }
                break;
            }

            result = &mut supervisor_task, if !supervisor_done => {
                supervisor_done = true;
                match result {
                    Ok(()) => {
                        let state = *state_rx.borrow_and_update();
                        info!(?state, "session supervisor stopped; health endpoint stays up");
                    }
                    Err(e) => error!(error = %e, "session supervisor task failed; process stays alive"),
                }
            }

            result = &mut server_task, if !server_done => {
                server_done = true;
                if let Err(e) = result {
                    error!(error = %e, "health endpoint task failed; process stays alive");
                }
            }

            result = &mut probe_task, if !probe_done => {
                probe_done = true;
                if let Err(e) = result {
                    error!(error = %e, "liveness prober task failed; process stays alive");
                }
            }
        }
    }

    if !supervisor_done {
        supervisor_task.abort();
    }
    if !server_done {
        server_task.abort();
    }
    if !probe_done {
        probe_task.abort();
    }
    if let Some(mongo) = mongo {
        mongo.disconnect().await;
    }
    info!("shutdown complete");
    Ok(())
}
