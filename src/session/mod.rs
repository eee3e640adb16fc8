//! Connection lifecycle management.
//!
//! The [`Supervisor`] owns the session state machine: it drives connection
//! attempts through the transport provider, classifies disconnects, schedules
//! retries, and re-attaches event consumers on every new connection. The
//! [`Dispatcher`] hands inbound messages to the external handler with
//! per-message failure isolation.

pub mod config;
pub mod dispatch;
pub mod supervisor;

pub use config::Config;
pub use dispatch::{Dispatcher, MessageHandler};
pub use supervisor::{ConnectionState, Supervisor};
