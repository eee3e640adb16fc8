//! Liveness probing.
//!
//! A periodic self-directed request against the process's own health
//! endpoint. Purely observational: a wedged event loop shows up as probe
//! failures in the logs, and any corrective action belongs to whatever is
//! watching the process from outside. The prober never reconnects or
//! restarts anything.

use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, warn};

const DEFAULT_PROBE_INTERVAL: Duration = Duration::from_secs(300);
const PROBE_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the liveness prober.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ProbeConfig {
    /// Time between probes.
    pub interval: Duration,
    /// URL probed, normally the process's own health endpoint.
    pub url: String,
}

impl ProbeConfig {
    /// Probe the local health endpoint on `port` at the default interval.
    #[must_use]
    pub fn local(port: u16) -> Self {
        Self {
            interval: DEFAULT_PROBE_INTERVAL,
            url: format!("http://127.0.0.1:{port}/"),
        }
    }
}

/// Periodic self-check loop.
pub struct LivenessProber {
    config: ProbeConfig,
    client: reqwest::Client,
}

impl LivenessProber {
    #[must_use]
    pub fn new(config: ProbeConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    /// Run the probe loop forever.
    pub async fn run(self) {
        let mut ticker = interval(self.config.interval);
        // The first tick fires immediately; skip it so the endpoint has time
        // to come up before the first probe.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            self.probe_once().await;
        }
    }

    /// One probe. Failures are logged, never propagated.
    pub async fn probe_once(&self) {
        match self.client.get(&self.config.url).send().await {
            Ok(response) if response.status().is_success() => {
                debug!(url = %self.config.url, "liveness probe ok");
            }
            Ok(response) => {
                warn!(
                    url = %self.config.url,
                    status = %response.status(),
                    "liveness probe returned non-success"
                );
            }
            Err(e) => {
                warn!(url = %self.config.url, error = %e, "liveness probe failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_interval_is_five_minutes() {
        let config = ProbeConfig::local(3000);
        assert_eq!(config.interval, Duration::from_secs(300));
        assert_eq!(config.url, "http://127.0.0.1:3000/");
    }
}
