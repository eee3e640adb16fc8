use std::time::Duration;

const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(3);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_ANNOUNCE_DESTINATION: &str = "status@broadcast";
const DEFAULT_ANNOUNCE_TEXT: &str = "chatline session online";

/// Configuration for session lifecycle behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Fixed delay between reconnection attempts.
    ///
    /// Deliberately constant with no growth and no attempt cap: the bot has
    /// no external supervisor restarting the process, so it must eventually
    /// recover from arbitrarily long outages on its own.
    pub retry_delay: Duration,
    /// Maximum time one connection attempt may take before it is treated as
    /// a failed attempt and folded into the retry path.
    pub connect_timeout: Duration,
    /// Well-known broadcast destination for the readiness announcement.
    pub announce_destination: String,
    /// Text of the readiness announcement.
    pub announce_text: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            retry_delay: DEFAULT_RETRY_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            announce_destination: DEFAULT_ANNOUNCE_DESTINATION.to_owned(),
            announce_text: DEFAULT_ANNOUNCE_TEXT.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retry_delay_is_three_seconds() {
        let config = Config::default();
        assert_eq!(config.retry_delay, Duration::from_secs(3));
    }

    #[test]
    fn default_connect_timeout_is_one_minute() {
        let config = Config::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(60));
    }
}
