//! Server node configuration parameters.

use std::time::SystemTime;

use crate::utils::{from_unix_ms, GavelError};

use serde::Deserialize;

use tokio::time::Duration;

/// Configuration parameters struct.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize)]
pub struct ServerConfig {
    /// How long the primary waits for the backup's ack of one record.
    pub replication_timeout_ms: u64,

    /// Interval of explicit primary -> backup heartbeats; 0 disables them, in
    /// which case only replication traffic counts as liveness.
    pub heartbeat_interval_ms: u64,

    /// Backup watchdog polling interval.
    pub watchdog_tick_ms: u64,

    /// Primary silence after which the backup promotes itself (inclusive).
    pub promotion_threshold_ms: u64,

    /// How long the auction stays open.
    pub auction_duration_secs: u64,

    /// Auction start time in ms since the Unix epoch; 0 means process start.
    pub start_time_unix_ms: u64,

    /// If true, an accepted bid whose replication fails is reverted locally
    /// before replying `Exception`.
    pub rollback_on_repl_failure: bool,

    /// Extra attempts when the primary connects to the backup.
    pub peer_connect_retries: u8,
}

#[allow(clippy::derivable_impls)]
impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            replication_timeout_ms: 2000,
            heartbeat_interval_ms: 1000,
            watchdog_tick_ms: 1000,
            promotion_threshold_ms: 5000,
            auction_duration_secs: 100,
            start_time_unix_ms: 0,
            rollback_on_repl_failure: false,
            peer_connect_retries: 3,
        }
    }
}

impl ServerConfig {
    /// Parses an optional TOML config string on top of the defaults, then
    /// sanity-checks the result.
    pub fn from_toml(config_str: Option<&str>) -> Result<Self, GavelError> {
        let config = parsed_config!(config_str => ServerConfig;
                                    replication_timeout_ms,
                                    heartbeat_interval_ms,
                                    watchdog_tick_ms,
                                    promotion_threshold_ms,
                                    auction_duration_secs,
                                    start_time_unix_ms,
                                    rollback_on_repl_failure,
                                    peer_connect_retries)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the parameters for consistency.
    pub fn validate(&self) -> Result<(), GavelError> {
        if self.replication_timeout_ms == 0 {
            return logged_err!(
                "invalid config.replication_timeout_ms '{}'",
                self.replication_timeout_ms
            );
        }
        if self.watchdog_tick_ms == 0 {
            return logged_err!(
                "invalid config.watchdog_tick_ms '{}'",
                self.watchdog_tick_ms
            );
        }
        if self.promotion_threshold_ms < self.watchdog_tick_ms {
            return logged_err!(
                "config.promotion_threshold_ms '{}' shorter than watchdog tick '{}'",
                self.promotion_threshold_ms,
                self.watchdog_tick_ms
            );
        }
        if self.heartbeat_interval_ms >= self.promotion_threshold_ms {
            return logged_err!(
                "config.heartbeat_interval_ms '{}' must be below promotion threshold '{}'",
                self.heartbeat_interval_ms,
                self.promotion_threshold_ms
            );
        }
        if self.auction_duration_secs == 0 {
            return logged_err!(
                "invalid config.auction_duration_secs '{}'",
                self.auction_duration_secs
            );
        }
        Ok(())
    }

    pub fn replication_timeout(&self) -> Duration {
        Duration::from_millis(self.replication_timeout_ms)
    }

    /// `None` if explicit heartbeats are disabled.
    pub fn heartbeat_interval(&self) -> Option<Duration> {
        if self.heartbeat_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.heartbeat_interval_ms))
        }
    }

    pub fn watchdog_tick(&self) -> Duration {
        Duration::from_millis(self.watchdog_tick_ms)
    }

    pub fn promotion_threshold(&self) -> Duration {
        Duration::from_millis(self.promotion_threshold_ms)
    }

    pub fn auction_duration(&self) -> Duration {
        Duration::from_secs(self.auction_duration_secs)
    }

    /// Auction start time, with `now` substituted if unset.
    pub fn start_time(&self, now: SystemTime) -> SystemTime {
        if self.start_time_unix_ms == 0 {
            now
        } else {
            from_unix_ms(self.start_time_unix_ms)
        }
    }
}
