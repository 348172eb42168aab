//! Client configuration parameters.

use crate::utils::GavelError;

use serde::Deserialize;

use tokio::time::Duration;

/// Configuration parameters struct.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize)]
pub struct ClientConfig {
    /// Bound on waiting for one reply.
    pub rpc_timeout_ms: u64,

    /// Bound on one connection attempt.
    pub connect_timeout_ms: u64,
}

#[allow(clippy::derivable_impls)]
impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            rpc_timeout_ms: 5000,
            connect_timeout_ms: 3000,
        }
    }
}

impl ClientConfig {
    /// Parses an optional TOML config string on top of the defaults.
    pub fn from_toml(config_str: Option<&str>) -> Result<Self, GavelError> {
        let config = parsed_config!(config_str => ClientConfig;
                                    rpc_timeout_ms, connect_timeout_ms)?;
        if config.rpc_timeout_ms == 0 {
            return logged_err!(
                "invalid config.rpc_timeout_ms '{}'",
                config.rpc_timeout_ms
            );
        }
        if config.connect_timeout_ms == 0 {
            return logged_err!(
                "invalid config.connect_timeout_ms '{}'",
                config.connect_timeout_ms
            );
        }
        Ok(config)
    }

    #[inline]
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}
