//! Engine configuration.

use std::time::Duration;

use thiserror::Error;

/// Working parameters for the consensus engine.
#[derive(Debug, Clone)]
pub struct Config {
    /// Target interval between accepted blocks. Also the base unit for view
    /// timeouts: view `v` waits `block_interval << (v + 1)` before asking
    /// for the next view change.
    pub block_interval: Duration,

    /// Minimum increment (milliseconds) between consecutive block
    /// timestamps. A proposal's timestamp is the wall clock or the previous
    /// block's timestamp plus this, whichever is later.
    pub timestamp_increment: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_interval: Duration::from_secs(15),
            timestamp_increment: 1,
        }
    }
}

/// Fatal configuration problems detected at construction.
///
/// These are the only errors the engine ever returns to a caller; every
/// protocol-level failure is handled internally.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("block interval must be non-zero")]
    ZeroBlockInterval,

    #[error("host returned no validators for height {height}")]
    NoValidators { height: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_protocol_constants() {
        let cfg = Config::default();
        assert_eq!(cfg.block_interval, Duration::from_secs(15));
        assert_eq!(cfg.timestamp_increment, 1);
    }
}
