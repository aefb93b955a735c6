//! Process-wide engine configuration.
//!
//! Per-auction bidding rules live in [`crate::AuctionConfig`]; this module
//! holds the timing knobs shared by every auction an engine instance
//! serves.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Per-auction mutex tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutexConfig {
    /// Lock expiry; guarantees liveness if a holder crashes.
    pub ttl: Duration,
    /// Acquisition attempts before the caller sees `ServerBusy`.
    pub max_attempts: u32,
    /// Pause between attempts.
    pub retry_interval: Duration,
}

impl Default for MutexConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_millis(constants::DEFAULT_MUTEX_TTL_MS),
            max_attempts: constants::DEFAULT_MUTEX_MAX_ATTEMPTS,
            retry_interval: Duration::from_millis(constants::DEFAULT_MUTEX_RETRY_INTERVAL_MS),
        }
    }
}

/// Engine-wide timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Closing buffer before the round deadline in which bids are rejected.
    pub bidding_buffer: Duration,
    /// Remaining-seconds marks at which an "ending soon" signal fires.
    pub ending_soon_thresholds_secs: Vec<u64>,
    /// Grace delay between one round completing and the next starting.
    pub inter_round_grace: Duration,
    /// Delay before the single auto-bid funding retry.
    pub auto_bid_retry_delay: Duration,
    /// Leaderboard projection cache TTL.
    pub leaderboard_ttl: Duration,
    /// Per-auction mutex tuning.
    pub mutex: MutexConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bidding_buffer: Duration::from_millis(constants::DEFAULT_BIDDING_BUFFER_MS),
            ending_soon_thresholds_secs: constants::DEFAULT_ENDING_SOON_THRESHOLDS_SECS.to_vec(),
            inter_round_grace: Duration::from_secs(constants::DEFAULT_INTER_ROUND_GRACE_SECS),
            auto_bid_retry_delay: Duration::from_millis(constants::DEFAULT_AUTO_BID_RETRY_DELAY_MS),
            leaderboard_ttl: Duration::from_millis(constants::DEFAULT_LEADERBOARD_TTL_MS),
            mutex: MutexConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_config_defaults() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.bidding_buffer.as_millis(), 3000);
        assert_eq!(cfg.ending_soon_thresholds_secs, vec![60, 30, 10]);
        assert_eq!(cfg.auto_bid_retry_delay.as_secs(), 5);
        assert_eq!(cfg.mutex.ttl.as_secs(), 5);
        assert_eq!(cfg.mutex.max_attempts, 3);
    }

    #[test]
    fn config_serde_roundtrip() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.bidding_buffer, cfg.bidding_buffer);
        assert_eq!(back.mutex.max_attempts, cfg.mutex.max_attempts);
    }
}
