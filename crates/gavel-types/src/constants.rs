//! System-wide constants for the Gavel auction engine.

/// Default closing buffer in milliseconds. Bids landing inside this window
/// before the round deadline are rejected so an anti-snipe extension can
/// still be applied before the round physically ends.
pub const DEFAULT_BIDDING_BUFFER_MS: u64 = 3000;

/// Default "ending soon" broadcast thresholds, in seconds of remaining time.
pub const DEFAULT_ENDING_SOON_THRESHOLDS_SECS: [u64; 3] = [60, 30, 10];

/// Default anti-snipe trigger window: a bid within this many seconds of the
/// current round deadline extends the round.
pub const DEFAULT_ANTI_SNIPE_THRESHOLD_SECS: u64 = 60;

/// Default length of one anti-snipe extension, in seconds.
pub const DEFAULT_ANTI_SNIPE_EXTENSION_SECS: u64 = 30;

/// Default cap on anti-snipe extensions per round.
pub const DEFAULT_MAX_ANTI_SNIPE_EXTENSIONS: u32 = 3;

/// Default per-auction mutex expiry in milliseconds. Guarantees liveness if
/// a holder crashes mid-operation.
pub const DEFAULT_MUTEX_TTL_MS: u64 = 5000;

/// Default number of acquisition attempts before reporting busy.
pub const DEFAULT_MUTEX_MAX_ATTEMPTS: u32 = 3;

/// Default pause between mutex acquisition attempts, in milliseconds.
pub const DEFAULT_MUTEX_RETRY_INTERVAL_MS: u64 = 50;

/// Default delay before the single auto-bid funding retry, in milliseconds.
pub const DEFAULT_AUTO_BID_RETRY_DELAY_MS: u64 = 5000;

/// Default leaderboard cache TTL in milliseconds. The projection is
/// advisory; consumers tolerate staleness up to this bound.
pub const DEFAULT_LEADERBOARD_TTL_MS: u64 = 2000;

/// Default grace delay between one round completing and the next starting,
/// in seconds.
pub const DEFAULT_INTER_ROUND_GRACE_SECS: u64 = 10;

/// Default length of one bidding round, in seconds.
pub const DEFAULT_ROUND_DURATION_SECS: u64 = 600;

/// Version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Engine name.
pub const ENGINE_NAME: &str = "Gavel";
