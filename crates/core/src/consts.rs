//! Constant variables.

/// Default replication factor N.
pub const DEFAULT_REPLICATION: usize = 2;
/// Default read quorum R.
pub const DEFAULT_READ_QUORUM: usize = 2;
/// Default write quorum W.
pub const DEFAULT_WRITE_QUORUM: usize = 2;
/// Default protocol timeout T in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;
/// Max delay in ms on sending message
pub const DEFAULT_LATENCY_MAX_MS: u64 = 100;
/// Min delay in ms on sending message
pub const DEFAULT_LATENCY_MIN_MS: u64 = 0;
