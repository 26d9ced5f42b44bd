//! Quorum parameters shared by every node of one ring.
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::consts::DEFAULT_READ_QUORUM;
use crate::consts::DEFAULT_REPLICATION;
use crate::consts::DEFAULT_TIMEOUT_SECS;
use crate::consts::DEFAULT_WRITE_QUORUM;
use crate::error::Error;
use crate::error::Result;

/// Replication and quorum settings of a ring instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RingConfig {
    /// Replication factor N, number of nodes holding each item.
    pub replication: usize,
    /// Read quorum R.
    pub read_quorum: usize,
    /// Write quorum W.
    pub write_quorum: usize,
    /// Timeout T of every await phase.
    pub timeout: Duration,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            replication: DEFAULT_REPLICATION,
            read_quorum: DEFAULT_READ_QUORUM,
            write_quorum: DEFAULT_WRITE_QUORUM,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl RingConfig {
    /// Create a config with timeout given in seconds.
    pub fn new(
        replication: usize,
        read_quorum: usize,
        write_quorum: usize,
        timeout_secs: u64,
    ) -> Self {
        Self {
            replication,
            read_quorum,
            write_quorum,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// Overwrite the timeout, mostly for tests that cannot wait seconds.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Check `R + W > N` and `W > N/2`, and that both quorums fit in `1..=N`.
    pub fn validate(&self) -> Result<()> {
        let (n, r, w) = (self.replication, self.read_quorum, self.write_quorum);
        if n == 0 {
            return Err(Error::InvalidRingConfig(
                "replication factor must be positive".to_string(),
            ));
        }
        if r == 0 || r > n {
            return Err(Error::InvalidRingConfig(format!(
                "read quorum {r} out of range 1..={n}"
            )));
        }
        if w == 0 || w > n {
            return Err(Error::InvalidRingConfig(format!(
                "write quorum {w} out of range 1..={n}"
            )));
        }
        if r + w <= n {
            return Err(Error::InvalidRingConfig(format!(
                "R + W must exceed N, got R={r} W={w} N={n}"
            )));
        }
        if 2 * w <= n {
            return Err(Error::InvalidRingConfig(format!(
                "W must exceed N/2, got W={w} N={n}"
            )));
        }
        Ok(())
    }
}
