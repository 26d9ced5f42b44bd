//! YAML configuration of the harness.
use std::fs;
use std::io;
use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;
use crate::error::Result;
use crate::logging::LogLevel;
use crate::prelude::ringkv_core::config::RingConfig;
use crate::prelude::ringkv_core::consts;
use crate::prelude::ringkv_core::transport::LatencyConfig;
use crate::util::ensure_parent_dir;
use crate::util::expand_home;

pub const DEFAULT_CONFIG_LOCATION: &str = "~/.ringkv/config.yaml";
pub const DEFAULT_REPLICATION: usize = consts::DEFAULT_REPLICATION;
pub const DEFAULT_READ_QUORUM: usize = consts::DEFAULT_READ_QUORUM;
pub const DEFAULT_WRITE_QUORUM: usize = consts::DEFAULT_WRITE_QUORUM;
pub const DEFAULT_TIMEOUT_SECS: u64 = consts::DEFAULT_TIMEOUT_SECS;
pub const DEFAULT_LATENCY_MIN_MS: u64 = consts::DEFAULT_LATENCY_MIN_MS;
pub const DEFAULT_LATENCY_MAX_MS: u64 = consts::DEFAULT_LATENCY_MAX_MS;

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Replication factor N.
    pub replication: usize,
    /// Read quorum R.
    pub read_quorum: usize,
    /// Write quorum W.
    pub write_quorum: usize,
    /// Protocol timeout T.
    pub timeout_secs: u64,
    /// Lower bound of the injected latency.
    #[serde(default)]
    pub latency_min_ms: u64,
    /// Upper bound of the injected latency.
    #[serde(default)]
    pub latency_max_ms: u64,
    /// When missing from the YAML file, `info`.
    #[serde(default = "default_log_level")]
    pub log_level: LogLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            replication: DEFAULT_REPLICATION,
            read_quorum: DEFAULT_READ_QUORUM,
            write_quorum: DEFAULT_WRITE_QUORUM,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            latency_min_ms: DEFAULT_LATENCY_MIN_MS,
            latency_max_ms: DEFAULT_LATENCY_MAX_MS,
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Ring parameters, validated.
    pub fn ring(&self) -> Result<RingConfig> {
        let config = RingConfig::new(
            self.replication,
            self.read_quorum,
            self.write_quorum,
            self.timeout_secs,
        );
        config.validate()?;
        Ok(config)
    }

    pub fn latency(&self) -> LatencyConfig {
        LatencyConfig {
            min_ms: self.latency_min_ms,
            max_ms: self.latency_max_ms,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn write_fs<P>(&self, path: P) -> Result<String>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        ensure_parent_dir(&path)?;
        let f =
            fs::File::create(path.as_path()).map_err(|e| Error::CreateFileError(e.to_string()))?;
        let f_writer = io::BufWriter::new(f);
        serde_yaml::to_writer(f_writer, self)?;
        Ok(path.to_string_lossy().to_string())
    }

    pub fn read_fs<P>(path: P) -> Result<Config>
    where P: AsRef<std::path::Path> {
        let path = expand_home(path)?;
        tracing::debug!("Read config from: {:?}", path);
        let f = fs::File::open(path).map_err(|e| Error::OpenFileError(e.to_string()))?;
        let f_rdr = io::BufReader::new(f);
        Ok(serde_yaml::from_reader(f_rdr)?)
    }
}
