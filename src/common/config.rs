//! Configuration for the blobmaster process

use crate::common::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix, e.g. `BLOBMASTER_PULSE_SECONDS=3`
const ENV_PREFIX: &str = "BLOBMASTER";

/// Master configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasterConfig {
    /// Topology root id
    #[serde(default = "default_id")]
    pub id: String,

    /// Size ceiling of a single volume, in megabytes
    #[serde(default = "default_volume_size_limit_mb")]
    pub volume_size_limit_mb: u64,

    /// Expected heartbeat interval of storage nodes
    #[serde(default = "default_pulse_seconds")]
    pub pulse_seconds: u64,

    /// Directory holding the durable sequence
    #[serde(default = "default_meta_dir")]
    pub meta_dir: PathBuf,

    /// File name of the durable sequence inside `meta_dir`
    #[serde(default = "default_sequence_file")]
    pub sequence_file: String,

    /// Rack/datacenter mapping file
    #[serde(default)]
    pub topology_file: Option<PathBuf>,

    /// Replication used when a request names none
    #[serde(default = "default_replication")]
    pub default_replication: String,

    /// Ids reserved per durable write of the sequence
    #[serde(default = "default_sequence_batch")]
    pub sequence_batch: u64,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_id() -> String {
    "topo".to_string()
}
fn default_volume_size_limit_mb() -> u64 {
    32 * 1024
}
fn default_pulse_seconds() -> u64 {
    5
}
fn default_meta_dir() -> PathBuf {
    PathBuf::from("./master-data")
}
fn default_sequence_file() -> String {
    "sequence.dat".to_string()
}
fn default_replication() -> String {
    "00".to_string()
}
fn default_sequence_batch() -> u64 {
    10_000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            id: default_id(),
            volume_size_limit_mb: default_volume_size_limit_mb(),
            pulse_seconds: default_pulse_seconds(),
            meta_dir: default_meta_dir(),
            sequence_file: default_sequence_file(),
            topology_file: None,
            default_replication: default_replication(),
            sequence_batch: default_sequence_batch(),
            log_level: default_log_level(),
        }
    }
}

impl MasterConfig {
    /// Load configuration: defaults, then the optional TOML file, then
    /// `BLOBMASTER_*` environment variables.
    ///
    /// A missing file is not an error; a malformed one is.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(false),
            );
        }
        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        let conf: MasterConfig = builder.build()?.try_deserialize()?;
        conf.validate()?;
        Ok(conf)
    }

    /// Parse configuration from an in-memory TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let conf: MasterConfig = config::Config::builder()
            .add_source(config::File::from_str(s, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        conf.validate()?;
        Ok(conf)
    }

    fn validate(&self) -> Result<()> {
        if self.volume_size_limit_mb == 0 {
            return Err(crate::Error::InvalidConfig(
                "volume_size_limit_mb must be positive".into(),
            ));
        }
        if self.pulse_seconds == 0 {
            return Err(crate::Error::InvalidConfig(
                "pulse_seconds must be positive".into(),
            ));
        }
        if self.sequence_batch == 0 {
            return Err(crate::Error::InvalidConfig(
                "sequence_batch must be positive".into(),
            ));
        }
        self.default_replication
            .parse::<crate::volume::ReplicationPolicy>()?;
        Ok(())
    }

    /// Volume size ceiling in bytes
    pub fn volume_size_limit(&self) -> u64 {
        self.volume_size_limit_mb * 1024 * 1024
    }

    pub fn pulse(&self) -> Duration {
        Duration::from_secs(self.pulse_seconds)
    }

    /// Full path of the sequence file
    pub fn sequence_path(&self) -> PathBuf {
        self.meta_dir.join(&self.sequence_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let conf = MasterConfig::default();
        assert_eq!(conf.volume_size_limit(), 32 * 1024 * 1024 * 1024);
        assert_eq!(conf.pulse(), Duration::from_secs(5));
        assert_eq!(
            conf.sequence_path(),
            PathBuf::from("./master-data/sequence.dat")
        );
    }

    #[test]
    fn test_from_toml_overrides() {
        let conf = MasterConfig::from_toml_str(
            r#"
            id = "master-1"
            volume_size_limit_mb = 100
            pulse_seconds = 2
            default_replication = "01"
            "#,
        )
        .unwrap();
        assert_eq!(conf.id, "master-1");
        assert_eq!(conf.volume_size_limit(), 100 * 1024 * 1024);
        assert_eq!(conf.pulse_seconds, 2);
        assert_eq!(conf.default_replication, "01");
        assert_eq!(conf.sequence_batch, 10_000);
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(MasterConfig::from_toml_str("pulse_seconds = 0").is_err());
        assert!(MasterConfig::from_toml_str(r#"default_replication = "99""#).is_err());
        assert!(MasterConfig::from_toml_str("volume_size_limit_mb = [").is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let conf = MasterConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(conf.id, "topo");
    }
}
