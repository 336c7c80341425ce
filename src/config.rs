//! Configuration types for sync-propagator

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Propagation engine configuration
///
/// All fields have sensible defaults; construct with `Default::default()` or
/// deserialize from the host application's settings file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PropagatorConfig {
    /// Maximum items dispatched ahead of completion per job (default: 6)
    ///
    /// Bounds how many downloads one directory's batch keeps outstanding at a
    /// time, limiting server and network load. Cross-job concurrency is
    /// governed by each job's parallelism declaration, not by this cap.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    /// Maximum items combined into one physical bulk request (default: 20)
    ///
    /// Dispatched non-encrypted items are grouped into bulk requests of at
    /// most this many items. A batch of one degrades to a plain single-item
    /// request with identical per-item semantics.
    #[serde(default = "default_bulk_batch_limit")]
    pub bulk_batch_limit: usize,

    /// Root of the local sync tree (default: "./sync")
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,

    /// Staging directory for in-progress transfers (default: "./sync/.partial")
    ///
    /// Delegates write content here; the local store renames finished files
    /// into `local_dir`. Keep it on the same filesystem so the rename is
    /// atomic.
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Sync journal database path (None = in-memory journal)
    #[serde(default)]
    pub journal_path: Option<PathBuf>,
}

impl Default for PropagatorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: default_max_in_flight(),
            bulk_batch_limit: default_bulk_batch_limit(),
            local_dir: default_local_dir(),
            staging_dir: default_staging_dir(),
            journal_path: None,
        }
    }
}

impl PropagatorConfig {
    /// Validate the configuration, returning a descriptive error for the
    /// first invalid setting.
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(Error::Config {
                message: "max_in_flight must be at least 1".to_string(),
                key: Some("max_in_flight".to_string()),
            });
        }
        if self.bulk_batch_limit == 0 {
            return Err(Error::Config {
                message: "bulk_batch_limit must be at least 1".to_string(),
                key: Some("bulk_batch_limit".to_string()),
            });
        }
        if self.local_dir == self.staging_dir {
            return Err(Error::Config {
                message: "staging_dir must differ from local_dir".to_string(),
                key: Some("staging_dir".to_string()),
            });
        }
        Ok(())
    }
}

fn default_max_in_flight() -> usize {
    6
}

fn default_bulk_batch_limit() -> usize {
    20
}

fn default_local_dir() -> PathBuf {
    PathBuf::from("./sync")
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("./sync/.partial")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = PropagatorConfig::default();
        assert_eq!(config.max_in_flight, 6);
        assert_eq!(config.bulk_batch_limit, 20);
        assert!(config.journal_path.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn zero_caps_are_rejected() {
        let config = PropagatorConfig {
            max_in_flight: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Config { key: Some(k), .. }) if k == "max_in_flight"
        ));

        let config = PropagatorConfig {
            bulk_batch_limit: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::Config { key: Some(k), .. }) if k == "bulk_batch_limit"
        ));
    }

    #[test]
    fn staging_dir_must_differ_from_local_dir() {
        let config = PropagatorConfig {
            local_dir: PathBuf::from("/data"),
            staging_dir: PathBuf::from("/data"),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: PropagatorConfig =
            serde_json::from_str(r#"{"max_in_flight": 2}"#).unwrap();
        assert_eq!(config.max_in_flight, 2);
        assert_eq!(config.bulk_batch_limit, 20);
        assert_eq!(config.local_dir, PathBuf::from("./sync"));
    }
}
