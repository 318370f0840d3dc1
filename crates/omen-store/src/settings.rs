//! Optional `omen.toml` in the data directory.
//!
//! ```toml
//! [training]
//! ngram = 4
//! max_level = 10
//! max_length = 20
//! workers = 8
//! shard_size = 65536
//!
//! [guessing]
//! checkpoint_every = 1000000
//! checkpoint_secs = 60
//! ```
//!
//! Every key is optional. Command-line flags override whatever is set here.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use omen_core::{CheckpointPolicy, Level, TrainingConfig};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub training: TrainingSettings,
    pub guessing: GuessingSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingSettings {
    pub ngram: Option<usize>,
    pub max_level: Option<Level>,
    pub max_length: Option<usize>,
    pub workers: Option<usize>,
    pub shard_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GuessingSettings {
    pub checkpoint_every: Option<u64>,
    pub checkpoint_secs: Option<u64>,
}

impl Settings {
    /// Read `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let settings = Self::parse(&content)
            .map_err(|e| StoreError::Settings(format!("{}: {e}", path.display())))?;
        tracing::debug!("loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Training defaults with this file's overrides applied.
    pub fn training_config(&self) -> TrainingConfig {
        let defaults = TrainingConfig::default();
        let t = &self.training;
        TrainingConfig {
            ngram: t.ngram.unwrap_or(defaults.ngram),
            max_level: t.max_level.unwrap_or(defaults.max_level),
            max_length: t.max_length.unwrap_or(defaults.max_length),
            workers: t.workers.or(defaults.workers),
            shard_size: t.shard_size.unwrap_or(defaults.shard_size),
            ..defaults
        }
    }

    pub fn checkpoint_policy(&self) -> CheckpointPolicy {
        let defaults = CheckpointPolicy::default();
        match (self.guessing.checkpoint_every, self.guessing.checkpoint_secs) {
            (None, None) => defaults,
            (every, secs) => CheckpointPolicy::new(
                every.unwrap_or(DEFAULT_CHECKPOINT_EVERY),
                Duration::from_secs(secs.unwrap_or(DEFAULT_CHECKPOINT_SECS)),
            ),
        }
    }
}

const DEFAULT_CHECKPOINT_EVERY: u64 = 1_000_000;
const DEFAULT_CHECKPOINT_SECS: u64 = 60;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::load(&tmp.path().join("omen.toml")).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.training_config(), TrainingConfig::default());
    }

    #[test]
    fn test_partial_overrides() {
        let settings = Settings::parse("[training]\nngram = 3\nworkers = 2\n").unwrap();
        let config = settings.training_config();
        assert_eq!(config.ngram, 3);
        assert_eq!(config.workers, Some(2));
        assert_eq!(config.max_level, TrainingConfig::default().max_level);
    }

    #[test]
    fn test_checkpoint_policy_from_settings() {
        let settings = Settings::parse("[guessing]\ncheckpoint_every = 5\n").unwrap();
        let policy = settings.checkpoint_policy();
        let now = std::time::Instant::now();
        assert!(!policy.due(4, now));
        assert!(policy.due(5, now));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("omen.toml");
        fs::write(&path, "[training]\nngrm = 3\n").unwrap();
        assert!(matches!(Settings::load(&path), Err(StoreError::Settings(_))));
    }
}
