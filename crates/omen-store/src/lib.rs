//! Persistence for omen: ruleset directories, the built-in default ruleset,
//! SQLite session checkpoints and `omen.toml` settings.

pub mod checkpoint;
pub mod default_ruleset;
pub mod error;
pub mod paths;
pub mod rules;
pub mod schema;
pub mod sessions;
pub mod settings;

pub use checkpoint::CheckpointManager;
pub use error::{Result, StoreError};
pub use paths::{DATA_DIR_ENV, DataDir, default_base_dir, resolve_base_dir};
pub use rules::RulesetStore;
pub use sessions::{SessionStore, SessionSummary};
pub use settings::Settings;
