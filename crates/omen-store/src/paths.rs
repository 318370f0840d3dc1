use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "OMEN_DATA_DIR";

/// Default base directory for all omen storage.
pub fn default_base_dir() -> PathBuf {
    dirs_home().join(".omen")
}

fn dirs_home() -> PathBuf {
    env::var("HOME")
        .or_else(|_| env::var("USERPROFILE"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("."))
}

/// Resolve the data directory: explicit path, then `OMEN_DATA_DIR`, then
/// `~/.omen`.
pub fn resolve_base_dir(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    match env::var_os(DATA_DIR_ENV) {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => default_base_dir(),
    }
}

/// Layout of the data directory:
///
/// ```text
/// ~/.omen/
/// ├── omen.toml
/// ├── sessions.db
/// └── Rules/
///     ├── Default/
///     └── <NAME>/
/// ```
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Open the data directory, creating it and `Rules/` as needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let dir = Self { root: root.into() };
        fs::create_dir_all(dir.rules_dir())?;
        Ok(dir)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn rules_dir(&self) -> PathBuf {
        self.root.join("Rules")
    }

    pub fn sessions_db(&self) -> PathBuf {
        self.root.join("sessions.db")
    }

    pub fn settings_file(&self) -> PathBuf {
        self.root.join("omen.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_dir_wins() {
        let dir = resolve_base_dir(Some(Path::new("/tmp/omen-explicit")));
        assert_eq!(dir, PathBuf::from("/tmp/omen-explicit"));
    }

    #[test]
    fn test_open_creates_layout() {
        let tmp = tempfile::tempdir().unwrap();
        let data = DataDir::open(tmp.path().join("nested")).unwrap();
        assert!(data.rules_dir().is_dir());
        assert_eq!(data.sessions_db(), tmp.path().join("nested/sessions.db"));
        assert_eq!(data.settings_file(), tmp.path().join("nested/omen.toml"));
    }
}
