//! Resumable guessing sessions.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::enumerate::Cursor;
use crate::error::{CoreError, Result};
use crate::ruleset::Ruleset;

/// A named enumeration run bound to one ruleset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub name: String,
    pub ruleset: String,
    pub fingerprint: String,
    pub cursor: Cursor,
}

impl Session {
    /// A session positioned before the first guess.
    pub fn new(name: impl Into<String>, ruleset: &Ruleset) -> Self {
        Self {
            name: name.into(),
            ruleset: ruleset.name().to_string(),
            fingerprint: ruleset.fingerprint().to_string(),
            cursor: Cursor::start(),
        }
    }

    /// Fails with `SessionMismatch` unless `ruleset` is the exact ruleset
    /// this session was recorded against.
    pub fn verify(&self, ruleset: &Ruleset) -> Result<()> {
        if self.ruleset != ruleset.name() || self.fingerprint != ruleset.fingerprint() {
            return Err(CoreError::SessionMismatch {
                session: self.name.clone(),
                expected: format!("{}@{}", self.ruleset, short(&self.fingerprint)),
                found: format!("{}@{}", ruleset.name(), short(ruleset.fingerprint())),
            });
        }
        Ok(())
    }
}

fn short(fingerprint: &str) -> &str {
    fingerprint.get(..12).unwrap_or(fingerprint)
}

/// When to persist the cursor while guessing.
#[derive(Debug, Clone)]
pub struct CheckpointPolicy {
    every: u64,
    interval: Duration,
    last_emitted: u64,
    last_at: Instant,
}

impl CheckpointPolicy {
    /// `every == 0` or a zero interval disables that trigger.
    pub fn new(every: u64, interval: Duration) -> Self {
        Self {
            every,
            interval,
            last_emitted: 0,
            last_at: Instant::now(),
        }
    }

    /// Start counting from a restored position.
    pub fn starting_at(mut self, emitted: u64) -> Self {
        self.last_emitted = emitted;
        self
    }

    pub fn due(&self, emitted: u64, now: Instant) -> bool {
        let by_count = self.every > 0 && emitted.saturating_sub(self.last_emitted) >= self.every;
        let by_time = !self.interval.is_zero()
            && emitted > self.last_emitted
            && now.duration_since(self.last_at) >= self.interval;
        by_count || by_time
    }

    pub fn mark(&mut self, emitted: u64, now: Instant) {
        self.last_emitted = emitted;
        self.last_at = now;
    }
}

impl Default for CheckpointPolicy {
    fn default() -> Self {
        Self::new(1_000_000, Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::Alphabet;
    use crate::ruleset::tests::sample_config;
    use crate::ruleset::{LevelTables, Ruleset};

    fn ruleset(name: &str, end_level: u32) -> Ruleset {
        let a = Alphabet::new("ab".chars()).unwrap();
        let mut config = sample_config(&a, 2);
        config.max_length = 2;
        let mut tables = LevelTables {
            lengths: vec![0, 1],
            ..LevelTables::default()
        };
        tables.ep.insert(0, end_level);
        Ruleset::new(name, config, a, tables).unwrap()
    }

    #[test]
    fn test_verify_accepts_same_ruleset() {
        let r = ruleset("r", 0);
        assert!(Session::new("s", &r).verify(&r).is_ok());
    }

    #[test]
    fn test_verify_rejects_retrained_ruleset() {
        let session = Session::new("s", &ruleset("r", 0));
        let err = session.verify(&ruleset("r", 3)).unwrap_err();
        assert!(matches!(err, CoreError::SessionMismatch { .. }));
    }

    #[test]
    fn test_verify_rejects_other_name() {
        let session = Session::new("s", &ruleset("r", 0));
        assert!(session.verify(&ruleset("other", 0)).is_err());
    }

    #[test]
    fn test_policy_by_count() {
        let now = Instant::now();
        let mut p = CheckpointPolicy::new(100, Duration::ZERO);
        assert!(!p.due(99, now));
        assert!(p.due(100, now));
        p.mark(100, now);
        assert!(!p.due(150, now));
        assert!(p.due(200, now));
    }

    #[test]
    fn test_policy_by_time() {
        let start = Instant::now();
        let mut p = CheckpointPolicy::new(0, Duration::from_secs(60));
        p.mark(0, start);
        assert!(!p.due(5, start + Duration::from_secs(59)));
        assert!(p.due(5, start + Duration::from_secs(60)));
        // nothing new since the last checkpoint
        assert!(!p.due(0, start + Duration::from_secs(120)));
    }

    #[test]
    fn test_policy_resumes_from_restored_count() {
        let p = CheckpointPolicy::new(10, Duration::ZERO).starting_at(1000);
        assert!(!p.due(1005, Instant::now()));
        assert!(p.due(1010, Instant::now()));
    }
}
