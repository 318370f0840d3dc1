//! Session checkpoints on top of [`SessionStore`].
//!
//! Output must be flushed before a cursor is persisted, otherwise a restore
//! would skip guesses that never reached the consumer. `maybe_checkpoint`
//! takes the flush as a closure and runs it first.

use std::io;
use std::time::Instant;

use omen_core::{CheckpointPolicy, Ruleset, Session};

use crate::error::Result;
use crate::sessions::SessionStore;

pub struct CheckpointManager {
    sessions: SessionStore,
}

impl CheckpointManager {
    pub fn new(sessions: SessionStore) -> Self {
        Self { sessions }
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Persist the session, replacing any earlier checkpoint of that name.
    pub fn checkpoint(&self, session: &Session) -> Result<()> {
        self.sessions.save(session)?;
        tracing::info!(
            session = %session.name,
            emitted = session.cursor.emitted,
            "checkpoint written"
        );
        Ok(())
    }

    /// Load `name` and check it belongs to `ruleset`.
    pub fn restore(&self, name: &str, ruleset: &Ruleset) -> Result<Session> {
        let session = self.sessions.load(name)?;
        session.verify(ruleset)?;
        tracing::info!(
            session = name,
            ruleset = ruleset.name(),
            emitted = session.cursor.emitted,
            "session restored"
        );
        Ok(session)
    }

    /// Flush and checkpoint if `policy` says one is due. Returns whether a
    /// checkpoint was written.
    pub fn maybe_checkpoint<F>(
        &self,
        session: &Session,
        policy: &mut CheckpointPolicy,
        now: Instant,
        flush: F,
    ) -> Result<bool>
    where
        F: FnOnce() -> io::Result<()>,
    {
        let emitted = session.cursor.emitted;
        if !policy.due(emitted, now) {
            return Ok(false);
        }
        flush()?;
        self.checkpoint(session)?;
        policy.mark(emitted, now);
        Ok(true)
    }
}
