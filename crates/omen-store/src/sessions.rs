use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use omen_core::{Cursor, Session};

use crate::error::{Result, StoreError};
use crate::schema;

/// One row of `omen sessions`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub name: String,
    pub ruleset: String,
    pub fingerprint: String,
    pub emitted: u64,
    pub saved_at: String,
}

pub struct SessionStore {
    conn: Connection,
}

impl SessionStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Insert or overwrite the session row named `session.name`.
    pub fn save(&self, session: &Session) -> Result<()> {
        let cursor = serde_json::to_string(&session.cursor)
            .map_err(|e| StoreError::InvalidData(format!("cannot encode cursor: {e}")))?;
        let emitted = i64::try_from(session.cursor.emitted)
            .map_err(|_| StoreError::InvalidData("emitted count overflows".to_string()))?;
        self.conn.execute(
            "INSERT INTO sessions (name, ruleset, fingerprint, cursor, emitted, saved_at)
             VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
             ON CONFLICT(name) DO UPDATE SET
                ruleset = excluded.ruleset,
                fingerprint = excluded.fingerprint,
                cursor = excluded.cursor,
                emitted = excluded.emitted,
                saved_at = excluded.saved_at",
            params![
                session.name,
                session.ruleset,
                session.fingerprint,
                cursor,
                emitted
            ],
        )?;
        Ok(())
    }

    pub fn load(&self, name: &str) -> Result<Session> {
        let row: Option<(String, String, String)> = self
            .conn
            .query_row(
                "SELECT ruleset, fingerprint, cursor FROM sessions WHERE name = ?1",
                [name],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        let (ruleset, fingerprint, cursor) =
            row.ok_or_else(|| StoreError::SessionNotFound(name.to_string()))?;
        let cursor: Cursor = serde_json::from_str(&cursor).map_err(|e| {
            StoreError::InvalidData(format!("session '{name}' has an unreadable cursor: {e}"))
        })?;
        Ok(Session {
            name: name.to_string(),
            ruleset,
            fingerprint,
            cursor,
        })
    }

    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let mut stmt = self.conn.prepare(
            "SELECT name, ruleset, fingerprint, emitted, saved_at FROM sessions ORDER BY name",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let emitted: i64 = row.get(3)?;
                Ok(SessionSummary {
                    name: row.get(0)?,
                    ruleset: row.get(1)?,
                    fingerprint: row.get(2)?,
                    emitted: emitted.max(0) as u64,
                    saved_at: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Returns whether a row was removed.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM sessions WHERE name = ?1", [name])?;
        Ok(n > 0)
    }
}
