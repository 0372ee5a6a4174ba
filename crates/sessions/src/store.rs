//! Durable, append-mostly per-location message log (§4.1).
//!
//! Backed by `rusqlite` (bundled SQLite) in WAL mode. The single connection
//! is guarded by a `parking_lot::Mutex`: the process is single-node and
//! writes are already serialized per location by the orchestrator's
//! concurrency gate, so a connection pool would buy nothing.

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};

use sa_domain::error::{Error, Result};
use sa_domain::tool::{Message, Role, ToolCall};

/// One row of the per-location message log (§3 `StoredMessage`).
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: i64,
    pub location: String,
    pub message: Message,
    pub token_count: u32,
    pub created_at: DateTime<Utc>,
    pub compacted: bool,
}

/// Summary row returned by `list()`.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub location: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: i64,
}

pub struct SessionStore {
    conn: Mutex<Connection>,
}

impl SessionStore {
    /// Open (creating if absent) the SQLite database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(Error::Io)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| Error::Storage(e.to_string()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .map_err(|e| Error::Storage(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| Error::Storage(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Open an in-memory database, used by tests and the interactive `chat`
    /// command's throwaway scratch sessions.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::Storage(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .map_err(|e| Error::Storage(e.to_string()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sessions (
                location    TEXT PRIMARY KEY,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS messages (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                location        TEXT NOT NULL REFERENCES sessions(location),
                role            TEXT NOT NULL,
                content         TEXT,
                tool_calls_json TEXT NOT NULL DEFAULT '[]',
                tool_call_id    TEXT,
                name            TEXT,
                token_count     INTEGER NOT NULL,
                created_at      TEXT NOT NULL,
                compacted       INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX IF NOT EXISTS idx_messages_location_id
                ON messages(location, id);
            CREATE INDEX IF NOT EXISTS idx_messages_location_compacted
                ON messages(location, compacted);
            ",
        )
        .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(())
    }

    /// Append a message, creating the session record on first use (§4.1).
    /// Returns the assigned ordering id.
    pub fn append(&self, location: &str, message: &Message, token_count: u32) -> Result<i64> {
        let conn = self.conn.lock();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO sessions (location, created_at, updated_at)
             VALUES (?1, ?2, ?2)
             ON CONFLICT(location) DO UPDATE SET updated_at = ?2",
            params![location, now.to_rfc3339()],
        )
        .map_err(|e| Error::Storage(e.to_string()))?;

        let tool_calls_json = serde_json::to_string(&message.tool_calls)?;

        conn.execute(
            "INSERT INTO messages
                (location, role, content, tool_calls_json, tool_call_id, name, token_count, created_at, compacted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0)",
            params![
                location,
                message.role.as_str(),
                message.content,
                tool_calls_json,
                message.tool_call_id,
                message.name,
                token_count,
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Storage(e.to_string()))?;

        Ok(conn.last_insert_rowid())
    }

    /// Messages in append order. `include_compacted=false` (the default
    /// view) excludes messages already folded into a summary.
    pub fn messages(&self, location: &str, include_compacted: bool) -> Result<Vec<StoredMessage>> {
        let conn = self.conn.lock();
        let sql = if include_compacted {
            "SELECT id, role, content, tool_calls_json, tool_call_id, name, token_count, created_at, compacted
             FROM messages WHERE location = ?1 ORDER BY id ASC"
        } else {
            "SELECT id, role, content, tool_calls_json, tool_call_id, name, token_count, created_at, compacted
             FROM messages WHERE location = ?1 AND compacted = 0 ORDER BY id ASC"
        };
        let mut stmt = conn.prepare(sql).map_err(|e| Error::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![location], |row| row_to_stored(location, row))
            .map_err(|e| Error::Storage(e.to_string()))?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| Error::Storage(e.to_string()))?);
        }
        Ok(out)
    }

    /// Ids of non-compacted messages, in append order.
    pub fn active_ids(&self, location: &str) -> Result<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id FROM messages WHERE location = ?1 AND compacted = 0 ORDER BY id ASC")
            .map_err(|e| Error::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![location], |row| row.get::<_, i64>(0))
            .map_err(|e| Error::Storage(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| Error::Storage(e.to_string()))?);
        }
        Ok(out)
    }

    /// Sum of `token_count` over non-compacted messages.
    pub fn token_sum(&self, location: &str) -> Result<u32> {
        let conn = self.conn.lock();
        let sum: Option<i64> = conn
            .query_row(
                "SELECT SUM(token_count) FROM messages WHERE location = ?1 AND compacted = 0",
                params![location],
                |row| row.get(0),
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(sum.unwrap_or(0) as u32)
    }

    /// Mark all non-compacted messages with `id <= up_to_id` as compacted,
    /// except `role=system` rows (system prompts and prior summaries stay
    /// visible forever). Returns the number of rows updated.
    pub fn mark_compacted(&self, location: &str, up_to_id: i64) -> Result<usize> {
        let conn = self.conn.lock();
        let n = conn
            .execute(
                "UPDATE messages SET compacted = 1
                 WHERE location = ?1 AND compacted = 0 AND id <= ?2 AND role != 'system'",
                params![location, up_to_id],
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(n)
    }

    /// Mark every message in a location as compacted (used to reset a
    /// session without deleting its history). Returns the count affected.
    pub fn clear(&self, location: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let n = conn
            .execute(
                "UPDATE messages SET compacted = 1 WHERE location = ?1 AND compacted = 0",
                params![location],
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(n)
    }

    /// Delete a location's session and all its messages. Returns whether a
    /// session existed.
    pub fn delete(&self, location: &str) -> Result<bool> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM messages WHERE location = ?1", params![location])
            .map_err(|e| Error::Storage(e.to_string()))?;
        let n = conn
            .execute("DELETE FROM sessions WHERE location = ?1", params![location])
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(n > 0)
    }

    /// All known sessions with their message counts.
    pub fn list(&self) -> Result<Vec<SessionSummary>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare(
                "SELECT s.location, s.created_at, s.updated_at,
                        (SELECT COUNT(*) FROM messages m WHERE m.location = s.location)
                 FROM sessions s ORDER BY s.updated_at DESC",
            )
            .map_err(|e| Error::Storage(e.to_string()))?;
        let rows = stmt
            .query_map(params![], |row| {
                let created_at: String = row.get(1)?;
                let updated_at: String = row.get(2)?;
                Ok(SessionSummary {
                    location: row.get(0)?,
                    created_at: parse_dt(&created_at),
                    updated_at: parse_dt(&updated_at),
                    message_count: row.get(3)?,
                })
            })
            .map_err(|e| Error::Storage(e.to_string()))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| Error::Storage(e.to_string()))?);
        }
        Ok(out)
    }

    /// Whether a session record exists for `location`.
    pub fn exists(&self, location: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let found: Option<String> = conn
            .query_row(
                "SELECT location FROM sessions WHERE location = ?1",
                params![location],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(found.is_some())
    }
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn row_to_stored(location: &str, row: &rusqlite::Row) -> rusqlite::Result<StoredMessage> {
    let id: i64 = row.get(0)?;
    let role_str: String = row.get(1)?;
    let content: Option<String> = row.get(2)?;
    let tool_calls_json: String = row.get(3)?;
    let tool_call_id: Option<String> = row.get(4)?;
    let name: Option<String> = row.get(5)?;
    let token_count: i64 = row.get(6)?;
    let created_at: String = row.get(7)?;
    let compacted: i64 = row.get(8)?;

    let role: Role = role_str.parse().unwrap_or(Role::User);
    let tool_calls: Vec<ToolCall> = serde_json::from_str(&tool_calls_json).unwrap_or_default();

    Ok(StoredMessage {
        id,
        location: location.to_string(),
        message: Message {
            role,
            content,
            tool_calls,
            tool_call_id,
            name,
        },
        token_count: token_count as u32,
        created_at: parse_dt(&created_at),
        compacted: compacted != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_creates_session_and_returns_monotonic_ids() {
        let store = SessionStore::open_in_memory().unwrap();
        let id1 = store.append("chan-1", &Message::user("hi"), 3).unwrap();
        let id2 = store.append("chan-1", &Message::assistant("hello"), 4).unwrap();
        assert!(id2 > id1);
        assert!(store.exists("chan-1").unwrap());
    }

    #[test]
    fn messages_excludes_compacted_by_default() {
        let store = SessionStore::open_in_memory().unwrap();
        let id1 = store.append("chan-1", &Message::user("old"), 5).unwrap();
        store.append("chan-1", &Message::user("new"), 5).unwrap();
        store.mark_compacted("chan-1", id1).unwrap();

        let active = store.messages("chan-1", false).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].message.text(), "new");

        let all = store.messages("chan-1", true).unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn mark_compacted_never_compacts_system_rows() {
        let store = SessionStore::open_in_memory().unwrap();
        let sys_id = store.append("chan-1", &Message::system("prompt"), 10).unwrap();
        let user_id = store.append("chan-1", &Message::user("hi"), 3).unwrap();

        store.mark_compacted("chan-1", user_id).unwrap();

        let active = store.messages("chan-1", false).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, sys_id);
    }

    #[test]
    fn token_sum_only_counts_active_messages() {
        let store = SessionStore::open_in_memory().unwrap();
        let id1 = store.append("chan-1", &Message::user("a"), 10).unwrap();
        store.append("chan-1", &Message::user("b"), 20).unwrap();
        assert_eq!(store.token_sum("chan-1").unwrap(), 30);

        store.mark_compacted("chan-1", id1).unwrap();
        assert_eq!(store.token_sum("chan-1").unwrap(), 20);
    }

    #[test]
    fn clear_compacts_everything_without_deleting() {
        let store = SessionStore::open_in_memory().unwrap();
        store.append("chan-1", &Message::user("a"), 5).unwrap();
        store.clear("chan-1").unwrap();
        assert!(store.messages("chan-1", false).unwrap().is_empty());
        assert!(store.exists("chan-1").unwrap());
    }

    #[test]
    fn delete_removes_session_and_messages() {
        let store = SessionStore::open_in_memory().unwrap();
        store.append("chan-1", &Message::user("a"), 5).unwrap();
        assert!(store.delete("chan-1").unwrap());
        assert!(!store.exists("chan-1").unwrap());
        assert!(!store.delete("chan-1").unwrap());
    }

    #[test]
    fn list_reports_message_counts() {
        let store = SessionStore::open_in_memory().unwrap();
        store.append("chan-1", &Message::user("a"), 5).unwrap();
        store.append("chan-1", &Message::user("b"), 5).unwrap();
        store.append("chan-2", &Message::user("c"), 5).unwrap();

        let summaries = store.list().unwrap();
        assert_eq!(summaries.len(), 2);
        let chan1 = summaries.iter().find(|s| s.location == "chan-1").unwrap();
        assert_eq!(chan1.message_count, 2);
    }

    #[test]
    fn round_trips_tool_call_messages() {
        let store = SessionStore::open_in_memory().unwrap();
        let tool_call = ToolCall {
            id: "call_1".into(),
            name: "exec".into(),
            arguments: serde_json::json!({"cmd": "ls"}),
        };
        let assistant = Message::assistant_with_tool_calls("", vec![tool_call.clone()]);
        store.append("chan-1", &assistant, 8).unwrap();
        store
            .append("chan-1", &Message::tool_result("call_1", "exec", "file.txt"), 3)
            .unwrap();

        let msgs = store.messages("chan-1", false).unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].message.tool_calls[0].name, "exec");
        assert_eq!(msgs[1].message.tool_call_id.as_deref(), Some("call_1"));
    }
}
