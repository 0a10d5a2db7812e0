//! SQLite persistence layer.
//!
//! One `users` table keyed by LINE `user_id`. Writes are upserts; a save that
//! changes nothing leaves the row (and `updated_at`) untouched. Uses WAL mode
//! for concurrent reads during writes.

use std::path::Path;

use chrono::{DateTime, Utc};
use liff_core::{PersistedUser, UserRecord};
use rusqlite::{Connection, Result as SqlResult, Row, params};

const USER_COLUMNS: &str =
    "user_id, display_name, picture_url, status_message, is_friend, created_at, updated_at";

/// Database handle wrapping a SQLite connection.
pub struct Db {
    conn: Connection,
}

impl Db {
    /// Open (or create) a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> SqlResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub fn open_memory() -> SqlResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    fn init(&self) -> SqlResult<()> {
        self.conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                user_id        TEXT PRIMARY KEY,
                display_name   TEXT NOT NULL,
                picture_url    TEXT,
                status_message TEXT,
                is_friend      INTEGER,
                created_at     INTEGER NOT NULL,
                updated_at     INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_is_friend ON users(is_friend);
            ",
        )?;
        Ok(())
    }

    // ── Users ──────────────────────────────────────────────────────────

    /// Insert or update a user and return the stored row.
    ///
    /// An unknown friendship flag (`None`) keeps the stored one. The update
    /// only fires when a column actually differs, so identical saves are
    /// no-ops.
    pub fn upsert_user(&self, record: &UserRecord, now: DateTime<Utc>) -> SqlResult<PersistedUser> {
        let now_ms = now.timestamp_millis();
        self.conn.execute(
            "INSERT INTO users (user_id, display_name, picture_url, status_message, is_friend, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
             ON CONFLICT(user_id) DO UPDATE SET
                display_name=excluded.display_name,
                picture_url=excluded.picture_url,
                status_message=excluded.status_message,
                is_friend=COALESCE(excluded.is_friend, users.is_friend),
                updated_at=excluded.updated_at
             WHERE users.display_name IS NOT excluded.display_name
                OR users.picture_url IS NOT excluded.picture_url
                OR users.status_message IS NOT excluded.status_message
                OR users.is_friend IS NOT COALESCE(excluded.is_friend, users.is_friend)",
            params![
                record.user_id,
                record.display_name,
                record.picture_url,
                record.status_message,
                record.is_friend,
                now_ms,
            ],
        )?;
        self.get_user(&record.user_id)?
            .ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    /// Look up a user by LINE user id.
    pub fn get_user(&self, user_id: &str) -> SqlResult<Option<PersistedUser>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {USER_COLUMNS} FROM users WHERE user_id = ?1"))?;
        let mut rows = stmt.query_map(params![user_id], user_from_row)?;
        match rows.next() {
            Some(row) => Ok(Some(row?)),
            None => Ok(None),
        }
    }

    /// Users whose friendship flag is known and equal to `is_friend`.
    pub fn users_by_friendship(&self, is_friend: bool) -> SqlResult<Vec<PersistedUser>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE is_friend = ?1 ORDER BY user_id"
        ))?;
        let rows = stmt.query_map(params![is_friend], user_from_row)?;
        rows.collect()
    }

    /// Remove a user. Returns whether a row existed.
    pub fn delete_user(&self, user_id: &str) -> SqlResult<bool> {
        let n = self
            .conn
            .execute("DELETE FROM users WHERE user_id = ?1", params![user_id])?;
        Ok(n > 0)
    }

    pub fn user_count(&self) -> SqlResult<u64> {
        self.conn
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get::<_, i64>(0))
            .map(|n| n as u64)
    }
}

fn user_from_row(row: &Row<'_>) -> SqlResult<PersistedUser> {
    Ok(PersistedUser {
        user_id: row.get(0)?,
        display_name: row.get(1)?,
        picture_url: row.get(2)?,
        status_message: row.get(3)?,
        is_friend: row.get(4)?,
        created_at: from_millis(row.get(5)?),
        updated_at: from_millis(row.get(6)?),
    })
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, is_friend: Option<bool>) -> UserRecord {
        UserRecord {
            user_id: "U1".into(),
            display_name: name.into(),
            picture_url: Some("https://profile.line-scdn.net/u1".into()),
            status_message: None,
            is_friend,
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        from_millis(ms)
    }

    #[test]
    fn insert_then_read_back() {
        let db = Db::open_memory().unwrap();
        let saved = db.upsert_user(&record("Alice", Some(true)), at(1_000)).unwrap();
        assert_eq!(saved.display_name, "Alice");
        assert_eq!(saved.created_at, at(1_000));
        assert_eq!(db.get_user("U1").unwrap(), Some(saved));
        assert_eq!(db.get_user("U2").unwrap(), None);
    }

    #[test]
    fn identical_upsert_does_not_touch_updated_at() {
        let db = Db::open_memory().unwrap();
        let first = db.upsert_user(&record("Alice", Some(true)), at(1_000)).unwrap();
        let second = db.upsert_user(&record("Alice", Some(true)), at(2_000)).unwrap();
        assert_eq!(first, second);
        assert_eq!(db.user_count().unwrap(), 1);
    }

    #[test]
    fn changed_upsert_moves_updated_at_only() {
        let db = Db::open_memory().unwrap();
        db.upsert_user(&record("Alice", Some(true)), at(1_000)).unwrap();
        let updated = db.upsert_user(&record("Alicia", Some(true)), at(2_000)).unwrap();
        assert_eq!(updated.display_name, "Alicia");
        assert_eq!(updated.created_at, at(1_000));
        assert_eq!(updated.updated_at, at(2_000));
    }

    #[test]
    fn unknown_friendship_keeps_stored_flag() {
        let db = Db::open_memory().unwrap();
        db.upsert_user(&record("Alice", Some(false)), at(1_000)).unwrap();
        let kept = db.upsert_user(&record("Alice", None), at(2_000)).unwrap();
        assert_eq!(kept.is_friend, Some(false));
        assert_eq!(kept.updated_at, at(1_000));
    }
}
