//! Gatedeck persistence: minimal SQLite store for the operator
//! notification log and session prefs. Keep code tiny and predictable.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use metrics::{counter, histogram};
use rusqlite::OptionalExtension;

use gatedeck_core::{Notification, NotificationKind};

/// The log keeps only the newest entries; older rows are rotated out.
pub const NOTIFICATION_CAP: usize = 20;

pub trait NotificationLog: Send + Sync {
    /// Prepend a notification and truncate to the cap. No dedup;
    /// callers are responsible for not double-firing.
    fn add(&self, n: &Notification) -> Result<()>;
    /// Newest first.
    fn list(&self) -> Result<Vec<Notification>>;
    /// Remove exactly one matching entry; `false` when absent.
    fn dismiss(&self, id: &str) -> Result<bool>;
    fn mark_all_read(&self) -> Result<()>;
    fn clear(&self) -> Result<()>;
    fn unread_count(&self) -> Result<usize>;
}

/// Session-scoped key/value prefs (auth flag, username, theme).
pub trait SessionPrefs: Send + Sync {
    fn set_pref(&self, key: &str, value: &str) -> Result<()>;
    fn get_pref(&self, key: &str) -> Result<Option<String>>;
    /// Drop everything auth-related; called on the session-end path.
    fn clear_auth(&self) -> Result<()>;
}

pub const PREF_AUTHENTICATED: &str = "authenticated";
pub const PREF_USERNAME: &str = "username";
pub const PREF_THEME: &str = "theme";

/// SQLite-backed store. Simple, synchronous; the console isn't latency
/// sensitive here.
pub struct SqliteStore {
    db: std::sync::Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("GATEDECK_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let started = std::time::Instant::now();
        let db = rusqlite::Connection::open(path)
            .with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", &"WAL").ok();
        db.pragma_update(None, "synchronous", &"NORMAL").ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS notifications (
                id      TEXT NOT NULL PRIMARY KEY,
                seq     INTEGER NOT NULL,
                kind    TEXT NOT NULL,
                title   TEXT NOT NULL,
                descr   TEXT NOT NULL,
                created TEXT NOT NULL,
                read    INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )
        .context("creating notifications table")?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_notifications_seq ON notifications(seq DESC)",
            [],
        )
        .ok();
        db.execute(
            "CREATE TABLE IF NOT EXISTS prefs (
                key   TEXT NOT NULL PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .context("creating prefs table")?;
        let me = Self { db: std::sync::Mutex::new(db) };
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(me)
    }
}

fn kind_to_str(k: NotificationKind) -> &'static str {
    match k {
        NotificationKind::Info => "info",
        NotificationKind::Success => "success",
        NotificationKind::Warning => "warning",
        NotificationKind::Error => "error",
        NotificationKind::Message => "message",
        NotificationKind::Connection => "connection",
    }
}

fn kind_from_str(s: &str) -> NotificationKind {
    match s {
        "success" => NotificationKind::Success,
        "warning" => NotificationKind::Warning,
        "error" => NotificationKind::Error,
        "message" => NotificationKind::Message,
        "connection" => NotificationKind::Connection,
        _ => NotificationKind::Info,
    }
}

impl NotificationLog for SqliteStore {
    fn add(&self, n: &Notification) -> Result<()> {
        let started = std::time::Instant::now();
        let mut db = self.db.lock().unwrap();
        let tx = db.transaction()?;
        let next_seq: i64 = tx
            .query_row("SELECT COALESCE(MAX(seq), 0) + 1 FROM notifications", [], |r| r.get(0))?;
        tx.execute(
            "INSERT OR REPLACE INTO notifications(id, seq, kind, title, descr, created, read)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            (
                &n.id,
                next_seq,
                kind_to_str(n.kind),
                &n.title,
                &n.description,
                &n.created_label,
                n.read as i64,
            ),
        )?;
        // Keep the newest NOTIFICATION_CAP rows by seq.
        tx.execute(
            "DELETE FROM notifications
             WHERE id NOT IN (
                 SELECT id FROM notifications ORDER BY seq DESC LIMIT ?1
             )",
            [NOTIFICATION_CAP as i64],
        )?;
        tx.commit()?;
        histogram!("persist_notify_add_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_notify_add_total", 1u64);
        Ok(())
    }

    fn list(&self) -> Result<Vec<Notification>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare(
            "SELECT id, kind, title, descr, created, read
             FROM notifications ORDER BY seq DESC",
        )?;
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let kind: String = row.get(1)?;
            out.push(Notification {
                id: row.get(0)?,
                kind: kind_from_str(&kind),
                title: row.get(2)?,
                description: row.get(3)?,
                created_label: row.get(4)?,
                read: row.get::<_, i64>(5)? != 0,
            });
        }
        Ok(out)
    }

    fn dismiss(&self, id: &str) -> Result<bool> {
        let db = self.db.lock().unwrap();
        let n = db.execute("DELETE FROM notifications WHERE id = ?1", [id])?;
        Ok(n == 1)
    }

    fn mark_all_read(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("UPDATE notifications SET read = 1", [])?;
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute("DELETE FROM notifications", [])?;
        Ok(())
    }

    fn unread_count(&self) -> Result<usize> {
        let db = self.db.lock().unwrap();
        let n: i64 =
            db.query_row("SELECT COUNT(*) FROM notifications WHERE read = 0", [], |r| r.get(0))?;
        Ok(n as usize)
    }
}

impl SessionPrefs for SqliteStore {
    fn set_pref(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO prefs(key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            (key, value),
        )?;
        Ok(())
    }

    fn get_pref(&self, key: &str) -> Result<Option<String>> {
        let db = self.db.lock().unwrap();
        let v = db
            .query_row("SELECT value FROM prefs WHERE key = ?1", [key], |r| r.get(0))
            .optional()?;
        Ok(v)
    }

    fn clear_auth(&self) -> Result<()> {
        let db = self.db.lock().unwrap();
        db.execute(
            "DELETE FROM prefs WHERE key IN (?1, ?2)",
            (PREF_AUTHENTICATED, PREF_USERNAME),
        )?;
        Ok(())
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".gatedeck");
        let _ = std::fs::create_dir_all(&p);
        p.push("gatedeck.db");
        return p.to_string_lossy().to_string();
    }
    // Fallback to current directory
    "gatedeck.db".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_db() -> String {
        let dir = std::env::temp_dir();
        let f = format!(
            "gatedeck-test-{}.db",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        );
        dir.join(f).to_string_lossy().to_string()
    }

    fn note(id: &str, title: &str) -> Notification {
        Notification {
            id: id.into(),
            kind: NotificationKind::Info,
            title: title.into(),
            description: String::new(),
            created_label: "just now".into(),
            read: false,
        }
    }

    #[test]
    fn add_orders_newest_first_and_caps() {
        let s = SqliteStore::open(&temp_db()).unwrap();
        for i in 0..25 {
            s.add(&note(&format!("n-{}", i), &format!("event {}", i))).unwrap();
        }
        let all = s.list().unwrap();
        assert_eq!(all.len(), NOTIFICATION_CAP);
        assert_eq!(all[0].id, "n-24");
        assert_eq!(all.last().unwrap().id, "n-5");
    }

    #[test]
    fn dismiss_removes_exactly_one_and_is_noop_when_absent() {
        let s = SqliteStore::open(&temp_db()).unwrap();
        s.add(&note("a", "one")).unwrap();
        s.add(&note("b", "two")).unwrap();
        assert!(s.dismiss("a").unwrap());
        assert!(!s.dismiss("a").unwrap());
        assert_eq!(s.list().unwrap().len(), 1);
    }

    #[test]
    fn mark_all_read_and_unread_count() {
        let s = SqliteStore::open(&temp_db()).unwrap();
        s.add(&note("a", "one")).unwrap();
        s.add(&note("b", "two")).unwrap();
        assert_eq!(s.unread_count().unwrap(), 2);
        s.mark_all_read().unwrap();
        assert_eq!(s.unread_count().unwrap(), 0);
        s.clear().unwrap();
        assert!(s.list().unwrap().is_empty());
    }

    #[test]
    fn prefs_roundtrip_and_auth_clear() {
        let s = SqliteStore::open(&temp_db()).unwrap();
        s.set_pref(PREF_AUTHENTICATED, "1").unwrap();
        s.set_pref(PREF_USERNAME, "operator").unwrap();
        s.set_pref(PREF_THEME, "dark").unwrap();
        assert_eq!(s.get_pref(PREF_USERNAME).unwrap().as_deref(), Some("operator"));
        s.set_pref(PREF_THEME, "light").unwrap();
        assert_eq!(s.get_pref(PREF_THEME).unwrap().as_deref(), Some("light"));
        s.clear_auth().unwrap();
        assert!(s.get_pref(PREF_AUTHENTICATED).unwrap().is_none());
        assert!(s.get_pref(PREF_USERNAME).unwrap().is_none());
        // theme survives logout
        assert_eq!(s.get_pref(PREF_THEME).unwrap().as_deref(), Some("light"));
    }
}
