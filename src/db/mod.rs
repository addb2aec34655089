use crate::config::Config;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

/// One periodic sample of guild-wide counters.
#[derive(Debug, Clone, Serialize)]
pub struct SnapshotRow {
    pub guild_id: String,
    pub member_count: i64,
    pub channel_count: i64,
    pub message_count: i64,
    pub voice_minutes: i64,
    pub timestamp: String,
}

/// Per-channel message counts over a window.
#[derive(Debug, Clone, Serialize)]
pub struct ChannelRollup {
    pub channel_id: String,
    pub message_count: i64,
    pub avg_length: f64,
}

/// Per-user activity counts over a window.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityRollup {
    pub user_id: String,
    pub activity_type: String,
    pub activity_count: i64,
    pub total_duration: i64,
}

#[derive(Debug, Clone)]
pub struct OAuthSessionRow {
    pub user_id: String,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    VoiceJoin,
    VoiceLeave,
}

impl ActivityKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ActivityKind::VoiceJoin => "voice_join",
            ActivityKind::VoiceLeave => "voice_leave",
        }
    }
}

impl Database {
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(&config.database_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&config.database_url)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn execute_init(&self) -> anyhow::Result<()> {
        info!("Database: Initializing schema...");
        let sql = "
            CREATE TABLE IF NOT EXISTS server_snapshots (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id TEXT NOT NULL,
                member_count INTEGER NOT NULL DEFAULT 0,
                channel_count INTEGER NOT NULL DEFAULT 0,
                message_count INTEGER NOT NULL DEFAULT 0,
                voice_minutes INTEGER NOT NULL DEFAULT 0,
                timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_guild_date ON server_snapshots (guild_id, timestamp);

            CREATE TABLE IF NOT EXISTS message_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                message_length INTEGER NOT NULL DEFAULT 0,
                timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_messages_guild_date ON message_events (guild_id, timestamp);

            CREATE TABLE IF NOT EXISTS activity_events (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                guild_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                activity_type TEXT NOT NULL,
                channel_id TEXT,
                duration INTEGER NOT NULL DEFAULT 0,
                timestamp DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE INDEX IF NOT EXISTS idx_activity_guild_date ON activity_events (guild_id, timestamp);

            CREATE TABLE IF NOT EXISTS oauth_sessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL UNIQUE,
                access_token TEXT NOT NULL,
                refresh_token TEXT,
                expires_at DATETIME,
                created_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        ";
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(sql)?;
        debug!("Database: Schema initialized successfully");
        Ok(())
    }

    /// Runs a database closure on the blocking thread pool. Async callers go
    /// through this; event-handler inserts call the sync methods directly.
    pub async fn run_blocking<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || f(&db)).await?
    }

    pub fn log_snapshot(
        &self,
        guild_id: &str,
        member_count: i64,
        channel_count: i64,
        message_count: i64,
        voice_minutes: i64,
    ) -> anyhow::Result<()> {
        debug!(
            "Database: Snapshot for guild {}: {} members, {} channels, {} messages, {} voice minutes",
            guild_id, member_count, channel_count, message_count, voice_minutes
        );
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO server_snapshots (guild_id, member_count, channel_count, message_count, voice_minutes)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (guild_id, member_count, channel_count, message_count, voice_minutes),
        )?;
        Ok(())
    }

    pub fn log_message(
        &self,
        guild_id: &str,
        channel_id: &str,
        user_id: &str,
        message_length: i64,
    ) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO message_events (guild_id, channel_id, user_id, message_length)
             VALUES (?1, ?2, ?3, ?4)",
            (guild_id, channel_id, user_id, message_length),
        )?;
        Ok(())
    }

    pub fn log_activity(
        &self,
        guild_id: &str,
        user_id: &str,
        kind: ActivityKind,
        channel_id: Option<&str>,
        duration_secs: i64,
    ) -> anyhow::Result<()> {
        debug!(
            "Database: Activity {} for user {} in guild {} ({}s)",
            kind.as_str(),
            user_id,
            guild_id,
            duration_secs
        );
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO activity_events (guild_id, user_id, activity_type, channel_id, duration)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            (guild_id, user_id, kind.as_str(), channel_id, duration_secs),
        )?;
        Ok(())
    }

    /// Snapshots within the window, newest first.
    pub fn get_snapshots(&self, guild_id: &str, window_days: u32) -> anyhow::Result<Vec<SnapshotRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT guild_id, member_count, channel_count, message_count, voice_minutes, timestamp
             FROM server_snapshots
             WHERE guild_id = ?1 AND timestamp >= datetime('now', ?2)
             ORDER BY timestamp DESC",
        )?;
        let rows = stmt.query_map((guild_id, format!("-{} days", window_days)), |row| {
            Ok(SnapshotRow {
                guild_id: row.get(0)?,
                member_count: row.get(1)?,
                channel_count: row.get(2)?,
                message_count: row.get(3)?,
                voice_minutes: row.get(4)?,
                timestamp: row.get(5)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Message counts grouped by channel, busiest first.
    pub fn get_message_rollup(
        &self,
        guild_id: &str,
        window_days: u32,
    ) -> anyhow::Result<Vec<ChannelRollup>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT channel_id, COUNT(*) AS message_count, AVG(message_length) AS avg_length
             FROM message_events
             WHERE guild_id = ?1 AND timestamp >= datetime('now', ?2)
             GROUP BY channel_id
             ORDER BY message_count DESC",
        )?;
        let rows = stmt.query_map((guild_id, format!("-{} days", window_days)), |row| {
            Ok(ChannelRollup {
                channel_id: row.get(0)?,
                message_count: row.get(1)?,
                avg_length: row.get(2)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Activity counts grouped by user and type, most active first.
    pub fn get_activity_rollup(
        &self,
        guild_id: &str,
        window_days: u32,
    ) -> anyhow::Result<Vec<ActivityRollup>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id, activity_type, COUNT(*) AS activity_count, SUM(duration) AS total_duration
             FROM activity_events
             WHERE guild_id = ?1 AND timestamp >= datetime('now', ?2)
             GROUP BY user_id, activity_type
             ORDER BY activity_count DESC",
        )?;
        let rows = stmt.query_map((guild_id, format!("-{} days", window_days)), |row| {
            Ok(ActivityRollup {
                user_id: row.get(0)?,
                activity_type: row.get(1)?,
                activity_count: row.get(2)?,
                total_duration: row.get(3)?,
            })
        })?;

        let mut results = Vec::new();
        for row in rows {
            results.push(row?);
        }
        Ok(results)
    }

    /// Upserts the OAuth session for a user; at most one live row per user.
    pub fn store_oauth_session(
        &self,
        user_id: &str,
        access_token: &str,
        refresh_token: Option<&str>,
        expires_at: Option<DateTime<Utc>>,
    ) -> anyhow::Result<()> {
        let expires_at = expires_at.map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string());
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO oauth_sessions (user_id, access_token, refresh_token, expires_at, created_at)
             VALUES (?1, ?2, ?3, ?4, CURRENT_TIMESTAMP)
             ON CONFLICT(user_id) DO UPDATE SET
                 access_token = ?2, refresh_token = ?3, expires_at = ?4, created_at = CURRENT_TIMESTAMP",
            (user_id, access_token, refresh_token, expires_at),
        )?;
        Ok(())
    }

    pub fn get_oauth_session(&self, user_id: &str) -> anyhow::Result<Option<OAuthSessionRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT user_id, access_token, refresh_token, expires_at, created_at
             FROM oauth_sessions WHERE user_id = ?1",
        )?;
        let mut rows = stmt.query([user_id])?;

        if let Some(row) = rows.next()? {
            Ok(Some(OAuthSessionRow {
                user_id: row.get(0)?,
                access_token: row.get(1)?,
                refresh_token: row.get(2)?,
                expires_at: row.get(3)?,
                created_at: row.get(4)?,
            }))
        } else {
            Ok(None)
        }
    }

    /// Removes event rows older than the horizon. OAuth sessions are kept.
    /// Returns the number of rows deleted.
    pub fn purge_older_than(&self, days: u64) -> anyhow::Result<usize> {
        let cutoff = format!("-{} days", days);
        let conn = self.conn.lock().unwrap();
        let mut deleted = 0;
        for table in ["server_snapshots", "message_events", "activity_events"] {
            deleted += conn.execute(
                &format!("DELETE FROM {} WHERE timestamp < datetime('now', ?1)", table),
                (&cutoff,),
            )?;
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn test_config() -> Config {
        Config {
            discord_token: "test".to_string(),
            client_id: None,
            client_secret: None,
            redirect_uri: "http://localhost:8080/callback".to_string(),
            session_secret: "0123456789abcdef0123456789abcdef".to_string(),
            database_url: ":memory:".to_string(),
            sample_interval: std::time::Duration::from_secs(300),
            retention_days: 30,
            web_bind_addr: "127.0.0.1:0".to_string(),
        }
    }

    fn test_db() -> Database {
        let db = Database::new(&test_config()).unwrap();
        db.execute_init().unwrap();
        db
    }

    #[test]
    fn test_snapshot_window_and_order() {
        let db = test_db();

        // Insert with explicit timestamps to control the window.
        let conn = db.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO server_snapshots (guild_id, member_count, timestamp)
             VALUES ('g1', 1, datetime('now', '-10 days'))",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO server_snapshots (guild_id, member_count, timestamp)
             VALUES ('g1', 2, datetime('now', '-1 hours'))",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO server_snapshots (guild_id, member_count, timestamp)
             VALUES ('g1', 3, datetime('now'))",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO server_snapshots (guild_id, member_count, timestamp)
             VALUES ('g2', 9, datetime('now'))",
            [],
        )
        .unwrap();
        drop(conn);

        let rows = db.get_snapshots("g1", 7).unwrap();
        assert_eq!(rows.len(), 2, "Row outside the window must be excluded");
        assert_eq!(rows[0].member_count, 3, "Newest first");
        assert_eq!(rows[1].member_count, 2);
        assert!(rows.iter().all(|r| r.guild_id == "g1"));
    }

    #[test]
    fn test_message_rollup_grouping() {
        let db = test_db();

        db.log_message("g1", "c1", "u1", 10).unwrap();
        db.log_message("g1", "c1", "u2", 20).unwrap();
        db.log_message("g1", "c1", "u1", 30).unwrap();
        db.log_message("g1", "c2", "u1", 4).unwrap();
        db.log_message("g2", "c9", "u1", 100).unwrap();

        let rollup = db.get_message_rollup("g1", 7).unwrap();
        assert_eq!(rollup.len(), 2);
        assert_eq!(rollup[0].channel_id, "c1", "Busiest channel first");
        assert_eq!(rollup[0].message_count, 3);
        assert!((rollup[0].avg_length - 20.0).abs() < f64::EPSILON);
        assert_eq!(rollup[1].channel_id, "c2");
        assert_eq!(rollup[1].message_count, 1);
    }

    #[test]
    fn test_activity_rollup_grouping() {
        let db = test_db();

        db.log_activity("g1", "u1", ActivityKind::VoiceJoin, Some("c1"), 0)
            .unwrap();
        db.log_activity("g1", "u1", ActivityKind::VoiceJoin, Some("c1"), 0)
            .unwrap();
        db.log_activity("g1", "u1", ActivityKind::VoiceLeave, Some("c1"), 120)
            .unwrap();
        db.log_activity("g1", "u2", ActivityKind::VoiceLeave, Some("c1"), 45)
            .unwrap();

        let rollup = db.get_activity_rollup("g1", 7).unwrap();
        assert_eq!(rollup.len(), 3);
        assert_eq!(rollup[0].user_id, "u1");
        assert_eq!(rollup[0].activity_type, "voice_join");
        assert_eq!(rollup[0].activity_count, 2);

        let leaves: Vec<_> = rollup
            .iter()
            .filter(|r| r.activity_type == "voice_leave")
            .collect();
        assert_eq!(leaves.len(), 2);
        let u1_leave = leaves.iter().find(|r| r.user_id == "u1").unwrap();
        assert_eq!(u1_leave.total_duration, 120);
    }

    #[test]
    fn test_oauth_session_upsert() {
        let db = test_db();

        assert!(db.get_oauth_session("u1").unwrap().is_none());

        db.store_oauth_session("u1", "token_a", Some("refresh_a"), Some(Utc::now()))
            .unwrap();
        db.store_oauth_session("u1", "token_b", None, None).unwrap();

        let conn = db.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM oauth_sessions WHERE user_id = 'u1'", [], |r| {
                r.get(0)
            })
            .unwrap();
        drop(conn);
        assert_eq!(count, 1, "Upsert must leave exactly one row per user");

        let row = db.get_oauth_session("u1").unwrap().unwrap();
        assert_eq!(row.access_token, "token_b");
        assert_eq!(row.refresh_token, None);
        assert_eq!(row.expires_at, None);
    }

    #[test]
    fn test_purge_horizon() {
        let db = test_db();

        let conn = db.conn.lock().unwrap();
        for table in ["server_snapshots", "message_events", "activity_events"] {
            let cols = match table {
                "server_snapshots" => "(guild_id, timestamp)",
                "message_events" => "(guild_id, channel_id, user_id, timestamp)",
                _ => "(guild_id, user_id, activity_type, timestamp)",
            };
            let old_vals = match table {
                "server_snapshots" => "('g1', datetime('now', '-40 days'))",
                "message_events" => "('g1', 'c1', 'u1', datetime('now', '-40 days'))",
                _ => "('g1', 'u1', 'voice_join', datetime('now', '-40 days'))",
            };
            let new_vals = match table {
                "server_snapshots" => "('g1', datetime('now', '-1 days'))",
                "message_events" => "('g1', 'c1', 'u1', datetime('now', '-1 days'))",
                _ => "('g1', 'u1', 'voice_join', datetime('now', '-1 days'))",
            };
            conn.execute(&format!("INSERT INTO {table} {cols} VALUES {old_vals}"), [])
                .unwrap();
            conn.execute(&format!("INSERT INTO {table} {cols} VALUES {new_vals}"), [])
                .unwrap();
        }
        drop(conn);

        db.store_oauth_session("u1", "token", None, None).unwrap();

        let deleted = db.purge_older_than(30).unwrap();
        assert_eq!(deleted, 3, "One expired row per event table");

        let conn = db.conn.lock().unwrap();
        for table in ["server_snapshots", "message_events", "activity_events"] {
            let count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))
                .unwrap();
            assert_eq!(count, 1, "Recent row in {table} must survive");
        }
        let oauth_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM oauth_sessions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(oauth_count, 1, "OAuth sessions are exempt from retention");
    }
}
