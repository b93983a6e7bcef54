//! Append-only audit log of authentication attempts and system events, persisted to SQLite.
//! Mirrors the source system's dedicated log writer thread: callers never block on disk I/O.

use crate::config::Config;
use crate::error::Result;
use rusqlite::{params, Connection};
use std::sync::mpsc::{channel, Sender};
use std::thread::JoinHandle;

#[derive(Debug, Clone)]
pub struct AuthLogRow {
    pub id: i64,
    pub user_name: String,
    pub message: String,
    pub timestamp: String,
    pub image_blob: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
    Critical,
}

impl LogLevel {
    fn as_i32(self) -> i32 {
        match self {
            LogLevel::Debug => 0,
            LogLevel::Info => 1,
            LogLevel::Warn => 2,
            LogLevel::Error => 3,
            LogLevel::Critical => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SystemLogRow {
    pub id: i64,
    pub level: LogLevel,
    pub tag: String,
    pub message: String,
    pub timestamp: String,
    pub extra: Option<String>,
}

enum WriteJob {
    Auth {
        user_name: String,
        message: String,
        image_blob: Option<Vec<u8>>,
    },
    System {
        level: LogLevel,
        tag: String,
        message: String,
        extra: Option<String>,
    },
}

/// Owns the SQLite connection on a dedicated writer thread; the handle only ever sends jobs.
pub struct PersistenceLog {
    tx: Sender<WriteJob>,
    _worker: JoinHandle<()>,
}

impl PersistenceLog {
    pub fn open(config: &Config) -> Result<Self> {
        let conn = Connection::open(&config.persistence.db_path)?;
        init_schema(&conn)?;

        let (tx, rx) = channel::<WriteJob>();
        let worker = std::thread::spawn(move || {
            for job in rx {
                if let Err(e) = apply_job(&conn, job) {
                    tracing::warn!("persistence log write failed: {e}");
                }
            }
        });

        Ok(Self { tx, _worker: worker })
    }

    pub fn log_auth(&self, user_name: &str, message: &str, image_blob: Option<Vec<u8>>) {
        let job = WriteJob::Auth {
            user_name: user_name.to_string(),
            message: message.to_string(),
            image_blob,
        };
        if self.tx.send(job).is_err() {
            tracing::warn!("persistence log worker has exited; dropping auth log entry");
        }
    }

    pub fn log_system(&self, level: LogLevel, tag: &str, message: &str, extra: Option<String>) {
        let job = WriteJob::System {
            level,
            tag: tag.to_string(),
            message: message.to_string(),
            extra,
        };
        let _ = self.tx.send(job);
    }

    /// Read path for log export / diagnostics, opened on a short-lived read-only connection so
    /// it never contends with the writer thread.
    pub fn fetch_recent_auth(config: &Config, limit: u32) -> Result<Vec<AuthLogRow>> {
        let conn = Connection::open(&config.persistence.db_path)?;
        let mut stmt = conn.prepare(
            "SELECT id, user_name, message, timestamp, image FROM auth_logs \
             ORDER BY timestamp DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit.max(1)], |row| {
            Ok(AuthLogRow {
                id: row.get(0)?,
                user_name: row.get(1)?,
                message: row.get(2)?,
                timestamp: row.get(3)?,
                image_blob: row.get(4)?,
            })
        })?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS auth_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_name TEXT NOT NULL,
            message TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            image BLOB
        );
        CREATE INDEX IF NOT EXISTS idx_auth_logs_timestamp ON auth_logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_auth_logs_user ON auth_logs(user_name);

        CREATE TABLE IF NOT EXISTS system_logs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            level INTEGER NOT NULL,
            tag TEXT NOT NULL,
            message TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            extra TEXT
        );
        CREATE INDEX IF NOT EXISTS idx_system_logs_timestamp ON system_logs(timestamp);
        CREATE INDEX IF NOT EXISTS idx_system_logs_level ON system_logs(level);
        CREATE INDEX IF NOT EXISTS idx_system_logs_tag ON system_logs(tag);",
    )?;
    Ok(())
}

fn apply_job(conn: &Connection, job: WriteJob) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();
    match job {
        WriteJob::Auth {
            user_name,
            message,
            image_blob,
        } => {
            conn.execute(
                "INSERT INTO auth_logs (user_name, message, timestamp, image) VALUES (?1, ?2, ?3, ?4)",
                params![user_name, message, now, image_blob],
            )?;
        }
        WriteJob::System {
            level,
            tag,
            message,
            extra,
        } => {
            conn.execute(
                "INSERT INTO system_logs (level, tag, message, timestamp, extra) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![level.as_i32(), tag, message, now, extra],
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_config(name: &str) -> Config {
        let mut cfg = Config::default();
        let mut path = std::env::temp_dir();
        path.push(format!("doorlock_persist_test_{}_{}.db", name, std::process::id()));
        let _ = std::fs::remove_file(&path);
        cfg.persistence.db_path = PathBuf::from(path);
        cfg
    }

    #[test]
    fn auth_log_round_trips() {
        let cfg = temp_config("auth");
        let log = PersistenceLog::open(&cfg).unwrap();
        log.log_auth("alice", "strong accept", None);
        drop(log);
        std::thread::sleep(std::time::Duration::from_millis(100));

        let rows = PersistenceLog::fetch_recent_auth(&cfg, 10).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].user_name, "alice");

        let _ = std::fs::remove_file(&cfg.persistence.db_path);
    }
}
