#![deny(warnings)]

//! Persistence layer: SQLite repository for user aggregates and daily logs.
//!
//! The repository is the asynchronous boundary of the system. A failed
//! save never rolls back in-memory state; callers surface a warning and
//! keep going (the next successful save carries everything forward).
//! Uniqueness of one log row per (user, date) is enforced by the schema.

use habit_core::{BloodPressure, ChallengeId, LogEntry, Rank, UserRecord};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::info;

/// Returns the default SQLite URL used for local saves.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/habits.db"
}

/// Errors from the persistence boundary. None of these are fatal to the
/// engine; the in-memory aggregate stays authoritative.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot error: {0}")]
    Snapshot(#[from] serde_json::Error),
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Open (creating if needed) the database behind `url` and ensure the
/// schema exists. A single connection is enough for the single-user,
/// single-session model; concurrent sessions fall back to the schema's
/// last-write-wins upsert.
pub async fn init_db(url: &str) -> Result<SqlitePool, StoreError> {
    if let Some(path) = url.strip_prefix("sqlite://").or_else(|| url.strip_prefix("sqlite:")) {
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            name TEXT PRIMARY KEY,
            points_total INTEGER NOT NULL,
            streak INTEGER NOT NULL,
            rank TEXT NOT NULL,
            active_challenge TEXT,
            completed_challenges TEXT NOT NULL
        )",
    )
    .execute(&pool)
    .await?;
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS logs (
            user_name TEXT NOT NULL,
            date TEXT NOT NULL,
            meds_taken INTEGER NOT NULL,
            junk_score INTEGER NOT NULL,
            sleep_hours INTEGER NOT NULL,
            slept_past_midnight INTEGER NOT NULL,
            moved INTEGER NOT NULL,
            bp_systolic INTEGER,
            bp_diastolic INTEGER,
            points_awarded INTEGER NOT NULL,
            UNIQUE(user_name, date)
        )",
    )
    .execute(&pool)
    .await?;
    info!(url, "database ready");
    Ok(pool)
}

/// SQLite-backed repository keyed by user name.
#[derive(Clone)]
pub struct SqliteRepository {
    pool: SqlitePool,
}

impl SqliteRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Load a user's aggregate header and full log history (oldest first).
    /// Returns `None` for a user that has never been saved.
    pub async fn load_user(
        &self,
        name: &str,
    ) -> Result<Option<(UserRecord, Vec<LogEntry>)>, StoreError> {
        let row = sqlx::query(
            "SELECT points_total, streak, rank, active_challenge, completed_challenges
             FROM users WHERE name = ?1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };

        let rank: String = row.try_get("rank")?;
        let rank = Rank::from_str(&rank).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let active: Option<String> = row.try_get("active_challenge")?;
        let active_challenge = active
            .map(|s| ChallengeId::from_str(&s))
            .transpose()
            .map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let completed_json: String = row.try_get("completed_challenges")?;
        let completed_challenges: Vec<ChallengeId> = serde_json::from_str(&completed_json)?;
        let record = UserRecord {
            name: name.to_string(),
            points_total: row.try_get("points_total")?,
            streak: row.try_get::<i64, _>("streak")? as u32,
            rank,
            active_challenge,
            completed_challenges,
        };

        let rows = sqlx::query(
            "SELECT date, meds_taken, junk_score, sleep_hours, slept_past_midnight,
                    moved, bp_systolic, bp_diastolic, points_awarded
             FROM logs WHERE user_name = ?1 ORDER BY date ASC",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await?;
        let mut logs = Vec::with_capacity(rows.len());
        for row in rows {
            let systolic: Option<i64> = row.try_get("bp_systolic")?;
            let diastolic: Option<i64> = row.try_get("bp_diastolic")?;
            let blood_pressure = match (systolic, diastolic) {
                (Some(s), Some(d)) => Some(BloodPressure {
                    systolic: s as u16,
                    diastolic: d as u16,
                }),
                (None, None) => None,
                _ => {
                    return Err(StoreError::Corrupt(
                        "blood pressure row has only one component".to_string(),
                    ))
                }
            };
            logs.push(LogEntry {
                date: row.try_get("date")?,
                meds_taken: row.try_get("meds_taken")?,
                junk_score: row.try_get::<i64, _>("junk_score")? as u8,
                sleep_hours: row.try_get::<i64, _>("sleep_hours")? as u8,
                slept_past_midnight: row.try_get("slept_past_midnight")?,
                moved: row.try_get("moved")?,
                blood_pressure,
                points_awarded: row.try_get("points_awarded")?,
            });
        }
        Ok(Some((record, logs)))
    }

    /// Upsert the aggregate header. Last write wins across sessions.
    pub async fn save_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        let completed = serde_json::to_string(&record.completed_challenges)?;
        sqlx::query(
            "INSERT INTO users (name, points_total, streak, rank, active_challenge, completed_challenges)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(name) DO UPDATE SET
                points_total = excluded.points_total,
                streak = excluded.streak,
                rank = excluded.rank,
                active_challenge = excluded.active_challenge,
                completed_challenges = excluded.completed_challenges",
        )
        .bind(&record.name)
        .bind(record.points_total)
        .bind(record.streak as i64)
        .bind(record.rank.to_string())
        .bind(record.active_challenge.map(|id| id.to_string()))
        .bind(completed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert one log row; the (user, date) key makes resubmission for a
    /// day replace the prior row instead of duplicating it.
    pub async fn upsert_log(&self, user: &str, entry: &LogEntry) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO logs (user_name, date, meds_taken, junk_score, sleep_hours,
                               slept_past_midnight, moved, bp_systolic, bp_diastolic, points_awarded)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(user_name, date) DO UPDATE SET
                meds_taken = excluded.meds_taken,
                junk_score = excluded.junk_score,
                sleep_hours = excluded.sleep_hours,
                slept_past_midnight = excluded.slept_past_midnight,
                moved = excluded.moved,
                bp_systolic = excluded.bp_systolic,
                bp_diastolic = excluded.bp_diastolic,
                points_awarded = excluded.points_awarded",
        )
        .bind(user)
        .bind(entry.date)
        .bind(entry.meds_taken)
        .bind(i64::from(entry.junk_score))
        .bind(i64::from(entry.sleep_hours))
        .bind(entry.slept_past_midnight)
        .bind(entry.moved)
        .bind(entry.blood_pressure.map(|bp| i64::from(bp.systolic)))
        .bind(entry.blood_pressure.map(|bp| i64::from(bp.diastolic)))
        .bind(entry.points_awarded)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// A portable JSON export of one user's aggregate and history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub user: UserRecord,
    pub logs: Vec<LogEntry>,
}

/// Write a pretty-printed snapshot to `writer`.
pub fn snapshot_to_writer<W: std::io::Write>(
    writer: W,
    user: &UserRecord,
    logs: &[LogEntry],
) -> Result<(), StoreError> {
    let snap = Snapshot {
        user: user.clone(),
        logs: logs.to_vec(),
    };
    serde_json::to_writer_pretty(writer, &snap)?;
    Ok(())
}

/// Read a snapshot previously produced by [`snapshot_to_writer`].
pub fn snapshot_from_reader<R: std::io::Read>(reader: R) -> Result<Snapshot, StoreError> {
    Ok(serde_json::from_reader(reader)?)
}
