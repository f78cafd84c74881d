use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, Executor, Pool, Row, Sqlite};

use crate::models::{BundleState, DiagnosticResult, DrillSession, LastResult, UserProfile, UserProgress};
use crate::srs::{MAX_EASE, MAX_INTERVAL_DAYS, MIN_EASE};

const MIGRATIONS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS diagnostics (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        started_at DATETIME NOT NULL,
        payload TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS sessions (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL UNIQUE,
        created_at DATETIME NOT NULL,
        payload TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS bundle_states (
        bundle_id TEXT PRIMARY KEY,
        ease REAL NOT NULL DEFAULT 2.5,
        interval_days INTEGER NOT NULL DEFAULT 1,
        due_at DATETIME NOT NULL,
        last_correct BOOLEAN,
        last_reviewed_at DATETIME
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS progress (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        payload TEXT NOT NULL
    );
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS profile (
        id INTEGER PRIMARY KEY CHECK (id = 1),
        payload TEXT NOT NULL
    );
    "#,
];

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for BundleState {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        let bundle_id: String = row.try_get("bundle_id")?;
        let ease: f64 = row.try_get("ease")?;
        let interval_days: i64 = row.try_get("interval_days")?;
        let due_at: DateTime<Utc> = row.try_get("due_at")?;
        let last_correct: Option<bool> = row.try_get("last_correct")?;
        let last_reviewed_at: Option<DateTime<Utc>> = row.try_get("last_reviewed_at")?;

        // Rows may come from an imported snapshot; hold them to the SRS bounds.
        Ok(BundleState {
            bundle_id,
            ease: ease.clamp(MIN_EASE, MAX_EASE),
            interval_days: interval_days.clamp(1, i64::from(MAX_INTERVAL_DAYS)) as u32,
            due_at,
            last_result: last_correct
                .zip(last_reviewed_at)
                .map(|(correct, timestamp)| LastResult { correct, timestamp }),
        })
    }
}

/// Everything stored for the learner, as exchanged with sync collaborators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub diagnostics: Vec<DiagnosticResult>,
    #[serde(default)]
    pub sessions: Vec<DrillSession>,
    #[serde(default)]
    pub bundle_states: Vec<BundleState>,
    #[serde(default)]
    pub progress: Option<UserProgress>,
    #[serde(default)]
    pub profile: Option<UserProfile>,
}

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

impl Db {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .log_statements(log::LevelFilter::Trace);

        // Every connection to an in-memory database is a fresh database.
        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .idle_timeout(Duration::from_secs(600))
        };
        let pool = pool_options.connect_with(options).await?;

        let db = Db { pool };
        db.migrate().await?;
        log::info!("connected to {}", url);

        Ok(db)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        for statement in MIGRATIONS {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Inserts a diagnostic, or replaces the payload of one with the same id
    /// without changing its position in history.
    pub async fn save_diagnostic(&self, diagnostic: &DiagnosticResult) -> anyhow::Result<()> {
        upsert_diagnostic(&self.pool, diagnostic).await
    }

    pub async fn latest_diagnostic(&self) -> anyhow::Result<Option<DiagnosticResult>> {
        let payload: Option<String> =
            sqlx::query_scalar("SELECT payload FROM diagnostics ORDER BY seq DESC LIMIT 1")
                .fetch_optional(&self.pool)
                .await?;

        payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn diagnostics(&self) -> anyhow::Result<Vec<DiagnosticResult>> {
        let payloads: Vec<String> = sqlx::query_scalar("SELECT payload FROM diagnostics ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await?;
        decode_all(payloads)
    }

    pub async fn add_session(&self, session: &DrillSession) -> anyhow::Result<()> {
        insert_session(&self.pool, session).await
    }

    /// The last `limit` sessions, oldest first.
    pub async fn recent_sessions(&self, limit: usize) -> anyhow::Result<Vec<DrillSession>> {
        let payloads: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT payload FROM (
                SELECT seq, payload FROM sessions ORDER BY seq DESC LIMIT ?
            )
            ORDER BY seq ASC
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;
        decode_all(payloads)
    }

    pub async fn sessions(&self) -> anyhow::Result<Vec<DrillSession>> {
        let payloads: Vec<String> = sqlx::query_scalar("SELECT payload FROM sessions ORDER BY seq ASC")
            .fetch_all(&self.pool)
            .await?;
        decode_all(payloads)
    }

    pub async fn bundle_states(&self) -> anyhow::Result<Vec<BundleState>> {
        let states = sqlx::query_as::<_, BundleState>("SELECT * FROM bundle_states ORDER BY bundle_id")
            .fetch_all(&self.pool)
            .await?;
        Ok(states)
    }

    pub async fn bundle_state(&self, bundle_id: &str) -> anyhow::Result<Option<BundleState>> {
        let state = sqlx::query_as::<_, BundleState>("SELECT * FROM bundle_states WHERE bundle_id = ?")
            .bind(bundle_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(state)
    }

    pub async fn save_bundle_state(&self, state: &BundleState) -> anyhow::Result<()> {
        upsert_bundle_state(&self.pool, state).await
    }

    pub async fn progress(&self) -> anyhow::Result<Option<UserProgress>> {
        let payload: Option<String> = sqlx::query_scalar("SELECT payload FROM progress WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn save_progress(&self, progress: &UserProgress) -> anyhow::Result<()> {
        upsert_progress(&self.pool, progress).await
    }

    pub async fn profile(&self) -> anyhow::Result<Option<UserProfile>> {
        let payload: Option<String> = sqlx::query_scalar("SELECT payload FROM profile WHERE id = 1")
            .fetch_optional(&self.pool)
            .await?;

        payload
            .map(|p| serde_json::from_str(&p))
            .transpose()
            .map_err(Into::into)
    }

    pub async fn save_profile(&self, profile: &UserProfile) -> anyhow::Result<()> {
        upsert_profile(&self.pool, profile).await
    }

    /// True once the learner has completed a diagnostic or finished any drill.
    pub async fn has_meaningful_engagement(&self) -> anyhow::Result<bool> {
        let sessions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions")
            .fetch_one(&self.pool)
            .await?;
        if sessions > 0 {
            return Ok(true);
        }
        Ok(self.diagnostics().await?.iter().any(|d| d.completed_at.is_some()))
    }

    pub async fn export(&self) -> anyhow::Result<Snapshot> {
        Ok(Snapshot {
            diagnostics: self.diagnostics().await?,
            sessions: self.sessions().await?,
            bundle_states: self.bundle_states().await?,
            progress: self.progress().await?,
            profile: self.profile().await?,
        })
    }

    /// Replaces everything stored with the snapshot, atomically.
    pub async fn import(&self, snapshot: &Snapshot) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;

        clear_tables(&mut *tx).await?;
        for diagnostic in &snapshot.diagnostics {
            upsert_diagnostic(&mut *tx, diagnostic).await?;
        }
        for session in &snapshot.sessions {
            insert_session(&mut *tx, session).await?;
        }
        for state in &snapshot.bundle_states {
            upsert_bundle_state(&mut *tx, state).await?;
        }
        if let Some(progress) = &snapshot.progress {
            upsert_progress(&mut *tx, progress).await?;
        }
        if let Some(profile) = &snapshot.profile {
            upsert_profile(&mut *tx, profile).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn clear(&self) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await?;
        clear_tables(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

fn decode_all<T: serde::de::DeserializeOwned>(payloads: Vec<String>) -> anyhow::Result<Vec<T>> {
    payloads
        .iter()
        .map(|p| Ok(serde_json::from_str(p)?))
        .collect()
}

async fn clear_tables<'e, E>(executor: E) -> anyhow::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    executor
        .execute(
            "DELETE FROM diagnostics; DELETE FROM sessions; DELETE FROM bundle_states; DELETE FROM progress; \
             DELETE FROM profile;",
        )
        .await?;
    Ok(())
}

async fn upsert_diagnostic<'e, E>(executor: E, diagnostic: &DiagnosticResult) -> anyhow::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO diagnostics (id, started_at, payload) VALUES (?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET started_at = excluded.started_at, payload = excluded.payload
        "#,
    )
    .bind(&diagnostic.id)
    .bind(diagnostic.started_at)
    .bind(serde_json::to_string(diagnostic)?)
    .execute(executor)
    .await?;
    Ok(())
}

async fn insert_session<'e, E>(executor: E, session: &DrillSession) -> anyhow::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query("INSERT INTO sessions (id, created_at, payload) VALUES (?, ?, ?)")
        .bind(&session.id)
        .bind(session.created_at)
        .bind(serde_json::to_string(session)?)
        .execute(executor)
        .await?;
    Ok(())
}

async fn upsert_bundle_state<'e, E>(executor: E, state: &BundleState) -> anyhow::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO bundle_states (bundle_id, ease, interval_days, due_at, last_correct, last_reviewed_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(bundle_id) DO UPDATE SET
            ease = excluded.ease,
            interval_days = excluded.interval_days,
            due_at = excluded.due_at,
            last_correct = excluded.last_correct,
            last_reviewed_at = excluded.last_reviewed_at
        "#,
    )
    .bind(&state.bundle_id)
    .bind(state.ease)
    .bind(state.interval_days as i64)
    .bind(state.due_at)
    .bind(state.last_result.as_ref().map(|r| r.correct))
    .bind(state.last_result.as_ref().map(|r| r.timestamp))
    .execute(executor)
    .await?;
    Ok(())
}

async fn upsert_progress<'e, E>(executor: E, progress: &UserProgress) -> anyhow::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO progress (id, payload) VALUES (1, ?) ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
    )
    .bind(serde_json::to_string(progress)?)
    .execute(executor)
    .await?;
    Ok(())
}

async fn upsert_profile<'e, E>(executor: E, profile: &UserProfile) -> anyhow::Result<()>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query(
        "INSERT INTO profile (id, payload) VALUES (1, ?) ON CONFLICT(id) DO UPDATE SET payload = excluded.payload",
    )
    .bind(serde_json::to_string(profile)?)
    .execute(executor)
    .await?;
    Ok(())
}
