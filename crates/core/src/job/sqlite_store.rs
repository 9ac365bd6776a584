//! SQLite-backed job store implementation.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension};

use crate::owner::{OwnerKind, OwnerRef};

use super::{
    CreateJobRequest, JobCompletion, JobError, JobFilter, JobKind, JobPayload, JobRecord,
    JobStatus, JobStore,
};

const JOB_COLUMNS: &str = "id, kind, provider, model, payload, external_task_id, status, \
     result_url, stable_url, duration_secs, error_message, owner_kind, owner_id, owner_synced, \
     created_at, updated_at, completed_at, deleted_at";

/// SQLite-backed job store.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

fn db_err(e: impl std::fmt::Display) -> JobError {
    JobError::Database(e.to_string())
}

fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

impl SqliteJobStore {
    /// Open (or create) the job database at `path`.
    pub fn new(path: &Path) -> Result<Self, JobError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, JobError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), JobError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS jobs (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                provider TEXT NOT NULL,
                model TEXT,
                payload TEXT NOT NULL,
                external_task_id TEXT,
                status TEXT NOT NULL,
                result_url TEXT,
                stable_url TEXT,
                duration_secs REAL,
                error_message TEXT,
                owner_kind TEXT,
                owner_id TEXT,
                owner_synced INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                deleted_at TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
            CREATE INDEX IF NOT EXISTS idx_jobs_owner ON jobs(owner_kind, owner_id);
            CREATE INDEX IF NOT EXISTS idx_jobs_stable_url ON jobs(stable_url);
            CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs(created_at);
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    fn build_where_clause(filter: &JobFilter) -> (String, Vec<Box<dyn rusqlite::ToSql>>) {
        let mut conditions = vec!["deleted_at IS NULL"];
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            conditions.push("status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(kind) = filter.kind {
            conditions.push("kind = ?");
            params.push(Box::new(kind.as_str()));
        }

        if let Some(ref owner) = filter.owner {
            conditions.push("owner_kind = ? AND owner_id = ?");
            params.push(Box::new(owner.kind.as_str()));
            params.push(Box::new(owner.id.clone()));
        }

        (format!("WHERE {}", conditions.join(" AND ")), params)
    }

    fn row_to_job(row: &rusqlite::Row) -> rusqlite::Result<JobRecord> {
        let kind_str: String = row.get(1)?;
        let kind: JobKind = kind_str.parse().map_err(|e| conversion_err(1, e))?;

        let payload_json: String = row.get(4)?;
        let payload: JobPayload =
            serde_json::from_str(&payload_json).map_err(|e| conversion_err(4, e))?;

        let status_str: String = row.get(6)?;
        let status: JobStatus = status_str.parse().map_err(|e| conversion_err(6, e))?;

        let owner_kind: Option<String> = row.get(11)?;
        let owner_id: Option<String> = row.get(12)?;
        let owner = match (owner_kind, owner_id) {
            (Some(kind), Some(id)) => {
                let kind: OwnerKind = kind.parse().map_err(|e| conversion_err(11, e))?;
                Some(OwnerRef::new(kind, id))
            }
            _ => None,
        };

        let created_at: String = row.get(14)?;
        let updated_at: String = row.get(15)?;
        let completed_at: Option<String> = row.get(16)?;
        let deleted_at: Option<String> = row.get(17)?;

        Ok(JobRecord {
            id: row.get(0)?,
            kind,
            provider: row.get(2)?,
            model: row.get(3)?,
            payload,
            external_task_id: row.get(5)?,
            status,
            result_url: row.get(7)?,
            stable_url: row.get(8)?,
            duration_secs: row.get(9)?,
            error_message: row.get(10)?,
            owner,
            owner_synced: row.get::<_, i64>(13)? != 0,
            created_at: parse_timestamp(&created_at),
            updated_at: parse_timestamp(&updated_at),
            completed_at: completed_at.as_deref().map(parse_timestamp),
            deleted_at: deleted_at.as_deref().map(parse_timestamp),
        })
    }

    fn load(conn: &Connection, id: &str) -> Result<Option<JobRecord>, JobError> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE id = ? AND deleted_at IS NULL",
            JOB_COLUMNS
        );
        conn.query_row(&sql, params![id], Self::row_to_job)
            .optional()
            .map_err(db_err)
    }

    fn query_jobs(
        conn: &Connection,
        clause: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<JobRecord>, JobError> {
        let sql = format!("SELECT {} FROM jobs {}", JOB_COLUMNS, clause);
        let mut stmt = conn.prepare(&sql).map_err(db_err)?;
        let rows = stmt.query_map(params, Self::row_to_job).map_err(db_err)?;

        let mut jobs = Vec::new();
        for row_result in rows {
            jobs.push(row_result.map_err(db_err)?);
        }
        Ok(jobs)
    }

    /// Run a guarded UPDATE and report why it matched nothing.
    fn transition(
        conn: &Connection,
        id: &str,
        target: &str,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<JobRecord, JobError> {
        let changed = conn.execute(sql, params).map_err(db_err)?;
        match Self::load(conn, id)? {
            None => Err(JobError::NotFound(id.to_string())),
            Some(job) if changed == 0 => Err(JobError::InvalidTransition {
                job_id: id.to_string(),
                current: job.status,
                target: target.to_string(),
            }),
            Some(job) => Ok(job),
        }
    }
}

impl JobStore for SqliteJobStore {
    fn create(&self, request: CreateJobRequest) -> Result<JobRecord, JobError> {
        let conn = self.conn.lock().unwrap();

        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let payload_json = serde_json::to_string(&request.payload).map_err(db_err)?;

        conn.execute(
            "INSERT INTO jobs (id, kind, provider, model, payload, status, owner_kind, owner_id, owner_synced, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?)",
            params![
                id,
                request.kind.as_str(),
                request.provider,
                request.model,
                payload_json,
                JobStatus::Pending.as_str(),
                request.owner.as_ref().map(|o| o.kind.as_str()),
                request.owner.as_ref().map(|o| o.id.as_str()),
                timestamp(&now),
                timestamp(&now),
            ],
        )
        .map_err(db_err)?;

        Self::load(&conn, &id)?.ok_or(JobError::NotFound(id))
    }

    fn get(&self, id: &str) -> Result<Option<JobRecord>, JobError> {
        let conn = self.conn.lock().unwrap();
        Self::load(&conn, id)
    }

    fn list(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, JobError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let clause = format!(
            "{} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            where_clause
        );

        let mut all_params: Vec<Box<dyn rusqlite::ToSql>> = params;
        all_params.push(Box::new(filter.limit));
        all_params.push(Box::new(filter.offset));

        let param_refs: Vec<&dyn rusqlite::ToSql> = all_params.iter().map(|p| p.as_ref()).collect();
        Self::query_jobs(&conn, &clause, param_refs.as_slice())
    }

    fn count(&self, filter: &JobFilter) -> Result<i64, JobError> {
        let conn = self.conn.lock().unwrap();

        let (where_clause, params) = Self::build_where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM jobs {}", where_clause);
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();

        conn.query_row(&sql, param_refs.as_slice(), |row| row.get(0))
            .map_err(db_err)
    }

    fn mark_processing(&self, id: &str, task_id: &str) -> Result<JobRecord, JobError> {
        let conn = self.conn.lock().unwrap();
        let now = timestamp(&Utc::now());
        Self::transition(
            &conn,
            id,
            "processing",
            "UPDATE jobs SET status = 'processing', external_task_id = ?, updated_at = ? \
             WHERE id = ? AND status = 'pending' AND external_task_id IS NULL AND deleted_at IS NULL",
            params![task_id, now, id],
        )
    }

    fn mark_failed(&self, id: &str, message: &str) -> Result<JobRecord, JobError> {
        let conn = self.conn.lock().unwrap();
        let now = timestamp(&Utc::now());
        Self::transition(
            &conn,
            id,
            "failed",
            "UPDATE jobs SET status = 'failed', error_message = ?, updated_at = ? \
             WHERE id = ? AND status IN ('pending', 'processing') AND deleted_at IS NULL",
            params![message, now, id],
        )
    }

    fn mark_cancelled(&self, id: &str, reason: &str) -> Result<JobRecord, JobError> {
        let conn = self.conn.lock().unwrap();
        let now = timestamp(&Utc::now());
        Self::transition(
            &conn,
            id,
            "cancelled",
            "UPDATE jobs SET status = 'cancelled', error_message = ?, updated_at = ? \
             WHERE id = ? AND status IN ('pending', 'processing') AND deleted_at IS NULL",
            params![reason, now, id],
        )
    }

    fn mark_completed(
        &self,
        id: &str,
        completion: &JobCompletion,
    ) -> Result<JobRecord, JobError> {
        let conn = self.conn.lock().unwrap();
        let now = timestamp(&Utc::now());
        Self::transition(
            &conn,
            id,
            "completed",
            "UPDATE jobs SET status = 'completed', result_url = ?, stable_url = ?, \
             duration_secs = COALESCE(?, duration_secs), owner_synced = 0, \
             completed_at = ?, updated_at = ? \
             WHERE id = ? AND status = 'processing' AND deleted_at IS NULL",
            params![
                completion.result_url,
                completion.stable_url,
                completion.duration_secs,
                now,
                now,
                id
            ],
        )
    }

    fn rebind_stable_url(&self, id: &str, stable_url: &str) -> Result<JobRecord, JobError> {
        let conn = self.conn.lock().unwrap();
        let now = timestamp(&Utc::now());
        Self::transition(
            &conn,
            id,
            "completed",
            "UPDATE jobs SET stable_url = ?, owner_synced = 0, updated_at = ? \
             WHERE id = ? AND status = 'completed' AND deleted_at IS NULL",
            params![stable_url, now, id],
        )
    }

    fn mark_owner_synced(&self, id: &str) -> Result<(), JobError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                "UPDATE jobs SET owner_synced = 1 WHERE id = ? AND deleted_at IS NULL",
                params![id],
            )
            .map_err(db_err)?;

        if changed == 0 {
            return Err(JobError::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn soft_delete(&self, id: &str) -> Result<JobRecord, JobError> {
        let conn = self.conn.lock().unwrap();

        let job = Self::load(&conn, id)?.ok_or_else(|| JobError::NotFound(id.to_string()))?;
        let now = Utc::now();
        conn.execute(
            "UPDATE jobs SET deleted_at = ?, updated_at = ? WHERE id = ? AND deleted_at IS NULL",
            params![timestamp(&now), timestamp(&now), id],
        )
        .map_err(db_err)?;

        Ok(JobRecord {
            deleted_at: Some(now),
            updated_at: now,
            ..job
        })
    }

    fn list_processing_with_task(&self) -> Result<Vec<JobRecord>, JobError> {
        let conn = self.conn.lock().unwrap();
        Self::query_jobs(
            &conn,
            "WHERE status = 'processing' AND deleted_at IS NULL \
             AND external_task_id IS NOT NULL AND external_task_id != '' \
             ORDER BY created_at ASC",
            &[],
        )
    }

    fn list_completed_missing_cache(&self) -> Result<Vec<JobRecord>, JobError> {
        let conn = self.conn.lock().unwrap();
        Self::query_jobs(
            &conn,
            "WHERE status = 'completed' AND deleted_at IS NULL \
             AND (stable_url IS NULL OR stable_url = '' OR stable_url = result_url) \
             ORDER BY completed_at ASC",
            &[],
        )
    }

    fn list_completed_with_stable_url(&self) -> Result<Vec<JobRecord>, JobError> {
        let conn = self.conn.lock().unwrap();
        Self::query_jobs(
            &conn,
            "WHERE status = 'completed' AND deleted_at IS NULL \
             AND stable_url IS NOT NULL AND stable_url != '' \
             AND (result_url IS NULL OR stable_url != result_url) \
             ORDER BY completed_at ASC",
            &[],
        )
    }

    fn list_completed_unsynced_owner(&self) -> Result<Vec<JobRecord>, JobError> {
        let conn = self.conn.lock().unwrap();
        Self::query_jobs(
            &conn,
            "WHERE status = 'completed' AND deleted_at IS NULL AND owner_synced = 0 \
             AND owner_kind IS NOT NULL AND owner_id IS NOT NULL \
             AND stable_url IS NOT NULL AND stable_url != '' \
             ORDER BY completed_at ASC",
            &[],
        )
    }

    fn stable_url_in_use(&self, url: &str) -> Result<bool, JobError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM jobs WHERE stable_url = ? AND deleted_at IS NULL",
                params![url],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        Ok(count > 0)
    }
}
