// Job table: one row per target key, kept after it finishes

use crate::data::{Database, from_millis, to_millis};
use crate::error::{CoreError, Result};
use crate::model::{Job, JobState};
use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row, params};

const JOB_COLUMNS: &str =
    "id, key, status, retry_count, last_executed_at, error_message, created_at";

fn job_from_row(row: &Row) -> rusqlite::Result<Job> {
    let status: String = row.get(2)?;
    let state = status.parse::<JobState>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, e.into())
    })?;

    Ok(Job {
        id: row.get(0)?,
        key: row.get(1)?,
        state,
        retry_count: row.get(3)?,
        last_executed_at: row.get::<_, Option<i64>>(4)?.map(from_millis),
        error_message: row.get(5)?,
        created_at: from_millis(row.get(6)?),
    })
}

impl Database {
    pub fn get_job(&self, key: &str) -> Result<Option<Job>> {
        let sql = format!("SELECT {} FROM jobs WHERE key = ?1", JOB_COLUMNS);
        Ok(self
            .conn
            .query_row(&sql, params![key], job_from_row)
            .optional()?)
    }

    fn require_job(&self, key: &str) -> Result<Job> {
        self.get_job(key)?
            .ok_or_else(|| CoreError::UnknownJob(key.to_string()))
    }

    /// Look up the job for `key`, creating a pending one if there is none.
    /// The flag reports whether it was created.
    pub fn get_or_create_job(&mut self, key: &str, now: DateTime<Utc>) -> Result<(Job, bool)> {
        if let Some(job) = self.get_job(key)? {
            return Ok((job, false));
        }

        let now = to_millis(now);
        self.conn.execute(
            "INSERT INTO jobs (key, status, retry_count, created_at) VALUES (?1, ?2, 0, ?3)",
            params![key, JobState::Pending.as_str(), now],
        )?;
        Ok((self.require_job(key)?, true))
    }

    fn check_transition(&self, key: &str, to: JobState) -> Result<Job> {
        let job = self.require_job(key)?;
        if !job.state.can_transition_to(to) {
            return Err(CoreError::IllegalTransition {
                key: key.to_string(),
                from: job.state,
                to,
            });
        }
        Ok(job)
    }

    /// `pending -> processing`.
    pub fn admit_job(&mut self, key: &str) -> Result<Job> {
        self.check_transition(key, JobState::Processing)?;
        self.conn.execute(
            "UPDATE jobs SET status = ?1 WHERE key = ?2",
            params![JobState::Processing.as_str(), key],
        )?;
        self.require_job(key)
    }

    /// `failed | completed -> pending`. The job keeps its place by creation time.
    pub fn requeue_job(&mut self, key: &str, reset_retries: bool) -> Result<Job> {
        self.check_transition(key, JobState::Pending)?;
        self.conn.execute(
            "UPDATE jobs SET status = ?1,
                retry_count = CASE WHEN ?2 THEN 0 ELSE retry_count END
             WHERE key = ?3",
            params![JobState::Pending.as_str(), reset_retries, key],
        )?;
        self.require_job(key)
    }

    pub fn record_execution(&mut self, key: &str, now: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE jobs SET last_executed_at = ?1, counted_at = ?1 WHERE key = ?2",
            params![to_millis(now), key],
        )?;
        Ok(())
    }

    /// `processing -> completed`. `note` explains a completion without data.
    pub fn complete_job(&mut self, key: &str, note: Option<&str>) -> Result<Job> {
        self.check_transition(key, JobState::Completed)?;
        self.conn.execute(
            "UPDATE jobs SET status = ?1, error_message = ?2 WHERE key = ?3",
            params![JobState::Completed.as_str(), note, key],
        )?;
        self.require_job(key)
    }

    /// `processing -> failed`, counting the attempt. A failed attempt no
    /// longer holds the rate limit, so a run of failures drains the queue
    /// without spacing. Only completed extractions are spaced.
    pub fn fail_job(&mut self, key: &str, message: &str) -> Result<Job> {
        self.check_transition(key, JobState::Failed)?;
        self.conn.execute(
            "UPDATE jobs SET status = ?1, error_message = ?2, retry_count = retry_count + 1,
                counted_at = NULL
             WHERE key = ?3",
            params![JobState::Failed.as_str(), message, key],
        )?;
        self.require_job(key)
    }

    /// Start time of the most recent execution that counts against the rate
    /// limit. Failed attempts do not count; a completed job that was queued
    /// again still does.
    pub fn last_execution_at(&self) -> Result<Option<DateTime<Utc>>> {
        let last: Option<i64> = self.conn.query_row(
            "SELECT MAX(counted_at) FROM jobs",
            [],
            |row| row.get(0),
        )?;
        Ok(last.map(from_millis))
    }

    pub fn processing_count(&self) -> Result<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM jobs WHERE status = 'processing'",
            [],
            |row| row.get(0),
        )?)
    }

    /// Oldest job waiting for admission.
    pub fn next_pending_job(&self) -> Result<Option<Job>> {
        let sql = format!(
            "SELECT {} FROM jobs WHERE status = 'pending' ORDER BY created_at, id LIMIT 1",
            JOB_COLUMNS
        );
        Ok(self.conn.query_row(&sql, [], job_from_row).optional()?)
    }

    pub fn pending_jobs(&self) -> Result<Vec<Job>> {
        self.query_jobs(&format!(
            "SELECT {} FROM jobs WHERE status = 'pending' ORDER BY created_at, id",
            JOB_COLUMNS
        ))
    }

    pub fn list_jobs(&self) -> Result<Vec<Job>> {
        self.query_jobs(&format!(
            "SELECT {} FROM jobs ORDER BY created_at, id",
            JOB_COLUMNS
        ))
    }

    fn query_jobs(&self, sql: &str) -> Result<Vec<Job>> {
        let mut stmt = self.conn.prepare(sql)?;
        let jobs = stmt
            .query_map([], job_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    /// Return jobs stranded in `processing` by a previous process to the
    /// queue. Only valid before any execution has been dispatched.
    pub fn recover_in_flight(&mut self) -> Result<usize> {
        Ok(self.conn.execute(
            "UPDATE jobs SET status = 'pending' WHERE status = 'processing'",
            [],
        )?)
    }
}
