//! Job queue persistence.
//!
//! Jobs move `pending -> running -> completed | failed`. A transient failure
//! puts a job back to `pending` with a later `run_at`. Running jobs whose
//! lock is older than the stale cutoff are assumed abandoned and requeued.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::models::JobRecord;
use super::pool::{DbError, DbPool};
use super::util::expect_rows;
use super::{now, timestamp};
use crate::models::{Job, JobStatus, JobType};
use crate::schema::jobs;

const ACTIVE: [&str; 2] = ["pending", "running"];

#[derive(Clone)]
pub struct JobRepository {
    pool: DbPool,
}

impl JobRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert a pending job. A second in-flight analysis for the same
    /// inspection fails with a unique violation.
    pub async fn enqueue(
        &self,
        job_type: JobType,
        payload: &str,
        inspection_id: Option<&str>,
        max_attempts: i32,
    ) -> Result<Job, DbError> {
        let stamp = now();
        let record = JobRecord {
            id: uuid::Uuid::new_v4().to_string(),
            job_type: job_type.as_str().to_string(),
            payload: payload.to_string(),
            inspection_id: inspection_id.map(str::to_string),
            status: JobStatus::Pending.as_str().to_string(),
            attempts: 0,
            max_attempts: max_attempts.max(1),
            last_error: None,
            run_at: stamp.clone(),
            locked_at: None,
            created_at: stamp.clone(),
            updated_at: stamp,
        };

        let mut conn = self.pool.get().await?;
        diesel::insert_into(jobs::table)
            .values(&record)
            .execute(&mut conn)
            .await?;
        Ok(Job::from(record))
    }

    pub async fn has_pending(&self, job_type: JobType, inspection_id: &str) -> Result<bool, DbError> {
        let mut conn = self.pool.get().await?;
        let count: i64 = jobs::table
            .filter(jobs::job_type.eq(job_type.as_str()))
            .filter(jobs::inspection_id.eq(inspection_id))
            .filter(jobs::status.eq_any(ACTIVE))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(count > 0)
    }

    /// Atomically claim the oldest runnable job.
    pub async fn claim_next(&self) -> Result<Option<Job>, DbError> {
        let mut conn = self.pool.get().await?;
        let now = now();

        conn.transaction(|conn| {
            let now = now.clone();
            Box::pin(async move {
                let record: Option<JobRecord> = jobs::table
                    .filter(jobs::status.eq(JobStatus::Pending.as_str()))
                    .filter(jobs::run_at.le(&now))
                    .order((jobs::run_at.asc(), jobs::created_at.asc()))
                    .select(JobRecord::as_select())
                    .first(conn)
                    .await
                    .optional()?;

                let Some(record) = record else {
                    return Ok(None);
                };

                let affected = diesel::update(
                    jobs::table
                        .filter(jobs::id.eq(&record.id))
                        .filter(jobs::status.eq(JobStatus::Pending.as_str())),
                )
                .set((
                    jobs::status.eq(JobStatus::Running.as_str()),
                    jobs::attempts.eq(jobs::attempts + 1),
                    jobs::locked_at.eq(&now),
                    jobs::updated_at.eq(&now),
                ))
                .execute(conn)
                .await?;

                if affected == 0 {
                    return Ok(None);
                }

                let mut job = Job::from(record);
                job.status = JobStatus::Running;
                job.attempts += 1;
                job.locked_at = Some(super::parse_datetime(&now));
                Ok(Some(job))
            })
        })
        .await
    }

    pub async fn complete(&self, id: &str) -> Result<(), DbError> {
        self.finish(id, JobStatus::Completed, None).await
    }

    pub async fn fail(&self, id: &str, error: &str) -> Result<(), DbError> {
        self.finish(id, JobStatus::Failed, Some(error)).await
    }

    async fn finish(&self, id: &str, status: JobStatus, error: Option<&str>) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(jobs::table.find(id))
            .set((
                jobs::status.eq(status.as_str()),
                jobs::last_error.eq(error),
                jobs::locked_at.eq(None::<String>),
                jobs::updated_at.eq(now()),
            ))
            .execute(&mut conn)
            .await?;
        expect_rows(affected)
    }

    /// Put a running job back in the queue to run at `run_at`.
    pub async fn retry_later(
        &self,
        id: &str,
        error: &str,
        run_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(jobs::table.find(id))
            .set((
                jobs::status.eq(JobStatus::Pending.as_str()),
                jobs::last_error.eq(error),
                jobs::run_at.eq(timestamp(run_at)),
                jobs::locked_at.eq(None::<String>),
                jobs::updated_at.eq(now()),
            ))
            .execute(&mut conn)
            .await?;
        expect_rows(affected)
    }

    /// Manually re-run a failed job from scratch.
    pub async fn retry_failed(&self, id: &str) -> Result<(), DbError> {
        let stamp = now();
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(
            jobs::table
                .filter(jobs::id.eq(id))
                .filter(jobs::status.eq(JobStatus::Failed.as_str())),
        )
        .set((
            jobs::status.eq(JobStatus::Pending.as_str()),
            jobs::attempts.eq(0),
            jobs::run_at.eq(&stamp),
            jobs::updated_at.eq(&stamp),
        ))
        .execute(&mut conn)
        .await?;
        expect_rows(affected)
    }

    /// Requeue running jobs locked before `cutoff`. Returns the count.
    pub async fn requeue_stale(&self, cutoff: DateTime<Utc>) -> Result<usize, DbError> {
        let stamp = now();
        let mut conn = self.pool.get().await?;
        diesel::update(
            jobs::table
                .filter(jobs::status.eq(JobStatus::Running.as_str()))
                .filter(jobs::locked_at.lt(timestamp(cutoff))),
        )
        .set((
            jobs::status.eq(JobStatus::Pending.as_str()),
            jobs::locked_at.eq(None::<String>),
            jobs::run_at.eq(&stamp),
            jobs::updated_at.eq(&stamp),
        ))
        .execute(&mut conn)
        .await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Job>, DbError> {
        let mut conn = self.pool.get().await?;
        jobs::table
            .find(id)
            .select(JobRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(Job::from))
    }

    /// Most recent job of a type for an inspection.
    pub async fn latest_for_inspection(
        &self,
        job_type: JobType,
        inspection_id: &str,
    ) -> Result<Option<Job>, DbError> {
        let mut conn = self.pool.get().await?;
        jobs::table
            .filter(jobs::job_type.eq(job_type.as_str()))
            .filter(jobs::inspection_id.eq(inspection_id))
            .order(jobs::created_at.desc())
            .select(JobRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(Job::from))
    }

    pub async fn list(
        &self,
        status: Option<JobStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Job>, DbError> {
        let mut conn = self.pool.get().await?;
        let mut query = jobs::table.into_boxed();
        if let Some(status) = status {
            query = query.filter(jobs::status.eq(status.as_str()));
        }
        query
            .order(jobs::created_at.desc())
            .limit(limit)
            .offset(offset)
            .select(JobRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(Job::from).collect())
    }

    pub async fn counts(&self) -> Result<HashMap<JobStatus, i64>, DbError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<(String, i64)> = jobs::table
            .group_by(jobs::status)
            .select((jobs::status, diesel::dsl::count_star()))
            .load(&mut conn)
            .await?;
        Ok(rows
            .into_iter()
            .filter_map(|(status, n)| JobStatus::from_str(&status).map(|s| (s, n)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup_test_db;
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_claim_complete_cycle() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.jobs();
        let job = repo
            .enqueue(JobType::GenerateReport, "{}", None, 3)
            .await
            .unwrap();

        let claimed = repo.claim_next().await.unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.attempts, 1);
        assert!(repo.claim_next().await.unwrap().is_none());

        repo.complete(&job.id).await.unwrap();
        let done = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(done.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_one_active_analysis_per_inspection() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.jobs();

        repo.enqueue(JobType::AnalyzeInspection, "{}", Some("insp-1"), 3)
            .await
            .unwrap();
        assert!(repo
            .has_pending(JobType::AnalyzeInspection, "insp-1")
            .await
            .unwrap());

        let err = repo
            .enqueue(JobType::AnalyzeInspection, "{}", Some("insp-1"), 3)
            .await
            .unwrap_err();
        let app: crate::AppError = err.into();
        assert_eq!(app.code(), "ECONFLICT");

        // other inspections and other job types are unaffected
        repo.enqueue(JobType::AnalyzeInspection, "{}", Some("insp-2"), 3)
            .await
            .unwrap();
        repo.enqueue(JobType::GenerateReport, "{}", Some("insp-1"), 3)
            .await
            .unwrap();

        // once finished the slot frees up
        let claimed = repo.claim_next().await.unwrap().unwrap();
        repo.complete(&claimed.id).await.unwrap();
        repo.enqueue(JobType::AnalyzeInspection, "{}", Some("insp-1"), 3)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_retry_later_defers_claim() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.jobs();
        repo.enqueue(JobType::GenerateReport, "{}", None, 3)
            .await
            .unwrap();
        let job = repo.claim_next().await.unwrap().unwrap();

        repo.retry_later(&job.id, "timeout", Utc::now() + Duration::minutes(5))
            .await
            .unwrap();
        assert!(repo.claim_next().await.unwrap().is_none());

        let pending = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(pending.status, JobStatus::Pending);
        assert_eq!(pending.last_error.as_deref(), Some("timeout"));
    }

    #[tokio::test]
    async fn test_requeue_stale_and_manual_retry() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.jobs();
        repo.enqueue(JobType::GenerateReport, "{}", None, 3)
            .await
            .unwrap();
        let job = repo.claim_next().await.unwrap().unwrap();

        assert_eq!(
            repo.requeue_stale(Utc::now() - Duration::minutes(90))
                .await
                .unwrap(),
            0
        );
        assert_eq!(
            repo.requeue_stale(Utc::now() + Duration::seconds(1))
                .await
                .unwrap(),
            1
        );

        let again = repo.claim_next().await.unwrap().unwrap();
        assert_eq!(again.attempts, 2);
        repo.fail(&job.id, "boom").await.unwrap();
        assert_eq!(repo.counts().await.unwrap().get(&JobStatus::Failed), Some(&1));

        repo.retry_failed(&job.id).await.unwrap();
        let retried = repo.get(&job.id).await.unwrap().unwrap();
        assert_eq!(retried.status, JobStatus::Pending);
        assert_eq!(retried.attempts, 0);
        assert!(repo.retry_failed(&job.id).await.is_err());
    }
}
