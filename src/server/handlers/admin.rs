//! Admin overview and job management.

use axum::extract::{Path, Query, State};
use axum::response::Response;
use serde::Deserialize;

use super::super::auth::AdminUser;
use super::super::htmx::{redirect, HxRequest};
use super::super::template_structs::{
    AdminJobsTemplate, AdminStats, AdminTemplate, Choice, JobRow, NavUser, UserRow,
};
use super::super::AppState;
use super::helpers::render;
use crate::error::{AppError, AppResult};
use crate::models::JobStatus;

const USER_LIMIT: i64 = 100;
const JOB_LIMIT: i64 = 200;

async fn load_stats(state: &AppState) -> AppResult<AdminStats> {
    if let Some(stats) = state.stats_cache.get_admin_stats() {
        return Ok(stats);
    }
    let (users_repo, regulations_repo, jobs_repo) =
        (state.ctx.users(), state.ctx.regulations(), state.ctx.jobs());
    let (users, regulations, jobs) = tokio::join!(
        users_repo.count(),
        regulations_repo.count(),
        jobs_repo.counts(),
    );
    let jobs = jobs?;
    let count = |s: JobStatus| jobs.get(&s).copied().unwrap_or(0);
    let stats = AdminStats {
        users: users?,
        regulations: regulations?,
        jobs_pending: count(JobStatus::Pending),
        jobs_running: count(JobStatus::Running),
        jobs_failed: count(JobStatus::Failed),
        jobs_completed: count(JobStatus::Completed),
    };
    state.stats_cache.set_admin_stats(stats.clone());
    Ok(stats)
}

pub async fn admin_index(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
) -> AppResult<Response> {
    let stats = load_stats(&state).await?;
    let users = state.ctx.users().list(USER_LIMIT, 0).await?;
    render(&AdminTemplate {
        title: "Admin",
        nav: Some(NavUser::from(&admin)),
        stats,
        users: users.iter().map(UserRow::from).collect(),
    })
}

#[derive(Debug, Deserialize)]
pub struct JobParams {
    pub status: Option<String>,
}

pub async fn admin_jobs(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Query(params): Query<JobParams>,
) -> AppResult<Response> {
    let current = params.status.as_deref().unwrap_or("").trim();
    let status = match current {
        "" => None,
        s => Some(
            JobStatus::from_str(s).ok_or_else(|| AppError::invalid(format!("Unknown job status: {}", s)))?,
        ),
    };
    let jobs = state.ctx.jobs().list(status, JOB_LIMIT, 0).await?;

    let mut statuses = vec![Choice::new("", "All jobs", current)];
    statuses.extend(
        JobStatus::ALL
            .iter()
            .map(|s| Choice::new(s.as_str(), s.as_str(), current)),
    );

    render(&AdminJobsTemplate {
        title: "Jobs",
        nav: Some(NavUser::from(&admin)),
        statuses,
        jobs: jobs.iter().map(JobRow::from).collect(),
    })
}

/// Put a failed job back in the queue.
pub async fn retry_job(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    hx: HxRequest,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let job = state
        .ctx
        .jobs()
        .get(&id)
        .await?
        .ok_or_else(|| AppError::not_found("Job"))?;
    if job.status != JobStatus::Failed {
        return Err(AppError::Conflict("Only failed jobs can be retried".to_string()));
    }
    state.ctx.jobs().retry_failed(&id).await?;
    state.stats_cache.invalidate();
    tracing::info!(job_id = %id, admin = %admin.email, "job requeued by admin");
    Ok(redirect(hx, "/admin/jobs"))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::super::super::test_support::TestApp;
    use crate::models::JobType;

    #[tokio::test]
    async fn test_admin_requires_admin_flag() {
        let app = TestApp::new().await;
        let (user, cookie) = app.login("plain@example.com").await;

        let response = app.get("/admin", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        app.state.ctx.users().set_admin(&user.id, true).await.unwrap();
        let response = app.get("/admin", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_load_stats_counts_each_table() {
        let app = TestApp::new().await;
        app.login("one@example.com").await;
        app.login("two@example.com").await;
        let jobs = app.state.ctx.jobs();
        let job = jobs
            .enqueue(JobType::GenerateReport, "{}", None, 1)
            .await
            .unwrap();
        jobs.fail(&job.id, "boom").await.unwrap();
        jobs.enqueue(JobType::GenerateReport, "{}", None, 1)
            .await
            .unwrap();

        let stats = super::load_stats(&app.state).await.unwrap();
        assert_eq!(stats.users, 2);
        assert_eq!(stats.regulations, 0);
        assert_eq!(stats.jobs_pending, 1);
        assert_eq!(stats.jobs_failed, 1);
        assert_eq!(stats.jobs_running, 0);
    }

    #[tokio::test]
    async fn test_retry_only_failed_jobs() {
        let app = TestApp::new().await;
        let (user, cookie) = app.login("root@example.com").await;
        app.state.ctx.users().set_admin(&user.id, true).await.unwrap();

        let jobs = app.state.ctx.jobs();
        let job = jobs
            .enqueue(JobType::GenerateReport, "{}", None, 1)
            .await
            .unwrap();

        let uri = format!("/admin/jobs/{}/retry", job.id);
        let response = app.form("POST", &uri, &cookie, "").await;
        assert_eq!(response.status(), StatusCode::CONFLICT);

        jobs.fail(&job.id, "boom").await.unwrap();
        let response = app.form("POST", &uri, &cookie, "").await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let job = jobs.get(&job.id).await.unwrap().unwrap();
        assert_eq!(job.status, crate::models::JobStatus::Pending);
        assert_eq!(job.attempts, 0);
    }
}
