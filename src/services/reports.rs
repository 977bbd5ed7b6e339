//! Report generation requests and downloads.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::{InspectionStatus, Report, ReportFormat, ReportStatus};
use crate::repository::DbContext;
use crate::storage::Storage;
use crate::work_queue::enqueue_report;

/// Lifetime of a signed download link.
pub const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(15 * 60);

#[derive(Clone)]
pub struct ReportService {
    ctx: DbContext,
    storage: Arc<dyn Storage>,
    job_max_attempts: i32,
}

impl ReportService {
    pub fn new(ctx: DbContext, storage: Arc<dyn Storage>, job_max_attempts: i32) -> Self {
        Self {
            ctx,
            storage,
            job_max_attempts,
        }
    }

    /// Queue a new report for the inspection. Every request creates a fresh
    /// report row; earlier reports stay downloadable.
    pub async fn request(&self, user_id: &str, inspection_id: &str) -> AppResult<Report> {
        let inspection = self
            .ctx
            .inspections()
            .get(inspection_id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Inspection"))?;
        if !matches!(
            inspection.status,
            InspectionStatus::Review | InspectionStatus::Completed
        ) {
            return Err(AppError::invalid(
                "Reports can be generated once the inspection is in review or completed",
            ));
        }
        let confirmed = self
            .ctx
            .violations()
            .confirmed_count(inspection_id, user_id)
            .await?;
        if confirmed == 0 {
            return Err(AppError::invalid(
                "Confirm at least one violation before generating a report",
            ));
        }

        let report = Report {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            inspection_id: inspection_id.to_string(),
            violation_count: confirmed as i32,
            status: ReportStatus::Pending,
            pdf_key: None,
            docx_key: None,
            error: None,
            generated_at: None,
            created_at: Utc::now(),
        };
        let reports = self.ctx.reports();
        reports.create(&report).await?;

        if let Err(e) = enqueue_report(
            &self.ctx.jobs(),
            &report.id,
            inspection_id,
            user_id,
            self.job_max_attempts,
        )
        .await
        {
            reports.mark_failed(&report.id, "could not be queued").await?;
            return Err(e.into());
        }
        info!(report_id = %report.id, inspection_id, "report queued");
        Ok(report)
    }

    pub async fn get(&self, user_id: &str, id: &str) -> AppResult<Report> {
        self.ctx
            .reports()
            .get(id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Report"))
    }

    pub async fn list_for_inspection(
        &self,
        user_id: &str,
        inspection_id: &str,
    ) -> AppResult<Vec<Report>> {
        Ok(self
            .ctx
            .reports()
            .list_for_inspection(inspection_id, user_id)
            .await?)
    }

    pub async fn recent(&self, user_id: &str, limit: i64) -> AppResult<Vec<Report>> {
        Ok(self.ctx.reports().list_for_user(user_id, limit).await?)
    }

    /// Signed download URL for one format of a generated report; `pdf` when
    /// no format is given.
    pub async fn download_url(
        &self,
        user_id: &str,
        id: &str,
        format: Option<&str>,
    ) -> AppResult<(ReportFormat, String)> {
        let format = match format.map(str::trim).filter(|f| !f.is_empty()) {
            None => ReportFormat::Pdf,
            Some(f) => ReportFormat::from_str(&f.to_ascii_lowercase())
                .ok_or_else(|| AppError::invalid(format!("Unknown report format: {}", f)))?,
        };
        let report = self.get(user_id, id).await?;
        let key = report
            .key_for(format)
            .ok_or_else(|| AppError::NotFound("Report has not been generated yet".to_string()))?;
        let url = self.storage.url(key, DOWNLOAD_URL_TTL)?;
        Ok((format, url))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{setup, TestEnv};
    use super::*;
    use crate::models::{Inspection, JobType, NewInspection, NewViolation, User, ViolationStatus};
    use crate::repository::test_support::create_user;

    async fn inspection_in(env: &TestEnv, user: &User, status: InspectionStatus) -> Inspection {
        let insp = env
            .services
            .inspections
            .create(
                &user.id,
                NewInspection {
                    title: "Roof".into(),
                    inspection_date: "2024-06-10".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        env.ctx
            .inspections()
            .set_status(&insp.id, &user.id, status)
            .await
            .unwrap();
        insp
    }

    async fn confirmed_violation(env: &TestEnv, user: &User, insp: &Inspection) {
        let v = env
            .services
            .violations
            .create(
                &user.id,
                &insp.id,
                NewViolation {
                    description: "Open edge".into(),
                    severity: "critical".into(),
                    inspector_notes: None,
                },
            )
            .await
            .unwrap();
        env.ctx
            .violations()
            .set_status(&v.id, &user.id, ViolationStatus::Confirmed)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_request_requires_review_and_confirmed() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;

        let draft = inspection_in(&env, &user, InspectionStatus::Draft).await;
        confirmed_violation(&env, &user, &draft).await;
        let err = env.services.reports.request(&user.id, &draft.id).await.unwrap_err();
        assert_eq!(err.code(), "EINVALID");

        let review = inspection_in(&env, &user, InspectionStatus::Review).await;
        let err = env.services.reports.request(&user.id, &review.id).await.unwrap_err();
        assert_eq!(err.code(), "EINVALID");

        confirmed_violation(&env, &user, &review).await;
        confirmed_violation(&env, &user, &review).await;
        let report = env.services.reports.request(&user.id, &review.id).await.unwrap();
        assert_eq!(report.status, ReportStatus::Pending);
        assert_eq!(report.violation_count, 2);
        assert!(env
            .ctx
            .jobs()
            .has_pending(JobType::GenerateReport, &review.id)
            .await
            .unwrap());

        // Regeneration creates a second row.
        env.services.reports.request(&user.id, &review.id).await.unwrap();
        let reports = env
            .services
            .reports
            .list_for_inspection(&user.id, &review.id)
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);
    }

    #[tokio::test]
    async fn test_download_url() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let insp = inspection_in(&env, &user, InspectionStatus::Completed).await;
        confirmed_violation(&env, &user, &insp).await;
        let report = env.services.reports.request(&user.id, &insp.id).await.unwrap();
        let svc = &env.services.reports;

        let err = svc.download_url(&user.id, &report.id, None).await.unwrap_err();
        assert_eq!(err.code(), "ENOTFOUND");
        let err = svc
            .download_url(&user.id, &report.id, Some("xlsx"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EINVALID");

        env.ctx
            .reports()
            .mark_generated(&report.id, "users/u/r.pdf", "users/u/r.docx")
            .await
            .unwrap();
        let (format, url) = svc.download_url(&user.id, &report.id, None).await.unwrap();
        assert_eq!(format, ReportFormat::Pdf);
        assert!(url.starts_with("/files/users/u/r.pdf?expires="));
        let (format, url) = svc
            .download_url(&user.id, &report.id, Some("docx"))
            .await
            .unwrap();
        assert_eq!(format, ReportFormat::Docx);
        assert!(url.contains("r.docx"));

        let other = create_user(&env.ctx, "b@example.com").await;
        let err = svc.download_url(&other.id, &report.id, None).await.unwrap_err();
        assert_eq!(err.code(), "ENOTFOUND");
    }
}
