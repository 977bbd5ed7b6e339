//! Inspections and their status workflow.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::{patch, trimmed};
use crate::error::{AppError, AppResult, FieldError};
use crate::models::{
    page_offset, ImageAnalysisStatus, Inspection, InspectionStatus, InspectionUpdate, Job,
    JobType, NewInspection, Page, StatusCounts, User, PAGE_SIZE,
};
use crate::repository::models::InspectionChanges;
use crate::repository::{now, DbContext, InspectionFilter};
use crate::storage::Storage;
use crate::utils::clean;
use crate::work_queue::enqueue_analysis;

/// Snapshot polled while analysis runs.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisProgress {
    pub status: InspectionStatus,
    pub images_pending: i64,
    pub images_analyzing: i64,
    pub images_completed: i64,
    pub images_failed: i64,
    pub violations: StatusCounts,
    pub job: Option<Job>,
}

impl AnalysisProgress {
    pub fn is_running(&self) -> bool {
        self.status == InspectionStatus::Analyzing
    }

    pub fn images_total(&self) -> i64 {
        self.images_pending + self.images_analyzing + self.images_completed + self.images_failed
    }

    /// Percent of photos finished, for the progress bar.
    pub fn percent(&self) -> i64 {
        let total = self.images_total();
        if total == 0 {
            return 0;
        }
        (self.images_completed + self.images_failed) * 100 / total
    }
}

#[derive(Clone)]
pub struct InspectionService {
    ctx: DbContext,
    storage: Arc<dyn Storage>,
    enforce_subscription: bool,
    job_max_attempts: i32,
}

impl InspectionService {
    pub fn new(
        ctx: DbContext,
        storage: Arc<dyn Storage>,
        enforce_subscription: bool,
        job_max_attempts: i32,
    ) -> Self {
        Self {
            ctx,
            storage,
            enforce_subscription,
            job_max_attempts,
        }
    }

    async fn check_refs(
        &self,
        user_id: &str,
        client_id: Option<&str>,
        site_id: Option<&str>,
    ) -> AppResult<()> {
        let mut errors = Vec::new();
        if let Some(id) = client_id {
            if self.ctx.clients().get(id, user_id).await?.is_none() {
                errors.push(FieldError::new("client_id", "Choose one of your clients"));
            }
        }
        if let Some(id) = site_id {
            if self.ctx.sites().get(id, user_id).await?.is_none() {
                errors.push(FieldError::new("site_id", "Choose one of your sites"));
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::validation(errors))
        }
    }

    pub async fn create(&self, user_id: &str, input: NewInspection) -> AppResult<Inspection> {
        let (inspection_date, temperature_f) = input.validate()?;
        let client_id = clean(input.client_id);
        let site_id = clean(input.site_id);
        self.check_refs(user_id, client_id.as_deref(), site_id.as_deref())
            .await?;

        let stamp = Utc::now();
        let inspection = Inspection {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            client_id,
            site_id,
            title: trimmed(&input.title),
            address_line1: clean(input.address_line1),
            address_line2: clean(input.address_line2),
            city: clean(input.city),
            state: clean(input.state),
            postal_code: clean(input.postal_code),
            inspection_date,
            weather_conditions: clean(input.weather_conditions),
            temperature_f,
            inspector_notes: clean(input.inspector_notes),
            status: InspectionStatus::Draft,
            created_at: stamp,
            updated_at: stamp,
        };
        self.ctx.inspections().create(&inspection).await?;
        info!(inspection_id = %inspection.id, user_id, "inspection created");
        Ok(inspection)
    }

    pub async fn get(&self, user_id: &str, id: &str) -> AppResult<Inspection> {
        self.ctx
            .inspections()
            .get(id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Inspection"))
    }

    pub async fn list(
        &self,
        user_id: &str,
        filter: &InspectionFilter,
        page: Option<i64>,
    ) -> AppResult<Page<Inspection>> {
        let (page, offset) = page_offset(page);
        let repo = self.ctx.inspections();
        let items = repo.list(user_id, filter, PAGE_SIZE, offset).await?;
        let total = repo.count(user_id, filter).await?;
        Ok(Page { items, page, total })
    }

    pub async fn status_counts(
        &self,
        user_id: &str,
    ) -> AppResult<std::collections::HashMap<InspectionStatus, i64>> {
        Ok(self.ctx.inspections().status_counts(user_id).await?)
    }

    pub async fn update(
        &self,
        user_id: &str,
        id: &str,
        input: InspectionUpdate,
    ) -> AppResult<Inspection> {
        let (inspection_date, temperature_f) = input.validate()?;
        let client_id = patch(input.client_id);
        if let Some(Some(ref cid)) = client_id {
            self.check_refs(user_id, Some(cid), None).await?;
        }
        let changes = InspectionChanges {
            title: input.title.as_deref().map(trimmed),
            client_id,
            address_line1: patch(input.address_line1),
            address_line2: patch(input.address_line2),
            city: patch(input.city),
            state: patch(input.state),
            postal_code: patch(input.postal_code),
            inspection_date: inspection_date.map(|d| d.format("%Y-%m-%d").to_string()),
            weather_conditions: patch(input.weather_conditions),
            temperature_f,
            inspector_notes: patch(input.inspector_notes),
            updated_at: now(),
        };
        Ok(self.ctx.inspections().update(id, user_id, &changes).await?)
    }

    /// User-driven status change (review <-> completed).
    pub async fn update_status(&self, user_id: &str, id: &str, status: &str) -> AppResult<Inspection> {
        let next = InspectionStatus::from_str(status.trim()).ok_or_else(|| {
            AppError::validation(vec![FieldError::new("status", "Unknown status")])
        })?;
        let current = self.get(user_id, id).await?;
        if !current.status.can_transition_to(next) {
            return Err(AppError::invalid(format!(
                "Cannot change status from {} to {}",
                current.status.label(),
                next.label()
            )));
        }
        if current.status != next {
            let moved = self
                .ctx
                .inspections()
                .set_status_if(id, user_id, &[current.status], next)
                .await?;
            if !moved {
                return Err(AppError::Conflict(
                    "The inspection changed in the meantime; reload and try again".to_string(),
                ));
            }
        }
        self.get(user_id, id).await
    }

    /// Delete an inspection, its stored photos and report files.
    pub async fn delete(&self, user_id: &str, id: &str) -> AppResult<()> {
        let inspection = self.get(user_id, id).await?;
        if inspection.status == InspectionStatus::Analyzing {
            return Err(AppError::Conflict(
                "Wait for analysis to finish before deleting this inspection".to_string(),
            ));
        }

        let mut keys = Vec::new();
        for image in self.ctx.images().list_for_inspection(id, user_id).await? {
            keys.push(image.original_key);
            keys.extend(image.thumbnail_key);
        }
        for report in self.ctx.reports().list_for_inspection(id, user_id).await? {
            keys.extend(report.pdf_key);
            keys.extend(report.docx_key);
        }
        for key in &keys {
            if let Err(e) = self.storage.delete(key).await {
                warn!(key = %key, "failed to delete stored object: {}", e);
            }
        }

        self.ctx.inspections().delete(id, user_id).await?;
        info!(inspection_id = id, user_id, objects = keys.len(), "inspection deleted");
        Ok(())
    }

    /// Queue AI analysis of the inspection's pending photos.
    pub async fn start_analysis(&self, user: &User, id: &str) -> AppResult<Job> {
        let inspection = self.get(&user.id, id).await?;
        if !inspection.status.can_start_analysis() {
            return Err(AppError::invalid(format!(
                "Analysis cannot start while the inspection is {}",
                inspection.status.label().to_lowercase()
            )));
        }
        if self.ctx.images().count_pending(id).await? == 0 {
            return Err(AppError::invalid(
                "Upload at least one new photo before starting analysis",
            ));
        }
        let jobs = self.ctx.jobs();
        if jobs.has_pending(JobType::AnalyzeInspection, id).await? {
            return Err(AppError::Conflict(
                "Analysis is already running for this inspection".to_string(),
            ));
        }
        if self.enforce_subscription && !user.has_active_subscription() {
            return Err(AppError::PaymentRequired(
                "An active subscription is required for AI analysis".to_string(),
            ));
        }

        let previous = inspection.status;
        let moved = self
            .ctx
            .inspections()
            .set_status_if(id, &user.id, &[previous], InspectionStatus::Analyzing)
            .await?;
        if !moved {
            return Err(AppError::Conflict(
                "Analysis is already running for this inspection".to_string(),
            ));
        }

        match enqueue_analysis(&jobs, id, &user.id, self.job_max_attempts).await {
            Ok(job) => {
                info!(inspection_id = id, job_id = %job.id, "analysis queued");
                Ok(job)
            }
            Err(e) => {
                self.ctx
                    .inspections()
                    .set_status_if(id, &user.id, &[InspectionStatus::Analyzing], previous)
                    .await?;
                Err(match AppError::from(e) {
                    AppError::Conflict(_) => AppError::Conflict(
                        "Analysis is already running for this inspection".to_string(),
                    ),
                    other => other,
                })
            }
        }
    }

    pub async fn analysis_status(&self, user_id: &str, id: &str) -> AppResult<AnalysisProgress> {
        let inspection = self.get(user_id, id).await?;
        let images = self.ctx.images();
        Ok(AnalysisProgress {
            status: inspection.status,
            images_pending: images.count_with_status(id, ImageAnalysisStatus::Pending).await?,
            images_analyzing: images.count_with_status(id, ImageAnalysisStatus::Analyzing).await?,
            images_completed: images.count_with_status(id, ImageAnalysisStatus::Completed).await?,
            images_failed: images.count_with_status(id, ImageAnalysisStatus::Failed).await?,
            violations: self.ctx.violations().status_counts(id, user_id).await?,
            job: self
                .ctx
                .jobs()
                .latest_for_inspection(JobType::AnalyzeInspection, id)
                .await?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{setup, setup_with, TestEnv};
    use super::*;
    use crate::models::{Image, SubscriptionStatus};
    use crate::repository::test_support::create_user;

    fn new_inspection(title: &str) -> NewInspection {
        NewInspection {
            title: title.into(),
            inspection_date: "2024-05-01".into(),
            temperature_f: Some("72".into()),
            ..Default::default()
        }
    }

    async fn add_pending_image(env: &TestEnv, insp: &Inspection) {
        let stamp = Utc::now();
        env.ctx
            .images()
            .create(&Image {
                id: uuid::Uuid::new_v4().to_string(),
                user_id: insp.user_id.clone(),
                inspection_id: insp.id.clone(),
                original_key: format!("users/{}/x.jpg", insp.user_id),
                thumbnail_key: None,
                filename: "x.jpg".into(),
                content_type: "image/jpeg".into(),
                size_bytes: 1,
                analysis_status: ImageAnalysisStatus::Pending,
                created_at: stamp,
                updated_at: stamp,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_validates_and_checks_client_owner() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let err = env
            .services
            .inspections
            .create(
                &user.id,
                NewInspection {
                    title: "Bad date".into(),
                    inspection_date: "05/01/2024".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.fields()[0].field, "inspection_date");

        let mut input = new_inspection("Foreign client");
        input.client_id = Some("someone-elses".into());
        let err = env.services.inspections.create(&user.id, input).await.unwrap_err();
        assert_eq!(err.fields()[0].field, "client_id");

        let created = env
            .services
            .inspections
            .create(&user.id, new_inspection("Level 2 pour"))
            .await
            .unwrap();
        assert_eq!(created.status, InspectionStatus::Draft);
        assert_eq!(created.temperature_f, Some(72));
    }

    #[tokio::test]
    async fn test_start_analysis_requires_pending_photos() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let insp = env
            .services
            .inspections
            .create(&user.id, new_inspection("No photos"))
            .await
            .unwrap();
        let err = env.services.inspections.start_analysis(&user, &insp.id).await.unwrap_err();
        assert_eq!(err.code(), "EINVALID");
    }

    #[tokio::test]
    async fn test_start_analysis_conflicts_while_job_in_flight() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let insp = env
            .services
            .inspections
            .create(&user.id, new_inspection("Roof"))
            .await
            .unwrap();
        add_pending_image(&env, &insp).await;

        let job = env.services.inspections.start_analysis(&user, &insp.id).await.unwrap();
        assert_eq!(job.kind(), Some(JobType::AnalyzeInspection));
        let insp_now = env.services.inspections.get(&user.id, &insp.id).await.unwrap();
        assert_eq!(insp_now.status, InspectionStatus::Analyzing);

        // Status no longer permits a start.
        let err = env.services.inspections.start_analysis(&user, &insp.id).await.unwrap_err();
        assert_eq!(err.code(), "EINVALID");

        // Even if the status were reset, the in-flight job blocks a second one.
        env.ctx
            .inspections()
            .set_status(&insp.id, &user.id, InspectionStatus::Review)
            .await
            .unwrap();
        let err = env.services.inspections.start_analysis(&user, &insp.id).await.unwrap_err();
        assert_eq!(err.code(), "ECONFLICT");
    }

    #[tokio::test]
    async fn test_start_analysis_enforces_subscription_when_configured() {
        let env = setup_with(|s| s.billing.enforce_subscription = true).await;
        let mut user = create_user(&env.ctx, "a@example.com").await;
        let insp = env
            .services
            .inspections
            .create(&user.id, new_inspection("Trench"))
            .await
            .unwrap();
        add_pending_image(&env, &insp).await;

        let err = env.services.inspections.start_analysis(&user, &insp.id).await.unwrap_err();
        assert_eq!(err.code(), "EPAYMENT");

        user.subscription_status = SubscriptionStatus::Active;
        assert!(env.services.inspections.start_analysis(&user, &insp.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let insp = env
            .services
            .inspections
            .create(&user.id, new_inspection("Crane"))
            .await
            .unwrap();

        let err = env
            .services
            .inspections
            .update_status(&user.id, &insp.id, "completed")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EINVALID");
        let err = env
            .services
            .inspections
            .update_status(&user.id, &insp.id, "archived")
            .await
            .unwrap_err();
        assert_eq!(err.fields()[0].field, "status");

        env.ctx
            .inspections()
            .set_status(&insp.id, &user.id, InspectionStatus::Review)
            .await
            .unwrap();
        let done = env
            .services
            .inspections
            .update_status(&user.id, &insp.id, "completed")
            .await
            .unwrap();
        assert_eq!(done.status, InspectionStatus::Completed);
        let err = env
            .services
            .inspections
            .update_status(&user.id, &insp.id, "draft")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EINVALID");
    }

    #[tokio::test]
    async fn test_update_keeps_unspecified_fields() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let insp = env
            .services
            .inspections
            .create(&user.id, new_inspection("Facade"))
            .await
            .unwrap();
        let updated = env
            .services
            .inspections
            .update(
                &user.id,
                &insp.id,
                InspectionUpdate {
                    weather_conditions: Some("Overcast".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Facade");
        assert_eq!(updated.temperature_f, Some(72));
        assert_eq!(updated.weather_conditions.as_deref(), Some("Overcast"));
    }

    #[tokio::test]
    async fn test_analysis_status_counts_images() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let insp = env
            .services
            .inspections
            .create(&user.id, new_inspection("Excavation"))
            .await
            .unwrap();
        add_pending_image(&env, &insp).await;
        let progress = env
            .services
            .inspections
            .analysis_status(&user.id, &insp.id)
            .await
            .unwrap();
        assert_eq!(progress.images_pending, 1);
        assert_eq!(progress.images_total(), 1);
        assert_eq!(progress.percent(), 0);
        assert!(progress.job.is_none());
        assert!(!progress.is_running());
    }
}
