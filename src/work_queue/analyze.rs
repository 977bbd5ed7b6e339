//! `analyze_inspection`: run pending photos through the vision provider.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use super::{decode_payload, AnalyzeInspectionPayload, JobError, JobHandler};
use crate::models::{
    Confidence, Image, ImageAnalysisStatus, Inspection, InspectionStatus, JobType, Violation,
    ViolationRegulation, ViolationStatus,
};
use crate::repository::DbContext;
use crate::storage::Storage;
use crate::vision::{Finding, VisionProvider};

pub struct AnalyzeInspectionHandler {
    ctx: DbContext,
    storage: Arc<dyn Storage>,
    vision: Arc<dyn VisionProvider>,
}

impl AnalyzeInspectionHandler {
    pub fn new(ctx: DbContext, storage: Arc<dyn Storage>, vision: Arc<dyn VisionProvider>) -> Self {
        Self {
            ctx,
            storage,
            vision,
        }
    }

    async fn load(&self, payload: &AnalyzeInspectionPayload) -> Result<Inspection, JobError> {
        self.ctx
            .inspections()
            .get(&payload.inspection_id, &payload.user_id)
            .await?
            .ok_or_else(|| JobError::permanent(format!("inspection {} not found", payload.inspection_id)))
    }

    /// Review if any photo has been analyzed, otherwise back to draft.
    async fn finish(&self, inspection: &Inspection) -> Result<InspectionStatus, JobError> {
        let completed = self
            .ctx
            .images()
            .count_with_status(&inspection.id, ImageAnalysisStatus::Completed)
            .await?;
        let target = if completed > 0 {
            InspectionStatus::Review
        } else {
            InspectionStatus::Draft
        };
        let moved = self
            .ctx
            .inspections()
            .set_status_if(&inspection.id, &inspection.user_id, &[InspectionStatus::Analyzing], target)
            .await?;
        if !moved {
            warn!(inspection_id = %inspection.id, "inspection left analyzing state during analysis");
        }
        Ok(target)
    }

    async fn analyze_image(&self, inspection: &Inspection, image: &Image) -> Result<usize, JobError> {
        let (bytes, _) = self.storage.get(&image.original_key).await?;
        let findings = self
            .vision
            .analyze(&bytes, &image.content_type)
            .await
            .map_err(|e| {
                if e.is_transient() {
                    JobError::transient(e.to_string())
                } else {
                    JobError::permanent(e.to_string())
                }
            })?;

        let count = findings.len();
        for finding in findings {
            self.record_finding(inspection, image, finding).await?;
        }
        Ok(count)
    }

    async fn record_finding(
        &self,
        inspection: &Inspection,
        image: &Image,
        finding: Finding,
    ) -> Result<(), JobError> {
        let stamp = Utc::now();
        let violation = Violation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: inspection.user_id.clone(),
            inspection_id: inspection.id.clone(),
            image_id: Some(image.id.clone()),
            description: finding.description.clone(),
            ai_description: Some(finding.description.clone()),
            severity: finding.severity,
            confidence: Some(finding.confidence),
            inspector_notes: None,
            status: ViolationStatus::Pending,
            created_at: stamp,
            updated_at: stamp,
        };
        self.ctx.violations().create(&violation).await?;

        let mut primary = true;
        for number in &finding.standard_numbers {
            let Some(regulation) = self.find_regulation(number).await? else {
                debug!(standard = %number, "no regulation for suggested standard");
                continue;
            };
            let linked = self
                .ctx
                .violations()
                .link_regulation(&ViolationRegulation {
                    violation_id: violation.id.clone(),
                    regulation_id: regulation,
                    relevance_score: relevance(finding.confidence),
                    ai_explanation: finding.explanation.clone(),
                    is_primary: primary,
                    created_at: stamp,
                })
                .await?;
            primary &= !linked;
        }
        Ok(())
    }

    /// Exact standard number, falling back to the section without its
    /// paragraph designators (`1926.501(b)(13)` -> `1926.501`).
    async fn find_regulation(&self, number: &str) -> Result<Option<String>, JobError> {
        let repo = self.ctx.regulations();
        if let Some(reg) = repo.get_by_standard_number(number).await? {
            return Ok(Some(reg.id));
        }
        match number.split_once('(') {
            Some((section, _)) => Ok(repo
                .get_by_standard_number(section.trim())
                .await?
                .map(|r| r.id)),
            None => Ok(None),
        }
    }
}

fn relevance(confidence: Confidence) -> f64 {
    match confidence {
        Confidence::High => 0.9,
        Confidence::Medium => 0.7,
        Confidence::Low => 0.5,
    }
}

#[async_trait]
impl JobHandler for AnalyzeInspectionHandler {
    fn job_type(&self) -> JobType {
        JobType::AnalyzeInspection
    }

    async fn handle(&self, payload: &str) -> Result<(), JobError> {
        let payload: AnalyzeInspectionPayload = decode_payload(payload)?;
        let inspection = self.load(&payload).await?;
        if inspection.status != InspectionStatus::Analyzing {
            return Err(JobError::permanent(format!(
                "inspection {} is {}, not analyzing",
                inspection.id, inspection.status
            )));
        }

        let images = self.ctx.images();
        images
            .set_status_for_inspection(
                &inspection.id,
                ImageAnalysisStatus::Pending,
                ImageAnalysisStatus::Analyzing,
            )
            .await?;
        // Includes photos left analyzing by an earlier attempt.
        let batch = images
            .list_with_status(&inspection.id, ImageAnalysisStatus::Analyzing)
            .await?;
        info!(
            inspection_id = %inspection.id,
            images = batch.len(),
            provider = self.vision.name(),
            "analyzing inspection"
        );

        let mut findings = 0;
        let mut failed = 0;
        for image in &batch {
            match self.analyze_image(&inspection, image).await {
                Ok(n) => {
                    findings += n;
                    images
                        .set_analysis_status(&image.id, ImageAnalysisStatus::Completed)
                        .await?;
                }
                // Leave the photo analyzing so the retry picks it up.
                Err(JobError::Transient(msg)) => return Err(JobError::Transient(msg)),
                Err(JobError::Permanent(msg)) => {
                    warn!(image_id = %image.id, "image analysis failed: {}", msg);
                    failed += 1;
                    images
                        .set_analysis_status(&image.id, ImageAnalysisStatus::Failed)
                        .await?;
                }
            }
        }

        let status = self.finish(&inspection).await?;
        info!(
            inspection_id = %inspection.id,
            findings,
            failed,
            status = %status,
            "analysis finished"
        );
        Ok(())
    }

    async fn on_failed(&self, payload: &str, error: &str) {
        let Ok(payload) = decode_payload::<AnalyzeInspectionPayload>(payload) else {
            return;
        };
        let Ok(inspection) = self.load(&payload).await else {
            return;
        };
        if let Err(e) = self
            .ctx
            .images()
            .set_status_for_inspection(
                &inspection.id,
                ImageAnalysisStatus::Analyzing,
                ImageAnalysisStatus::Failed,
            )
            .await
        {
            warn!(inspection_id = %inspection.id, "could not mark images failed: {}", e);
        }
        if inspection.status == InspectionStatus::Analyzing {
            if let Err(e) = self.finish(&inspection).await {
                warn!(inspection_id = %inspection.id, "could not reset inspection: {}", e);
            }
        }
        warn!(inspection_id = %inspection.id, "analysis abandoned: {}", error);
    }
}
