//! `generate_report`: render PDF and DOCX for a report request.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use super::{decode_payload, GenerateReportPayload, JobError, JobHandler};
use crate::models::{JobType, ReportFormat, ViolationStatus};
use crate::render::{self, ReportData};
use crate::repository::DbContext;
use crate::storage::{report_key, Storage};

pub struct GenerateReportHandler {
    ctx: DbContext,
    storage: Arc<dyn Storage>,
}

impl GenerateReportHandler {
    pub fn new(ctx: DbContext, storage: Arc<dyn Storage>) -> Self {
        Self { ctx, storage }
    }

    async fn assemble(&self, payload: &GenerateReportPayload) -> Result<(String, ReportData), JobError> {
        let report = self
            .ctx
            .reports()
            .get(&payload.report_id, &payload.user_id)
            .await?
            .ok_or_else(|| JobError::permanent(format!("report {} not found", payload.report_id)))?;
        let inspection = self
            .ctx
            .inspections()
            .get(&report.inspection_id, &payload.user_id)
            .await?
            .ok_or_else(|| {
                JobError::permanent(format!("inspection {} not found", report.inspection_id))
            })?;
        let inspector = self
            .ctx
            .users()
            .get(&payload.user_id)
            .await?
            .ok_or_else(|| JobError::permanent(format!("user {} not found", payload.user_id)))?;
        let client = match inspection.client_id {
            Some(ref id) => self.ctx.clients().get(id, &payload.user_id).await?,
            None => None,
        };

        let violations = self
            .ctx
            .violations()
            .list_with_status(&inspection.id, &payload.user_id, ViolationStatus::Confirmed)
            .await?;
        let links = self
            .ctx
            .violations()
            .linked_regulations_for_inspection(&inspection.id, &payload.user_id)
            .await?;

        let data = ReportData::assemble(
            &inspection,
            client.as_ref(),
            &inspector,
            violations,
            &links,
            Utc::now(),
        );
        Ok((inspection.id, data))
    }
}

#[async_trait]
impl JobHandler for GenerateReportHandler {
    fn job_type(&self) -> JobType {
        JobType::GenerateReport
    }

    async fn handle(&self, payload: &str) -> Result<(), JobError> {
        let payload: GenerateReportPayload = decode_payload(payload)?;
        let (inspection_id, data) = self.assemble(&payload).await?;

        let (pdf, docx) = tokio::task::spawn_blocking(move || {
            Ok::<_, render::RenderError>((render::pdf::render(&data)?, render::docx::render(&data)?))
        })
        .await
        .map_err(|e| JobError::transient(format!("render task failed: {}", e)))?
        .map_err(|e| JobError::permanent(e.to_string()))?;

        let pdf_key = report_key(&payload.user_id, &inspection_id, &payload.report_id, ReportFormat::Pdf.extension());
        let docx_key = report_key(&payload.user_id, &inspection_id, &payload.report_id, ReportFormat::Docx.extension());
        self.storage
            .put(&pdf_key, &pdf, ReportFormat::Pdf.content_type())
            .await?;
        self.storage
            .put(&docx_key, &docx, ReportFormat::Docx.content_type())
            .await?;

        self.ctx
            .reports()
            .mark_generated(&payload.report_id, &pdf_key, &docx_key)
            .await?;
        info!(
            report_id = %payload.report_id,
            pdf_bytes = pdf.len(),
            docx_bytes = docx.len(),
            "report generated"
        );
        Ok(())
    }

    async fn on_failed(&self, payload: &str, error: &str) {
        let Ok(payload) = decode_payload::<GenerateReportPayload>(payload) else {
            return;
        };
        if let Err(e) = self.ctx.reports().mark_failed(&payload.report_id, error).await {
            warn!(report_id = %payload.report_id, "could not mark report failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InspectionStatus, Report, ReportStatus};
    use crate::repository::inspections::tests::inspection;
    use crate::repository::test_support::{create_user, setup_test_db};
    use crate::repository::violations::tests::violation;
    use crate::storage::LocalStorage;

    #[tokio::test]
    async fn test_generates_both_formats() {
        let (ctx, dir) = setup_test_db().await;
        let storage = Arc::new(LocalStorage::new(dir.path().join("storage"), "k"));
        let user = create_user(&ctx, "a@example.com").await;
        let mut insp = inspection(&user.id, "Warehouse retrofit");
        insp.status = InspectionStatus::Review;
        ctx.inspections().create(&insp).await.unwrap();
        let v = violation(&user.id, &insp.id, "Unguarded floor opening");
        ctx.violations().create(&v).await.unwrap();
        ctx.violations()
            .set_status(&v.id, &user.id, ViolationStatus::Confirmed)
            .await
            .unwrap();

        let report = Report {
            id: "rep-1".into(),
            user_id: user.id.clone(),
            inspection_id: insp.id.clone(),
            violation_count: 1,
            status: ReportStatus::Pending,
            pdf_key: None,
            docx_key: None,
            error: None,
            generated_at: None,
            created_at: Utc::now(),
        };
        ctx.reports().create(&report).await.unwrap();

        let handler = GenerateReportHandler::new(ctx.clone(), storage.clone());
        let payload = serde_json::to_string(&GenerateReportPayload {
            report_id: report.id.clone(),
            user_id: user.id.clone(),
        })
        .unwrap();
        handler.handle(&payload).await.unwrap();

        let report = ctx.reports().get("rep-1", &user.id).await.unwrap().unwrap();
        assert_eq!(report.status, ReportStatus::Ready);
        let (pdf, info) = storage.get(report.pdf_key.as_deref().unwrap()).await.unwrap();
        assert!(pdf.starts_with(b"%PDF-"));
        assert_eq!(info.content_type, "application/pdf");
        assert!(storage.get(report.docx_key.as_deref().unwrap()).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_report_is_permanent_and_marks_nothing() {
        let (ctx, dir) = setup_test_db().await;
        let storage = Arc::new(LocalStorage::new(dir.path().join("storage"), "k"));
        let handler = GenerateReportHandler::new(ctx, storage);
        let err = handler
            .handle(r#"{"report_id":"missing","user_id":"u"}"#)
            .await
            .unwrap_err();
        assert!(err.is_permanent());
    }
}
