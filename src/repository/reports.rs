//! Report repository.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::ReportRecord;
use super::pool::{DbError, DbPool};
use super::util::expect_rows;
use super::now;
use crate::models::{Report, ReportStatus};
use crate::schema::reports;

#[derive(Clone)]
pub struct ReportRepository {
    pool: DbPool,
}

impl ReportRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, report: &Report) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(reports::table)
            .values(ReportRecord::from(report))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str, user_id: &str) -> Result<Option<Report>, DbError> {
        let mut conn = self.pool.get().await?;
        reports::table
            .filter(reports::id.eq(id))
            .filter(reports::user_id.eq(user_id))
            .select(ReportRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(Report::from))
    }

    /// Newest first.
    pub async fn list_for_inspection(
        &self,
        inspection_id: &str,
        user_id: &str,
    ) -> Result<Vec<Report>, DbError> {
        let mut conn = self.pool.get().await?;
        reports::table
            .filter(reports::inspection_id.eq(inspection_id))
            .filter(reports::user_id.eq(user_id))
            .order(reports::created_at.desc())
            .select(ReportRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(Report::from).collect())
    }

    pub async fn list_for_user(&self, user_id: &str, limit: i64) -> Result<Vec<Report>, DbError> {
        let mut conn = self.pool.get().await?;
        reports::table
            .filter(reports::user_id.eq(user_id))
            .order(reports::created_at.desc())
            .limit(limit)
            .select(ReportRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(Report::from).collect())
    }

    pub async fn mark_generated(
        &self,
        id: &str,
        pdf_key: &str,
        docx_key: &str,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(reports::table.find(id))
            .set((
                reports::status.eq(ReportStatus::Ready.as_str()),
                reports::pdf_key.eq(pdf_key),
                reports::docx_key.eq(docx_key),
                reports::error.eq(None::<String>),
                reports::generated_at.eq(now()),
            ))
            .execute(&mut conn)
            .await?;
        expect_rows(affected)
    }

    pub async fn mark_failed(&self, id: &str, error: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(reports::table.find(id))
            .set((
                reports::status.eq(ReportStatus::Failed.as_str()),
                reports::error.eq(error),
            ))
            .execute(&mut conn)
            .await?;
        expect_rows(affected)
    }

    pub async fn delete(&self, id: &str, user_id: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::delete(
            reports::table
                .filter(reports::id.eq(id))
                .filter(reports::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await?;
        expect_rows(affected)
    }
}

#[cfg(test)]
mod tests {
    use super::super::inspections::tests::inspection;
    use super::super::test_support::{create_user, setup_test_db};
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_report_lifecycle() {
        let (ctx, _dir) = setup_test_db().await;
        let alice = create_user(&ctx, "alice@example.com").await;
        let bob = create_user(&ctx, "bob@example.com").await;
        let insp = inspection(&alice.id, "Deck");
        ctx.inspections().create(&insp).await.unwrap();

        let report = Report {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: alice.id.clone(),
            inspection_id: insp.id.clone(),
            violation_count: 2,
            status: ReportStatus::Pending,
            pdf_key: None,
            docx_key: None,
            error: None,
            generated_at: None,
            created_at: Utc::now(),
        };
        let repo = ctx.reports();
        repo.create(&report).await.unwrap();
        assert!(repo.get(&report.id, &bob.id).await.unwrap().is_none());

        repo.mark_generated(&report.id, "a.pdf", "a.docx").await.unwrap();
        let ready = repo.get(&report.id, &alice.id).await.unwrap().unwrap();
        assert_eq!(ready.status, ReportStatus::Ready);
        assert_eq!(ready.pdf_key.as_deref(), Some("a.pdf"));
        assert!(ready.generated_at.is_some());

        assert_eq!(
            repo.list_for_inspection(&insp.id, &alice.id).await.unwrap().len(),
            1
        );
        assert!(repo
            .list_for_inspection(&insp.id, &bob.id)
            .await
            .unwrap()
            .is_empty());
    }
}
