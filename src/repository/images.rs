//! Image repository.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::ImageRecord;
use super::pool::{DbError, DbPool};
use super::util::expect_rows;
use super::now;
use crate::models::{Image, ImageAnalysisStatus};
use crate::schema::images;

#[derive(Clone)]
pub struct ImageRepository {
    pool: DbPool,
}

impl ImageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, image: &Image) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(images::table)
            .values(ImageRecord::from(image))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str, user_id: &str) -> Result<Option<Image>, DbError> {
        let mut conn = self.pool.get().await?;
        images::table
            .filter(images::id.eq(id))
            .filter(images::user_id.eq(user_id))
            .select(ImageRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(Image::from))
    }

    /// Images of an inspection in upload order.
    pub async fn list_for_inspection(
        &self,
        inspection_id: &str,
        user_id: &str,
    ) -> Result<Vec<Image>, DbError> {
        let mut conn = self.pool.get().await?;
        images::table
            .filter(images::inspection_id.eq(inspection_id))
            .filter(images::user_id.eq(user_id))
            .order((images::created_at.asc(), images::id.asc()))
            .select(ImageRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(Image::from).collect())
    }

    pub async fn list_with_status(
        &self,
        inspection_id: &str,
        status: ImageAnalysisStatus,
    ) -> Result<Vec<Image>, DbError> {
        let mut conn = self.pool.get().await?;
        images::table
            .filter(images::inspection_id.eq(inspection_id))
            .filter(images::analysis_status.eq(status.as_str()))
            .order((images::created_at.asc(), images::id.asc()))
            .select(ImageRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(Image::from).collect())
    }

    pub async fn count_with_status(
        &self,
        inspection_id: &str,
        status: ImageAnalysisStatus,
    ) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;
        images::table
            .filter(images::inspection_id.eq(inspection_id))
            .filter(images::analysis_status.eq(status.as_str()))
            .count()
            .get_result(&mut conn)
            .await
    }

    pub async fn count_pending(&self, inspection_id: &str) -> Result<i64, DbError> {
        self.count_with_status(inspection_id, ImageAnalysisStatus::Pending)
            .await
    }

    pub async fn set_analysis_status(
        &self,
        id: &str,
        status: ImageAnalysisStatus,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(images::table.find(id))
            .set((
                images::analysis_status.eq(status.as_str()),
                images::updated_at.eq(now()),
            ))
            .execute(&mut conn)
            .await?;
        expect_rows(affected)
    }

    /// Move every image of an inspection in status `from` to `to`.
    pub async fn set_status_for_inspection(
        &self,
        inspection_id: &str,
        from: ImageAnalysisStatus,
        to: ImageAnalysisStatus,
    ) -> Result<usize, DbError> {
        let mut conn = self.pool.get().await?;
        diesel::update(
            images::table
                .filter(images::inspection_id.eq(inspection_id))
                .filter(images::analysis_status.eq(from.as_str())),
        )
        .set((
            images::analysis_status.eq(to.as_str()),
            images::updated_at.eq(now()),
        ))
        .execute(&mut conn)
        .await
    }

    pub async fn delete(&self, id: &str, user_id: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::delete(
            images::table
                .filter(images::id.eq(id))
                .filter(images::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await?;
        expect_rows(affected)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::inspections::tests::inspection;
    use super::super::test_support::{create_user, setup_test_db};
    use super::*;
    use chrono::Utc;

    pub(crate) fn image(user_id: &str, inspection_id: &str) -> Image {
        let id = uuid::Uuid::new_v4().to_string();
        Image {
            original_key: format!("users/{}/inspections/{}/{}.jpg", user_id, inspection_id, id),
            thumbnail_key: None,
            id,
            user_id: user_id.to_string(),
            inspection_id: inspection_id.to_string(),
            filename: "photo.jpg".into(),
            content_type: "image/jpeg".into(),
            size_bytes: 1024,
            analysis_status: ImageAnalysisStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_pending_counts_and_bulk_status() {
        let (ctx, _dir) = setup_test_db().await;
        let user = create_user(&ctx, "a@example.com").await;
        let insp = inspection(&user.id, "Deck");
        ctx.inspections().create(&insp).await.unwrap();
        let repo = ctx.images();

        let first = image(&user.id, &insp.id);
        repo.create(&first).await.unwrap();
        repo.create(&image(&user.id, &insp.id)).await.unwrap();
        assert_eq!(repo.count_pending(&insp.id).await.unwrap(), 2);

        repo.set_analysis_status(&first.id, ImageAnalysisStatus::Completed)
            .await
            .unwrap();
        assert_eq!(repo.count_pending(&insp.id).await.unwrap(), 1);

        let moved = repo
            .set_status_for_inspection(
                &insp.id,
                ImageAnalysisStatus::Pending,
                ImageAnalysisStatus::Analyzing,
            )
            .await
            .unwrap();
        assert_eq!(moved, 1);
        assert_eq!(
            repo.list_with_status(&insp.id, ImageAnalysisStatus::Analyzing)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_images_are_scoped() {
        let (ctx, _dir) = setup_test_db().await;
        let alice = create_user(&ctx, "alice@example.com").await;
        let bob = create_user(&ctx, "bob@example.com").await;
        let insp = inspection(&alice.id, "Deck");
        ctx.inspections().create(&insp).await.unwrap();
        let img = image(&alice.id, &insp.id);
        ctx.images().create(&img).await.unwrap();

        assert!(ctx.images().get(&img.id, &bob.id).await.unwrap().is_none());
        assert!(ctx
            .images()
            .list_for_inspection(&insp.id, &bob.id)
            .await
            .unwrap()
            .is_empty());
        assert!(ctx.images().delete(&img.id, &bob.id).await.is_err());
    }
}
