//! Site repository.

use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use diesel_async::RunQueryDsl;

use super::models::{SiteChanges, SiteRecord};
use super::pool::{DbError, DbPool};
use super::util::{expect_rows, like_pattern};
use crate::models::Site;
use crate::schema::{inspections, sites};

#[derive(Clone)]
pub struct SiteRepository {
    pool: DbPool,
}

impl SiteRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn filtered<'a>(user_id: &'a str, q: Option<&'a str>) -> sites::BoxedQuery<'a, Sqlite> {
        let mut query = sites::table.filter(sites::user_id.eq(user_id)).into_boxed();
        if let Some(q) = q.map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = like_pattern(q);
            query = query.filter(
                sites::name
                    .like(pattern.clone())
                    .escape('\\')
                    .or(sites::city.like(pattern.clone()).escape('\\'))
                    .or(sites::address_line1.like(pattern).escape('\\')),
            );
        }
        query
    }

    pub async fn create(&self, site: &Site) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(sites::table)
            .values(SiteRecord::from(site))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str, user_id: &str) -> Result<Option<Site>, DbError> {
        let mut conn = self.pool.get().await?;
        sites::table
            .filter(sites::id.eq(id))
            .filter(sites::user_id.eq(user_id))
            .select(SiteRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(Site::from))
    }

    pub async fn list(
        &self,
        user_id: &str,
        q: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Site>, DbError> {
        let mut conn = self.pool.get().await?;
        Self::filtered(user_id, q)
            .order((sites::name.asc(), sites::id.asc()))
            .limit(limit)
            .offset(offset)
            .select(SiteRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(Site::from).collect())
    }

    pub async fn count(&self, user_id: &str, q: Option<&str>) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;
        Self::filtered(user_id, q)
            .count()
            .get_result(&mut conn)
            .await
    }

    pub async fn update(
        &self,
        id: &str,
        user_id: &str,
        changes: &SiteChanges,
    ) -> Result<Site, DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(
            sites::table
                .filter(sites::id.eq(id))
                .filter(sites::user_id.eq(user_id)),
        )
        .set(changes)
        .execute(&mut conn)
        .await?;
        expect_rows(affected)?;

        sites::table
            .find(id)
            .select(SiteRecord::as_select())
            .first(&mut conn)
            .await
            .map(Site::from)
    }

    pub async fn delete(&self, id: &str, user_id: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::delete(
            sites::table
                .filter(sites::id.eq(id))
                .filter(sites::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await?;
        expect_rows(affected)
    }

    pub async fn inspection_count(&self, id: &str) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;
        inspections::table
            .filter(inspections::site_id.eq(id))
            .count()
            .get_result(&mut conn)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{create_user, setup_test_db};
    use super::*;
    use chrono::Utc;

    fn site(user_id: &str, name: &str) -> Site {
        Site {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            client_id: None,
            name: name.to_string(),
            address_line1: Some("12 Quarry Rd".into()),
            address_line2: None,
            city: Some("Shelbyville".into()),
            state: None,
            postal_code: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_site_crud_is_scoped() {
        let (ctx, _dir) = setup_test_db().await;
        let alice = create_user(&ctx, "alice@example.com").await;
        let bob = create_user(&ctx, "bob@example.com").await;
        let repo = ctx.sites();

        let s = site(&alice.id, "North Tower");
        repo.create(&s).await.unwrap();
        assert_eq!(repo.count(&alice.id, Some("quarry")).await.unwrap(), 1);
        assert_eq!(repo.count(&bob.id, None).await.unwrap(), 0);
        assert!(repo.get(&s.id, &bob.id).await.unwrap().is_none());

        let changes = SiteChanges {
            city: Some(None),
            updated_at: super::super::now(),
            ..Default::default()
        };
        let updated = repo.update(&s.id, &alice.id, &changes).await.unwrap();
        assert_eq!(updated.city, None);
        assert_eq!(updated.address_line1, s.address_line1);

        assert!(repo.delete(&s.id, &bob.id).await.is_err());
        repo.delete(&s.id, &alice.id).await.unwrap();
        assert!(repo.get(&s.id, &alice.id).await.unwrap().is_none());
    }
}
