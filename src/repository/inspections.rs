//! Inspection repository.

use std::collections::HashMap;

use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use diesel_async::RunQueryDsl;

use super::models::{InspectionChanges, InspectionRecord};
use super::pool::{DbError, DbPool};
use super::util::{expect_rows, like_pattern};
use super::now;
use crate::models::{Inspection, InspectionStatus};
use crate::schema::inspections;

/// Listing filters for inspections.
#[derive(Debug, Clone, Default)]
pub struct InspectionFilter {
    pub q: Option<String>,
    pub status: Option<InspectionStatus>,
    pub client_id: Option<String>,
}

#[derive(Clone)]
pub struct InspectionRepository {
    pool: DbPool,
}

impl InspectionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn filtered<'a>(
        user_id: &'a str,
        filter: &'a InspectionFilter,
    ) -> inspections::BoxedQuery<'a, Sqlite> {
        let mut query = inspections::table
            .filter(inspections::user_id.eq(user_id))
            .into_boxed();
        if let Some(q) = filter.q.as_deref().map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = like_pattern(q);
            query = query.filter(
                inspections::title
                    .like(pattern.clone())
                    .escape('\\')
                    .or(inspections::address_line1.like(pattern.clone()).escape('\\'))
                    .or(inspections::city.like(pattern).escape('\\')),
            );
        }
        if let Some(status) = filter.status {
            query = query.filter(inspections::status.eq(status.as_str()));
        }
        if let Some(ref client_id) = filter.client_id {
            query = query.filter(inspections::client_id.eq(client_id));
        }
        query
    }

    pub async fn create(&self, inspection: &Inspection) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(inspections::table)
            .values(InspectionRecord::from(inspection))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str, user_id: &str) -> Result<Option<Inspection>, DbError> {
        let mut conn = self.pool.get().await?;
        inspections::table
            .filter(inspections::id.eq(id))
            .filter(inspections::user_id.eq(user_id))
            .select(InspectionRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(Inspection::from))
    }

    /// Newest inspection date first.
    pub async fn list(
        &self,
        user_id: &str,
        filter: &InspectionFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Inspection>, DbError> {
        let mut conn = self.pool.get().await?;
        Self::filtered(user_id, filter)
            .order((
                inspections::inspection_date.desc(),
                inspections::created_at.desc(),
            ))
            .limit(limit)
            .offset(offset)
            .select(InspectionRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(Inspection::from).collect())
    }

    pub async fn count(&self, user_id: &str, filter: &InspectionFilter) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;
        Self::filtered(user_id, filter)
            .count()
            .get_result(&mut conn)
            .await
    }

    pub async fn update(
        &self,
        id: &str,
        user_id: &str,
        changes: &InspectionChanges,
    ) -> Result<Inspection, DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(
            inspections::table
                .filter(inspections::id.eq(id))
                .filter(inspections::user_id.eq(user_id)),
        )
        .set(changes)
        .execute(&mut conn)
        .await?;
        expect_rows(affected)?;

        inspections::table
            .find(id)
            .select(InspectionRecord::as_select())
            .first(&mut conn)
            .await
            .map(Inspection::from)
    }

    pub async fn set_status(
        &self,
        id: &str,
        user_id: &str,
        status: InspectionStatus,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(
            inspections::table
                .filter(inspections::id.eq(id))
                .filter(inspections::user_id.eq(user_id)),
        )
        .set((
            inspections::status.eq(status.as_str()),
            inspections::updated_at.eq(now()),
        ))
        .execute(&mut conn)
        .await?;
        expect_rows(affected)
    }

    /// Compare-and-set: move to `next` only while the current status is one
    /// of `from`. Returns whether the row changed.
    pub async fn set_status_if(
        &self,
        id: &str,
        user_id: &str,
        from: &[InspectionStatus],
        next: InspectionStatus,
    ) -> Result<bool, DbError> {
        let from: Vec<&str> = from.iter().map(|s| s.as_str()).collect();
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(
            inspections::table
                .filter(inspections::id.eq(id))
                .filter(inspections::user_id.eq(user_id))
                .filter(inspections::status.eq_any(from)),
        )
        .set((
            inspections::status.eq(next.as_str()),
            inspections::updated_at.eq(now()),
        ))
        .execute(&mut conn)
        .await?;
        Ok(affected > 0)
    }

    pub async fn delete(&self, id: &str, user_id: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::delete(
            inspections::table
                .filter(inspections::id.eq(id))
                .filter(inspections::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await?;
        expect_rows(affected)
    }

    /// Number of inspections per status for the dashboard.
    pub async fn status_counts(
        &self,
        user_id: &str,
    ) -> Result<HashMap<InspectionStatus, i64>, DbError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<(String, i64)> = inspections::table
            .filter(inspections::user_id.eq(user_id))
            .group_by(inspections::status)
            .select((inspections::status, diesel::dsl::count_star()))
            .load(&mut conn)
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(status, n)| InspectionStatus::from_str(&status).map(|s| (s, n)))
            .collect())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::test_support::{create_user, setup_test_db};
    use super::*;
    use chrono::{NaiveDate, Utc};

    pub(crate) fn inspection(user_id: &str, title: &str) -> Inspection {
        Inspection {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            client_id: None,
            site_id: None,
            title: title.to_string(),
            address_line1: Some("400 Elm St".into()),
            address_line2: None,
            city: Some("Springfield".into()),
            state: Some("IL".into()),
            postal_code: None,
            inspection_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            weather_conditions: Some("Clear".into()),
            temperature_f: Some(68),
            inspector_notes: None,
            status: InspectionStatus::Draft,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_round_trip_and_scoping() {
        let (ctx, _dir) = setup_test_db().await;
        let alice = create_user(&ctx, "alice@example.com").await;
        let bob = create_user(&ctx, "bob@example.com").await;
        let repo = ctx.inspections();

        let i = inspection(&alice.id, "Foundation pour");
        repo.create(&i).await.unwrap();

        let found = repo.get(&i.id, &alice.id).await.unwrap().unwrap();
        assert_eq!(found.inspection_date, i.inspection_date);
        assert_eq!(found.temperature_f, Some(68));
        assert!(repo.get(&i.id, &bob.id).await.unwrap().is_none());
        assert!(repo
            .set_status(&i.id, &bob.id, InspectionStatus::Completed)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_set_status_if_is_compare_and_set() {
        let (ctx, _dir) = setup_test_db().await;
        let user = create_user(&ctx, "a@example.com").await;
        let repo = ctx.inspections();
        let i = inspection(&user.id, "Roof");
        repo.create(&i).await.unwrap();

        let from = [InspectionStatus::Draft, InspectionStatus::Review];
        assert!(repo
            .set_status_if(&i.id, &user.id, &from, InspectionStatus::Analyzing)
            .await
            .unwrap());
        assert!(!repo
            .set_status_if(&i.id, &user.id, &from, InspectionStatus::Analyzing)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_filters_and_counts() {
        let (ctx, _dir) = setup_test_db().await;
        let user = create_user(&ctx, "a@example.com").await;
        let repo = ctx.inspections();
        repo.create(&inspection(&user.id, "Scaffold check")).await.unwrap();
        let mut done = inspection(&user.id, "Crane check");
        done.status = InspectionStatus::Completed;
        repo.create(&done).await.unwrap();

        let filter = InspectionFilter {
            status: Some(InspectionStatus::Completed),
            ..Default::default()
        };
        assert_eq!(repo.count(&user.id, &filter).await.unwrap(), 1);

        let filter = InspectionFilter {
            q: Some("check".into()),
            ..Default::default()
        };
        assert_eq!(repo.list(&user.id, &filter, 10, 0).await.unwrap().len(), 2);

        let counts = repo.status_counts(&user.id).await.unwrap();
        assert_eq!(counts.get(&InspectionStatus::Draft), Some(&1));
        assert_eq!(counts.get(&InspectionStatus::Completed), Some(&1));
    }
}
