//! Regulation repository with full-text search over `regulations_fts`.

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Text};
use diesel_async::RunQueryDsl;

use super::models::RegulationRecord;
use super::pool::{DbError, DbPool};
use super::util::fts_query;
use super::now;
use crate::models::{NewRegulation, Regulation};
use crate::schema::regulations;

#[derive(QueryableByName)]
struct CountRow {
    #[diesel(sql_type = BigInt)]
    count: i64,
}

const FTS_SEARCH: &str = "SELECT r.id, r.standard_number, r.title, r.category, r.full_text, r.created_at \
     FROM regulations r \
     JOIN (SELECT regulation_id, rank FROM regulations_fts WHERE regulations_fts MATCH ?) m \
       ON m.regulation_id = r.id \
     WHERE (? = '' OR r.category = ?) \
     ORDER BY m.rank, r.standard_number \
     LIMIT ? OFFSET ?";

const FTS_COUNT: &str = "SELECT COUNT(*) AS count \
     FROM regulations r \
     JOIN (SELECT regulation_id FROM regulations_fts WHERE regulations_fts MATCH ?) m \
       ON m.regulation_id = r.id \
     WHERE (? = '' OR r.category = ?)";

#[derive(Clone)]
pub struct RegulationRepository {
    pool: DbPool,
}

impl RegulationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Insert or update by standard number; the row ID is stable across
    /// re-imports so existing violation links survive.
    pub async fn upsert(&self, input: &NewRegulation) -> Result<Regulation, DbError> {
        let mut conn = self.pool.get().await?;
        let record = RegulationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            standard_number: input.standard_number.trim().to_string(),
            title: input.title.trim().to_string(),
            category: input.category.trim().to_string(),
            full_text: input.full_text.trim().to_string(),
            created_at: now(),
        };

        diesel::insert_into(regulations::table)
            .values(&record)
            .on_conflict(regulations::standard_number)
            .do_update()
            .set((
                regulations::title.eq(&record.title),
                regulations::category.eq(&record.category),
                regulations::full_text.eq(&record.full_text),
            ))
            .execute(&mut conn)
            .await?;

        regulations::table
            .filter(regulations::standard_number.eq(&record.standard_number))
            .select(RegulationRecord::as_select())
            .first(&mut conn)
            .await
            .map(Regulation::from)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Regulation>, DbError> {
        let mut conn = self.pool.get().await?;
        regulations::table
            .find(id)
            .select(RegulationRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(Regulation::from))
    }

    pub async fn get_by_standard_number(
        &self,
        standard_number: &str,
    ) -> Result<Option<Regulation>, DbError> {
        let mut conn = self.pool.get().await?;
        regulations::table
            .filter(regulations::standard_number.eq(standard_number.trim()))
            .select(RegulationRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(Regulation::from))
    }

    /// Search by free text and/or category, best matches first.
    pub async fn search(
        &self,
        q: Option<&str>,
        category: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Regulation>, DbError> {
        let mut conn = self.pool.get().await?;
        let category = category.map(str::trim).unwrap_or("");

        let records: Vec<RegulationRecord> = match q.and_then(fts_query) {
            Some(fts) => {
                diesel::sql_query(FTS_SEARCH)
                    .bind::<Text, _>(fts)
                    .bind::<Text, _>(category)
                    .bind::<Text, _>(category)
                    .bind::<BigInt, _>(limit)
                    .bind::<BigInt, _>(offset)
                    .load(&mut conn)
                    .await?
            }
            None => {
                let mut query = regulations::table.into_boxed();
                if !category.is_empty() {
                    query = query.filter(regulations::category.eq(category));
                }
                query
                    .order(regulations::standard_number.asc())
                    .limit(limit)
                    .offset(offset)
                    .select(RegulationRecord::as_select())
                    .load(&mut conn)
                    .await?
            }
        };

        Ok(records.into_iter().map(Regulation::from).collect())
    }

    pub async fn count_search(
        &self,
        q: Option<&str>,
        category: Option<&str>,
    ) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;
        let category = category.map(str::trim).unwrap_or("");

        match q.and_then(fts_query) {
            Some(fts) => {
                let row: CountRow = diesel::sql_query(FTS_COUNT)
                    .bind::<Text, _>(fts)
                    .bind::<Text, _>(category)
                    .bind::<Text, _>(category)
                    .get_result(&mut conn)
                    .await?;
                Ok(row.count)
            }
            None => {
                let mut query = regulations::table.into_boxed();
                if !category.is_empty() {
                    query = query.filter(regulations::category.eq(category));
                }
                query.count().get_result(&mut conn).await
            }
        }
    }

    /// Distinct categories with their regulation counts.
    pub async fn categories(&self) -> Result<Vec<(String, i64)>, DbError> {
        let mut conn = self.pool.get().await?;
        regulations::table
            .filter(regulations::category.ne(""))
            .group_by(regulations::category)
            .select((regulations::category, diesel::dsl::count_star()))
            .order(regulations::category.asc())
            .load(&mut conn)
            .await
    }

    pub async fn count(&self) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;
        regulations::table.count().get_result(&mut conn).await
    }
}
