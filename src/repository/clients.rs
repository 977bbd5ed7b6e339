//! Client repository.

use diesel::prelude::*;
use diesel::sqlite::Sqlite;
use diesel_async::RunQueryDsl;

use super::models::{ClientChanges, ClientRecord};
use super::pool::{DbError, DbPool};
use super::util::{expect_rows, like_pattern};
use crate::models::Client;
use crate::schema::{clients, inspections, sites};

#[derive(Clone)]
pub struct ClientRepository {
    pool: DbPool,
}

impl ClientRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    fn filtered<'a>(user_id: &'a str, q: Option<&'a str>) -> clients::BoxedQuery<'a, Sqlite> {
        let mut query = clients::table
            .filter(clients::user_id.eq(user_id))
            .into_boxed();
        if let Some(q) = q.map(str::trim).filter(|q| !q.is_empty()) {
            let pattern = like_pattern(q);
            query = query.filter(
                clients::name
                    .like(pattern.clone())
                    .escape('\\')
                    .or(clients::contact_name.like(pattern.clone()).escape('\\'))
                    .or(clients::email.like(pattern).escape('\\')),
            );
        }
        query
    }

    pub async fn create(&self, client: &Client) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(clients::table)
            .values(ClientRecord::from(client))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str, user_id: &str) -> Result<Option<Client>, DbError> {
        let mut conn = self.pool.get().await?;
        clients::table
            .filter(clients::id.eq(id))
            .filter(clients::user_id.eq(user_id))
            .select(ClientRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(Client::from))
    }

    /// Clients ordered by name, optionally matching `q`.
    pub async fn list(
        &self,
        user_id: &str,
        q: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Client>, DbError> {
        let mut conn = self.pool.get().await?;
        Self::filtered(user_id, q)
            .order((clients::name.asc(), clients::id.asc()))
            .limit(limit)
            .offset(offset)
            .select(ClientRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(Client::from).collect())
    }

    pub async fn count(&self, user_id: &str, q: Option<&str>) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;
        Self::filtered(user_id, q)
            .count()
            .get_result(&mut conn)
            .await
    }

    /// Apply `changes` to the client if it belongs to `user_id`.
    pub async fn update(
        &self,
        id: &str,
        user_id: &str,
        changes: &ClientChanges,
    ) -> Result<Client, DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(
            clients::table
                .filter(clients::id.eq(id))
                .filter(clients::user_id.eq(user_id)),
        )
        .set(changes)
        .execute(&mut conn)
        .await?;
        expect_rows(affected)?;

        clients::table
            .find(id)
            .select(ClientRecord::as_select())
            .first(&mut conn)
            .await
            .map(Client::from)
    }

    pub async fn delete(&self, id: &str, user_id: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::delete(
            clients::table
                .filter(clients::id.eq(id))
                .filter(clients::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await?;
        expect_rows(affected)
    }

    /// Sites plus inspections that point at this client.
    pub async fn reference_count(&self, id: &str) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;
        let site_refs: i64 = sites::table
            .filter(sites::client_id.eq(id))
            .count()
            .get_result(&mut conn)
            .await?;
        let inspection_refs: i64 = inspections::table
            .filter(inspections::client_id.eq(id))
            .count()
            .get_result(&mut conn)
            .await?;
        Ok(site_refs + inspection_refs)
    }

    /// Every client of a user, for select boxes.
    pub async fn all_for_user(&self, user_id: &str) -> Result<Vec<Client>, DbError> {
        let mut conn = self.pool.get().await?;
        clients::table
            .filter(clients::user_id.eq(user_id))
            .order(clients::name.asc())
            .select(ClientRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(Client::from).collect())
    }
}
