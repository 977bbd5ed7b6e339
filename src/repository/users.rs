//! Users and login sessions.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{ProfileChanges, SessionRecord, UserRecord};
use super::pool::{DbError, DbPool};
use super::util::expect_rows;
use super::{now, timestamp};
use crate::models::{SubscriptionStatus, SubscriptionTier, User};
use crate::schema::{sessions, users};

#[derive(Clone)]
pub struct UserRepository {
    pool: DbPool,
}

impl UserRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, user: &User) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(users::table)
            .values(UserRecord::from(user))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Option<User>, DbError> {
        let mut conn = self.pool.get().await?;
        users::table
            .find(id)
            .select(UserRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(User::from))
    }

    /// Case-insensitive lookup.
    pub async fn get_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let mut conn = self.pool.get().await?;
        users::table
            .filter(users::email.eq(email.trim()))
            .select(UserRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(User::from))
    }

    pub async fn get_by_customer_id(&self, customer_id: &str) -> Result<Option<User>, DbError> {
        let mut conn = self.pool.get().await?;
        users::table
            .filter(users::stripe_customer_id.eq(customer_id))
            .select(UserRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(User::from))
    }

    pub async fn update_profile(&self, id: &str, changes: &ProfileChanges) -> Result<User, DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(users::table.find(id))
            .set(changes)
            .execute(&mut conn)
            .await?;
        expect_rows(affected)?;
        users::table
            .find(id)
            .select(UserRecord::as_select())
            .first(&mut conn)
            .await
            .map(User::from)
    }

    pub async fn set_password_hash(&self, id: &str, hash: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(users::table.find(id))
            .set((users::password_hash.eq(hash), users::updated_at.eq(now())))
            .execute(&mut conn)
            .await?;
        expect_rows(affected)
    }

    pub async fn set_admin(&self, id: &str, is_admin: bool) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(users::table.find(id))
            .set((users::is_admin.eq(is_admin), users::updated_at.eq(now())))
            .execute(&mut conn)
            .await?;
        expect_rows(affected)
    }

    pub async fn set_stripe_customer(&self, id: &str, customer_id: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(users::table.find(id))
            .set((
                users::stripe_customer_id.eq(customer_id),
                users::updated_at.eq(now()),
            ))
            .execute(&mut conn)
            .await?;
        expect_rows(affected)
    }

    /// Update subscription state; `tier` is left unchanged when `None`.
    pub async fn set_subscription(
        &self,
        id: &str,
        status: SubscriptionStatus,
        tier: Option<SubscriptionTier>,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let target = users::table.find(id);
        let affected = match tier {
            Some(tier) => {
                diesel::update(target)
                    .set((
                        users::subscription_status.eq(status.as_str()),
                        users::subscription_tier.eq(tier.as_str()),
                        users::updated_at.eq(now()),
                    ))
                    .execute(&mut conn)
                    .await?
            }
            None => {
                diesel::update(target)
                    .set((
                        users::subscription_status.eq(status.as_str()),
                        users::updated_at.eq(now()),
                    ))
                    .execute(&mut conn)
                    .await?
            }
        };
        expect_rows(affected)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<User>, DbError> {
        let mut conn = self.pool.get().await?;
        users::table
            .order(users::created_at.desc())
            .limit(limit)
            .offset(offset)
            .select(UserRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(User::from).collect())
    }

    pub async fn count(&self) -> Result<i64, DbError> {
        let mut conn = self.pool.get().await?;
        users::table.count().get_result(&mut conn).await
    }

    pub async fn create_session(
        &self,
        token_hash: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(sessions::table)
            .values(SessionRecord {
                token_hash: token_hash.to_string(),
                user_id: user_id.to_string(),
                created_at: now(),
                expires_at: timestamp(expires_at),
            })
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Resolve an unexpired session to its user.
    pub async fn find_session_user(&self, token_hash: &str) -> Result<Option<User>, DbError> {
        let mut conn = self.pool.get().await?;
        sessions::table
            .inner_join(users::table)
            .filter(sessions::token_hash.eq(token_hash))
            .filter(sessions::expires_at.gt(now()))
            .select(UserRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(User::from))
    }

    pub async fn delete_session(&self, token_hash: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        diesel::delete(sessions::table.find(token_hash))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    /// Remove expired sessions; returns how many were deleted.
    pub async fn purge_expired_sessions(&self) -> Result<usize, DbError> {
        let mut conn = self.pool.get().await?;
        diesel::delete(sessions::table.filter(sessions::expires_at.le(now())))
            .execute(&mut conn)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{create_user, setup_test_db};
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn test_email_lookup_is_case_insensitive() {
        let (ctx, _dir) = setup_test_db().await;
        let user = create_user(&ctx, "Inspector@Example.com").await;
        let found = ctx
            .users()
            .get_by_email("inspector@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, user.id);
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected() {
        let (ctx, _dir) = setup_test_db().await;
        create_user(&ctx, "a@example.com").await;
        let dup = crate::services::auth::new_user("A@example.com", "Other", "x".into(), false);
        let err = ctx.users().create(&dup).await.unwrap_err();
        let app: crate::AppError = err.into();
        assert_eq!(app.code(), "ECONFLICT");
    }

    #[tokio::test]
    async fn test_set_password_hash() {
        let (ctx, _dir) = setup_test_db().await;
        let user = create_user(&ctx, "a@example.com").await;
        ctx.users().set_password_hash(&user.id, "new-hash").await.unwrap();
        let stored = ctx.users().get(&user.id).await.unwrap().unwrap();
        assert_eq!(stored.password_hash, "new-hash");

        let missing = ctx.users().set_password_hash("nobody", "h").await;
        assert!(matches!(missing, Err(DbError::NotFound)));
    }

    #[tokio::test]
    async fn test_sessions_expire() {
        let (ctx, _dir) = setup_test_db().await;
        let user = create_user(&ctx, "a@example.com").await;
        let repo = ctx.users();

        repo.create_session("live", &user.id, Utc::now() + Duration::hours(1))
            .await
            .unwrap();
        repo.create_session("stale", &user.id, Utc::now() - Duration::hours(1))
            .await
            .unwrap();

        assert_eq!(repo.find_session_user("live").await.unwrap().unwrap().id, user.id);
        assert!(repo.find_session_user("stale").await.unwrap().is_none());
        assert_eq!(repo.purge_expired_sessions().await.unwrap(), 1);

        repo.delete_session("live").await.unwrap();
        assert!(repo.find_session_user("live").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_subscription_updates() {
        let (ctx, _dir) = setup_test_db().await;
        let user = create_user(&ctx, "a@example.com").await;
        let repo = ctx.users();

        repo.set_stripe_customer(&user.id, "cus_123").await.unwrap();
        repo.set_subscription(&user.id, SubscriptionStatus::Active, Some(SubscriptionTier::Pro))
            .await
            .unwrap();
        repo.set_subscription(&user.id, SubscriptionStatus::PastDue, None)
            .await
            .unwrap();

        let found = repo.get_by_customer_id("cus_123").await.unwrap().unwrap();
        assert_eq!(found.subscription_status, SubscriptionStatus::PastDue);
        assert_eq!(found.subscription_tier, SubscriptionTier::Pro);
    }
}
