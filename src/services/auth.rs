//! Accounts, passwords and sessions.
//!
//! Session tokens are random and only their SHA-256 hash is stored, so a
//! leaked database cannot be replayed as cookies.

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use tracing::{info, warn};

use super::patch;
use crate::error::{AppError, AppResult};
use crate::models::{ProfileUpdate, SubscriptionStatus, SubscriptionTier, User};
use crate::rate_limit::LoginThrottle;
use crate::repository::models::ProfileChanges;
use crate::repository::{now, DbContext};
use crate::utils::{is_valid_email, require, FieldErrors};

pub const MIN_PASSWORD_LEN: usize = 8;

const LOGIN_FAILED: &str = "Invalid email or password";

/// Build a fresh user row. Emails are stored lowercased.
pub fn new_user(email: &str, name: &str, password_hash: String, is_admin: bool) -> User {
    let stamp = Utc::now();
    User {
        id: uuid::Uuid::new_v4().to_string(),
        email: normalize_email(email),
        password_hash,
        name: name.trim().to_string(),
        company_name: None,
        license_number: None,
        phone: None,
        is_admin,
        email_verified_at: None,
        stripe_customer_id: None,
        subscription_status: SubscriptionStatus::None,
        subscription_tier: SubscriptionTier::Free,
        created_at: stamp,
        updated_at: stamp,
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(AppError::internal)
}

/// Unparseable hashes count as a mismatch.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Hex SHA-256 of a session token, as stored in `sessions.token_hash`.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

fn generate_token() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

#[derive(Clone)]
pub struct AuthService {
    ctx: DbContext,
    session_ttl: Duration,
    throttle: LoginThrottle,
}

impl AuthService {
    pub fn new(ctx: DbContext, session_ttl_hours: i64, throttle: LoginThrottle) -> Self {
        Self {
            ctx,
            session_ttl: Duration::hours(session_ttl_hours.max(1)),
            throttle,
        }
    }

    pub fn throttle(&self) -> &LoginThrottle {
        &self.throttle
    }

    pub async fn register(&self, email: &str, name: &str, password: &str) -> AppResult<User> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "name", "Name", name);
        if !is_valid_email(email.trim()) {
            errors.add("email", "Enter a valid email address");
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            errors.add(
                "password",
                format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
            );
        }
        errors.into_result()?;
        self.create_user(email, name, password, false).await
    }

    /// Create an account without form validation; used by `register` and
    /// the `user create` command.
    pub async fn create_user(
        &self,
        email: &str,
        name: &str,
        password: &str,
        is_admin: bool,
    ) -> AppResult<User> {
        let users = self.ctx.users();
        if users.get_by_email(&normalize_email(email)).await?.is_some() {
            return Err(AppError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }
        let user = new_user(email, name, hash_password(password)?, is_admin);
        users.create(&user).await.map_err(|e| match AppError::from(e) {
            AppError::Conflict(_) => {
                AppError::Conflict("An account with this email already exists".to_string())
            }
            other => other,
        })?;
        info!(user_id = %user.id, is_admin, "user created");
        Ok(user)
    }

    /// Check credentials. Unknown emails and wrong passwords fail the same
    /// way; repeated failures per email are throttled.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<User> {
        let email = normalize_email(email);
        if !self.throttle.check(&email).await {
            warn!(email = %email, "login throttled");
            return Err(AppError::RateLimited(
                "Too many failed attempts. Try again later.".to_string(),
            ));
        }

        let user = self.ctx.users().get_by_email(&email).await?;
        match user {
            Some(user) if verify_password(password, &user.password_hash) => {
                self.throttle.reset(&email).await;
                Ok(user)
            }
            _ => {
                self.throttle.record_failure(&email).await;
                Err(AppError::Unauthorized(LOGIN_FAILED.to_string()))
            }
        }
    }

    /// Start a session; returns the raw token for the cookie and its expiry.
    pub async fn create_session(&self, user_id: &str) -> AppResult<(String, DateTime<Utc>)> {
        let token = generate_token();
        let expires_at = Utc::now() + self.session_ttl;
        self.ctx
            .users()
            .create_session(&hash_token(&token), user_id, expires_at)
            .await?;
        Ok((token, expires_at))
    }

    /// User for an unexpired session token.
    pub async fn resolve_session(&self, token: &str) -> AppResult<Option<User>> {
        if token.is_empty() {
            return Ok(None);
        }
        Ok(self.ctx.users().find_session_user(&hash_token(token)).await?)
    }

    pub async fn logout(&self, token: &str) -> AppResult<()> {
        Ok(self.ctx.users().delete_session(&hash_token(token)).await?)
    }

    pub async fn purge_expired_sessions(&self) -> AppResult<usize> {
        Ok(self.ctx.users().purge_expired_sessions().await?)
    }

    pub async fn update_profile(&self, user_id: &str, input: ProfileUpdate) -> AppResult<User> {
        let mut errors = FieldErrors::new();
        if let Some(ref name) = input.name {
            require(&mut errors, "name", "Name", name);
        }
        errors.max_len("company_name", input.company_name.as_deref(), 200);
        errors.max_len("license_number", input.license_number.as_deref(), 100);
        errors.max_len("phone", input.phone.as_deref(), 50);
        errors.into_result()?;

        let changes = ProfileChanges {
            name: input.name.map(|n| n.trim().to_string()),
            company_name: patch(input.company_name),
            license_number: patch(input.license_number),
            phone: patch(input.phone),
            updated_at: now(),
        };
        Ok(self.ctx.users().update_profile(user_id, &changes).await?)
    }
}
