//! Repository layer for database persistence.
//!
//! All database access uses Diesel over SQLite. Every tenant-owned query is
//! filtered by `user_id`; updates and deletes that match no row return
//! `NotFound` so callers cannot distinguish "missing" from "not yours".

pub mod clients;
pub mod context;
pub mod images;
pub mod inspections;
pub mod jobs;
pub mod models;
pub mod pool;
pub mod regulations;
pub mod reports;
pub mod sites;
pub mod users;
pub mod util;
pub mod violations;

pub use clients::ClientRepository;
pub use context::DbContext;
pub use images::ImageRepository;
pub use inspections::{InspectionFilter, InspectionRepository};
pub use jobs::JobRepository;
pub use pool::{DbError, DbPool};
pub use regulations::RegulationRepository;
pub use reports::ReportRepository;
pub use sites::SiteRepository;
pub use users::UserRepository;
pub use violations::ViolationRepository;

use chrono::{DateTime, SecondsFormat, Utc};

/// Parse a datetime string from the database, defaulting to Unix epoch on error.
pub fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(DateTime::UNIX_EPOCH)
}

/// Parse an optional datetime string from the database.
pub fn parse_datetime_opt(s: Option<&str>) -> Option<DateTime<Utc>> {
    s.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format a timestamp for storage.
pub fn timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time formatted for storage.
pub fn now() -> String {
    timestamp(Utc::now())
}

#[cfg(test)]
pub(crate) mod test_support {
    use tempfile::TempDir;

    use super::DbContext;
    use crate::models::User;

    /// Fresh database in a temp dir with the schema applied.
    pub async fn setup_test_db() -> (DbContext, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        let ctx = DbContext::from_url(&db_path.display().to_string());
        ctx.init_schema().await.unwrap();
        (ctx, dir)
    }

    /// Insert a user with the given email.
    pub async fn create_user(ctx: &DbContext, email: &str) -> User {
        let user = crate::services::auth::new_user(email, "Test Inspector", "x".into(), false);
        ctx.users().create(&user).await.unwrap();
        user
    }
}
