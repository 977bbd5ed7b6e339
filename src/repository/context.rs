//! Database context: owns the pool and hands out repositories.

use diesel_async::SimpleAsyncConnection;

use super::pool::{DbError, DbPool};
use super::{
    ClientRepository, ImageRepository, InspectionRepository, JobRepository,
    RegulationRepository, ReportRepository, SiteRepository, UserRepository, ViolationRepository,
};

/// Entry point for database operations. Create one per process and clone it
/// freely; repositories are cheap handles over the shared pool.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_url("sqlite:siteinspect.db");
/// ctx.init_schema().await?;
/// let client = ctx.clients().get(&client_id, &user_id).await?;
/// ```
#[derive(Clone, Debug)]
pub struct DbContext {
    pool: DbPool,
}

impl DbContext {
    pub fn from_url(database_url: &str) -> Self {
        Self {
            pool: DbPool::new(database_url),
        }
    }

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    pub fn clients(&self) -> ClientRepository {
        ClientRepository::new(self.pool.clone())
    }

    pub fn sites(&self) -> SiteRepository {
        SiteRepository::new(self.pool.clone())
    }

    pub fn inspections(&self) -> InspectionRepository {
        InspectionRepository::new(self.pool.clone())
    }

    pub fn images(&self) -> ImageRepository {
        ImageRepository::new(self.pool.clone())
    }

    pub fn violations(&self) -> ViolationRepository {
        ViolationRepository::new(self.pool.clone())
    }

    pub fn regulations(&self) -> RegulationRepository {
        RegulationRepository::new(self.pool.clone())
    }

    pub fn reports(&self) -> ReportRepository {
        ReportRepository::new(self.pool.clone())
    }

    pub fn jobs(&self) -> JobRepository {
        JobRepository::new(self.pool.clone())
    }

    /// Create all tables, indexes and triggers if they don't exist.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute("PRAGMA journal_mode = WAL;").await?;
        conn.batch_execute(SCHEMA).await?;
        Ok(())
    }

    /// Liveness check used by `/healthz`.
    pub async fn ping(&self) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        conn.batch_execute("SELECT 1;").await
    }
}

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id TEXT PRIMARY KEY,
    email TEXT NOT NULL UNIQUE COLLATE NOCASE,
    password_hash TEXT NOT NULL,
    name TEXT NOT NULL,
    company_name TEXT,
    license_number TEXT,
    phone TEXT,
    is_admin BOOLEAN NOT NULL DEFAULT 0,
    email_verified_at TEXT,
    stripe_customer_id TEXT,
    subscription_status TEXT NOT NULL DEFAULT 'none',
    subscription_tier TEXT NOT NULL DEFAULT 'free',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_users_stripe_customer ON users(stripe_customer_id);

CREATE TABLE IF NOT EXISTS sessions (
    token_hash TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    expires_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

CREATE TABLE IF NOT EXISTS clients (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    contact_name TEXT,
    email TEXT,
    phone TEXT,
    address_line1 TEXT,
    address_line2 TEXT,
    city TEXT,
    state TEXT,
    postal_code TEXT,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_clients_user ON clients(user_id, name);

CREATE TABLE IF NOT EXISTS sites (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    client_id TEXT REFERENCES clients(id),
    name TEXT NOT NULL,
    address_line1 TEXT,
    address_line2 TEXT,
    city TEXT,
    state TEXT,
    postal_code TEXT,
    notes TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sites_user ON sites(user_id, name);
CREATE INDEX IF NOT EXISTS idx_sites_client ON sites(client_id);

CREATE TABLE IF NOT EXISTS inspections (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    client_id TEXT REFERENCES clients(id),
    site_id TEXT REFERENCES sites(id),
    title TEXT NOT NULL,
    address_line1 TEXT,
    address_line2 TEXT,
    city TEXT,
    state TEXT,
    postal_code TEXT,
    inspection_date TEXT NOT NULL,
    weather_conditions TEXT,
    temperature_f INTEGER,
    inspector_notes TEXT,
    status TEXT NOT NULL DEFAULT 'draft',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_inspections_user ON inspections(user_id, inspection_date);
CREATE INDEX IF NOT EXISTS idx_inspections_client ON inspections(client_id);
CREATE INDEX IF NOT EXISTS idx_inspections_site ON inspections(site_id);

CREATE TABLE IF NOT EXISTS images (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    inspection_id TEXT NOT NULL REFERENCES inspections(id) ON DELETE CASCADE,
    original_key TEXT NOT NULL,
    thumbnail_key TEXT,
    filename TEXT NOT NULL,
    content_type TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    analysis_status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_images_inspection ON images(inspection_id, created_at);

CREATE TABLE IF NOT EXISTS violations (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    inspection_id TEXT NOT NULL REFERENCES inspections(id) ON DELETE CASCADE,
    image_id TEXT REFERENCES images(id) ON DELETE SET NULL,
    description TEXT NOT NULL,
    ai_description TEXT,
    severity TEXT NOT NULL,
    confidence TEXT,
    inspector_notes TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_violations_inspection ON violations(inspection_id, created_at, id);

CREATE TABLE IF NOT EXISTS regulations (
    id TEXT PRIMARY KEY,
    standard_number TEXT NOT NULL UNIQUE,
    title TEXT NOT NULL,
    category TEXT NOT NULL DEFAULT '',
    full_text TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_regulations_category ON regulations(category);

CREATE VIRTUAL TABLE IF NOT EXISTS regulations_fts USING fts5(
    regulation_id UNINDEXED,
    standard_number,
    title,
    full_text
);

CREATE TRIGGER IF NOT EXISTS regulations_fts_insert AFTER INSERT ON regulations BEGIN
    INSERT INTO regulations_fts(regulation_id, standard_number, title, full_text)
    VALUES (new.id, new.standard_number, new.title, new.full_text);
END;

CREATE TRIGGER IF NOT EXISTS regulations_fts_update AFTER UPDATE ON regulations BEGIN
    DELETE FROM regulations_fts WHERE regulation_id = old.id;
    INSERT INTO regulations_fts(regulation_id, standard_number, title, full_text)
    VALUES (new.id, new.standard_number, new.title, new.full_text);
END;

CREATE TRIGGER IF NOT EXISTS regulations_fts_delete AFTER DELETE ON regulations BEGIN
    DELETE FROM regulations_fts WHERE regulation_id = old.id;
END;

CREATE TABLE IF NOT EXISTS violation_regulations (
    violation_id TEXT NOT NULL REFERENCES violations(id) ON DELETE CASCADE,
    regulation_id TEXT NOT NULL REFERENCES regulations(id) ON DELETE CASCADE,
    relevance_score REAL NOT NULL DEFAULT 1.0,
    ai_explanation TEXT,
    is_primary BOOLEAN NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    PRIMARY KEY (violation_id, regulation_id)
);
CREATE INDEX IF NOT EXISTS idx_violation_regulations_regulation ON violation_regulations(regulation_id);

CREATE TABLE IF NOT EXISTS reports (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
    inspection_id TEXT NOT NULL REFERENCES inspections(id) ON DELETE CASCADE,
    violation_count INTEGER NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'pending',
    pdf_key TEXT,
    docx_key TEXT,
    error TEXT,
    generated_at TEXT,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_reports_inspection ON reports(inspection_id, created_at);

CREATE TABLE IF NOT EXISTS jobs (
    id TEXT PRIMARY KEY,
    job_type TEXT NOT NULL,
    payload TEXT NOT NULL DEFAULT '{}',
    inspection_id TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    attempts INTEGER NOT NULL DEFAULT 0,
    max_attempts INTEGER NOT NULL DEFAULT 3,
    last_error TEXT,
    run_at TEXT NOT NULL,
    locked_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_jobs_claim ON jobs(status, run_at);

-- At most one in-flight analysis per inspection.
CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_active_analysis ON jobs(inspection_id)
    WHERE job_type = 'analyze_inspection' AND status IN ('pending', 'running');
"#;
