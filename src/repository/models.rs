//! Diesel row types and their conversions to domain models.
//!
//! Timestamps are stored as RFC 3339 text with microsecond precision so that
//! lexical order matches chronological order.

use chrono::NaiveDate;
use diesel::prelude::*;

use super::{parse_datetime, parse_datetime_opt, timestamp};
use crate::models::{
    Client, Confidence, Image, ImageAnalysisStatus, Inspection, InspectionStatus, Job, JobStatus,
    Regulation, Report, ReportStatus, Severity, Site, SubscriptionStatus, SubscriptionTier, User,
    Violation, ViolationRegulation, ViolationStatus,
};
use crate::schema::{
    clients, images, inspections, jobs, regulations, reports, sessions, sites, users,
    violation_regulations, violations,
};

/// Date format for `inspections.inspection_date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct UserRecord {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub company_name: Option<String>,
    pub license_number: Option<String>,
    pub phone: Option<String>,
    pub is_admin: bool,
    pub email_verified_at: Option<String>,
    pub stripe_customer_id: Option<String>,
    pub subscription_status: String,
    pub subscription_tier: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<UserRecord> for User {
    fn from(r: UserRecord) -> Self {
        User {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            name: r.name,
            company_name: r.company_name,
            license_number: r.license_number,
            phone: r.phone,
            is_admin: r.is_admin,
            email_verified_at: parse_datetime_opt(r.email_verified_at.as_deref()),
            stripe_customer_id: r.stripe_customer_id,
            subscription_status: SubscriptionStatus::from_str(&r.subscription_status)
                .unwrap_or(SubscriptionStatus::None),
            subscription_tier: SubscriptionTier::from_str(&r.subscription_tier)
                .unwrap_or(SubscriptionTier::Free),
            created_at: parse_datetime(&r.created_at),
            updated_at: parse_datetime(&r.updated_at),
        }
    }
}

impl From<&User> for UserRecord {
    fn from(u: &User) -> Self {
        UserRecord {
            id: u.id.clone(),
            email: u.email.clone(),
            password_hash: u.password_hash.clone(),
            name: u.name.clone(),
            company_name: u.company_name.clone(),
            license_number: u.license_number.clone(),
            phone: u.phone.clone(),
            is_admin: u.is_admin,
            email_verified_at: u.email_verified_at.map(timestamp),
            stripe_customer_id: u.stripe_customer_id.clone(),
            subscription_status: u.subscription_status.as_str().to_string(),
            subscription_tier: u.subscription_tier.as_str().to_string(),
            created_at: timestamp(u.created_at),
            updated_at: timestamp(u.updated_at),
        }
    }
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = users)]
pub struct ProfileChanges {
    pub name: Option<String>,
    pub company_name: Option<Option<String>>,
    pub license_number: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub updated_at: String,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = sessions)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SessionRecord {
    pub token_hash: String,
    pub user_id: String,
    pub created_at: String,
    pub expires_at: String,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = clients)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ClientRecord {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ClientRecord> for Client {
    fn from(r: ClientRecord) -> Self {
        Client {
            id: r.id,
            user_id: r.user_id,
            name: r.name,
            contact_name: r.contact_name,
            email: r.email,
            phone: r.phone,
            address_line1: r.address_line1,
            address_line2: r.address_line2,
            city: r.city,
            state: r.state,
            postal_code: r.postal_code,
            notes: r.notes,
            created_at: parse_datetime(&r.created_at),
            updated_at: parse_datetime(&r.updated_at),
        }
    }
}

impl From<&Client> for ClientRecord {
    fn from(c: &Client) -> Self {
        ClientRecord {
            id: c.id.clone(),
            user_id: c.user_id.clone(),
            name: c.name.clone(),
            contact_name: c.contact_name.clone(),
            email: c.email.clone(),
            phone: c.phone.clone(),
            address_line1: c.address_line1.clone(),
            address_line2: c.address_line2.clone(),
            city: c.city.clone(),
            state: c.state.clone(),
            postal_code: c.postal_code.clone(),
            notes: c.notes.clone(),
            created_at: timestamp(c.created_at),
            updated_at: timestamp(c.updated_at),
        }
    }
}

/// Client columns to change. Outer `None` skips a column; `Some(None)`
/// sets it to NULL.
#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = clients)]
pub struct ClientChanges {
    pub name: Option<String>,
    pub contact_name: Option<Option<String>>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub address_line1: Option<Option<String>>,
    pub address_line2: Option<Option<String>>,
    pub city: Option<Option<String>>,
    pub state: Option<Option<String>>,
    pub postal_code: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub updated_at: String,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = sites)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SiteRecord {
    pub id: String,
    pub user_id: String,
    pub client_id: Option<String>,
    pub name: String,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<SiteRecord> for Site {
    fn from(r: SiteRecord) -> Self {
        Site {
            id: r.id,
            user_id: r.user_id,
            client_id: r.client_id,
            name: r.name,
            address_line1: r.address_line1,
            address_line2: r.address_line2,
            city: r.city,
            state: r.state,
            postal_code: r.postal_code,
            notes: r.notes,
            created_at: parse_datetime(&r.created_at),
            updated_at: parse_datetime(&r.updated_at),
        }
    }
}

impl From<&Site> for SiteRecord {
    fn from(s: &Site) -> Self {
        SiteRecord {
            id: s.id.clone(),
            user_id: s.user_id.clone(),
            client_id: s.client_id.clone(),
            name: s.name.clone(),
            address_line1: s.address_line1.clone(),
            address_line2: s.address_line2.clone(),
            city: s.city.clone(),
            state: s.state.clone(),
            postal_code: s.postal_code.clone(),
            notes: s.notes.clone(),
            created_at: timestamp(s.created_at),
            updated_at: timestamp(s.updated_at),
        }
    }
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = sites)]
pub struct SiteChanges {
    pub name: Option<String>,
    pub client_id: Option<Option<String>>,
    pub address_line1: Option<Option<String>>,
    pub address_line2: Option<Option<String>>,
    pub city: Option<Option<String>>,
    pub state: Option<Option<String>>,
    pub postal_code: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    pub updated_at: String,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = inspections)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct InspectionRecord {
    pub id: String,
    pub user_id: String,
    pub client_id: Option<String>,
    pub site_id: Option<String>,
    pub title: String,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub inspection_date: String,
    pub weather_conditions: Option<String>,
    pub temperature_f: Option<i32>,
    pub inspector_notes: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<InspectionRecord> for Inspection {
    fn from(r: InspectionRecord) -> Self {
        Inspection {
            id: r.id,
            user_id: r.user_id,
            client_id: r.client_id,
            site_id: r.site_id,
            title: r.title,
            address_line1: r.address_line1,
            address_line2: r.address_line2,
            city: r.city,
            state: r.state,
            postal_code: r.postal_code,
            inspection_date: NaiveDate::parse_from_str(&r.inspection_date, DATE_FORMAT)
                .unwrap_or_default(),
            weather_conditions: r.weather_conditions,
            temperature_f: r.temperature_f,
            inspector_notes: r.inspector_notes,
            status: InspectionStatus::from_str(&r.status).unwrap_or(InspectionStatus::Draft),
            created_at: parse_datetime(&r.created_at),
            updated_at: parse_datetime(&r.updated_at),
        }
    }
}

impl From<&Inspection> for InspectionRecord {
    fn from(i: &Inspection) -> Self {
        InspectionRecord {
            id: i.id.clone(),
            user_id: i.user_id.clone(),
            client_id: i.client_id.clone(),
            site_id: i.site_id.clone(),
            title: i.title.clone(),
            address_line1: i.address_line1.clone(),
            address_line2: i.address_line2.clone(),
            city: i.city.clone(),
            state: i.state.clone(),
            postal_code: i.postal_code.clone(),
            inspection_date: i.inspection_date.format(DATE_FORMAT).to_string(),
            weather_conditions: i.weather_conditions.clone(),
            temperature_f: i.temperature_f,
            inspector_notes: i.inspector_notes.clone(),
            status: i.status.as_str().to_string(),
            created_at: timestamp(i.created_at),
            updated_at: timestamp(i.updated_at),
        }
    }
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = inspections)]
pub struct InspectionChanges {
    pub title: Option<String>,
    pub client_id: Option<Option<String>>,
    pub address_line1: Option<Option<String>>,
    pub address_line2: Option<Option<String>>,
    pub city: Option<Option<String>>,
    pub state: Option<Option<String>>,
    pub postal_code: Option<Option<String>>,
    pub inspection_date: Option<String>,
    pub weather_conditions: Option<Option<String>>,
    pub temperature_f: Option<Option<i32>>,
    pub inspector_notes: Option<Option<String>>,
    pub updated_at: String,
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = images)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ImageRecord {
    pub id: String,
    pub user_id: String,
    pub inspection_id: String,
    pub original_key: String,
    pub thumbnail_key: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub analysis_status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ImageRecord> for Image {
    fn from(r: ImageRecord) -> Self {
        Image {
            id: r.id,
            user_id: r.user_id,
            inspection_id: r.inspection_id,
            original_key: r.original_key,
            thumbnail_key: r.thumbnail_key,
            filename: r.filename,
            content_type: r.content_type,
            size_bytes: r.size_bytes,
            analysis_status: ImageAnalysisStatus::from_str(&r.analysis_status)
                .unwrap_or(ImageAnalysisStatus::Pending),
            created_at: parse_datetime(&r.created_at),
            updated_at: parse_datetime(&r.updated_at),
        }
    }
}

impl From<&Image> for ImageRecord {
    fn from(i: &Image) -> Self {
        ImageRecord {
            id: i.id.clone(),
            user_id: i.user_id.clone(),
            inspection_id: i.inspection_id.clone(),
            original_key: i.original_key.clone(),
            thumbnail_key: i.thumbnail_key.clone(),
            filename: i.filename.clone(),
            content_type: i.content_type.clone(),
            size_bytes: i.size_bytes,
            analysis_status: i.analysis_status.as_str().to_string(),
            created_at: timestamp(i.created_at),
            updated_at: timestamp(i.updated_at),
        }
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = violations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ViolationRecord {
    pub id: String,
    pub user_id: String,
    pub inspection_id: String,
    pub image_id: Option<String>,
    pub description: String,
    pub ai_description: Option<String>,
    pub severity: String,
    pub confidence: Option<String>,
    pub inspector_notes: Option<String>,
    pub status: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<ViolationRecord> for Violation {
    fn from(r: ViolationRecord) -> Self {
        Violation {
            id: r.id,
            user_id: r.user_id,
            inspection_id: r.inspection_id,
            image_id: r.image_id,
            description: r.description,
            ai_description: r.ai_description,
            severity: Severity::from_str(&r.severity).unwrap_or(Severity::Other),
            confidence: r.confidence.as_deref().and_then(Confidence::from_str),
            inspector_notes: r.inspector_notes,
            status: ViolationStatus::from_str(&r.status).unwrap_or(ViolationStatus::Pending),
            created_at: parse_datetime(&r.created_at),
            updated_at: parse_datetime(&r.updated_at),
        }
    }
}

impl From<&Violation> for ViolationRecord {
    fn from(v: &Violation) -> Self {
        ViolationRecord {
            id: v.id.clone(),
            user_id: v.user_id.clone(),
            inspection_id: v.inspection_id.clone(),
            image_id: v.image_id.clone(),
            description: v.description.clone(),
            ai_description: v.ai_description.clone(),
            severity: v.severity.as_str().to_string(),
            confidence: v.confidence.map(|c| c.as_str().to_string()),
            inspector_notes: v.inspector_notes.clone(),
            status: v.status.as_str().to_string(),
            created_at: timestamp(v.created_at),
            updated_at: timestamp(v.updated_at),
        }
    }
}

#[derive(AsChangeset, Debug, Default)]
#[diesel(table_name = violations)]
pub struct ViolationChanges {
    pub description: Option<String>,
    pub severity: Option<String>,
    pub inspector_notes: Option<Option<String>>,
    pub updated_at: String,
}

#[derive(Queryable, Selectable, QueryableByName, Insertable, Debug, Clone)]
#[diesel(table_name = regulations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct RegulationRecord {
    pub id: String,
    pub standard_number: String,
    pub title: String,
    pub category: String,
    pub full_text: String,
    pub created_at: String,
}

impl From<RegulationRecord> for Regulation {
    fn from(r: RegulationRecord) -> Self {
        Regulation {
            id: r.id,
            standard_number: r.standard_number,
            title: r.title,
            category: r.category,
            full_text: r.full_text,
            created_at: parse_datetime(&r.created_at),
        }
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = violation_regulations)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ViolationRegulationRecord {
    pub violation_id: String,
    pub regulation_id: String,
    pub relevance_score: f64,
    pub ai_explanation: Option<String>,
    pub is_primary: bool,
    pub created_at: String,
}

impl From<ViolationRegulationRecord> for ViolationRegulation {
    fn from(r: ViolationRegulationRecord) -> Self {
        ViolationRegulation {
            violation_id: r.violation_id,
            regulation_id: r.regulation_id,
            relevance_score: r.relevance_score,
            ai_explanation: r.ai_explanation,
            is_primary: r.is_primary,
            created_at: parse_datetime(&r.created_at),
        }
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = reports)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ReportRecord {
    pub id: String,
    pub user_id: String,
    pub inspection_id: String,
    pub violation_count: i32,
    pub status: String,
    pub pdf_key: Option<String>,
    pub docx_key: Option<String>,
    pub error: Option<String>,
    pub generated_at: Option<String>,
    pub created_at: String,
}

impl From<ReportRecord> for Report {
    fn from(r: ReportRecord) -> Self {
        Report {
            id: r.id,
            user_id: r.user_id,
            inspection_id: r.inspection_id,
            violation_count: r.violation_count,
            status: ReportStatus::from_str(&r.status).unwrap_or(ReportStatus::Pending),
            pdf_key: r.pdf_key,
            docx_key: r.docx_key,
            error: r.error,
            generated_at: parse_datetime_opt(r.generated_at.as_deref()),
            created_at: parse_datetime(&r.created_at),
        }
    }
}

impl From<&Report> for ReportRecord {
    fn from(r: &Report) -> Self {
        ReportRecord {
            id: r.id.clone(),
            user_id: r.user_id.clone(),
            inspection_id: r.inspection_id.clone(),
            violation_count: r.violation_count,
            status: r.status.as_str().to_string(),
            pdf_key: r.pdf_key.clone(),
            docx_key: r.docx_key.clone(),
            error: r.error.clone(),
            generated_at: r.generated_at.map(timestamp),
            created_at: timestamp(r.created_at),
        }
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = jobs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct JobRecord {
    pub id: String,
    pub job_type: String,
    pub payload: String,
    pub inspection_id: Option<String>,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: Option<String>,
    pub run_at: String,
    pub locked_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<JobRecord> for Job {
    fn from(r: JobRecord) -> Self {
        Job {
            id: r.id,
            job_type: r.job_type,
            payload: r.payload,
            inspection_id: r.inspection_id,
            status: JobStatus::from_str(&r.status).unwrap_or(JobStatus::Pending),
            attempts: r.attempts,
            max_attempts: r.max_attempts,
            last_error: r.last_error,
            run_at: parse_datetime(&r.run_at),
            locked_at: parse_datetime_opt(r.locked_at.as_deref()),
            created_at: parse_datetime(&r.created_at),
            updated_at: parse_datetime(&r.updated_at),
        }
    }
}
