//! Askama template structs for the web interface.
//!
//! Each struct corresponds to an HTML template in the templates/ directory.
//! Row structs carry pre-formatted strings so templates stay logic-free.

use askama::Template;

use crate::error::FieldError;
use crate::models::{
    Client, Image, Inspection, InspectionStatus, Job, LinkedRegulation, Page, Regulation, Report,
    Site, StatusCounts, User, Violation,
};
use crate::services::{AnalysisProgress, ImageUrls, QueueStep};
use crate::utils::{format_date, format_size, format_timestamp};

fn or_empty(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

/// Signed-in user shown in the navigation bar.
#[derive(Clone)]
pub struct NavUser {
    pub name: String,
    pub is_admin: bool,
}

impl From<&User> for NavUser {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone(),
            is_admin: user.is_admin,
        }
    }
}

/// Option in a `<select>`.
pub struct Choice {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl Choice {
    pub fn new(value: &str, label: &str, current: &str) -> Self {
        Self {
            value: value.to_string(),
            label: label.to_string(),
            selected: value == current,
        }
    }
}

/// Pagination links. `query` is the rest of the query string, already
/// encoded, without the page parameter.
pub struct Pager {
    pub page: i64,
    pub total_pages: i64,
    pub has_prev: bool,
    pub has_next: bool,
    pub prev: i64,
    pub next: i64,
    pub total: i64,
    pub query: String,
}

impl Pager {
    pub fn of<T>(page: &Page<T>, query: String) -> Self {
        Self {
            page: page.page,
            total_pages: page.total_pages(),
            has_prev: page.has_prev(),
            has_next: page.has_next(),
            prev: page.page - 1,
            next: page.page + 1,
            total: page.total,
            query,
        }
    }
}

pub struct ClientRow {
    pub id: String,
    pub name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub notes: String,
}

impl From<&Client> for ClientRow {
    fn from(c: &Client) -> Self {
        Self {
            id: c.id.clone(),
            name: c.name.clone(),
            contact_name: or_empty(&c.contact_name),
            email: or_empty(&c.email),
            phone: or_empty(&c.phone),
            address: c.address(),
            notes: or_empty(&c.notes),
        }
    }
}

pub struct SiteRow {
    pub id: String,
    pub name: String,
    pub client_id: String,
    pub address: String,
    pub notes: String,
}

impl From<&Site> for SiteRow {
    fn from(s: &Site) -> Self {
        Self {
            id: s.id.clone(),
            name: s.name.clone(),
            client_id: or_empty(&s.client_id),
            address: s.address(),
            notes: or_empty(&s.notes),
        }
    }
}

pub struct InspectionRow {
    pub id: String,
    pub title: String,
    pub date: String,
    pub address: String,
    pub status: String,
    pub status_label: String,
    pub client_id: String,
    pub weather: String,
    pub temperature: String,
    pub notes: String,
}

impl From<&Inspection> for InspectionRow {
    fn from(i: &Inspection) -> Self {
        Self {
            id: i.id.clone(),
            title: i.title.clone(),
            date: format_date(i.inspection_date),
            address: i.address(),
            status: i.status.as_str().to_string(),
            status_label: i.status.label().to_string(),
            client_id: or_empty(&i.client_id),
            weather: or_empty(&i.weather_conditions),
            temperature: i.temperature_f.map(|t| format!("{}°F", t)).unwrap_or_default(),
            notes: or_empty(&i.inspector_notes),
        }
    }
}

pub struct ImageView {
    pub id: String,
    pub filename: String,
    pub size: String,
    pub status: String,
    pub thumbnail_url: String,
    pub original_url: String,
}

impl ImageView {
    pub fn new(image: &Image, urls: ImageUrls) -> Self {
        Self {
            id: image.id.clone(),
            filename: image.filename.clone(),
            size: format_size(image.size_bytes.max(0) as u64),
            status: image.analysis_status.as_str().to_string(),
            thumbnail_url: urls.thumbnail,
            original_url: urls.original,
        }
    }
}

pub struct RegulationLinkView {
    pub id: String,
    pub standard_number: String,
    pub title: String,
    pub relevance: String,
    pub explanation: String,
    pub is_primary: bool,
}

impl From<&LinkedRegulation> for RegulationLinkView {
    fn from(l: &LinkedRegulation) -> Self {
        Self {
            id: l.regulation.id.clone(),
            standard_number: l.regulation.standard_number.clone(),
            title: l.regulation.title.clone(),
            relevance: format!("{:.0}%", l.relevance_score * 100.0),
            explanation: or_empty(&l.ai_explanation),
            is_primary: l.is_primary,
        }
    }
}

pub struct ViolationView {
    pub id: String,
    pub inspection_id: String,
    pub description: String,
    pub ai_description: String,
    pub severity: String,
    pub severity_label: String,
    pub confidence: String,
    pub notes: String,
    pub status: String,
    pub is_ai: bool,
    pub image_id: String,
    pub regulations: Vec<RegulationLinkView>,
}

impl ViolationView {
    pub fn new(v: &Violation, links: &[LinkedRegulation]) -> Self {
        Self {
            id: v.id.clone(),
            inspection_id: v.inspection_id.clone(),
            description: v.description.clone(),
            ai_description: or_empty(&v.ai_description),
            severity: v.severity.as_str().to_string(),
            severity_label: v.severity.label().to_string(),
            confidence: v.confidence.map(|c| c.as_str().to_string()).unwrap_or_default(),
            notes: or_empty(&v.inspector_notes),
            status: v.status.as_str().to_string(),
            is_ai: v.is_ai_generated(),
            image_id: or_empty(&v.image_id),
            regulations: links.iter().map(RegulationLinkView::from).collect(),
        }
    }
}

pub struct RegulationRow {
    pub id: String,
    pub standard_number: String,
    pub title: String,
    pub category: String,
    pub excerpt: String,
}

impl From<&Regulation> for RegulationRow {
    fn from(r: &Regulation) -> Self {
        Self {
            id: r.id.clone(),
            standard_number: r.standard_number.clone(),
            title: r.title.clone(),
            category: r.category.clone(),
            excerpt: r.excerpt(240),
        }
    }
}

pub struct ReportRow {
    pub id: String,
    pub inspection_id: String,
    pub status: String,
    pub violation_count: i32,
    pub created: String,
    pub generated: String,
    pub error: String,
    pub is_pending: bool,
    pub is_ready: bool,
}

impl From<&Report> for ReportRow {
    fn from(r: &Report) -> Self {
        Self {
            id: r.id.clone(),
            inspection_id: r.inspection_id.clone(),
            status: r.status.as_str().to_string(),
            violation_count: r.violation_count,
            created: format_timestamp(r.created_at),
            generated: r.generated_at.map(format_timestamp).unwrap_or_default(),
            error: or_empty(&r.error),
            is_pending: r.status == crate::models::ReportStatus::Pending,
            is_ready: r.status == crate::models::ReportStatus::Ready,
        }
    }
}

pub struct ProgressView {
    pub inspection_id: String,
    pub status: String,
    pub status_label: String,
    pub running: bool,
    pub percent: i64,
    pub images_total: i64,
    pub images_completed: i64,
    pub images_failed: i64,
    pub images_pending: i64,
    pub violations_found: i64,
    pub job_error: String,
}

impl ProgressView {
    pub fn new(inspection_id: &str, p: &AnalysisProgress) -> Self {
        Self {
            inspection_id: inspection_id.to_string(),
            status: p.status.as_str().to_string(),
            status_label: p.status.label().to_string(),
            running: p.is_running(),
            percent: p.percent(),
            images_total: p.images_total(),
            images_completed: p.images_completed,
            images_failed: p.images_failed,
            images_pending: p.images_pending,
            violations_found: p.violations.total(),
            job_error: p
                .job
                .as_ref()
                .and_then(|j| j.last_error.clone())
                .unwrap_or_default(),
        }
    }
}

pub struct CountsView {
    pub pending: i64,
    pub confirmed: i64,
    pub rejected: i64,
    pub total: i64,
}

impl From<&StatusCounts> for CountsView {
    fn from(c: &StatusCounts) -> Self {
        Self {
            pending: c.pending,
            confirmed: c.confirmed,
            rejected: c.rejected,
            total: c.total(),
        }
    }
}

/// One step of the review queue, flattened for the card template.
pub struct ReviewView {
    pub complete: bool,
    pub index: usize,
    pub position: usize,
    pub next_pos: usize,
    pub total: usize,
    pub counts: CountsView,
    pub violation: Vec<ViolationView>,
}

impl From<&QueueStep> for ReviewView {
    fn from(step: &QueueStep) -> Self {
        match step {
            QueueStep::Next {
                index,
                violation,
                regulations,
                counts,
                total,
            } => Self {
                complete: false,
                index: *index,
                position: index + 1,
                next_pos: index + 1,
                total: *total,
                counts: CountsView::from(counts),
                violation: vec![ViolationView::new(violation, regulations)],
            },
            QueueStep::Complete { counts } => Self {
                complete: true,
                index: 0,
                position: 0,
                next_pos: 0,
                total: counts.total() as usize,
                counts: CountsView::from(counts),
                violation: Vec::new(),
            },
        }
    }
}

pub struct JobRow {
    pub id: String,
    pub job_type: String,
    pub status: String,
    pub attempts: i32,
    pub max_attempts: i32,
    pub last_error: String,
    pub run_at: String,
    pub created: String,
    pub can_retry: bool,
}

impl From<&Job> for JobRow {
    fn from(j: &Job) -> Self {
        Self {
            id: j.id.clone(),
            job_type: j.job_type.clone(),
            status: j.status.as_str().to_string(),
            attempts: j.attempts,
            max_attempts: j.max_attempts,
            last_error: or_empty(&j.last_error),
            run_at: format_timestamp(j.run_at),
            created: format_timestamp(j.created_at),
            can_retry: j.status == crate::models::JobStatus::Failed,
        }
    }
}

pub struct UserRow {
    pub email: String,
    pub name: String,
    pub company: String,
    pub subscription: String,
    pub tier: String,
    pub is_admin: bool,
    pub created: String,
}

impl From<&User> for UserRow {
    fn from(u: &User) -> Self {
        Self {
            email: u.email.clone(),
            name: u.name.clone(),
            company: or_empty(&u.company_name),
            subscription: u.subscription_status.as_str().to_string(),
            tier: u.subscription_tier.as_str().to_string(),
            is_admin: u.is_admin,
            created: format_timestamp(u.created_at),
        }
    }
}

/// Dashboard tile per inspection status.
pub struct StatusTile {
    pub status: String,
    pub label: String,
    pub count: i64,
}

pub fn status_choices(current: &str, with_all: bool) -> Vec<Choice> {
    let mut choices = Vec::new();
    if with_all {
        choices.push(Choice::new("", "All statuses", current));
    }
    choices.extend(
        InspectionStatus::ALL
            .iter()
            .map(|s| Choice::new(s.as_str(), s.label(), current)),
    );
    choices
}

/// Values echoed back into a form.
#[derive(Default)]
pub struct FormValues {
    pub name: String,
    pub title: String,
    pub client_id: String,
    pub site_id: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub address_line1: String,
    pub address_line2: String,
    pub city: String,
    pub state: String,
    pub postal_code: String,
    pub inspection_date: String,
    pub weather_conditions: String,
    pub temperature_f: String,
    pub notes: String,
}

// --- pages ---

#[derive(Template)]
#[template(path = "error.html")]
pub struct ErrorTemplate<'a> {
    pub title: &'a str,
    pub nav: Option<NavUser>,
    pub code: &'a str,
    pub message: &'a str,
    pub fields: &'a [FieldError],
}

#[derive(Template)]
#[template(path = "error_fragment.html")]
pub struct ErrorFragment<'a> {
    pub message: &'a str,
    pub fields: &'a [FieldError],
}

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginTemplate {
    pub title: &'static str,
    pub nav: Option<NavUser>,
    pub email: String,
    pub next: String,
    pub error: String,
}

#[derive(Template)]
#[template(path = "register.html")]
pub struct RegisterTemplate {
    pub title: &'static str,
    pub nav: Option<NavUser>,
    pub email: String,
    pub name: String,
    pub errors: Vec<FieldError>,
}

#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardTemplate {
    pub title: &'static str,
    pub nav: Option<NavUser>,
    pub tiles: Vec<StatusTile>,
    pub recent: Vec<InspectionRow>,
    pub reports: Vec<ReportRow>,
}

#[derive(Template)]
#[template(path = "profile.html")]
pub struct ProfileTemplate {
    pub title: &'static str,
    pub nav: Option<NavUser>,
    pub email: String,
    pub name: String,
    pub company_name: String,
    pub license_number: String,
    pub phone: String,
    pub subscription: String,
    pub tier: String,
    pub errors: Vec<FieldError>,
    pub saved: bool,
}

#[derive(Template)]
#[template(path = "clients.html")]
pub struct ClientsTemplate {
    pub title: &'static str,
    pub nav: Option<NavUser>,
    pub q: String,
    pub clients: Vec<ClientRow>,
    pub pager: Pager,
}

#[derive(Template)]
#[template(path = "client_form.html")]
pub struct ClientFormTemplate {
    pub title: String,
    pub nav: Option<NavUser>,
    pub action: String,
    pub values: FormValues,
    pub errors: Vec<FieldError>,
}

#[derive(Template)]
#[template(path = "client_detail.html")]
pub struct ClientDetailTemplate {
    pub title: String,
    pub nav: Option<NavUser>,
    pub client: ClientRow,
    pub inspections: Vec<InspectionRow>,
}

#[derive(Template)]
#[template(path = "sites.html")]
pub struct SitesTemplate {
    pub title: &'static str,
    pub nav: Option<NavUser>,
    pub q: String,
    pub sites: Vec<SiteRow>,
    pub pager: Pager,
}

#[derive(Template)]
#[template(path = "site_form.html")]
pub struct SiteFormTemplate {
    pub title: String,
    pub nav: Option<NavUser>,
    pub action: String,
    pub values: FormValues,
    pub clients: Vec<Choice>,
    pub errors: Vec<FieldError>,
}

#[derive(Template)]
#[template(path = "site_detail.html")]
pub struct SiteDetailTemplate {
    pub title: String,
    pub nav: Option<NavUser>,
    pub site: SiteRow,
    pub client_name: String,
}

#[derive(Template)]
#[template(path = "inspections.html")]
pub struct InspectionsTemplate {
    pub title: &'static str,
    pub nav: Option<NavUser>,
    pub q: String,
    pub statuses: Vec<Choice>,
    pub inspections: Vec<InspectionRow>,
    pub pager: Pager,
}

#[derive(Template)]
#[template(path = "inspection_form.html")]
pub struct InspectionFormTemplate {
    pub title: String,
    pub nav: Option<NavUser>,
    pub action: String,
    pub values: FormValues,
    pub clients: Vec<Choice>,
    pub errors: Vec<FieldError>,
}

#[derive(Template)]
#[template(path = "inspection_detail.html")]
pub struct InspectionDetailTemplate {
    pub title: String,
    pub nav: Option<NavUser>,
    pub inspection: InspectionRow,
    pub client_name: String,
    pub statuses: Vec<Choice>,
    pub images: Vec<ImageView>,
    pub violations: Vec<ViolationView>,
    pub counts: CountsView,
    pub reports: Vec<ReportRow>,
    pub progress: ProgressView,
    pub can_add_photos: bool,
    pub can_analyze: bool,
    pub can_report: bool,
}

#[derive(Template)]
#[template(path = "analysis_status.html")]
pub struct AnalysisStatusTemplate {
    pub progress: ProgressView,
}

#[derive(Template)]
#[template(path = "violation_row.html")]
pub struct ViolationRowTemplate {
    pub v: ViolationView,
}

#[derive(Template)]
#[template(path = "review.html")]
pub struct ReviewTemplate {
    pub title: String,
    pub nav: Option<NavUser>,
    pub inspection_id: String,
    pub inspection_title: String,
    pub step: ReviewView,
}

#[derive(Template)]
#[template(path = "review_card.html")]
pub struct ReviewCardTemplate {
    pub inspection_id: String,
    pub inspection_title: String,
    pub step: ReviewView,
}

#[derive(Template)]
#[template(path = "regulations.html")]
pub struct RegulationsTemplate {
    pub title: &'static str,
    pub nav: Option<NavUser>,
    pub q: String,
    pub categories: Vec<Choice>,
    pub regulations: Vec<RegulationRow>,
    pub pager: Pager,
}

#[derive(Template)]
#[template(path = "regulation_detail.html")]
pub struct RegulationDetailTemplate {
    pub title: String,
    pub nav: Option<NavUser>,
    pub regulation: RegulationRow,
    pub full_text: String,
}

#[derive(Template)]
#[template(path = "report.html")]
pub struct ReportTemplate {
    pub title: String,
    pub nav: Option<NavUser>,
    pub inspection_title: String,
    pub report: ReportRow,
}

#[derive(Template)]
#[template(path = "report_status.html")]
pub struct ReportStatusTemplate {
    pub report: ReportRow,
}

/// Counters on the admin overview.
#[derive(Debug, Clone, Default)]
pub struct AdminStats {
    pub users: i64,
    pub regulations: i64,
    pub jobs_pending: i64,
    pub jobs_running: i64,
    pub jobs_failed: i64,
    pub jobs_completed: i64,
}

#[derive(Template)]
#[template(path = "admin.html")]
pub struct AdminTemplate {
    pub title: &'static str,
    pub nav: Option<NavUser>,
    pub stats: AdminStats,
    pub users: Vec<UserRow>,
}

#[derive(Template)]
#[template(path = "admin_jobs.html")]
pub struct AdminJobsTemplate {
    pub title: &'static str,
    pub nav: Option<NavUser>,
    pub statuses: Vec<Choice>,
    pub jobs: Vec<JobRow>,
}
