//! HTTP request handlers for the web server.

mod admin;
mod api;
mod auth;
mod clients;
mod dashboard;
mod helpers;
mod images;
mod inspections;
mod regulations;
mod reports;
mod sites;
mod static_files;
mod violations;
mod webhooks;

// Re-export handlers for use by the router
pub use admin::{admin_index, admin_jobs, retry_job};
pub use api::{api_clients, api_inspection, api_inspection_violations, api_inspections};
pub use auth::{
    login, login_page, logout, profile_page, register, register_page, root, update_profile,
};
pub use clients::{
    client_detail, create_client, delete_client, edit_client, list_clients, new_client,
    submit_client, update_client,
};
pub use dashboard::dashboard;
pub use images::{delete_image, upload_images};
pub use inspections::{
    analysis_status, create_inspection, delete_inspection, edit_inspection, inspection_detail,
    list_inspections, new_inspection, review, start_analysis, submit_inspection,
    update_inspection, update_status,
};
pub use regulations::{list_regulations, regulation_detail};
pub use reports::{download_report, report_page, report_status, request_report};
pub use sites::{
    create_site, delete_site, edit_site, list_sites, new_site, site_detail, submit_site,
    update_site,
};
pub use static_files::{healthz, serve_css, serve_file, serve_js};
pub use violations::{
    create_violation, delete_violation, link_regulation, set_violation_status, unlink_regulation,
    update_violation,
};
pub use webhooks::stripe_webhook;
