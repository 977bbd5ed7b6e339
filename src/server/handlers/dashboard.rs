//! Dashboard page.

use axum::extract::State;
use axum::response::Response;

use super::super::auth::CurrentUser;
use super::super::template_structs::{DashboardTemplate, InspectionRow, NavUser, ReportRow, StatusTile};
use super::super::AppState;
use super::helpers::render;
use crate::error::AppResult;
use crate::models::InspectionStatus;
use crate::repository::InspectionFilter;

const RECENT_LIMIT: usize = 5;

pub async fn dashboard(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let services = &state.services;
    let filter = InspectionFilter::default();
    let (counts, recent, reports) = tokio::join!(
        services.inspections.status_counts(&user.id),
        services.inspections.list(&user.id, &filter, None),
        services.reports.recent(&user.id, RECENT_LIMIT as i64),
    );
    let counts = counts?;

    let tiles = InspectionStatus::ALL
        .iter()
        .map(|s| StatusTile {
            status: s.as_str().to_string(),
            label: s.label().to_string(),
            count: counts.get(s).copied().unwrap_or(0),
        })
        .collect();

    render(&DashboardTemplate {
        title: "Dashboard",
        nav: Some(NavUser::from(&user)),
        tiles,
        recent: recent?
            .items
            .iter()
            .take(RECENT_LIMIT)
            .map(InspectionRow::from)
            .collect(),
        reports: reports?.iter().map(ReportRow::from).collect(),
    })
}
