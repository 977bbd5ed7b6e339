//! Report requests, status polling and downloads.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use serde::Deserialize;

use super::super::auth::{wants_json, CurrentUser};
use super::super::htmx::{redirect, HxRequest};
use super::super::template_structs::{NavUser, ReportRow, ReportStatusTemplate, ReportTemplate};
use super::super::AppState;
use super::helpers::render;
use crate::error::AppResult;

#[derive(Debug, Deserialize)]
pub struct DownloadParams {
    pub format: Option<String>,
}

pub async fn request_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    hx: HxRequest,
    Path(inspection_id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> AppResult<Response> {
    let report = state
        .services
        .reports
        .request(&user.id, &inspection_id)
        .await?;
    if wants_json(uri.path(), &headers) {
        return Ok((StatusCode::ACCEPTED, Json(report)).into_response());
    }
    Ok(redirect(hx, &format!("/reports/{}", report.id)))
}

pub async fn report_page(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let report = state.services.reports.get(&user.id, &id).await?;
    let inspection = state
        .services
        .inspections
        .get(&user.id, &report.inspection_id)
        .await?;
    render(&ReportTemplate {
        title: format!("Report: {}", inspection.title),
        nav: Some(NavUser::from(&user)),
        inspection_title: inspection.title,
        report: ReportRow::from(&report),
    })
}

/// Polled by the report page until generation finishes.
pub async fn report_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> AppResult<Response> {
    let report = state.services.reports.get(&user.id, &id).await?;
    if wants_json(uri.path(), &headers) {
        return Ok(Json(report).into_response());
    }
    render(&ReportStatusTemplate {
        report: ReportRow::from(&report),
    })
}

/// Redirect to a short-lived signed link for the requested format.
pub async fn download_report(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Query(params): Query<DownloadParams>,
) -> AppResult<Response> {
    let (_, url) = state
        .services
        .reports
        .download_url(&user.id, &id, params.format.as_deref())
        .await?;
    Ok(Redirect::to(&url).into_response())
}
