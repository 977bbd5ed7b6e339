//! Violation edits and regulation links. Mutations answer with the
//! re-rendered violation row so htmx can swap it in place.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::{Form, Json};
use serde::Deserialize;

use super::super::auth::{wants_json, CurrentUser};
use super::super::htmx::{hx_trigger, redirect, HxRequest};
use super::super::template_structs::{ViolationRowTemplate, ViolationView};
use super::super::AppState;
use super::helpers::render;
use crate::error::AppResult;
use crate::models::{LinkedRegulation, NewViolation, Violation, ViolationUpdate};

/// Client event fired whenever violation counts may have changed.
const VIOLATION_UPDATED: &str = "violation-updated";

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    #[serde(default)]
    pub status: String,
}

#[derive(serde::Serialize)]
struct ViolationJson<'a> {
    violation: &'a Violation,
    regulations: &'a [LinkedRegulation],
}

async fn row_response(
    state: &AppState,
    user_id: &str,
    violation: &Violation,
    json: bool,
) -> AppResult<Response> {
    let regulations = state.services.violations.regulations(user_id, &violation.id).await?;
    if json {
        return Ok(Json(ViolationJson {
            violation,
            regulations: &regulations,
        })
        .into_response());
    }
    render(&ViolationRowTemplate {
        v: ViolationView::new(violation, &regulations),
    })
}

pub async fn create_violation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    hx: HxRequest,
    Path(inspection_id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    Form(input): Form<NewViolation>,
) -> AppResult<Response> {
    let violation = state
        .services
        .violations
        .create(&user.id, &inspection_id, input)
        .await?;
    let json = wants_json(uri.path(), &headers);
    if !hx.0 && !json {
        return Ok(redirect(hx, &format!("/inspections/{}", inspection_id)));
    }
    let mut response = row_response(&state, &user.id, &violation, json).await?;
    *response.status_mut() = StatusCode::CREATED;
    Ok(hx_trigger(response, VIOLATION_UPDATED))
}

pub async fn update_violation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    Form(input): Form<ViolationUpdate>,
) -> AppResult<Response> {
    let violation = state.services.violations.update(&user.id, &id, input).await?;
    row_response(&state, &user.id, &violation, wants_json(uri.path(), &headers)).await
}

pub async fn set_violation_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    Form(form): Form<StatusForm>,
) -> AppResult<Response> {
    let violation = state
        .services
        .violations
        .set_status(&user.id, &id, &form.status)
        .await?;
    let response = row_response(&state, &user.id, &violation, wants_json(uri.path(), &headers)).await?;
    Ok(hx_trigger(response, VIOLATION_UPDATED))
}

pub async fn delete_violation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    state.services.violations.delete(&user.id, &id).await?;
    Ok(hx_trigger(StatusCode::OK, VIOLATION_UPDATED))
}

pub async fn link_regulation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, regulation_id)): Path<(String, String)>,
    uri: Uri,
    headers: HeaderMap,
) -> AppResult<Response> {
    state
        .services
        .violations
        .link_regulation(&user.id, &id, &regulation_id)
        .await?;
    let violation = state.services.violations.get(&user.id, &id).await?;
    row_response(&state, &user.id, &violation, wants_json(uri.path(), &headers)).await
}

pub async fn unlink_regulation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, regulation_id)): Path<(String, String)>,
    uri: Uri,
    headers: HeaderMap,
) -> AppResult<Response> {
    state
        .services
        .violations
        .unlink_regulation(&user.id, &id, &regulation_id)
        .await?;
    let violation = state.services.violations.get(&user.id, &id).await?;
    row_response(&state, &user.id, &violation, wants_json(uri.path(), &headers)).await
}
