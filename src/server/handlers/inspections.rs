//! Inspection pages, status changes, analysis and the review queue.

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Form, Json};
use serde::Deserialize;

use super::super::auth::{wants_json, CurrentUser};
use super::super::htmx::{redirect, HxRequest};
use super::super::template_structs::{
    status_choices, AnalysisStatusTemplate, Choice, CountsView, FormValues, ImageView,
    InspectionDetailTemplate, InspectionFormTemplate, InspectionRow, InspectionsTemplate, NavUser,
    Pager, ProgressView, ReportRow, ReviewCardTemplate, ReviewTemplate, ReviewView, ViolationView,
};
use super::super::AppState;
use super::helpers::{echo, form_errors, query_suffix, render, render_status, ListParams};
use crate::error::{AppError, AppResult, FieldError};
use crate::models::{Inspection, InspectionStatus, InspectionUpdate, NewInspection, User};
use crate::repository::InspectionFilter;
use crate::services::QueueAction;

fn values_from_input(input: &NewInspection) -> FormValues {
    FormValues {
        title: input.title.clone(),
        client_id: echo(&input.client_id),
        site_id: echo(&input.site_id),
        address_line1: echo(&input.address_line1),
        address_line2: echo(&input.address_line2),
        city: echo(&input.city),
        state: echo(&input.state),
        postal_code: echo(&input.postal_code),
        inspection_date: input.inspection_date.clone(),
        weather_conditions: echo(&input.weather_conditions),
        temperature_f: echo(&input.temperature_f),
        notes: echo(&input.inspector_notes),
        ..Default::default()
    }
}

fn values_from_inspection(i: &Inspection) -> FormValues {
    FormValues {
        title: i.title.clone(),
        client_id: echo(&i.client_id),
        site_id: echo(&i.site_id),
        address_line1: echo(&i.address_line1),
        address_line2: echo(&i.address_line2),
        city: echo(&i.city),
        state: echo(&i.state),
        postal_code: echo(&i.postal_code),
        inspection_date: i.inspection_date.format("%Y-%m-%d").to_string(),
        weather_conditions: echo(&i.weather_conditions),
        temperature_f: i.temperature_f.map(|t| t.to_string()).unwrap_or_default(),
        notes: echo(&i.inspector_notes),
        ..Default::default()
    }
}

fn update_from_form(input: NewInspection) -> InspectionUpdate {
    InspectionUpdate {
        title: Some(input.title),
        client_id: Some(echo(&input.client_id)),
        address_line1: Some(echo(&input.address_line1)),
        address_line2: Some(echo(&input.address_line2)),
        city: Some(echo(&input.city)),
        state: Some(echo(&input.state)),
        postal_code: Some(echo(&input.postal_code)),
        inspection_date: Some(input.inspection_date),
        weather_conditions: Some(echo(&input.weather_conditions)),
        temperature_f: Some(echo(&input.temperature_f)),
        inspector_notes: Some(echo(&input.inspector_notes)),
    }
}

async fn form_page(
    state: &AppState,
    user: &User,
    title: &str,
    action: String,
    values: FormValues,
    errors: Vec<FieldError>,
) -> AppResult<InspectionFormTemplate> {
    let clients = state
        .services
        .clients
        .all(&user.id)
        .await?
        .iter()
        .map(|c| Choice::new(&c.id, &c.name, &values.client_id))
        .collect();
    Ok(InspectionFormTemplate {
        title: title.to_string(),
        nav: Some(NavUser::from(user)),
        action,
        values,
        clients,
        errors,
    })
}

pub async fn list_inspections(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> AppResult<Response> {
    let status_param = params.status.as_deref().unwrap_or("").trim();
    let status = match status_param {
        "" => None,
        s => Some(InspectionStatus::from_str(s).ok_or_else(|| {
            AppError::validation(vec![FieldError::new("status", "Unknown status")])
        })?),
    };
    let filter = InspectionFilter {
        q: Some(params.q().to_string()).filter(|q| !q.is_empty()),
        status,
        client_id: None,
    };
    let page = state.services.inspections.list(&user.id, &filter, params.page).await?;
    render(&InspectionsTemplate {
        title: "Inspections",
        nav: Some(NavUser::from(&user)),
        q: params.q().to_string(),
        statuses: status_choices(status_param, true),
        inspections: page.items.iter().map(InspectionRow::from).collect(),
        pager: Pager::of(
            &page,
            query_suffix(&[("q", params.q()), ("status", status_param)]),
        ),
    })
}

pub async fn new_inspection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> AppResult<Response> {
    let values = FormValues {
        inspection_date: chrono::Local::now().format("%Y-%m-%d").to_string(),
        ..Default::default()
    };
    let page = form_page(&state, &user, "New inspection", "/inspections".to_string(), values, Vec::new())
        .await?;
    render(&page)
}

pub async fn create_inspection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(input): Form<NewInspection>,
) -> AppResult<Response> {
    match state.services.inspections.create(&user.id, input.clone()).await {
        Ok(inspection) => {
            Ok(Redirect::to(&format!("/inspections/{}", inspection.id)).into_response())
        }
        Err(err) => {
            let errors = form_errors(err)?;
            let page = form_page(
                &state,
                &user,
                "New inspection",
                "/inspections".to_string(),
                values_from_input(&input),
                errors,
            )
            .await?;
            render_status(StatusCode::UNPROCESSABLE_ENTITY, &page)
        }
    }
}

pub async fn inspection_detail(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let services = &state.services;
    let inspection = services.inspections.get(&user.id, &id).await?;

    let client_name = match inspection.client_id.as_deref() {
        Some(client_id) => services.clients.get(&user.id, client_id).await?.name,
        None => String::new(),
    };

    let images = services.images.list(&user.id, &id).await?;
    let image_views = images
        .iter()
        .map(|img| Ok(ImageView::new(img, services.images.urls(img)?)))
        .collect::<AppResult<Vec<_>>>()?;

    let violations = services.violations.list(&user.id, &id).await?;
    let links = state
        .ctx
        .violations()
        .linked_regulations_for_inspection(&id, &user.id)
        .await?;
    let empty = Vec::new();
    let violation_views = violations
        .iter()
        .map(|v| ViolationView::new(v, links.get(&v.id).unwrap_or(&empty)))
        .collect();

    let progress = services.inspections.analysis_status(&user.id, &id).await?;
    let reports = services.reports.list_for_inspection(&user.id, &id).await?;

    let status = inspection.status;
    let statuses = InspectionStatus::ALL
        .iter()
        .filter(|s| status.can_transition_to(**s))
        .map(|s| Choice::new(s.as_str(), s.label(), status.as_str()))
        .collect();

    render(&InspectionDetailTemplate {
        title: inspection.title.clone(),
        nav: Some(NavUser::from(&user)),
        inspection: InspectionRow::from(&inspection),
        client_name,
        statuses,
        images: image_views,
        violations: violation_views,
        counts: CountsView::from(&progress.violations),
        reports: reports.iter().map(ReportRow::from).collect(),
        can_add_photos: status.can_add_photos(),
        can_analyze: status.can_start_analysis() && progress.images_pending > 0,
        can_report: status.can_generate_report() && progress.violations.confirmed > 0,
        progress: ProgressView::new(&id, &progress),
    })
}

pub async fn edit_inspection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let inspection = state.services.inspections.get(&user.id, &id).await?;
    let page = form_page(
        &state,
        &user,
        "Edit inspection",
        format!("/inspections/{}", inspection.id),
        values_from_inspection(&inspection),
        Vec::new(),
    )
    .await?;
    render(&page)
}

pub async fn submit_inspection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Form(input): Form<NewInspection>,
) -> AppResult<Response> {
    let values = values_from_input(&input);
    match state
        .services
        .inspections
        .update(&user.id, &id, update_from_form(input))
        .await
    {
        Ok(inspection) => {
            Ok(Redirect::to(&format!("/inspections/{}", inspection.id)).into_response())
        }
        Err(err) => {
            let errors = form_errors(err)?;
            let page = form_page(
                &state,
                &user,
                "Edit inspection",
                format!("/inspections/{}", id),
                values,
                errors,
            )
            .await?;
            render_status(StatusCode::UNPROCESSABLE_ENTITY, &page)
        }
    }
}

pub async fn update_inspection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    hx: HxRequest,
    Path(id): Path<String>,
    Form(input): Form<InspectionUpdate>,
) -> AppResult<Response> {
    let inspection = state.services.inspections.update(&user.id, &id, input).await?;
    Ok(redirect(hx, &format!("/inspections/{}", inspection.id)))
}

pub async fn delete_inspection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    hx: HxRequest,
    Path(id): Path<String>,
) -> AppResult<Response> {
    state.services.inspections.delete(&user.id, &id).await?;
    Ok(redirect(hx, "/inspections"))
}

#[derive(Debug, Deserialize)]
pub struct StatusForm {
    #[serde(default)]
    pub status: String,
}

pub async fn update_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    hx: HxRequest,
    Path(id): Path<String>,
    Form(form): Form<StatusForm>,
) -> AppResult<Response> {
    let inspection = state
        .services
        .inspections
        .update_status(&user.id, &id, &form.status)
        .await?;
    Ok(redirect(hx, &format!("/inspections/{}", inspection.id)))
}

async fn progress_response(
    state: &AppState,
    user: &User,
    id: &str,
    uri: &Uri,
    headers: &HeaderMap,
) -> AppResult<Response> {
    let progress = state.services.inspections.analysis_status(&user.id, id).await?;
    if wants_json(uri.path(), headers) {
        return Ok(Json(progress).into_response());
    }
    render(&AnalysisStatusTemplate {
        progress: ProgressView::new(id, &progress),
    })
}

pub async fn start_analysis(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    hx: HxRequest,
    Path(id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> AppResult<Response> {
    state.services.inspections.start_analysis(&user, &id).await?;
    if !hx.0 && !wants_json(uri.path(), &headers) {
        return Ok(Redirect::to(&format!("/inspections/{}", id)).into_response());
    }
    let mut response = progress_response(&state, &user, &id, &uri, &headers).await?;
    *response.status_mut() = StatusCode::ACCEPTED;
    Ok(response)
}

pub async fn analysis_status(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
) -> AppResult<Response> {
    progress_response(&state, &user, &id, &uri, &headers).await
}

#[derive(Debug, Default, Deserialize)]
pub struct ReviewParams {
    pub pos: Option<i64>,
    pub violation_id: Option<String>,
    pub action: Option<String>,
}

pub async fn review(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    hx: HxRequest,
    Path(id): Path<String>,
    Query(params): Query<ReviewParams>,
) -> AppResult<Response> {
    let inspection = state.services.inspections.get(&user.id, &id).await?;

    let decision = match (params.violation_id.as_deref(), params.action.as_deref()) {
        (Some(violation_id), Some(action)) if !violation_id.is_empty() => {
            let action = QueueAction::from_str(action.trim()).ok_or_else(|| {
                AppError::validation(vec![FieldError::new("action", "Use accept or reject")])
            })?;
            Some((violation_id, action))
        }
        _ => None,
    };

    let step = state
        .services
        .violations
        .review_queue(&user.id, &id, params.pos, decision)
        .await?;
    let step = ReviewView::from(&step);

    if hx.0 {
        render(&ReviewCardTemplate {
            inspection_id: inspection.id,
            inspection_title: inspection.title,
            step,
        })
    } else {
        render(&ReviewTemplate {
            title: format!("Review: {}", inspection.title),
            nav: Some(NavUser::from(&user)),
            inspection_id: inspection.id,
            inspection_title: inspection.title,
            step,
        })
    }
}
