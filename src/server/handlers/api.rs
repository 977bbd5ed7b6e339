//! JSON API for programmatic clients. Read-only views over the same
//! services the pages use; errors use the JSON envelope.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Serialize;

use super::super::auth::CurrentUser;
use super::super::AppState;
use super::helpers::ListParams;
use crate::error::{AppError, AppResult, FieldError};
use crate::models::{
    Client, Image, Inspection, InspectionStatus, LinkedRegulation, Page, Report, StatusCounts,
    Violation,
};
use crate::repository::InspectionFilter;

pub async fn api_clients(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<Client>>> {
    let page = state
        .services
        .clients
        .list(&user.id, Some(params.q()), params.page)
        .await?;
    Ok(Json(page))
}

pub async fn api_inspections(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(params): Query<ListParams>,
) -> AppResult<Json<Page<Inspection>>> {
    let status = match params.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(s) => Some(InspectionStatus::from_str(s).ok_or_else(|| {
            AppError::validation(vec![FieldError::new("status", "Unknown status")])
        })?),
    };
    let filter = InspectionFilter {
        q: Some(params.q().to_string()).filter(|q| !q.is_empty()),
        status,
        client_id: None,
    };
    let page = state.services.inspections.list(&user.id, &filter, params.page).await?;
    Ok(Json(page))
}

#[derive(Serialize)]
pub struct InspectionDetail {
    #[serde(flatten)]
    pub inspection: Inspection,
    pub images: Vec<Image>,
    pub violation_counts: StatusCounts,
    pub reports: Vec<Report>,
}

pub async fn api_inspection(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<InspectionDetail>> {
    let services = &state.services;
    let inspection = services.inspections.get(&user.id, &id).await?;
    let (images, counts, reports) = tokio::join!(
        services.images.list(&user.id, &id),
        services.violations.counts(&user.id, &id),
        services.reports.list_for_inspection(&user.id, &id),
    );
    Ok(Json(InspectionDetail {
        inspection,
        images: images?,
        violation_counts: counts?,
        reports: reports?,
    }))
}

#[derive(Serialize)]
pub struct ViolationWithRegulations {
    #[serde(flatten)]
    pub violation: Violation,
    pub regulations: Vec<LinkedRegulation>,
}

pub async fn api_inspection_violations(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Vec<ViolationWithRegulations>>> {
    let violations = state.services.violations.list(&user.id, &id).await?;
    let mut links = state
        .ctx
        .violations()
        .linked_regulations_for_inspection(&id, &user.id)
        .await?;
    Ok(Json(
        violations
            .into_iter()
            .map(|violation| ViolationWithRegulations {
                regulations: links.remove(&violation.id).unwrap_or_default(),
                violation,
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};

    use super::super::super::test_support::{body_json, TestApp};
    use crate::models::NewInspection;

    #[tokio::test]
    async fn test_api_requires_session_with_json_error() {
        let app = TestApp::new().await;
        let response = app
            .send(
                Request::builder()
                    .uri("/api/inspections")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let json = body_json(response).await;
        assert_eq!(json["error"]["code"], "EUNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_api_is_tenant_scoped() {
        let app = TestApp::new().await;
        let (owner, owner_cookie) = app.login("owner@example.com").await;
        let (_, other_cookie) = app.login("other@example.com").await;
        let inspection = app
            .state
            .services
            .inspections
            .create(
                &owner.id,
                NewInspection {
                    title: "Roof edge".into(),
                    inspection_date: "2026-05-01".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let get = |uri: String, cookie: &str| {
            Request::builder()
                .uri(uri)
                .header(header::COOKIE, cookie)
                .body(Body::empty())
                .unwrap()
        };

        let response = app.send(get("/api/inspections".into(), &owner_cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["total"], 1);
        assert_eq!(json["items"][0]["title"], "Roof edge");

        let response = app.send(get("/api/inspections".into(), &other_cookie)).await;
        assert_eq!(body_json(response).await["total"], 0);

        let response = app
            .send(get(format!("/api/inspections/{}", inspection.id), &other_cookie))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "ENOTFOUND");

        let response = app
            .send(get(format!("/api/inspections/{}/violations", inspection.id), &owner_cookie))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await.as_array().unwrap().len(), 0);
    }
}
