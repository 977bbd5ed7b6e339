//! Signed object downloads, static assets and the health check.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;

use super::super::assets;
use super::super::AppState;
use crate::error::{AppError, AppResult};

#[derive(Debug, Deserialize)]
pub struct SignedParams {
    pub expires: Option<i64>,
    pub sig: Option<String>,
}

/// Serve a stored object behind a signed, expiring link.
pub async fn serve_file(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(params): Query<SignedParams>,
) -> AppResult<Response> {
    let (Some(expires), Some(sig)) = (params.expires, params.sig.as_deref()) else {
        return Err(AppError::Forbidden("Invalid or tampered link".to_string()));
    };
    state.signer.verify(&key, expires, sig)?;

    let (bytes, info) = state.storage.get(&key).await?;
    let filename = key.rsplit('/').next().unwrap_or("download");
    Ok((
        [
            (header::CONTENT_TYPE, info.content_type),
            (
                header::CONTENT_DISPOSITION,
                format!("inline; filename=\"{}\"", filename),
            ),
            (header::CACHE_CONTROL, "private, max-age=300".to_string()),
        ],
        bytes,
    )
        .into_response())
}

/// Serve CSS.
pub async fn serve_css() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "text/css")], assets::CSS)
}

/// Serve JavaScript.
pub async fn serve_js() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/javascript")],
        assets::JS,
    )
}

/// Liveness plus a database round trip.
pub async fn healthz(State(state): State<AppState>) -> AppResult<Response> {
    state.ctx.ping().await?;
    Ok(Json(serde_json::json!({ "status": "ok" })).into_response())
}
