//! Stripe webhook endpoint.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::super::AppState;
use crate::error::{AppError, AppResult};
use crate::services::WebhookOutcome;

const SIGNATURE_HEADER: &str = "stripe-signature";

pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Response> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing webhook signature".to_string()))?;

    let outcome = state.services.billing.handle_webhook(&body, signature).await?;
    let applied = matches!(outcome, WebhookOutcome::Applied { .. });
    Ok(Json(serde_json::json!({ "received": true, "applied": applied })).into_response())
}
