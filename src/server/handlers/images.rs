//! Photo upload and deletion.

use axum::extract::{Multipart, Path, State};
use axum::http::{HeaderMap, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;

use super::super::auth::{wants_json, CurrentUser};
use super::super::htmx::{redirect, HxRequest};
use super::super::AppState;
use crate::error::{AppError, AppResult, FieldError};
use crate::services::Upload;

fn multipart_error(err: axum::extract::multipart::MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::TooLarge("Upload exceeds the size limit".to_string())
    } else {
        AppError::invalid(err.body_text())
    }
}

/// Accepts one or more `file` fields.
pub async fn upload_images(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    hx: HxRequest,
    Path(id): Path<String>,
    uri: Uri,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> AppResult<Response> {
    let mut uploaded = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or("").to_string();
        let content_type = field.content_type().map(str::to_string);
        let bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
        if bytes.is_empty() && filename.is_empty() {
            continue;
        }
        let image = state
            .services
            .images
            .upload(
                &user.id,
                &id,
                Upload {
                    filename,
                    content_type,
                    bytes,
                },
            )
            .await?;
        uploaded.push(image);
    }

    if uploaded.is_empty() {
        return Err(AppError::validation(vec![FieldError::new(
            "file",
            "Choose at least one photo",
        )]));
    }

    if wants_json(uri.path(), &headers) {
        return Ok((StatusCode::CREATED, Json(uploaded)).into_response());
    }
    Ok(redirect(hx, &format!("/inspections/{}", id)))
}

pub async fn delete_image(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    state.services.images.delete(&user.id, &id).await?;
    // htmx swaps the empty body over the photo's figure.
    Ok(StatusCode::OK.into_response())
}
