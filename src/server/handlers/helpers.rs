//! Shared helpers for handlers.

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;

use crate::error::{AppError, AppResult, FieldError};

/// Query parameters shared by list pages.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub status: Option<String>,
    pub category: Option<String>,
}

impl ListParams {
    pub fn q(&self) -> &str {
        self.q.as_deref().map(str::trim).unwrap_or("")
    }
}

/// Render a template to an HTML response.
pub fn render(template: &impl Template) -> AppResult<Response> {
    template
        .render()
        .map(|html| Html(html).into_response())
        .map_err(AppError::internal)
}

/// Render with an explicit status.
pub fn render_status(status: StatusCode, template: &impl Template) -> AppResult<Response> {
    let mut response = render(template)?;
    *response.status_mut() = status;
    Ok(response)
}

/// Field errors when `err` is a validation failure; any other error is
/// returned as-is so the caller can propagate it.
pub fn form_errors(err: AppError) -> Result<Vec<FieldError>, AppError> {
    match err {
        AppError::Invalid { message, fields } if fields.is_empty() => {
            Ok(vec![FieldError::new("form", message)])
        }
        AppError::Invalid { fields, .. } => Ok(fields),
        other => Err(other),
    }
}

/// Extra query parameters carried through pagination links, encoded as
/// `&k=v` pairs. Blank values are skipped.
pub fn query_suffix(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .filter(|(_, v)| !v.trim().is_empty())
        .map(|(k, v)| format!("&{}={}", k, urlencoding::encode(v.trim())))
        .collect()
}

/// Optional form string to an owned value for echoing back.
pub fn echo(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_suffix_skips_blank() {
        assert_eq!(
            query_suffix(&[("q", "fall protection"), ("status", "")]),
            "&q=fall%20protection"
        );
        assert_eq!(query_suffix(&[]), "");
    }

    #[test]
    fn test_form_errors_passthrough() {
        let fields = form_errors(AppError::validation(vec![FieldError::new("name", "Required")]))
            .unwrap();
        assert_eq!(fields[0].field, "name");

        let general = form_errors(AppError::invalid("Bad date")).unwrap();
        assert_eq!(general[0].message, "Bad date");

        let err = form_errors(AppError::Conflict("taken".into())).unwrap_err();
        assert_eq!(err.code(), "ECONFLICT");
    }
}
