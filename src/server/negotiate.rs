//! Re-render JSON error responses as HTML for browsers.
//!
//! Handlers always produce the JSON envelope. Page requests get the error
//! page instead, and htmx requests get a small fragment that `app.js`
//! swaps into the flash area.

use askama::Template;
use axum::extract::Request;
use axum::http::{header, HeaderValue};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};

use super::auth::wants_json;
use super::htmx::is_htmx;
use super::template_structs::{ErrorFragment, ErrorTemplate};
use crate::error::{ErrorPayload, RenderedError};

enum Wants {
    Json,
    Page,
    Fragment,
}

pub async fn negotiate_errors(request: Request, next: Next) -> Response {
    let wants = if wants_json(request.uri().path(), request.headers()) {
        Wants::Json
    } else if is_htmx(request.headers()) {
        Wants::Fragment
    } else {
        Wants::Page
    };

    let response = next.run(request).await;
    let Some(RenderedError(payload)) = response.extensions().get::<RenderedError>().cloned() else {
        return response;
    };

    let html = match wants {
        Wants::Json => return response,
        Wants::Page => render_page(&payload),
        Wants::Fragment => ErrorFragment {
            message: &payload.message,
            fields: &payload.fields,
        }
        .render()
        .unwrap_or_else(|_| payload.message.clone()),
    };

    let (mut parts, _) = response.into_parts();
    parts.headers.remove(header::CONTENT_LENGTH);
    parts.headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/html; charset=utf-8"),
    );
    let mut rendered = Html(html).into_response();
    *rendered.status_mut() = parts.status;
    for (name, value) in parts.headers.iter() {
        rendered.headers_mut().insert(name.clone(), value.clone());
    }
    rendered
}

/// Full error page. Field details and internal messages stay out of it.
fn render_page(payload: &ErrorPayload) -> String {
    let message = match payload.code {
        "EINVALID" => "Please correct the highlighted fields",
        "EINTERNAL" => "Something went wrong",
        _ => payload.message.as_str(),
    };
    ErrorTemplate {
        title: "Error",
        nav: None,
        code: payload.code,
        message,
        fields: &[],
    }
    .render()
    .unwrap_or_else(|e| format!("Template error: {}", e))
}
