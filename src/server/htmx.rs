//! htmx request detection and response headers.

use std::convert::Infallible;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};

pub const HX_REQUEST: HeaderName = HeaderName::from_static("hx-request");
pub const HX_REDIRECT: HeaderName = HeaderName::from_static("hx-redirect");
pub const HX_TRIGGER: HeaderName = HeaderName::from_static("hx-trigger");

pub fn is_htmx(headers: &HeaderMap) -> bool {
    headers
        .get(HX_REQUEST)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "true")
}

/// Whether the request came from htmx.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HxRequest(pub bool);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for HxRequest {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(HxRequest(is_htmx(&parts.headers)))
    }
}

fn with_header(mut response: Response, name: HeaderName, value: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(value) {
        response.headers_mut().insert(name, value);
    }
    response
}

/// Full-page navigation triggered from an htmx request.
pub fn hx_redirect(url: &str) -> Response {
    with_header(StatusCode::OK.into_response(), HX_REDIRECT, url)
}

/// Fire a client-side event alongside `response`.
pub fn hx_trigger(response: impl IntoResponse, event: &str) -> Response {
    with_header(response.into_response(), HX_TRIGGER, event)
}

/// `HX-Redirect` for htmx, a 303 otherwise.
pub fn redirect(hx: HxRequest, url: &str) -> Response {
    if hx.0 {
        hx_redirect(url)
    } else {
        Redirect::to(url).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header::LOCATION;

    #[test]
    fn test_redirect_variants() {
        let response = redirect(HxRequest(true), "/clients/1");
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[HX_REDIRECT], "/clients/1");

        let response = redirect(HxRequest(false), "/clients/1");
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[LOCATION], "/clients/1");
    }

    #[test]
    fn test_trigger() {
        let response = hx_trigger(StatusCode::NO_CONTENT, "images-changed");
        assert_eq!(response.headers()[HX_TRIGGER], "images-changed");
    }

    #[test]
    fn test_is_htmx() {
        let mut headers = HeaderMap::new();
        assert!(!is_htmx(&headers));
        headers.insert(HX_REQUEST, HeaderValue::from_static("true"));
        assert!(is_htmx(&headers));
    }
}
