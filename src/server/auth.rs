//! Session cookies and the user extractors.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use chrono::{DateTime, Utc};

use super::htmx::{is_htmx, HX_REDIRECT};
use super::AppState;
use crate::error::AppError;
use crate::models::User;

pub const SESSION_COOKIE: &str = "session";

/// Value of one cookie from the `Cookie` header.
pub fn cookie_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v)
}

pub fn session_cookie(token: &str, expires: DateTime<Utc>, secure: bool) -> String {
    let max_age = (expires - Utc::now()).num_seconds().max(0);
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}{}",
        SESSION_COOKIE,
        token,
        max_age,
        if secure { "; Secure" } else { "" }
    )
}

pub fn clear_session_cookie(secure: bool) -> String {
    format!(
        "{}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0{}",
        SESSION_COOKIE,
        if secure { "; Secure" } else { "" }
    )
}

/// Whether the client expects JSON rather than pages.
pub fn wants_json(path: &str, headers: &HeaderMap) -> bool {
    if path.starts_with("/api/") {
        return true;
    }
    let accept = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    accept.contains("application/json") && !accept.contains("text/html")
}

/// The signed-in user.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

/// The signed-in user, who must be an admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub User);

/// Why a request has no usable session.
pub enum AuthRejection {
    Login { next: String, htmx: bool },
    Api,
    Error(AppError),
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::Login { next, htmx } => {
                let target = format!("/login?next={}", urlencoding::encode(&next));
                if htmx {
                    let mut response = StatusCode::UNAUTHORIZED.into_response();
                    if let Ok(value) = HeaderValue::from_str(&target) {
                        response.headers_mut().insert(HX_REDIRECT, value);
                    }
                    response
                } else {
                    Redirect::to(&target).into_response()
                }
            }
            Self::Api => AppError::Unauthorized("Sign in required".to_string()).into_response(),
            Self::Error(e) => e.into_response(),
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<CurrentUser>() {
            return Ok(user.clone());
        }

        let token = cookie_value(&parts.headers, SESSION_COOKIE).unwrap_or("");
        let user = state
            .services
            .auth
            .resolve_session(token)
            .await
            .map_err(AuthRejection::Error)?;

        match user {
            Some(user) => {
                let current = CurrentUser(user);
                parts.extensions.insert(current.clone());
                Ok(current)
            }
            None if wants_json(parts.uri.path(), &parts.headers) => Err(AuthRejection::Api),
            None => {
                let next = parts
                    .uri
                    .path_and_query()
                    .map(|pq| pq.as_str().to_string())
                    .unwrap_or_else(|| "/dashboard".to_string());
                Err(AuthRejection::Login {
                    next,
                    htmx: is_htmx(&parts.headers),
                })
            }
        }
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;
        if !user.is_admin {
            return Err(AuthRejection::Error(AppError::Forbidden(
                "Administrator access required".to_string(),
            )));
        }
        Ok(AdminUser(user))
    }
}

/// Optional session lookup for pages that render for both visitors and
/// signed-in users.
pub async fn optional_user(state: &AppState, headers: &HeaderMap) -> Option<User> {
    let token = cookie_value(headers, SESSION_COOKIE)?;
    state.services.auth.resolve_session(token).await.ok().flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_value() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark; session=abc123"));
        assert_eq!(cookie_value(&headers, "session"), Some("abc123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie("tok", Utc::now() + chrono::Duration::hours(1), true);
        assert!(cookie.starts_with("session=tok; Path=/; HttpOnly; SameSite=Lax; Max-Age="));
        assert!(cookie.ends_with("; Secure"));
        assert!(!session_cookie("tok", Utc::now(), false).contains("Secure"));
    }

    #[test]
    fn test_wants_json() {
        let mut headers = HeaderMap::new();
        assert!(wants_json("/api/clients", &headers));
        assert!(!wants_json("/clients", &headers));
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
        assert!(wants_json("/clients", &headers));
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/json;q=0.9"),
        );
        assert!(!wants_json("/clients", &headers));
    }
}
