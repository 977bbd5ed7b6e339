//! Sign-in, registration, sign-out and the profile page.

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Form;
use serde::Deserialize;

use super::super::auth::{
    clear_session_cookie, cookie_value, optional_user, session_cookie, CurrentUser, SESSION_COOKIE,
};
use super::super::template_structs::{LoginTemplate, NavUser, ProfileTemplate, RegisterTemplate};
use super::super::AppState;
use super::helpers::{echo, form_errors, render, render_status};
use crate::error::{AppError, AppResult};
use crate::models::{ProfileUpdate, User};
use crate::utils::safe_redirect_or;

const HOME: &str = "/dashboard";

#[derive(Debug, Deserialize)]
pub struct NextParam {
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub next: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub password: String,
}

/// 303 to `target` with a fresh session cookie.
async fn start_session(state: &AppState, user: &User, target: &str) -> AppResult<Response> {
    let (token, expires) = state.services.auth.create_session(&user.id).await?;
    let cookie = session_cookie(&token, expires, state.settings.secure_cookies);
    let mut response = Redirect::to(target).into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(AppError::internal)?,
    );
    Ok(response)
}

pub async fn root() -> Redirect {
    Redirect::to(HOME)
}

pub async fn login_page(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<NextParam>,
) -> AppResult<Response> {
    let next = safe_redirect_or(params.next.as_deref(), HOME).to_string();
    if optional_user(&state, &headers).await.is_some() {
        return Ok(Redirect::to(&next).into_response());
    }
    render(&LoginTemplate {
        title: "Sign in",
        nav: None,
        email: String::new(),
        next,
        error: String::new(),
    })
}

pub async fn login(State(state): State<AppState>, Form(form): Form<LoginForm>) -> AppResult<Response> {
    let next = safe_redirect_or(form.next.as_deref(), HOME).to_string();
    match state.services.auth.login(&form.email, &form.password).await {
        Ok(user) => start_session(&state, &user, &next).await,
        Err(err @ (AppError::Unauthorized(_) | AppError::RateLimited(_))) => render_status(
            err.status(),
            &LoginTemplate {
                title: "Sign in",
                nav: None,
                email: form.email.trim().to_string(),
                next,
                error: err.public_message(),
            },
        ),
        Err(other) => Err(other),
    }
}

pub async fn register_page(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if optional_user(&state, &headers).await.is_some() {
        return Ok(Redirect::to(HOME).into_response());
    }
    render(&RegisterTemplate {
        title: "Create account",
        nav: None,
        email: String::new(),
        name: String::new(),
        errors: Vec::new(),
    })
}

pub async fn register(
    State(state): State<AppState>,
    Form(form): Form<RegisterForm>,
) -> AppResult<Response> {
    let result = state
        .services
        .auth
        .register(&form.email, &form.name, &form.password)
        .await;
    let (status, errors) = match result {
        Ok(user) => return start_session(&state, &user, HOME).await,
        Err(AppError::Conflict(message)) => (
            StatusCode::CONFLICT,
            vec![crate::error::FieldError::new("email", message)],
        ),
        Err(err) => (StatusCode::UNPROCESSABLE_ENTITY, form_errors(err)?),
    };
    render_status(
        status,
        &RegisterTemplate {
            title: "Create account",
            nav: None,
            email: form.email.trim().to_string(),
            name: form.name.trim().to_string(),
            errors,
        },
    )
}

pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Response> {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
        state.services.auth.logout(token).await?;
    }
    let mut response = Redirect::to("/login").into_response();
    response.headers_mut().insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&clear_session_cookie(state.settings.secure_cookies))
            .map_err(AppError::internal)?,
    );
    Ok(response)
}

fn profile_template(user: &User, errors: Vec<crate::error::FieldError>, saved: bool) -> ProfileTemplate {
    ProfileTemplate {
        title: "Profile",
        nav: Some(NavUser::from(user)),
        email: user.email.clone(),
        name: user.name.clone(),
        company_name: echo(&user.company_name),
        license_number: echo(&user.license_number),
        phone: echo(&user.phone),
        subscription: user.subscription_status.as_str().to_string(),
        tier: user.subscription_tier.as_str().to_string(),
        errors,
        saved,
    }
}

pub async fn profile_page(CurrentUser(user): CurrentUser) -> AppResult<Response> {
    render(&profile_template(&user, Vec::new(), false))
}

pub async fn update_profile(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Form(form): Form<ProfileUpdate>,
) -> AppResult<Response> {
    match state.services.auth.update_profile(&user.id, form.clone()).await {
        Ok(updated) => render(&profile_template(&updated, Vec::new(), true)),
        Err(err) => {
            let errors = form_errors(err)?;
            let mut echoed = user.clone();
            echoed.name = form.name.unwrap_or_default();
            echoed.company_name = form.company_name;
            echoed.license_number = form.license_number;
            echoed.phone = form.phone;
            render_status(
                StatusCode::UNPROCESSABLE_ENTITY,
                &profile_template(&echoed, errors, false),
            )
        }
    }
}
