//! Router configuration for the web server.

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post, put};
use axum::{middleware, Router};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers;
use super::negotiate;
use super::AppState;
use crate::error::AppError;

async fn not_found() -> AppError {
    AppError::not_found("Page")
}

/// Create the main router with all routes.
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.settings.max_upload_bytes;

    Router::new()
        .route("/", get(handlers::root))
        .route("/dashboard", get(handlers::dashboard))
        // Sessions and the account
        .route("/login", get(handlers::login_page).post(handlers::login))
        .route(
            "/register",
            get(handlers::register_page).post(handlers::register),
        )
        .route("/logout", post(handlers::logout))
        .route(
            "/profile",
            get(handlers::profile_page).post(handlers::update_profile),
        )
        // Clients
        .route(
            "/clients",
            get(handlers::list_clients).post(handlers::create_client),
        )
        .route("/clients/new", get(handlers::new_client))
        .route(
            "/clients/:id",
            get(handlers::client_detail)
                .post(handlers::submit_client)
                .put(handlers::update_client)
                .delete(handlers::delete_client),
        )
        .route("/clients/:id/edit", get(handlers::edit_client))
        // Sites
        .route("/sites", get(handlers::list_sites).post(handlers::create_site))
        .route("/sites/new", get(handlers::new_site))
        .route(
            "/sites/:id",
            get(handlers::site_detail)
                .post(handlers::submit_site)
                .put(handlers::update_site)
                .delete(handlers::delete_site),
        )
        .route("/sites/:id/edit", get(handlers::edit_site))
        // Inspections and their workflow
        .route(
            "/inspections",
            get(handlers::list_inspections).post(handlers::create_inspection),
        )
        .route("/inspections/new", get(handlers::new_inspection))
        .route(
            "/inspections/:id",
            get(handlers::inspection_detail)
                .post(handlers::submit_inspection)
                .put(handlers::update_inspection)
                .delete(handlers::delete_inspection),
        )
        .route("/inspections/:id/edit", get(handlers::edit_inspection))
        .route("/inspections/:id/status", put(handlers::update_status))
        .route("/inspections/:id/analyze", post(handlers::start_analysis))
        .route(
            "/inspections/:id/analysis-status",
            get(handlers::analysis_status),
        )
        .route("/inspections/:id/review", get(handlers::review))
        .route("/inspections/:id/images", post(handlers::upload_images))
        .route(
            "/inspections/:id/violations",
            post(handlers::create_violation),
        )
        .route("/inspections/:id/reports", post(handlers::request_report))
        .route("/images/:id", axum::routing::delete(handlers::delete_image))
        // Violations
        .route(
            "/violations/:id",
            put(handlers::update_violation).delete(handlers::delete_violation),
        )
        .route(
            "/violations/:id/status",
            put(handlers::set_violation_status),
        )
        .route(
            "/violations/:id/regulations/:regulation_id",
            post(handlers::link_regulation).delete(handlers::unlink_regulation),
        )
        // Regulations
        .route("/regulations", get(handlers::list_regulations))
        .route("/regulations/:id", get(handlers::regulation_detail))
        // Reports
        .route("/reports/:id", get(handlers::report_page))
        .route("/reports/:id/status", get(handlers::report_status))
        .route("/reports/:id/download", get(handlers::download_report))
        // Signed objects, static assets, health
        .route("/files/*key", get(handlers::serve_file))
        .route("/static/style.css", get(handlers::serve_css))
        .route("/static/app.js", get(handlers::serve_js))
        .route("/healthz", get(handlers::healthz))
        // Admin
        .route("/admin", get(handlers::admin_index))
        .route("/admin/jobs", get(handlers::admin_jobs))
        .route("/admin/jobs/:id/retry", post(handlers::retry_job))
        // Billing
        .route("/webhooks/stripe", post(handlers::stripe_webhook))
        // JSON API
        .route("/api/clients", get(handlers::api_clients))
        .route("/api/inspections", get(handlers::api_inspections))
        .route("/api/inspections/:id", get(handlers::api_inspection))
        .route(
            "/api/inspections/:id/violations",
            get(handlers::api_inspection_violations),
        )
        .fallback(not_found)
        .layer(middleware::from_fn(negotiate::negotiate_errors))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};

    use super::super::test_support::{body_json, body_string, TestApp};

    #[tokio::test]
    async fn test_page_without_session_redirects_to_login() {
        let app = TestApp::new().await;
        let response = app.get("/inspections?status=draft", None).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()[header::LOCATION],
            "/login?next=%2Finspections%3Fstatus%3Ddraft"
        );
    }

    #[tokio::test]
    async fn test_login_sets_cookie_and_follows_safe_next() {
        let app = TestApp::new().await;
        app.state
            .services
            .auth
            .register("inspector@example.com", "Pat", "password123")
            .await
            .unwrap();

        let login = |body: &'static str| {
            Request::builder()
                .method("POST")
                .uri("/login")
                .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                .header(header::ACCEPT, "text/html")
                .body(Body::from(body))
                .unwrap()
        };

        let response = app
            .send(login(
                "email=inspector%40example.com&password=password123&next=%2Fclients",
            ))
            .await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(response.headers()[header::LOCATION], "/clients");
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));

        let session = cookie.split(';').next().unwrap().to_string();
        let response = app.get("/dashboard", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response = app
            .send(login(
                "email=inspector%40example.com&password=password123&next=%2F%2Fevil.example.com",
            ))
            .await;
        assert_eq!(response.headers()[header::LOCATION], "/dashboard");

        let response = app
            .send(login("email=inspector%40example.com&password=wrong"))
            .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());
    }

    #[tokio::test]
    async fn test_healthz_and_static_assets() {
        let app = TestApp::new().await;
        let response = app.get("/healthz", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");

        let response = app.get("/static/style.css", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/css");
    }

    #[tokio::test]
    async fn test_signed_file_links() {
        let app = TestApp::new().await;
        let key = "users/u1/inspections/i1/images/a.png";
        app.state
            .storage
            .put(key, b"\x89PNG fake", "image/png")
            .await
            .unwrap();
        let url = app.state.storage.url(key, Duration::from_secs(60)).unwrap();

        let response = app.get(&url, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");

        let tampered = url.replace("a.png", "b.png");
        let response = app.get(&tampered, None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let response = app.get(&format!("/files/{}", key), None).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_unknown_route_is_not_found_page() {
        let app = TestApp::new().await;
        let response = app.get("/nowhere", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = body_string(response).await;
        assert!(body.contains("<html"));
    }
}
