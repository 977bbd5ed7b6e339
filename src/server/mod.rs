//! Web server: server-rendered pages with htmx, a small JSON API, signed
//! file downloads and the billing webhook.

mod assets;
pub mod auth;
mod cache;
mod handlers;
pub mod htmx;
mod negotiate;
mod routes;
mod template_structs;

pub use routes::create_router;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Settings;
use crate::error::AppResult;
use crate::rate_limit::LoginThrottle;
use crate::repository::DbContext;
use crate::services::Services;
use crate::storage::{LocalStorage, Storage, UrlSigner};

use cache::StatsCache;

const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub ctx: DbContext,
    pub services: Services,
    pub storage: Arc<dyn Storage>,
    /// Verifies `/files` links; built from the same secret as the storage.
    pub signer: Arc<UrlSigner>,
    pub settings: Arc<Settings>,
    pub stats_cache: Arc<StatsCache>,
}

impl AppState {
    pub fn new(ctx: DbContext, settings: Settings) -> Self {
        let storage: Arc<dyn Storage> = Arc::new(LocalStorage::new(
            settings.storage_dir.clone(),
            &settings.secret_key,
        ));
        Self::with_storage(ctx, storage, settings)
    }

    pub fn with_storage(ctx: DbContext, storage: Arc<dyn Storage>, settings: Settings) -> Self {
        let services = Services::new(ctx.clone(), storage.clone(), &settings);
        Self {
            signer: Arc::new(UrlSigner::new(&settings.secret_key)),
            ctx,
            services,
            storage,
            settings: Arc::new(settings),
            stats_cache: Arc::new(StatsCache::new()),
        }
    }

    pub fn throttle(&self) -> &LoginThrottle {
        self.services.auth.throttle()
    }

    /// Drop expired sessions and login-throttle entries that have aged out.
    pub async fn sweep(&self) -> AppResult<usize> {
        self.throttle().prune().await;
        let purged = self.services.auth.purge_expired_sessions().await?;
        if purged > 0 {
            tracing::info!(purged, "purged expired sessions");
        }
        Ok(purged)
    }
}

/// Runs `sweep` at startup and then every interval.
fn spawn_maintenance(state: AppState) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(MAINTENANCE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = state.sweep().await {
                tracing::warn!("maintenance sweep failed: {}", e);
            }
        }
    })
}

/// Serve until `shutdown` resolves.
pub async fn serve(
    state: AppState,
    bind: &str,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Starting server at http://{}", listener.local_addr()?);

    let maintenance = spawn_maintenance(state.clone());
    let result = axum::serve(listener, create_router(state))
        .with_graceful_shutdown(shutdown)
        .await;
    maintenance.abort();
    Ok(result?)
}


#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::test_support::TestApp;

    #[tokio::test]
    async fn test_sweep_purges_expired_sessions_only() {
        let app = TestApp::new().await;
        let (user, cookie) = app.login("owner@example.com").await;
        app.state
            .ctx
            .users()
            .create_session("expired-token-hash", &user.id, Utc::now() - Duration::hours(1))
            .await
            .unwrap();
        app.state.throttle().record_failure("someone@example.com").await;

        assert_eq!(app.state.sweep().await.unwrap(), 1);
        assert_eq!(app.state.sweep().await.unwrap(), 0);

        // The live session and a fresh throttle entry survive.
        let token = cookie.split_once('=').unwrap().1;
        let resolved = app.state.services.auth.resolve_session(token).await.unwrap();
        assert_eq!(resolved.map(|u| u.id), Some(user.id));
        assert_eq!(app.state.throttle().tracked().await, 1);
    }
}
