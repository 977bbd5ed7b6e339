//! Business rules on top of the repositories.
//!
//! Every tenant-scoped operation takes the acting user's ID; rows owned by
//! someone else are reported as not found.

pub mod auth;
pub mod billing;
pub mod clients;
pub mod images;
pub mod inspections;
pub mod regulations;
pub mod reports;
pub mod sites;
pub mod violations;

use std::sync::Arc;

pub use auth::AuthService;
pub use billing::{BillingService, WebhookOutcome};
pub use clients::ClientService;
pub use images::{ImageService, ImageUrls, Upload};
pub use inspections::{AnalysisProgress, InspectionService};
pub use regulations::{ImportSummary, RegulationService};
pub use reports::ReportService;
pub use sites::SiteService;
pub use violations::{QueueAction, QueueStep, ViolationService};

use crate::config::Settings;
use crate::rate_limit::LoginThrottle;
use crate::repository::DbContext;
use crate::storage::Storage;
use crate::utils::clean;

/// All services, sharing one database context and storage backend.
#[derive(Clone)]
pub struct Services {
    pub auth: AuthService,
    pub billing: BillingService,
    pub clients: ClientService,
    pub sites: SiteService,
    pub inspections: InspectionService,
    pub images: ImageService,
    pub violations: ViolationService,
    pub regulations: RegulationService,
    pub reports: ReportService,
}

impl Services {
    pub fn new(ctx: DbContext, storage: Arc<dyn Storage>, settings: &Settings) -> Self {
        Self {
            auth: AuthService::new(ctx.clone(), settings.session_ttl_hours, LoginThrottle::default()),
            billing: BillingService::new(ctx.clone(), settings.billing.clone()),
            clients: ClientService::new(ctx.clone()),
            sites: SiteService::new(ctx.clone()),
            inspections: InspectionService::new(
                ctx.clone(),
                storage.clone(),
                settings.billing.enforce_subscription,
                settings.job_max_attempts,
            ),
            images: ImageService::new(ctx.clone(), storage.clone(), settings.max_upload_bytes),
            violations: ViolationService::new(ctx.clone()),
            regulations: RegulationService::new(ctx.clone()),
            reports: ReportService::new(ctx, storage, settings.job_max_attempts),
        }
    }
}

/// Turn an optional form value into a column patch: absent leaves the column
/// alone, blank clears it.
pub(crate) fn patch(value: Option<String>) -> Option<Option<String>> {
    value.map(|v| clean(Some(v)))
}

/// Trimmed required value.
pub(crate) fn trimmed(value: &str) -> String {
    value.trim().to_string()
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use tempfile::TempDir;

    use super::Services;
    use crate::config::Settings;
    use crate::repository::test_support::setup_test_db;
    use crate::repository::DbContext;
    use crate::storage::LocalStorage;

    pub struct TestEnv {
        pub ctx: DbContext,
        pub services: Services,
        pub storage: Arc<LocalStorage>,
        pub settings: Settings,
        pub _dir: TempDir,
    }

    pub async fn setup() -> TestEnv {
        setup_with(|_| {}).await
    }

    pub async fn setup_with(configure: impl FnOnce(&mut Settings)) -> TestEnv {
        let (ctx, dir) = setup_test_db().await;
        let mut settings = Settings::with_data_dir(dir.path().to_path_buf());
        settings.secret_key = "test-secret".to_string();
        configure(&mut settings);
        let storage = Arc::new(LocalStorage::new(settings.storage_dir.clone(), &settings.secret_key));
        let services = Services::new(ctx.clone(), storage.clone(), &settings);
        TestEnv {
            ctx,
            services,
            storage,
            settings,
            _dir: dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_patch_semantics() {
        assert_eq!(patch(None), None);
        assert_eq!(patch(Some("  ".into())), Some(None));
        assert_eq!(patch(Some(" x ".into())), Some(Some("x".into())));
    }
}
