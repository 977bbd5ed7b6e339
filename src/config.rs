//! Configuration management.
//!
//! Settings are resolved in layers: built-in defaults, then a config file
//! (explicit `--config` path or discovered with the prefer crate), then
//! environment variables, then CLI flags.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::repository::DbContext;

/// Default database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "siteinspect.db";

/// Default storage subdirectory name.
const STORAGE_SUBDIR: &str = "storage";

/// Multipart bodies above this size are rejected.
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 32 * 1024 * 1024;

/// Vision provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisionConfig {
    /// Whether AI analysis calls the provider at all.
    #[serde(default)]
    pub enabled: bool,
    /// Ollama-compatible API endpoint.
    #[serde(default = "default_vision_endpoint")]
    pub endpoint: String,
    /// Vision model name.
    #[serde(default = "default_vision_model")]
    pub model: String,
    #[serde(default = "default_vision_timeout")]
    pub timeout_secs: u64,
    /// Cap on findings kept per image.
    #[serde(default = "default_max_findings")]
    pub max_findings: usize,
}

fn default_vision_endpoint() -> String {
    "http://localhost:11434".to_string()
}
fn default_vision_model() -> String {
    "llava:13b".to_string()
}
fn default_vision_timeout() -> u64 {
    120
}
fn default_max_findings() -> usize {
    10
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_vision_endpoint(),
            model: default_vision_model(),
            timeout_secs: default_vision_timeout(),
            max_findings: default_max_findings(),
        }
    }
}

/// Billing provider configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Stripe webhook signing secret (`whsec_...`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_secret: Option<String>,
    /// Require an active subscription before AI analysis can run.
    #[serde(default)]
    pub enforce_subscription: bool,
    /// Price lookup key or ID to tier name.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub price_tiers: HashMap<String, String>,
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database URL (overrides data_dir/database filename if set).
    pub database_url: Option<String>,
    /// Directory for uploaded images and generated reports.
    pub storage_dir: PathBuf,
    /// Address the HTTP server listens on.
    pub bind: String,
    /// Secret used to sign storage URLs.
    pub secret_key: String,
    pub session_ttl_hours: i64,
    /// Mark session cookies `Secure` (enable behind TLS).
    pub secure_cookies: bool,
    pub max_upload_bytes: usize,
    pub worker_poll_ms: u64,
    pub job_max_attempts: i32,
    pub vision: VisionConfig,
    pub billing: BillingConfig,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("siteinspect");

        Self {
            storage_dir: data_dir.join(STORAGE_SUBDIR),
            data_dir,
            database_url: None,
            bind: "127.0.0.1:3030".to_string(),
            secret_key: "change-me".to_string(),
            session_ttl_hours: 24 * 30,
            secure_cookies: false,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            worker_poll_ms: 1000,
            job_max_attempts: 3,
            vision: VisionConfig::default(),
            billing: BillingConfig::default(),
        }
    }
}

impl Settings {
    /// Create settings rooted at a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        Self {
            storage_dir: data_dir.join(STORAGE_SUBDIR),
            data_dir,
            ..Default::default()
        }
    }

    /// Get the database URL, constructing it from the data dir if not set.
    pub fn database_url(&self) -> String {
        match self.database_url {
            Some(ref url) => url.clone(),
            None => {
                let path = self.data_dir.join(DEFAULT_DATABASE_FILENAME);
                format!("sqlite:{}", path.display())
            }
        }
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (label, dir) in [("data", &self.data_dir), ("storage", &self.storage_dir)] {
            fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        label,
                        dir.display(),
                        e
                    ),
                )
            })?;
        }
        Ok(())
    }

    /// Create a database context from the configured URL.
    pub fn create_db_context(&self) -> DbContext {
        DbContext::from_url(&self.database_url())
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        if let Some(url) = env_var("DATABASE_URL") {
            tracing::debug!("Using DATABASE_URL from environment");
            self.database_url = Some(url);
        }
        if let Some(dir) = env_var("SITEINSPECT_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
            self.storage_dir = self.data_dir.join(STORAGE_SUBDIR);
        }
        if let Some(dir) = env_var("SITEINSPECT_STORAGE_DIR") {
            self.storage_dir = PathBuf::from(dir);
        }
        if let Some(bind) = env_var("SITEINSPECT_BIND") {
            self.bind = bind;
        }
        if let Some(secret) = env_var("SITEINSPECT_SECRET") {
            self.secret_key = secret;
        }
        if let Some(flag) = env_var("SITEINSPECT_SECURE_COOKIES") {
            self.secure_cookies = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
        if let Some(secret) = env_var("STRIPE_WEBHOOK_SECRET") {
            self.billing.webhook_secret = Some(secret);
        }
        if let Some(endpoint) = env_var("VISION_ENDPOINT") {
            self.vision.endpoint = endpoint;
            self.vision.enabled = true;
        }
        if let Some(model) = env_var("VISION_MODEL") {
            self.vision.model = model;
        }
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_ttl_hours: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure_cookies: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_upload_bytes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_poll_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_max_attempts: Option<i32>,
    #[serde(default)]
    pub vision: VisionConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Discover and load a config file using the prefer crate.
    pub async fn load() -> Self {
        match prefer::load("siteinspect").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await.unwrap_or_else(|e| {
                    tracing::warn!("{}", e);
                    Self::default()
                }),
                None => Self::default(),
            },
            Err(_) => Self::default(),
        }
    }

    /// Load configuration from a specific file path.
    /// Supports JSON, TOML and YAML based on the file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, String> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| format!("Failed to read config file: {}", e))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let mut config = Self::parse(&contents, ext)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, ext: &str) -> Result<Self, String> {
        match ext {
            "toml" => toml::from_str(contents)
                .map_err(|e| format!("Failed to parse TOML config: {}", e)),
            "yaml" | "yml" => serde_yaml::from_str(contents)
                .map_err(|e| format!("Failed to parse YAML config: {}", e)),
            _ => serde_json::from_str(contents)
                .map_err(|e| format!("Failed to parse JSON config: {}", e)),
        }
    }

    /// Base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    fn resolve_path(path_str: &str, base_dir: &Path) -> PathBuf {
        let path = PathBuf::from(path_str);
        if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        }
    }

    /// Apply file values on top of settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref dir) = self.data_dir {
            settings.data_dir = Self::resolve_path(dir, base_dir);
            settings.storage_dir = settings.data_dir.join(STORAGE_SUBDIR);
        }
        if let Some(ref dir) = self.storage_dir {
            settings.storage_dir = Self::resolve_path(dir, base_dir);
        }
        if let Some(ref url) = self.database_url {
            settings.database_url = Some(url.clone());
        }
        if let Some(ref bind) = self.bind {
            settings.bind = bind.clone();
        }
        if let Some(ref secret) = self.secret_key {
            settings.secret_key = secret.clone();
        }
        if let Some(hours) = self.session_ttl_hours {
            settings.session_ttl_hours = hours;
        }
        if let Some(secure) = self.secure_cookies {
            settings.secure_cookies = secure;
        }
        if let Some(max) = self.max_upload_bytes {
            settings.max_upload_bytes = max;
        }
        if let Some(ms) = self.worker_poll_ms {
            settings.worker_poll_ms = ms;
        }
        if let Some(attempts) = self.job_max_attempts {
            settings.job_max_attempts = attempts.max(1);
        }
        settings.vision = self.vision.clone();
        settings.billing = self.billing.clone();
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path.
    pub config_path: Option<PathBuf>,
    /// Data directory override.
    pub data_dir: Option<PathBuf>,
}

/// Load settings: defaults, config file, environment, then CLI overrides.
pub async fn load_settings(options: LoadOptions) -> (Settings, Config) {
    let config = match options.config_path {
        Some(ref path) => Config::load_from_path(path).await.unwrap_or_else(|e| {
            tracing::warn!("{}", e);
            Config::default()
        }),
        None => Config::load().await,
    };

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
    config.apply_to_settings(&mut settings, &base_dir);
    settings.apply_env();

    if let Some(data_dir) = options.data_dir {
        settings.storage_dir = data_dir.join(STORAGE_SUBDIR);
        settings.data_dir = data_dir;
    }

    if settings.secret_key == "change-me" {
        tracing::warn!("SITEINSPECT_SECRET is not set; signed URLs use an insecure default key");
    }

    (settings, config)
}
