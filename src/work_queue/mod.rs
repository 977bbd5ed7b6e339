//! Background jobs: typed payloads, handlers and the polling worker.
//!
//! Jobs live in the `jobs` table. Requests enqueue them; a `Worker` claims
//! one at a time, dispatches it to the handler registered for its type and
//! records the outcome.

mod analyze;
mod error;
mod report;
mod worker;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

pub use analyze::AnalyzeInspectionHandler;
pub use error::JobError;
pub use report::GenerateReportHandler;
pub use worker::{backoff_delay, Worker, WorkerConfig};

use crate::config::Settings;
use crate::models::{Job, JobType};
use crate::repository::{DbContext, DbError, JobRepository};
use crate::storage::Storage;
use crate::vision::{self, VisionError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyzeInspectionPayload {
    pub inspection_id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateReportPayload {
    pub report_id: String,
    pub user_id: String,
}

/// Decode a JSON payload; malformed payloads can never succeed.
pub fn decode_payload<T: DeserializeOwned>(payload: &str) -> Result<T, JobError> {
    serde_json::from_str(payload).map_err(|e| JobError::permanent(format!("bad payload: {}", e)))
}

fn encode<T: Serialize>(payload: &T) -> Result<String, DbError> {
    serde_json::to_string(payload).map_err(crate::repository::util::to_diesel_error)
}

pub async fn enqueue_analysis(
    jobs: &JobRepository,
    inspection_id: &str,
    user_id: &str,
    max_attempts: i32,
) -> Result<Job, DbError> {
    let payload = encode(&AnalyzeInspectionPayload {
        inspection_id: inspection_id.to_string(),
        user_id: user_id.to_string(),
    })?;
    jobs.enqueue(JobType::AnalyzeInspection, &payload, Some(inspection_id), max_attempts)
        .await
}

pub async fn enqueue_report(
    jobs: &JobRepository,
    report_id: &str,
    inspection_id: &str,
    user_id: &str,
    max_attempts: i32,
) -> Result<Job, DbError> {
    let payload = encode(&GenerateReportPayload {
        report_id: report_id.to_string(),
        user_id: user_id.to_string(),
    })?;
    jobs.enqueue(JobType::GenerateReport, &payload, Some(inspection_id), max_attempts)
        .await
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> JobType;

    async fn handle(&self, payload: &str) -> Result<(), JobError>;

    /// Called once when the job is given up on, so the handler can put
    /// domain rows back into a consistent state.
    async fn on_failed(&self, _payload: &str, _error: &str) {}
}

/// Job type to handler.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(handler.job_type().as_str(), handler);
    }

    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Worker with every handler registered, configured from settings.
pub fn build_worker(
    ctx: &DbContext,
    storage: Arc<dyn Storage>,
    settings: &Settings,
) -> Result<Worker, VisionError> {
    let vision: Arc<dyn vision::VisionProvider> = Arc::from(vision::from_config(&settings.vision)?);
    tracing::info!(provider = vision.name(), "vision provider ready");

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(AnalyzeInspectionHandler::new(
        ctx.clone(),
        storage.clone(),
        vision,
    )));
    registry.register(Arc::new(GenerateReportHandler::new(ctx.clone(), storage)));

    let config = WorkerConfig {
        poll_interval: std::time::Duration::from_millis(settings.worker_poll_ms.max(50)),
        ..Default::default()
    };
    Ok(Worker::new(ctx.jobs(), registry, config))
}
