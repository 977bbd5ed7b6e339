//! Ollama-compatible vision client (`/api/generate` with base64 images).

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{parse_findings, Finding, VisionError, VisionProvider};
use crate::config::VisionConfig;

const PROMPT: &str = r#"You are an OSHA construction safety inspector reviewing a job-site photo.
List every visible safety violation. Respond with ONLY a JSON array. Each element must be an object with:
- "description": one or two sentences describing the hazard
- "severity": one of "critical", "serious", "other", "recommendation"
- "confidence": one of "high", "medium", "low"
- "standard_numbers": array of applicable 29 CFR 1926 standard numbers, e.g. "1926.501(b)(1)"
- "explanation": why the standard applies
If there are no violations, respond with []."#;

pub struct OllamaVisionClient {
    config: VisionConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
    format: &'a str,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaVisionClient {
    pub fn new(config: VisionConfig) -> Result<Self, VisionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| VisionError::Connection(e.to_string()))?;
        Ok(Self { config, client })
    }
}

#[async_trait]
impl VisionProvider for OllamaVisionClient {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn analyze(&self, image: &[u8], content_type: &str) -> Result<Vec<Finding>, VisionError> {
        let url = format!("{}/api/generate", self.config.endpoint.trim_end_matches('/'));
        let request = GenerateRequest {
            model: &self.config.model,
            prompt: PROMPT,
            images: vec![base64::engine::general_purpose::STANDARD.encode(image)],
            stream: false,
            format: "json",
            options: GenerateOptions { temperature: 0.1 },
        };

        debug!(model = %self.config.model, content_type, size = image.len(), "requesting vision analysis");
        let resp = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| VisionError::Connection(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(VisionError::Api(format!("HTTP {}: {}", status, body)));
        }

        let body: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| VisionError::Parse(e.to_string()))?;

        parse_findings(&body.response, self.config.max_findings)
    }
}
