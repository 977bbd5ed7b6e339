//! AI vision providers that look for safety violations in site photos.

mod ollama;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::VisionConfig;
use crate::models::{Confidence, Severity};

pub use ollama::OllamaVisionClient;

/// One potential violation spotted in an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Finding {
    pub description: String,
    pub severity: Severity,
    pub confidence: Confidence,
    /// OSHA standard numbers the provider thinks apply.
    pub standard_numbers: Vec<String>,
    pub explanation: Option<String>,
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("connection error: {0}")]
    Connection(String),
    #[error("API error: {0}")]
    Api(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("vision analysis is disabled")]
    Disabled,
}

impl VisionError {
    /// Whether retrying later could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Api(_))
    }
}

#[async_trait]
pub trait VisionProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(&self, image: &[u8], content_type: &str) -> Result<Vec<Finding>, VisionError>;
}

/// Provider used when AI analysis is turned off: every image yields nothing.
pub struct DisabledVision;

#[async_trait]
impl VisionProvider for DisabledVision {
    fn name(&self) -> &str {
        "disabled"
    }

    async fn analyze(&self, _image: &[u8], _content_type: &str) -> Result<Vec<Finding>, VisionError> {
        Ok(Vec::new())
    }
}

/// Build the provider selected by configuration.
pub fn from_config(config: &VisionConfig) -> Result<Box<dyn VisionProvider>, VisionError> {
    if config.enabled {
        Ok(Box::new(OllamaVisionClient::new(config.clone())?))
    } else {
        Ok(Box::new(DisabledVision))
    }
}

#[derive(Debug, Deserialize)]
struct RawFinding {
    #[serde(default)]
    description: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    confidence: String,
    #[serde(default, alias = "standards", alias = "regulations")]
    standard_numbers: Vec<String>,
    #[serde(default)]
    explanation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawResponse {
    List(Vec<RawFinding>),
    Wrapped {
        #[serde(alias = "violations")]
        findings: Vec<RawFinding>,
    },
}

/// Parse a model response into findings.
///
/// Models wrap JSON in prose or code fences often enough that the outermost
/// JSON value is extracted first. Findings without a description are dropped.
pub fn parse_findings(response: &str, max: usize) -> Result<Vec<Finding>, VisionError> {
    let json = extract_json(response)
        .ok_or_else(|| VisionError::Parse("no JSON found in response".to_string()))?;
    let raw: RawResponse =
        serde_json::from_str(json).map_err(|e| VisionError::Parse(e.to_string()))?;
    let raw = match raw {
        RawResponse::List(list) => list,
        RawResponse::Wrapped { findings } => findings,
    };

    Ok(raw
        .into_iter()
        .filter(|f| !f.description.trim().is_empty())
        .take(max)
        .map(|f| Finding {
            description: f.description.trim().to_string(),
            severity: Severity::from_str(&f.severity.trim().to_lowercase())
                .unwrap_or(Severity::Other),
            confidence: Confidence::from_str(&f.confidence.trim().to_lowercase())
                .unwrap_or(Confidence::Low),
            standard_numbers: f
                .standard_numbers
                .into_iter()
                .map(|s| normalize_standard(&s))
                .filter(|s| !s.is_empty())
                .collect(),
            explanation: f.explanation.filter(|e| !e.trim().is_empty()),
        })
        .collect())
}

fn extract_json(response: &str) -> Option<&str> {
    let start = response.find(['[', '{'])?;
    let close = if response[start..].starts_with('[') { ']' } else { '}' };
    let end = response.rfind(close)?;
    (end > start).then(|| &response[start..=end])
}

/// `"29 CFR 1926.501(b)(1)"` -> `"1926.501(b)(1)"`.
fn normalize_standard(s: &str) -> String {
    let s = s.trim();
    let s = s
        .strip_prefix("29 CFR")
        .or_else(|| s.strip_prefix("29 C.F.R."))
        .unwrap_or(s);
    s.trim().trim_start_matches('§').trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_array() {
        let response = r#"[
            {"description": "Worker on roof edge without fall protection",
             "severity": "Critical", "confidence": "high",
             "standard_numbers": ["29 CFR 1926.501(b)(13)"]},
            {"description": "", "severity": "other"}
        ]"#;
        let findings = parse_findings(response, 10).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert_eq!(findings[0].confidence, Confidence::High);
        assert_eq!(findings[0].standard_numbers, vec!["1926.501(b)(13)"]);
    }

    #[test]
    fn test_parse_wrapped_in_prose() {
        let response = "Here is what I found:\n```json\n{\"violations\": [{\"description\": \"Missing toe boards\", \"severity\": \"serious\", \"confidence\": \"medium\", \"standards\": [\"1926.451(h)\"]}]}\n```";
        let findings = parse_findings(response, 10).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].standard_numbers, vec!["1926.451(h)"]);
    }

    #[test]
    fn test_parse_caps_and_defaults() {
        let response = r#"[{"description": "a", "severity": "weird"}, {"description": "b"}, {"description": "c"}]"#;
        let findings = parse_findings(response, 2).unwrap();
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::Other);
        assert_eq!(findings[0].confidence, Confidence::Low);
    }

    #[test]
    fn test_parse_rejects_non_json() {
        assert!(matches!(
            parse_findings("no violations visible", 10),
            Err(VisionError::Parse(_))
        ));
        assert_eq!(parse_findings("[]", 10).unwrap(), vec![]);
    }

    #[tokio::test]
    async fn test_disabled_provider_finds_nothing() {
        let findings = DisabledVision.analyze(b"img", "image/png").await.unwrap();
        assert!(findings.is_empty());
    }
}
