//! Violations and their links to regulations.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::regulation::Regulation;
use crate::error::AppResult;
use crate::utils::{require, FieldErrors};

/// Relevance recorded for links an inspector creates by hand.
pub const MANUAL_LINK_RELEVANCE: f64 = 1.0;
/// Explanation recorded for links an inspector creates by hand.
pub const MANUAL_LINK_EXPLANATION: &str = "Manually linked by inspector";

/// Review status of a violation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationStatus {
    Pending,
    Confirmed,
    Rejected,
}

impl ViolationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Serious,
    Other,
    Recommendation,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Serious => "serious",
            Self::Other => "other",
            Self::Recommendation => "recommendation",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Self::Critical),
            "serious" => Some(Self::Serious),
            "other" => Some(Self::Other),
            "recommendation" => Some(Self::Recommendation),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::Serious => "Serious",
            Self::Other => "Other-than-serious",
            Self::Recommendation => "Recommendation",
        }
    }
}

/// Confidence of an AI finding. Manual violations have none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Self::High),
            "medium" => Some(Self::Medium),
            "low" => Some(Self::Low),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    pub id: String,
    pub user_id: String,
    pub inspection_id: String,
    pub image_id: Option<String>,
    pub description: String,
    pub ai_description: Option<String>,
    pub severity: Severity,
    pub confidence: Option<Confidence>,
    pub inspector_notes: Option<String>,
    pub status: ViolationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Violation {
    pub fn is_ai_generated(&self) -> bool {
        self.ai_description.is_some()
    }
}

/// Input for a manually entered violation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewViolation {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub severity: String,
    pub inspector_notes: Option<String>,
}

impl NewViolation {
    pub fn validate(&self) -> AppResult<Severity> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "description", "Description", &self.description);
        errors.max_len("description", Some(&self.description), 5000);
        let severity = Severity::from_str(self.severity.trim());
        if severity.is_none() {
            errors.add("severity", "Choose a severity");
        }
        errors.into_result()?;
        Ok(severity.unwrap_or(Severity::Other))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViolationUpdate {
    pub description: Option<String>,
    pub severity: Option<String>,
    pub inspector_notes: Option<String>,
}

impl ViolationUpdate {
    pub fn validate(&self) -> AppResult<Option<Severity>> {
        let mut errors = FieldErrors::new();
        if let Some(ref description) = self.description {
            require(&mut errors, "description", "Description", description);
        }
        let severity = match self.severity.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(s) => match Severity::from_str(s) {
                Some(sev) => Some(sev),
                None => {
                    errors.add("severity", "Choose a severity");
                    None
                }
            },
        };
        errors.into_result()?;
        Ok(severity)
    }
}

/// Join row between a violation and a regulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViolationRegulation {
    pub violation_id: String,
    pub regulation_id: String,
    pub relevance_score: f64,
    pub ai_explanation: Option<String>,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
}

/// A regulation together with the link metadata for one violation.
#[derive(Debug, Clone, Serialize)]
pub struct LinkedRegulation {
    pub regulation: Regulation,
    pub relevance_score: f64,
    pub ai_explanation: Option<String>,
    pub is_primary: bool,
}

/// Violation counts by review status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub confirmed: i64,
    pub rejected: i64,
}

impl StatusCounts {
    pub fn total(&self) -> i64 {
        self.pending + self.confirmed + self.rejected
    }

    pub fn reviewed(&self) -> i64 {
        self.confirmed + self.rejected
    }

    pub fn add(&mut self, status: ViolationStatus, n: i64) {
        match status {
            ViolationStatus::Pending => self.pending += n,
            ViolationStatus::Confirmed => self.confirmed += n,
            ViolationStatus::Rejected => self.rejected += n,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_parsing() {
        assert_eq!(Severity::from_str("serious"), Some(Severity::Serious));
        assert_eq!(Severity::from_str("Serious"), None);
        assert!(Severity::Critical < Severity::Recommendation);
    }

    #[test]
    fn test_new_violation_requires_description_and_severity() {
        let err = NewViolation::default().validate().unwrap_err();
        let fields: Vec<_> = err.fields().iter().map(|f| f.field.as_str()).collect();
        assert_eq!(fields, vec!["description", "severity"]);

        let ok = NewViolation {
            description: "Missing guardrail on level 3".into(),
            severity: "critical".into(),
            inspector_notes: None,
        };
        assert_eq!(ok.validate().unwrap(), Severity::Critical);
    }

    #[test]
    fn test_update_severity_is_optional() {
        assert_eq!(ViolationUpdate::default().validate().unwrap(), None);
        let bad = ViolationUpdate {
            severity: Some("extreme".into()),
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_status_counts() {
        let mut counts = StatusCounts::default();
        counts.add(ViolationStatus::Pending, 2);
        counts.add(ViolationStatus::Confirmed, 3);
        counts.add(ViolationStatus::Rejected, 1);
        assert_eq!(counts.total(), 6);
        assert_eq!(counts.reviewed(), 4);
    }
}
