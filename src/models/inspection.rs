//! Inspections and their lifecycle.
//!
//! ```text
//! draft --analyze--> analyzing --worker--> review <--user--> completed
//!   ^                    |
//!   +----all failed------+
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::client::join_address;
use crate::error::AppResult;
use crate::utils::{require, FieldErrors};

/// Lifecycle status of an inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InspectionStatus {
    Draft,
    Analyzing,
    Review,
    Completed,
}

impl InspectionStatus {
    pub const ALL: [InspectionStatus; 4] = [
        Self::Draft,
        Self::Analyzing,
        Self::Review,
        Self::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Analyzing => "analyzing",
            Self::Review => "review",
            Self::Completed => "completed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(Self::Draft),
            "analyzing" => Some(Self::Analyzing),
            "review" => Some(Self::Review),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Draft => "Draft",
            Self::Analyzing => "Analyzing",
            Self::Review => "In review",
            Self::Completed => "Completed",
        }
    }

    pub fn can_add_photos(&self) -> bool {
        matches!(self, Self::Draft | Self::Review)
    }

    pub fn can_start_analysis(&self) -> bool {
        matches!(self, Self::Draft | Self::Review)
    }

    pub fn can_generate_report(&self) -> bool {
        matches!(self, Self::Review | Self::Completed)
    }

    /// Transitions a user may request directly.
    pub fn can_transition_to(&self, next: InspectionStatus) -> bool {
        use InspectionStatus::*;
        *self == next || matches!((self, next), (Review, Completed) | (Completed, Review))
    }

    /// Transitions driven by the analysis pipeline.
    pub fn can_system_transition(&self, next: InspectionStatus) -> bool {
        use InspectionStatus::*;
        matches!(
            (self, next),
            (Draft, Analyzing) | (Review, Analyzing) | (Analyzing, Review) | (Analyzing, Draft)
        )
    }
}

impl std::fmt::Display for InspectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inspection {
    pub id: String,
    pub user_id: String,
    pub client_id: Option<String>,
    pub site_id: Option<String>,
    pub title: String,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub inspection_date: NaiveDate,
    pub weather_conditions: Option<String>,
    pub temperature_f: Option<i32>,
    pub inspector_notes: Option<String>,
    pub status: InspectionStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Inspection {
    pub fn address(&self) -> String {
        join_address(
            self.address_line1.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
            self.postal_code.as_deref(),
        )
    }
}

/// Input for creating an inspection. Dates and temperatures arrive as form
/// strings and are parsed during validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewInspection {
    #[serde(default)]
    pub title: String,
    pub client_id: Option<String>,
    pub site_id: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    #[serde(default)]
    pub inspection_date: String,
    pub weather_conditions: Option<String>,
    pub temperature_f: Option<String>,
    pub inspector_notes: Option<String>,
}

impl NewInspection {
    /// Validate and return the parsed date and temperature.
    pub fn validate(&self) -> AppResult<(NaiveDate, Option<i32>)> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "title", "Title", &self.title);
        errors.max_len("title", Some(&self.title), 200);
        let date = parse_date(&mut errors, &self.inspection_date);
        let temperature = parse_temperature(&mut errors, self.temperature_f.as_deref());
        errors.max_len("inspector_notes", self.inspector_notes.as_deref(), 10_000);
        errors.into_result()?;
        // parse_date only returns None after recording an error
        Ok((date.unwrap_or_default(), temperature.flatten()))
    }
}

/// Partial update of inspection fields. Status changes go through
/// `InspectionService::update_status`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InspectionUpdate {
    pub title: Option<String>,
    pub client_id: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub inspection_date: Option<String>,
    pub weather_conditions: Option<String>,
    pub temperature_f: Option<String>,
    pub inspector_notes: Option<String>,
}

impl InspectionUpdate {
    /// Validate and return the parsed date and temperature, when present.
    ///
    /// The temperature is `Some(None)` when the field was sent blank.
    pub fn validate(&self) -> AppResult<(Option<NaiveDate>, Option<Option<i32>>)> {
        let mut errors = FieldErrors::new();
        if let Some(ref title) = self.title {
            require(&mut errors, "title", "Title", title);
            errors.max_len("title", Some(title), 200);
        }
        let date = self
            .inspection_date
            .as_deref()
            .and_then(|d| parse_date(&mut errors, d));
        let temperature = parse_temperature(&mut errors, self.temperature_f.as_deref());
        errors.max_len("inspector_notes", self.inspector_notes.as_deref(), 10_000);
        errors.into_result()?;
        Ok((date, temperature))
    }
}

fn parse_date(errors: &mut FieldErrors, value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if value.is_empty() {
        errors.add("inspection_date", "Inspection date is required");
        return None;
    }
    match NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            errors.add("inspection_date", "Use the format YYYY-MM-DD");
            None
        }
    }
}

fn parse_temperature(errors: &mut FieldErrors, value: Option<&str>) -> Option<Option<i32>> {
    let value = value?.trim();
    if value.is_empty() {
        return Some(None);
    }
    match value.parse::<i32>() {
        Ok(t) if (-80..=150).contains(&t) => Some(Some(t)),
        _ => {
            errors.add("temperature_f", "Enter a temperature between -80 and 150");
            None
        }
    }
}
