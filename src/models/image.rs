//! Inspection photos.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// AI analysis state of a single image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageAnalysisStatus {
    Pending,
    Analyzing,
    Completed,
    Failed,
}

impl ImageAnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "analyzing" => Some(Self::Analyzing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Image {
    pub id: String,
    pub user_id: String,
    pub inspection_id: String,
    pub original_key: String,
    pub thumbnail_key: Option<String>,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: i64,
    pub analysis_status: ImageAnalysisStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Image {
    /// Key to show in galleries; falls back to the original.
    pub fn display_key(&self) -> &str {
        self.thumbnail_key.as_deref().unwrap_or(&self.original_key)
    }
}
