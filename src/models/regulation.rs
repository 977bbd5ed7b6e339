//! OSHA regulation reference data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regulation {
    pub id: String,
    /// Standard number, e.g. `1926.501(b)(1)`.
    pub standard_number: String,
    pub title: String,
    pub category: String,
    pub full_text: String,
    pub created_at: DateTime<Utc>,
}

impl Regulation {
    /// First paragraph-sized chunk of the text for list views.
    pub fn excerpt(&self, max_chars: usize) -> String {
        let text = self.full_text.trim();
        if text.chars().count() <= max_chars {
            return text.to_string();
        }
        let cut: String = text.chars().take(max_chars).collect();
        match cut.rfind(' ') {
            Some(idx) if idx > max_chars / 2 => format!("{}…", &cut[..idx]),
            _ => format!("{}…", cut),
        }
    }
}

/// One entry of a regulations import file.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRegulation {
    pub standard_number: String,
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub full_text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_breaks_on_word() {
        let reg = Regulation {
            id: "r1".into(),
            standard_number: "1926.501".into(),
            title: "Duty to have fall protection".into(),
            category: "Fall Protection".into(),
            full_text: "Each employee on a walking working surface with an unprotected side".into(),
            created_at: Utc::now(),
        };
        assert_eq!(reg.excerpt(24), "Each employee on a…");
        assert_eq!(reg.excerpt(500), reg.full_text);
    }
}
