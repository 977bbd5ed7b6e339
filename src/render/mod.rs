//! Inspection report rendering.
//!
//! `ReportData` holds display-ready content. Both renderers walk the same
//! block list from `ReportData::blocks` so the PDF and DOCX match.

pub mod docx;
pub mod pdf;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{Client, Inspection, LinkedRegulation, Severity, User, Violation};
use crate::utils::{format_date, format_timestamp};

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("PDF rendering failed: {0}")]
    Pdf(String),
    #[error("DOCX rendering failed: {0}")]
    Docx(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportViolation {
    pub number: usize,
    pub severity: Severity,
    pub description: String,
    pub inspector_notes: Option<String>,
    /// `"1926.501 Duty to have fall protection"` entries.
    pub regulations: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReportData {
    pub title: String,
    pub inspection_date: String,
    pub site_address: String,
    pub client_name: Option<String>,
    pub client_contact: Option<String>,
    pub client_address: Option<String>,
    pub inspector_name: String,
    pub company_name: Option<String>,
    pub license_number: Option<String>,
    pub weather: Option<String>,
    pub temperature: Option<String>,
    pub notes: Option<String>,
    pub generated_at: String,
    pub violations: Vec<ReportViolation>,
}

/// One unit of report layout.
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    Title(String),
    Heading(String),
    Field(String, String),
    Paragraph(String),
    Bullet(String),
    Spacer,
}

impl ReportData {
    /// Build report content from confirmed violations, most severe first.
    pub fn assemble(
        inspection: &Inspection,
        client: Option<&Client>,
        inspector: &User,
        mut violations: Vec<Violation>,
        links: &HashMap<String, Vec<LinkedRegulation>>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        violations.sort_by(|a, b| {
            a.severity
                .cmp(&b.severity)
                .then(a.created_at.cmp(&b.created_at))
        });

        let violations = violations
            .into_iter()
            .enumerate()
            .map(|(i, v)| ReportViolation {
                number: i + 1,
                severity: v.severity,
                regulations: links
                    .get(&v.id)
                    .map(|regs| {
                        regs.iter()
                            .map(|l| format!("{} {}", l.regulation.standard_number, l.regulation.title))
                            .collect()
                    })
                    .unwrap_or_default(),
                description: v.description,
                inspector_notes: v.inspector_notes,
            })
            .collect();

        let site_address = inspection.address();
        Self {
            title: inspection.title.clone(),
            inspection_date: format_date(inspection.inspection_date),
            site_address: if site_address.is_empty() {
                "Not recorded".to_string()
            } else {
                site_address
            },
            client_name: client.map(|c| c.name.clone()),
            client_contact: client.and_then(|c| c.contact_name.clone()),
            client_address: client.map(|c| c.address()).filter(|a| !a.is_empty()),
            inspector_name: inspector.name.clone(),
            company_name: inspector.company_name.clone(),
            license_number: inspector.license_number.clone(),
            weather: inspection.weather_conditions.clone(),
            temperature: inspection.temperature_f.map(|t| format!("{}°F", t)),
            notes: inspection.inspector_notes.clone(),
            generated_at: format_timestamp(generated_at),
            violations,
        }
    }

    /// Count of violations per severity, in severity order, skipping zeros.
    pub fn severity_summary(&self) -> Vec<(Severity, usize)> {
        [
            Severity::Critical,
            Severity::Serious,
            Severity::Other,
            Severity::Recommendation,
        ]
        .into_iter()
        .map(|s| (s, self.violations.iter().filter(|v| v.severity == s).count()))
        .filter(|(_, n)| *n > 0)
        .collect()
    }

    pub fn blocks(&self) -> Vec<Block> {
        let mut blocks = vec![
            Block::Title("Construction Site Safety Inspection Report".to_string()),
            Block::Paragraph(self.title.clone()),
            Block::Spacer,
            Block::Heading("Inspection details".to_string()),
            Block::Field("Date".into(), self.inspection_date.clone()),
            Block::Field("Site".into(), self.site_address.clone()),
        ];
        if let Some(ref weather) = self.weather {
            blocks.push(Block::Field("Weather".into(), weather.clone()));
        }
        if let Some(ref temperature) = self.temperature {
            blocks.push(Block::Field("Temperature".into(), temperature.clone()));
        }

        if let Some(ref name) = self.client_name {
            blocks.push(Block::Spacer);
            blocks.push(Block::Heading("Client".to_string()));
            blocks.push(Block::Field("Name".into(), name.clone()));
            if let Some(ref contact) = self.client_contact {
                blocks.push(Block::Field("Contact".into(), contact.clone()));
            }
            if let Some(ref address) = self.client_address {
                blocks.push(Block::Field("Address".into(), address.clone()));
            }
        }

        blocks.push(Block::Spacer);
        blocks.push(Block::Heading("Inspector".to_string()));
        blocks.push(Block::Field("Name".into(), self.inspector_name.clone()));
        if let Some(ref company) = self.company_name {
            blocks.push(Block::Field("Company".into(), company.clone()));
        }
        if let Some(ref license) = self.license_number {
            blocks.push(Block::Field("License".into(), license.clone()));
        }

        blocks.push(Block::Spacer);
        blocks.push(Block::Heading("Summary".to_string()));
        blocks.push(Block::Paragraph(format!(
            "{} confirmed violation(s).",
            self.violations.len()
        )));
        for (severity, count) in self.severity_summary() {
            blocks.push(Block::Bullet(format!("{}: {}", severity.label(), count)));
        }

        blocks.push(Block::Spacer);
        blocks.push(Block::Heading("Violations".to_string()));
        for v in &self.violations {
            blocks.push(Block::Paragraph(format!(
                "{}. [{}] {}",
                v.number,
                v.severity.label(),
                v.description
            )));
            for reg in &v.regulations {
                blocks.push(Block::Bullet(format!("29 CFR {}", reg)));
            }
            if let Some(ref notes) = v.inspector_notes {
                blocks.push(Block::Field("Inspector notes".into(), notes.clone()));
            }
            blocks.push(Block::Spacer);
        }

        if let Some(ref notes) = self.notes {
            blocks.push(Block::Heading("General notes".to_string()));
            blocks.push(Block::Paragraph(notes.clone()));
            blocks.push(Block::Spacer);
        }

        blocks.push(Block::Paragraph(format!("Generated {}", self.generated_at)));
        blocks
    }
}

/// Greedy word wrap to at most `width` characters per line.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut lines = Vec::new();
    for raw in text.lines() {
        let mut line = String::new();
        for word in raw.split_whitespace() {
            let mut word = word.to_string();
            while word.chars().count() > width {
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
                let head: String = word.chars().take(width).collect();
                word = word.chars().skip(width).collect();
                lines.push(head);
            }
            let needed = if line.is_empty() { 0 } else { 1 } + word.chars().count();
            if line.chars().count() + needed > width && !line.is_empty() {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(&word);
        }
        lines.push(line);
    }
    if lines.is_empty() {
        lines.push(String::new());
    }
    lines
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn sample(violations: usize) -> ReportData {
        ReportData {
            title: "Riverside Tower & Garage".into(),
            inspection_date: "May 1, 2024".into(),
            site_address: "400 Elm St, Springfield, IL".into(),
            client_name: Some("Acme Builders".into()),
            client_contact: Some("Pat Lee".into()),
            client_address: None,
            inspector_name: "Sam Inspector".into(),
            company_name: Some("Safe Sites LLC".into()),
            license_number: None,
            weather: Some("Clear".into()),
            temperature: Some("68°F".into()),
            notes: Some("Site was active during inspection.".into()),
            generated_at: "2024-05-02 10:00 UTC".into(),
            violations: (0..violations)
                .map(|i| ReportViolation {
                    number: i + 1,
                    severity: Severity::Serious,
                    description: "Scaffold planking not fully decked; gap exceeds one inch at the \
                                  working level (north elevation)."
                        .into(),
                    inspector_notes: Some("Foreman notified".into()),
                    regulations: vec!["1926.451(b)(1) Scaffold platform construction".into()],
                })
                .collect(),
        }
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("one two three", 7), vec!["one two", "three"]);
        assert_eq!(wrap("abcdefghij", 4), vec!["abcd", "efgh", "ij"]);
        assert_eq!(wrap("", 10), vec![""]);
        assert_eq!(wrap("a\nb", 10), vec!["a", "b"]);
    }

    #[test]
    fn test_blocks_include_violations_and_summary() {
        let data = sample(2);
        let blocks = data.blocks();
        assert!(blocks.contains(&Block::Bullet("Serious: 2".into())));
        assert!(blocks
            .iter()
            .any(|b| matches!(b, Block::Paragraph(p) if p.starts_with("2. [Serious]"))));
        assert!(blocks.contains(&Block::Bullet(
            "29 CFR 1926.451(b)(1) Scaffold platform construction".into()
        )));
    }

    #[test]
    fn test_severity_summary_orders_and_skips_zero() {
        let mut data = sample(1);
        data.violations.push(ReportViolation {
            number: 2,
            severity: Severity::Critical,
            description: "x".into(),
            inspector_notes: None,
            regulations: vec![],
        });
        assert_eq!(
            data.severity_summary(),
            vec![(Severity::Critical, 1), (Severity::Serious, 1)]
        );
    }
}
