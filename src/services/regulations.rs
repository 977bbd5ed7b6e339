//! Regulation reference lookup and import.

use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::models::{page_offset, NewRegulation, Page, Regulation, PAGE_SIZE};
use crate::repository::DbContext;

/// Accepted import file shapes.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    List(Vec<serde_json::Value>),
    Wrapped { regulations: Vec<serde_json::Value> },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct RegulationService {
    ctx: DbContext,
}

impl RegulationService {
    pub fn new(ctx: DbContext) -> Self {
        Self { ctx }
    }

    pub async fn search(
        &self,
        q: Option<&str>,
        category: Option<&str>,
        page: Option<i64>,
    ) -> AppResult<Page<Regulation>> {
        let (page, offset) = page_offset(page);
        let q = q.map(str::trim).filter(|q| !q.is_empty());
        let category = category.map(str::trim).filter(|c| !c.is_empty());
        let repo = self.ctx.regulations();
        let items = repo.search(q, category, PAGE_SIZE, offset).await?;
        let total = repo.count_search(q, category).await?;
        Ok(Page { items, page, total })
    }

    pub async fn get(&self, id: &str) -> AppResult<Regulation> {
        self.ctx
            .regulations()
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("Regulation"))
    }

    pub async fn categories(&self) -> AppResult<Vec<(String, i64)>> {
        Ok(self.ctx.regulations().categories().await?)
    }

    /// Import regulations from a JSON array or `{"regulations": [...]}`.
    /// Entries without a standard number or title are skipped; existing
    /// standard numbers are updated in place.
    pub async fn import_json(&self, json: &str) -> AppResult<ImportSummary> {
        let entries = match serde_json::from_str::<ImportFile>(json) {
            Ok(ImportFile::List(entries)) | Ok(ImportFile::Wrapped { regulations: entries }) => {
                entries
            }
            Err(e) => return Err(AppError::invalid(format!("Invalid regulations file: {}", e))),
        };

        let repo = self.ctx.regulations();
        let mut summary = ImportSummary::default();
        for entry in entries {
            let parsed: Option<NewRegulation> = serde_json::from_value(entry).ok();
            match parsed {
                Some(reg)
                    if !reg.standard_number.trim().is_empty() && !reg.title.trim().is_empty() =>
                {
                    repo.upsert(&reg).await?;
                    summary.imported += 1;
                }
                _ => summary.skipped += 1,
            }
        }

        tracing::info!(
            imported = summary.imported,
            skipped = summary.skipped,
            "regulations imported"
        );
        Ok(summary)
    }
}
