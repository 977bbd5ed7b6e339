//! Domain models for siteinspect.

mod client;
mod image;
mod inspection;
mod job;
mod regulation;
mod report;
mod site;
mod user;
mod violation;

pub use client::{Client, ClientUpdate, NewClient};
pub use image::{Image, ImageAnalysisStatus};
pub use inspection::{Inspection, InspectionStatus, InspectionUpdate, NewInspection};
pub use job::{Job, JobStatus, JobType};
pub use regulation::{NewRegulation, Regulation};
pub use report::{Report, ReportFormat, ReportStatus};
pub use site::{NewSite, Site, SiteUpdate};
pub use user::{ProfileUpdate, SubscriptionStatus, SubscriptionTier, User};
pub use violation::{
    Confidence, LinkedRegulation, NewViolation, Severity, StatusCounts, Violation,
    ViolationRegulation, ViolationStatus, ViolationUpdate, MANUAL_LINK_EXPLANATION,
    MANUAL_LINK_RELEVANCE,
};

/// Page size used by every paginated listing.
pub const PAGE_SIZE: i64 = 25;

/// One page of a listing plus the total number of matching rows.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> i64 {
        ((self.total + PAGE_SIZE - 1) / PAGE_SIZE).max(1)
    }

    pub fn has_prev(&self) -> bool {
        self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.page < self.total_pages()
    }
}

/// Normalize a 1-based page number and return its row offset.
pub fn page_offset(page: Option<i64>) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    (page, (page - 1) * PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_offset() {
        assert_eq!(page_offset(None), (1, 0));
        assert_eq!(page_offset(Some(0)), (1, 0));
        assert_eq!(page_offset(Some(3)), (3, 2 * PAGE_SIZE));
    }

    #[test]
    fn test_page_navigation() {
        let page = Page::<()> {
            items: vec![],
            page: 1,
            total: PAGE_SIZE + 1,
        };
        assert_eq!(page.total_pages(), 2);
        assert!(!page.has_prev());
        assert!(page.has_next());

        let empty = Page::<()> {
            items: vec![],
            page: 1,
            total: 0,
        };
        assert_eq!(empty.total_pages(), 1);
        assert!(!empty.has_next());
    }
}
