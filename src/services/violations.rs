//! Violations, regulation links and the review queue.

use chrono::Utc;
use serde::Serialize;

use super::patch;
use crate::error::{AppError, AppResult, FieldError};
use crate::models::{
    LinkedRegulation, NewViolation, StatusCounts, Violation, ViolationRegulation,
    ViolationStatus, ViolationUpdate, MANUAL_LINK_EXPLANATION, MANUAL_LINK_RELEVANCE,
};
use crate::repository::models::ViolationChanges;
use crate::repository::{now, DbContext};

/// Decision applied from the review queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueAction {
    Accept,
    Reject,
}

impl QueueAction {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "accept" | "confirm" => Some(Self::Accept),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }

    fn status(self) -> ViolationStatus {
        match self {
            Self::Accept => ViolationStatus::Confirmed,
            Self::Reject => ViolationStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum QueueStep {
    Next {
        /// Position of `violation` in the stable ordering.
        index: usize,
        violation: Violation,
        regulations: Vec<LinkedRegulation>,
        counts: StatusCounts,
        total: usize,
    },
    Complete {
        counts: StatusCounts,
    },
}

/// First pending violation at or after `pos`, wrapping to the start.
fn next_pending(violations: &[Violation], pos: usize) -> Option<usize> {
    let start = if pos < violations.len() { pos } else { 0 };
    (start..violations.len())
        .chain(0..start)
        .find(|&i| violations[i].status == ViolationStatus::Pending)
}

fn parse_status(status: &str) -> AppResult<ViolationStatus> {
    ViolationStatus::from_str(status.trim())
        .ok_or_else(|| AppError::validation(vec![FieldError::new("status", "Unknown status")]))
}

#[derive(Clone)]
pub struct ViolationService {
    ctx: DbContext,
}

impl ViolationService {
    pub fn new(ctx: DbContext) -> Self {
        Self { ctx }
    }

    pub async fn get(&self, user_id: &str, id: &str) -> AppResult<Violation> {
        self.ctx
            .violations()
            .get(id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Violation"))
    }

    pub async fn list(&self, user_id: &str, inspection_id: &str) -> AppResult<Vec<Violation>> {
        Ok(self
            .ctx
            .violations()
            .list_for_inspection(inspection_id, user_id)
            .await?)
    }

    pub async fn counts(&self, user_id: &str, inspection_id: &str) -> AppResult<StatusCounts> {
        Ok(self
            .ctx
            .violations()
            .status_counts(inspection_id, user_id)
            .await?)
    }

    /// Record a violation the inspector spotted without AI help.
    pub async fn create(
        &self,
        user_id: &str,
        inspection_id: &str,
        input: NewViolation,
    ) -> AppResult<Violation> {
        let severity = input.validate()?;
        if self
            .ctx
            .inspections()
            .get(inspection_id, user_id)
            .await?
            .is_none()
        {
            return Err(AppError::not_found("Inspection"));
        }

        let stamp = Utc::now();
        let violation = Violation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            inspection_id: inspection_id.to_string(),
            image_id: None,
            description: input.description.trim().to_string(),
            ai_description: None,
            severity,
            confidence: None,
            inspector_notes: crate::utils::clean(input.inspector_notes),
            status: ViolationStatus::Pending,
            created_at: stamp,
            updated_at: stamp,
        };
        self.ctx.violations().create(&violation).await?;
        Ok(violation)
    }

    pub async fn update(&self, user_id: &str, id: &str, input: ViolationUpdate) -> AppResult<Violation> {
        let severity = input.validate()?;
        let changes = ViolationChanges {
            description: input.description.map(|d| d.trim().to_string()),
            severity: severity.map(|s| s.as_str().to_string()),
            inspector_notes: patch(input.inspector_notes),
            updated_at: now(),
        };
        Ok(self.ctx.violations().update(id, user_id, &changes).await?)
    }

    pub async fn set_status(&self, user_id: &str, id: &str, status: &str) -> AppResult<Violation> {
        let status = parse_status(status)?;
        self.ctx.violations().set_status(id, user_id, status).await?;
        self.get(user_id, id).await
    }

    pub async fn delete(&self, user_id: &str, id: &str) -> AppResult<()> {
        Ok(self.ctx.violations().delete(id, user_id).await?)
    }

    pub async fn regulations(&self, user_id: &str, id: &str) -> AppResult<Vec<LinkedRegulation>> {
        let violation = self.get(user_id, id).await?;
        Ok(self.ctx.violations().linked_regulations(&violation.id).await?)
    }

    /// Manually link a regulation. Linking twice is a no-op.
    pub async fn link_regulation(
        &self,
        user_id: &str,
        id: &str,
        regulation_id: &str,
    ) -> AppResult<Vec<LinkedRegulation>> {
        let violation = self.get(user_id, id).await?;
        if self.ctx.regulations().get(regulation_id).await?.is_none() {
            return Err(AppError::not_found("Regulation"));
        }
        let existing = self.ctx.violations().linked_regulations(&violation.id).await?;
        self.ctx
            .violations()
            .link_regulation(&ViolationRegulation {
                violation_id: violation.id.clone(),
                regulation_id: regulation_id.to_string(),
                relevance_score: MANUAL_LINK_RELEVANCE,
                ai_explanation: Some(MANUAL_LINK_EXPLANATION.to_string()),
                is_primary: existing.is_empty(),
                created_at: Utc::now(),
            })
            .await?;
        Ok(self.ctx.violations().linked_regulations(&violation.id).await?)
    }

    pub async fn unlink_regulation(
        &self,
        user_id: &str,
        id: &str,
        regulation_id: &str,
    ) -> AppResult<Vec<LinkedRegulation>> {
        let violation = self.get(user_id, id).await?;
        self.ctx
            .violations()
            .unlink_regulation(&violation.id, regulation_id)
            .await
            .map_err(|e| match e {
                diesel::result::Error::NotFound => AppError::not_found("Regulation link"),
                other => other.into(),
            })?;
        Ok(self.ctx.violations().linked_regulations(&violation.id).await?)
    }

    /// Apply an optional accept/reject decision, then find the next pending
    /// violation starting at `pos`.
    pub async fn review_queue(
        &self,
        user_id: &str,
        inspection_id: &str,
        pos: Option<i64>,
        decision: Option<(&str, QueueAction)>,
    ) -> AppResult<QueueStep> {
        if self
            .ctx
            .inspections()
            .get(inspection_id, user_id)
            .await?
            .is_none()
        {
            return Err(AppError::not_found("Inspection"));
        }

        if let Some((violation_id, action)) = decision {
            let violation = self.get(user_id, violation_id).await?;
            if violation.inspection_id != inspection_id {
                return Err(AppError::not_found("Violation"));
            }
            self.ctx
                .violations()
                .set_status(violation_id, user_id, action.status())
                .await?;
        }

        let violations = self
            .ctx
            .violations()
            .list_for_inspection(inspection_id, user_id)
            .await?;
        let mut counts = StatusCounts::default();
        for v in &violations {
            counts.add(v.status, 1);
        }

        let pos = pos.filter(|p| *p >= 0).unwrap_or(0) as usize;
        match next_pending(&violations, pos) {
            Some(index) => {
                let violation = violations[index].clone();
                let regulations = self.ctx.violations().linked_regulations(&violation.id).await?;
                Ok(QueueStep::Next {
                    index,
                    violation,
                    regulations,
                    counts,
                    total: violations.len(),
                })
            }
            None => Ok(QueueStep::Complete { counts }),
        }
    }
}
