//! Violation repository, including regulation links.

use std::collections::HashMap;

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{
    RegulationRecord, ViolationChanges, ViolationRecord, ViolationRegulationRecord,
};
use super::pool::{DbError, DbPool};
use super::util::expect_rows;
use super::now;
use crate::models::{
    LinkedRegulation, Regulation, StatusCounts, Violation, ViolationRegulation, ViolationStatus,
};
use crate::schema::{regulations, violation_regulations, violations};

#[derive(Clone)]
pub struct ViolationRepository {
    pool: DbPool,
}

impl ViolationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, violation: &Violation) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        diesel::insert_into(violations::table)
            .values(ViolationRecord::from(violation))
            .execute(&mut conn)
            .await?;
        Ok(())
    }

    pub async fn get(&self, id: &str, user_id: &str) -> Result<Option<Violation>, DbError> {
        let mut conn = self.pool.get().await?;
        violations::table
            .filter(violations::id.eq(id))
            .filter(violations::user_id.eq(user_id))
            .select(ViolationRecord::as_select())
            .first(&mut conn)
            .await
            .optional()
            .map(|r| r.map(Violation::from))
    }

    /// Violations of an inspection in stable `(created_at, id)` order.
    pub async fn list_for_inspection(
        &self,
        inspection_id: &str,
        user_id: &str,
    ) -> Result<Vec<Violation>, DbError> {
        let mut conn = self.pool.get().await?;
        violations::table
            .filter(violations::inspection_id.eq(inspection_id))
            .filter(violations::user_id.eq(user_id))
            .order((violations::created_at.asc(), violations::id.asc()))
            .select(ViolationRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(Violation::from).collect())
    }

    pub async fn list_with_status(
        &self,
        inspection_id: &str,
        user_id: &str,
        status: ViolationStatus,
    ) -> Result<Vec<Violation>, DbError> {
        let mut conn = self.pool.get().await?;
        violations::table
            .filter(violations::inspection_id.eq(inspection_id))
            .filter(violations::user_id.eq(user_id))
            .filter(violations::status.eq(status.as_str()))
            .order((violations::created_at.asc(), violations::id.asc()))
            .select(ViolationRecord::as_select())
            .load(&mut conn)
            .await
            .map(|records| records.into_iter().map(Violation::from).collect())
    }

    pub async fn update(
        &self,
        id: &str,
        user_id: &str,
        changes: &ViolationChanges,
    ) -> Result<Violation, DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(
            violations::table
                .filter(violations::id.eq(id))
                .filter(violations::user_id.eq(user_id)),
        )
        .set(changes)
        .execute(&mut conn)
        .await?;
        expect_rows(affected)?;

        violations::table
            .find(id)
            .select(ViolationRecord::as_select())
            .first(&mut conn)
            .await
            .map(Violation::from)
    }

    pub async fn set_status(
        &self,
        id: &str,
        user_id: &str,
        status: ViolationStatus,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::update(
            violations::table
                .filter(violations::id.eq(id))
                .filter(violations::user_id.eq(user_id)),
        )
        .set((
            violations::status.eq(status.as_str()),
            violations::updated_at.eq(now()),
        ))
        .execute(&mut conn)
        .await?;
        expect_rows(affected)
    }

    pub async fn delete(&self, id: &str, user_id: &str) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::delete(
            violations::table
                .filter(violations::id.eq(id))
                .filter(violations::user_id.eq(user_id)),
        )
        .execute(&mut conn)
        .await?;
        expect_rows(affected)
    }

    pub async fn status_counts(
        &self,
        inspection_id: &str,
        user_id: &str,
    ) -> Result<StatusCounts, DbError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<(String, i64)> = violations::table
            .filter(violations::inspection_id.eq(inspection_id))
            .filter(violations::user_id.eq(user_id))
            .group_by(violations::status)
            .select((violations::status, diesel::dsl::count_star()))
            .load(&mut conn)
            .await?;

        let mut counts = StatusCounts::default();
        for (status, n) in rows {
            if let Some(status) = ViolationStatus::from_str(&status) {
                counts.add(status, n);
            }
        }
        Ok(counts)
    }

    pub async fn confirmed_count(&self, inspection_id: &str, user_id: &str) -> Result<i64, DbError> {
        Ok(self.status_counts(inspection_id, user_id).await?.confirmed)
    }

    /// Link a regulation; returns false if the link already existed.
    pub async fn link_regulation(&self, link: &ViolationRegulation) -> Result<bool, DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::insert_or_ignore_into(violation_regulations::table)
            .values(ViolationRegulationRecord {
                violation_id: link.violation_id.clone(),
                regulation_id: link.regulation_id.clone(),
                relevance_score: link.relevance_score,
                ai_explanation: link.ai_explanation.clone(),
                is_primary: link.is_primary,
                created_at: super::timestamp(link.created_at),
            })
            .execute(&mut conn)
            .await?;
        Ok(affected > 0)
    }

    pub async fn unlink_regulation(
        &self,
        violation_id: &str,
        regulation_id: &str,
    ) -> Result<(), DbError> {
        let mut conn = self.pool.get().await?;
        let affected = diesel::delete(
            violation_regulations::table
                .filter(violation_regulations::violation_id.eq(violation_id))
                .filter(violation_regulations::regulation_id.eq(regulation_id)),
        )
        .execute(&mut conn)
        .await?;
        expect_rows(affected)
    }

    /// Regulations linked to one violation, primary first.
    pub async fn linked_regulations(
        &self,
        violation_id: &str,
    ) -> Result<Vec<LinkedRegulation>, DbError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<(ViolationRegulationRecord, RegulationRecord)> =
            violation_regulations::table
                .inner_join(regulations::table)
                .filter(violation_regulations::violation_id.eq(violation_id))
                .order((
                    violation_regulations::is_primary.desc(),
                    violation_regulations::relevance_score.desc(),
                    regulations::standard_number.asc(),
                ))
                .select((
                    ViolationRegulationRecord::as_select(),
                    RegulationRecord::as_select(),
                ))
                .load(&mut conn)
                .await?;
        Ok(rows.into_iter().map(to_linked).collect())
    }

    /// Linked regulations for every violation of an inspection, keyed by
    /// violation ID.
    pub async fn linked_regulations_for_inspection(
        &self,
        inspection_id: &str,
        user_id: &str,
    ) -> Result<HashMap<String, Vec<LinkedRegulation>>, DbError> {
        let mut conn = self.pool.get().await?;
        let rows: Vec<(ViolationRegulationRecord, RegulationRecord)> =
            violation_regulations::table
                .inner_join(regulations::table)
                .inner_join(violations::table)
                .filter(violations::inspection_id.eq(inspection_id))
                .filter(violations::user_id.eq(user_id))
                .order((
                    violation_regulations::is_primary.desc(),
                    violation_regulations::relevance_score.desc(),
                    regulations::standard_number.asc(),
                ))
                .select((
                    ViolationRegulationRecord::as_select(),
                    RegulationRecord::as_select(),
                ))
                .load(&mut conn)
                .await?;

        let mut map: HashMap<String, Vec<LinkedRegulation>> = HashMap::new();
        for row in rows {
            let violation_id = row.0.violation_id.clone();
            map.entry(violation_id).or_default().push(to_linked(row));
        }
        Ok(map)
    }
}

fn to_linked((link, regulation): (ViolationRegulationRecord, RegulationRecord)) -> LinkedRegulation {
    LinkedRegulation {
        regulation: Regulation::from(regulation),
        relevance_score: link.relevance_score,
        ai_explanation: link.ai_explanation,
        is_primary: link.is_primary,
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::super::inspections::tests::inspection;
    use super::super::test_support::{create_user, setup_test_db};
    use super::*;
    use crate::models::{NewRegulation, Severity, MANUAL_LINK_EXPLANATION, MANUAL_LINK_RELEVANCE};
    use chrono::{Duration, Utc};

    pub(crate) fn violation(user_id: &str, inspection_id: &str, description: &str) -> Violation {
        Violation {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            inspection_id: inspection_id.to_string(),
            image_id: None,
            description: description.to_string(),
            ai_description: None,
            severity: Severity::Serious,
            confidence: None,
            inspector_notes: None,
            status: ViolationStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_counts_and_order() {
        let (ctx, _dir) = setup_test_db().await;
        let user = create_user(&ctx, "a@example.com").await;
        let insp = inspection(&user.id, "Deck");
        ctx.inspections().create(&insp).await.unwrap();
        let repo = ctx.violations();

        let base = Utc::now();
        for (i, desc) in ["first", "second", "third"].iter().enumerate() {
            let mut v = violation(&user.id, &insp.id, desc);
            v.created_at = base + Duration::seconds(i as i64);
            repo.create(&v).await.unwrap();
        }
        let all = repo.list_for_inspection(&insp.id, &user.id).await.unwrap();
        let order: Vec<_> = all.iter().map(|v| v.description.as_str()).collect();
        assert_eq!(order, vec!["first", "second", "third"]);

        repo.set_status(&all[0].id, &user.id, ViolationStatus::Confirmed)
            .await
            .unwrap();
        repo.set_status(&all[1].id, &user.id, ViolationStatus::Rejected)
            .await
            .unwrap();

        let counts = repo.status_counts(&insp.id, &user.id).await.unwrap();
        assert_eq!(counts, StatusCounts { pending: 1, confirmed: 1, rejected: 1 });
        assert_eq!(repo.confirmed_count(&insp.id, &user.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_regulation_links() {
        let (ctx, _dir) = setup_test_db().await;
        let user = create_user(&ctx, "a@example.com").await;
        let insp = inspection(&user.id, "Deck");
        ctx.inspections().create(&insp).await.unwrap();
        let v = violation(&user.id, &insp.id, "Open edge");
        ctx.violations().create(&v).await.unwrap();

        let reg = ctx
            .regulations()
            .upsert(&NewRegulation {
                standard_number: "1926.501(b)(1)".into(),
                title: "Unprotected sides and edges".into(),
                category: "Fall Protection".into(),
                full_text: "Each employee on a walking/working surface...".into(),
            })
            .await
            .unwrap();

        let link = ViolationRegulation {
            violation_id: v.id.clone(),
            regulation_id: reg.id.clone(),
            relevance_score: MANUAL_LINK_RELEVANCE,
            ai_explanation: Some(MANUAL_LINK_EXPLANATION.into()),
            is_primary: false,
            created_at: Utc::now(),
        };
        let repo = ctx.violations();
        assert!(repo.link_regulation(&link).await.unwrap());
        assert!(!repo.link_regulation(&link).await.unwrap());

        let linked = repo.linked_regulations(&v.id).await.unwrap();
        assert_eq!(linked.len(), 1);
        assert_eq!(linked[0].regulation.standard_number, "1926.501(b)(1)");

        let by_violation = repo
            .linked_regulations_for_inspection(&insp.id, &user.id)
            .await
            .unwrap();
        assert_eq!(by_violation[&v.id].len(), 1);

        repo.unlink_regulation(&v.id, &reg.id).await.unwrap();
        assert!(repo.unlink_regulation(&v.id, &reg.id).await.is_err());
    }
}
