//! Legacy job sites.

use chrono::Utc;

use super::{patch, trimmed};
use crate::error::{AppError, AppResult, FieldError};
use crate::models::{page_offset, NewSite, Page, Site, SiteUpdate, PAGE_SIZE};
use crate::repository::models::SiteChanges;
use crate::repository::{now, DbContext};
use crate::utils::clean;

#[derive(Clone)]
pub struct SiteService {
    ctx: DbContext,
}

impl SiteService {
    pub fn new(ctx: DbContext) -> Self {
        Self { ctx }
    }

    /// A client reference must belong to the same user.
    async fn check_client(&self, user_id: &str, client_id: Option<&str>) -> AppResult<()> {
        if let Some(client_id) = client_id {
            if self.ctx.clients().get(client_id, user_id).await?.is_none() {
                return Err(AppError::validation(vec![FieldError::new(
                    "client_id",
                    "Choose one of your clients",
                )]));
            }
        }
        Ok(())
    }

    pub async fn create(&self, user_id: &str, input: NewSite) -> AppResult<Site> {
        input.validate()?;
        let client_id = clean(input.client_id);
        self.check_client(user_id, client_id.as_deref()).await?;

        let stamp = Utc::now();
        let site = Site {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            client_id,
            name: trimmed(&input.name),
            address_line1: clean(input.address_line1),
            address_line2: clean(input.address_line2),
            city: clean(input.city),
            state: clean(input.state),
            postal_code: clean(input.postal_code),
            notes: clean(input.notes),
            created_at: stamp,
            updated_at: stamp,
        };
        self.ctx.sites().create(&site).await?;
        Ok(site)
    }

    pub async fn get(&self, user_id: &str, id: &str) -> AppResult<Site> {
        self.ctx
            .sites()
            .get(id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Site"))
    }

    pub async fn list(&self, user_id: &str, q: Option<&str>, page: Option<i64>) -> AppResult<Page<Site>> {
        let (page, offset) = page_offset(page);
        let q = q.map(str::trim).filter(|q| !q.is_empty());
        let items = self.ctx.sites().list(user_id, q, PAGE_SIZE, offset).await?;
        let total = self.ctx.sites().count(user_id, q).await?;
        Ok(Page { items, page, total })
    }

    pub async fn update(&self, user_id: &str, id: &str, input: SiteUpdate) -> AppResult<Site> {
        input.validate()?;
        let client_id = patch(input.client_id);
        if let Some(Some(ref cid)) = client_id {
            self.check_client(user_id, Some(cid)).await?;
        }
        let changes = SiteChanges {
            name: input.name.as_deref().map(trimmed),
            client_id,
            address_line1: patch(input.address_line1),
            address_line2: patch(input.address_line2),
            city: patch(input.city),
            state: patch(input.state),
            postal_code: patch(input.postal_code),
            notes: patch(input.notes),
            updated_at: now(),
        };
        Ok(self.ctx.sites().update(id, user_id, &changes).await?)
    }

    /// Sites still referenced by inspections cannot be deleted.
    pub async fn delete(&self, user_id: &str, id: &str) -> AppResult<()> {
        let site = self.get(user_id, id).await?;
        if self.ctx.sites().inspection_count(&site.id).await? > 0 {
            return Err(AppError::Conflict(format!(
                "{} still has inspections",
                site.name
            )));
        }
        self.ctx.sites().delete(id, user_id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup;
    use super::*;
    use crate::models::NewClient;
    use crate::repository::test_support::create_user;

    #[tokio::test]
    async fn test_site_client_must_be_owned() {
        let env = setup().await;
        let owner = create_user(&env.ctx, "a@example.com").await;
        let other = create_user(&env.ctx, "b@example.com").await;
        let client = env
            .services
            .clients
            .create(
                &owner.id,
                NewClient {
                    name: "Acme".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = env
            .services
            .sites
            .create(
                &other.id,
                NewSite {
                    name: "Lot 7".into(),
                    client_id: Some(client.id.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "EINVALID");

        let site = env
            .services
            .sites
            .create(
                &owner.id,
                NewSite {
                    name: "Lot 7".into(),
                    client_id: Some(client.id),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let updated = env
            .services
            .sites
            .update(
                &owner.id,
                &site.id,
                SiteUpdate {
                    city: Some("Shelbyville".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Lot 7");
        assert_eq!(updated.city.as_deref(), Some("Shelbyville"));

        env.services.sites.delete(&owner.id, &site.id).await.unwrap();
        assert_eq!(
            env.services.sites.get(&owner.id, &site.id).await.unwrap_err().code(),
            "ENOTFOUND"
        );
    }
}
