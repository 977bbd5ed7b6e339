//! Client management.

use chrono::Utc;

use super::{patch, trimmed};
use crate::error::{AppError, AppResult};
use crate::models::{page_offset, Client, ClientUpdate, NewClient, Page, PAGE_SIZE};
use crate::repository::models::ClientChanges;
use crate::repository::{now, DbContext};
use crate::utils::clean;

#[derive(Clone)]
pub struct ClientService {
    ctx: DbContext,
}

impl ClientService {
    pub fn new(ctx: DbContext) -> Self {
        Self { ctx }
    }

    pub async fn create(&self, user_id: &str, input: NewClient) -> AppResult<Client> {
        input.validate()?;
        let stamp = Utc::now();
        let client = Client {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: trimmed(&input.name),
            contact_name: clean(input.contact_name),
            email: clean(input.email),
            phone: clean(input.phone),
            address_line1: clean(input.address_line1),
            address_line2: clean(input.address_line2),
            city: clean(input.city),
            state: clean(input.state),
            postal_code: clean(input.postal_code),
            notes: clean(input.notes),
            created_at: stamp,
            updated_at: stamp,
        };
        self.ctx.clients().create(&client).await?;
        tracing::info!(client_id = %client.id, user_id, "client created");
        Ok(client)
    }

    pub async fn get(&self, user_id: &str, id: &str) -> AppResult<Client> {
        self.ctx
            .clients()
            .get(id, user_id)
            .await?
            .ok_or_else(|| AppError::not_found("Client"))
    }

    pub async fn list(
        &self,
        user_id: &str,
        q: Option<&str>,
        page: Option<i64>,
    ) -> AppResult<Page<Client>> {
        let (page, offset) = page_offset(page);
        let q = q.map(str::trim).filter(|q| !q.is_empty());
        let repo = self.ctx.clients();
        let items = repo.list(user_id, q, PAGE_SIZE, offset).await?;
        let total = repo.count(user_id, q).await?;
        Ok(Page { items, page, total })
    }

    /// Every client of the user, for pickers.
    pub async fn all(&self, user_id: &str) -> AppResult<Vec<Client>> {
        Ok(self.ctx.clients().all_for_user(user_id).await?)
    }

    /// Apply a partial update. Fields absent from `input` keep their value.
    pub async fn update(&self, user_id: &str, id: &str, input: ClientUpdate) -> AppResult<Client> {
        input.validate()?;
        let changes = ClientChanges {
            name: input.name.as_deref().map(trimmed),
            contact_name: patch(input.contact_name),
            email: patch(input.email),
            phone: patch(input.phone),
            address_line1: patch(input.address_line1),
            address_line2: patch(input.address_line2),
            city: patch(input.city),
            state: patch(input.state),
            postal_code: patch(input.postal_code),
            notes: patch(input.notes),
            updated_at: now(),
        };
        Ok(self.ctx.clients().update(id, user_id, &changes).await?)
    }

    /// Delete a client that no site or inspection references.
    pub async fn delete(&self, user_id: &str, id: &str) -> AppResult<()> {
        let client = self.get(user_id, id).await?;
        let references = self.ctx.clients().reference_count(&client.id).await?;
        if references > 0 {
            return Err(AppError::Conflict(format!(
                "{} is used by {} site(s) or inspection(s)",
                client.name, references
            )));
        }
        self.ctx.clients().delete(id, user_id).await?;
        tracing::info!(client_id = id, user_id, "client deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::setup;
    use crate::models::{NewInspection, NewClient};
    use crate::repository::test_support::create_user;

    use super::*;

    fn acme() -> NewClient {
        NewClient {
            name: "  Acme Builders ".into(),
            email: Some("ops@acme.test".into()),
            city: Some("Springfield".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_then_get_round_trips() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let created = env.services.clients.create(&user.id, acme()).await.unwrap();
        assert_eq!(created.name, "Acme Builders");

        let fetched = env.services.clients.get(&user.id, &created.id).await.unwrap();
        assert_eq!(fetched.name, created.name);
        assert_eq!(fetched.email, created.email);
        assert_eq!(fetched.city, created.city);
    }

    #[tokio::test]
    async fn test_partial_update_preserves_other_fields() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let created = env.services.clients.create(&user.id, acme()).await.unwrap();

        let updated = env
            .services
            .clients
            .update(
                &user.id,
                &created.id,
                ClientUpdate {
                    phone: Some("555-0100".into()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.phone.as_deref(), Some("555-0100"));
        assert_eq!(updated.name, "Acme Builders");
        assert_eq!(updated.email.as_deref(), Some("ops@acme.test"));
        assert_eq!(updated.city.as_deref(), Some("Springfield"));
    }

    #[tokio::test]
    async fn test_other_users_client_is_not_found() {
        let env = setup().await;
        let owner = create_user(&env.ctx, "a@example.com").await;
        let other = create_user(&env.ctx, "b@example.com").await;
        let created = env.services.clients.create(&owner.id, acme()).await.unwrap();

        let err = env.services.clients.get(&other.id, &created.id).await.unwrap_err();
        assert_eq!(err.code(), "ENOTFOUND");
        let err = env
            .services
            .clients
            .update(&other.id, &created.id, ClientUpdate::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ENOTFOUND");
        let err = env.services.clients.delete(&other.id, &created.id).await.unwrap_err();
        assert_eq!(err.code(), "ENOTFOUND");
    }

    #[tokio::test]
    async fn test_delete_refused_while_referenced() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        let client = env.services.clients.create(&user.id, acme()).await.unwrap();
        env.services
            .inspections
            .create(
                &user.id,
                NewInspection {
                    title: "Tower crane check".into(),
                    client_id: Some(client.id.clone()),
                    inspection_date: "2024-05-01".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let err = env.services.clients.delete(&user.id, &client.id).await.unwrap_err();
        assert_eq!(err.code(), "ECONFLICT");
    }

    #[tokio::test]
    async fn test_list_paginates_and_searches() {
        let env = setup().await;
        let user = create_user(&env.ctx, "a@example.com").await;
        env.services.clients.create(&user.id, acme()).await.unwrap();
        env.services
            .clients
            .create(
                &user.id,
                NewClient {
                    name: "Zenith Roofing".into(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();

        let page = env.services.clients.list(&user.id, Some("zen"), None).await.unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].name, "Zenith Roofing");

        let page = env.services.clients.list(&user.id, Some("  "), Some(0)).await.unwrap();
        assert_eq!(page.page, 1);
        assert_eq!(page.total, 2);
    }
}
