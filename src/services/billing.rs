//! Stripe webhook verification and subscription sync.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, info};

use crate::config::BillingConfig;
use crate::error::{AppError, AppResult};
use crate::models::{SubscriptionStatus, SubscriptionTier, User};
use crate::repository::DbContext;

/// Maximum age of a signed webhook.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The event changed a user's subscription.
    Applied { user_id: String },
    /// Recognized signature but nothing to do.
    Ignored,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: Value,
}

/// Check a `Stripe-Signature` header (`t=...,v1=...`) against the payload.
pub fn verify_signature(payload: &[u8], header: &str, secret: &str, now: i64) -> AppResult<()> {
    let bad = || AppError::Unauthorized("Invalid webhook signature".to_string());

    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", t)) => timestamp = t.parse::<i64>().ok(),
            Some(("v1", sig)) => signatures.push(sig),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or_else(bad)?;
    let skew = now.checked_sub(timestamp).map(i64::unsigned_abs);
    if skew.map_or(true, |d| d > SIGNATURE_TOLERANCE_SECS.unsigned_abs()) {
        return Err(bad());
    }

    for sig in signatures {
        let Ok(sig) = hex::decode(sig) else { continue };
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(&sig).is_ok() {
            return Ok(());
        }
    }
    Err(bad())
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

#[derive(Clone)]
pub struct BillingService {
    ctx: DbContext,
    config: BillingConfig,
}

impl BillingService {
    pub fn new(ctx: DbContext, config: BillingConfig) -> Self {
        Self { ctx, config }
    }

    /// Verify and apply one webhook delivery.
    pub async fn handle_webhook(&self, payload: &[u8], signature: &str) -> AppResult<WebhookOutcome> {
        let secret = self
            .config
            .webhook_secret
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::NotImplemented("Billing is not configured".to_string()))?;
        verify_signature(payload, signature, secret, Utc::now().timestamp())?;

        let event: Event = serde_json::from_slice(payload)
            .map_err(|e| AppError::invalid(format!("Malformed event: {}", e)))?;
        self.apply(&event.kind, &event.data.object).await
    }

    async fn apply(&self, kind: &str, object: &Value) -> AppResult<WebhookOutcome> {
        let update = match kind {
            "checkout.session.completed" => return self.checkout_completed(object).await,
            "customer.subscription.created" | "customer.subscription.updated" => {
                let status = SubscriptionStatus::from_stripe(str_at(object, &["status"]).unwrap_or(""));
                (status, Some(self.tier_for(object)))
            }
            "customer.subscription.deleted" => {
                (SubscriptionStatus::Canceled, Some(SubscriptionTier::Free))
            }
            "invoice.payment_succeeded" => (SubscriptionStatus::Active, None),
            "invoice.payment_failed" => (SubscriptionStatus::PastDue, None),
            other => {
                debug!(event = other, "ignoring webhook event");
                return Ok(WebhookOutcome::Ignored);
            }
        };

        let Some(user) = self.customer_user(object).await? else {
            debug!(event = kind, "webhook for unknown customer");
            return Ok(WebhookOutcome::Ignored);
        };
        let (status, tier) = update;
        self.ctx.users().set_subscription(&user.id, status, tier).await?;
        info!(user_id = %user.id, event = kind, status = status.as_str(), "subscription updated");
        Ok(WebhookOutcome::Applied { user_id: user.id })
    }

    /// A completed checkout ties the Stripe customer to our user, found via
    /// `client_reference_id` or the customer email.
    async fn checkout_completed(&self, object: &Value) -> AppResult<WebhookOutcome> {
        let users = self.ctx.users();
        let user = match str_at(object, &["client_reference_id"]) {
            Some(id) => users.get(id).await?,
            None => match str_at(object, &["customer_details", "email"])
                .or_else(|| str_at(object, &["customer_email"]))
            {
                Some(email) => users.get_by_email(&email.to_lowercase()).await?,
                None => None,
            },
        };
        let Some(user) = user else {
            debug!("checkout for unknown user");
            return Ok(WebhookOutcome::Ignored);
        };

        if let Some(customer) = str_at(object, &["customer"]) {
            users.set_stripe_customer(&user.id, customer).await?;
        }
        users
            .set_subscription(&user.id, SubscriptionStatus::Active, Some(self.tier_for(object)))
            .await?;
        info!(user_id = %user.id, "checkout completed");
        Ok(WebhookOutcome::Applied { user_id: user.id })
    }

    async fn customer_user(&self, object: &Value) -> AppResult<Option<User>> {
        match str_at(object, &["customer"]) {
            Some(customer) => Ok(self.ctx.users().get_by_customer_id(customer).await?),
            None => Ok(None),
        }
    }

    /// Tier from the configured price mapping, then `metadata.tier`, then Pro.
    fn tier_for(&self, object: &Value) -> SubscriptionTier {
        let price = object
            .pointer("/items/data/0/price")
            .or_else(|| object.pointer("/lines/data/0/price"));
        if let Some(price) = price {
            for key in ["lookup_key", "id"] {
                let mapped = str_at(price, &[key])
                    .and_then(|k| self.config.price_tiers.get(k))
                    .and_then(|t| SubscriptionTier::from_str(t));
                if let Some(tier) = mapped {
                    return tier;
                }
            }
        }
        str_at(object, &["metadata", "tier"])
            .and_then(SubscriptionTier::from_str)
            .unwrap_or(SubscriptionTier::Pro)
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{setup_with, TestEnv};
    use super::*;
    use crate::repository::test_support::create_user;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    fn sign(payload: &[u8], t: i64) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{}.", t).as_bytes());
        mac.update(payload);
        format!("t={},v1={}", t, hex::encode(mac.finalize().into_bytes()))
    }

    async fn env() -> TestEnv {
        setup_with(|s| {
            s.billing.webhook_secret = Some(SECRET.to_string());
            s.billing
                .price_tiers
                .insert("business_monthly".to_string(), "business".to_string());
        })
        .await
    }

    async fn deliver(env: &TestEnv, event: Value) -> AppResult<WebhookOutcome> {
        let payload = serde_json::to_vec(&event).unwrap();
        let header = sign(&payload, Utc::now().timestamp());
        env.services.billing.handle_webhook(&payload, &header).await
    }

    #[test]
    fn test_verify_signature() {
        let payload = br#"{"id":"evt_1"}"#;
        let now = 1_700_000_000;
        let header = sign(payload, now);
        assert!(verify_signature(payload, &header, SECRET, now).is_ok());
        assert!(verify_signature(payload, &header, SECRET, now + 299).is_ok());
        assert!(verify_signature(payload, &header, SECRET, now + 301).is_err());
        assert!(verify_signature(b"tampered", &header, SECRET, now).is_err());
        assert!(verify_signature(payload, &header, "other", now).is_err());
        assert!(verify_signature(payload, "v1=abc", SECRET, now).is_err());

        // Extra signatures from rolled secrets are tolerated.
        let rolled = format!("{},v1=deadbeef", header);
        assert!(verify_signature(payload, &rolled, SECRET, now).is_ok());
    }

    #[test]
    fn test_extreme_timestamps_are_rejected() {
        let now = 1_700_000_000;
        for t in [i64::MIN, i64::MAX, -1] {
            let header = format!("t={},v1=00", t);
            let err = verify_signature(b"{}", &header, SECRET, now).unwrap_err();
            assert_eq!(err.code(), "EUNAUTHORIZED");
        }
        let err = verify_signature(b"{}", "t=0,v1=00", SECRET, i64::MIN).unwrap_err();
        assert_eq!(err.code(), "EUNAUTHORIZED");
    }

    #[tokio::test]
    async fn test_unconfigured_secret() {
        let env = setup_with(|_| {}).await;
        let err = env
            .services
            .billing
            .handle_webhook(b"{}", "t=1,v1=00")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "ENOTIMPL");
    }

    #[tokio::test]
    async fn test_subscription_lifecycle() {
        let env = env().await;
        let user = create_user(&env.ctx, "owner@example.com").await;

        let outcome = deliver(
            &env,
            json!({
                "type": "checkout.session.completed",
                "data": {"object": {"client_reference_id": user.id, "customer": "cus_1"}}
            }),
        )
        .await
        .unwrap();
        assert_eq!(outcome, WebhookOutcome::Applied { user_id: user.id.clone() });
        let u = env.ctx.users().get(&user.id).await.unwrap().unwrap();
        assert_eq!(u.stripe_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(u.subscription_status, SubscriptionStatus::Active);
        assert_eq!(u.subscription_tier, SubscriptionTier::Pro);

        deliver(
            &env,
            json!({
                "type": "customer.subscription.updated",
                "data": {"object": {
                    "customer": "cus_1",
                    "status": "active",
                    "items": {"data": [{"price": {"id": "price_9", "lookup_key": "business_monthly"}}]}
                }}
            }),
        )
        .await
        .unwrap();
        let u = env.ctx.users().get(&user.id).await.unwrap().unwrap();
        assert_eq!(u.subscription_tier, SubscriptionTier::Business);

        deliver(
            &env,
            json!({"type": "invoice.payment_failed", "data": {"object": {"customer": "cus_1"}}}),
        )
        .await
        .unwrap();
        let u = env.ctx.users().get(&user.id).await.unwrap().unwrap();
        assert_eq!(u.subscription_status, SubscriptionStatus::PastDue);
        assert_eq!(u.subscription_tier, SubscriptionTier::Business);

        deliver(
            &env,
            json!({"type": "customer.subscription.deleted", "data": {"object": {"customer": "cus_1"}}}),
        )
        .await
        .unwrap();
        let u = env.ctx.users().get(&user.id).await.unwrap().unwrap();
        assert_eq!(u.subscription_status, SubscriptionStatus::Canceled);
        assert_eq!(u.subscription_tier, SubscriptionTier::Free);
    }

    #[tokio::test]
    async fn test_unknown_events_and_customers_are_ignored() {
        let env = env().await;
        let outcome = deliver(
            &env,
            json!({"type": "charge.refunded", "data": {"object": {}}}),
        )
        .await
        .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);

        let outcome = deliver(
            &env,
            json!({"type": "invoice.payment_succeeded", "data": {"object": {"customer": "cus_nobody"}}}),
        )
        .await
        .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored);
    }
}
