//! User accounts and subscription state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    None,
    Trialing,
    Active,
    PastDue,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "none" => Some(Self::None),
            "trialing" => Some(Self::Trialing),
            "active" => Some(Self::Active),
            "past_due" => Some(Self::PastDue),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Map a Stripe subscription status onto ours.
    pub fn from_stripe(s: &str) -> Self {
        match s {
            "trialing" => Self::Trialing,
            "active" => Self::Active,
            "past_due" | "unpaid" => Self::PastDue,
            "canceled" | "incomplete_expired" => Self::Canceled,
            _ => Self::None,
        }
    }

    pub fn is_entitled(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    Free,
    Pro,
    Business,
}

impl SubscriptionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Business => "business",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "free" => Some(Self::Free),
            "pro" => Some(Self::Pro),
            "business" => Some(Self::Business),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub company_name: Option<String>,
    pub license_number: Option<String>,
    pub phone: Option<String>,
    pub is_admin: bool,
    pub email_verified_at: Option<DateTime<Utc>>,
    pub stripe_customer_id: Option<String>,
    pub subscription_status: SubscriptionStatus,
    pub subscription_tier: SubscriptionTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn has_active_subscription(&self) -> bool {
        self.subscription_status.is_entitled()
    }
}

/// Business-profile fields a user can edit.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub company_name: Option<String>,
    pub license_number: Option<String>,
    pub phone: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripe_status_mapping() {
        assert_eq!(SubscriptionStatus::from_stripe("active"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::from_stripe("unpaid"), SubscriptionStatus::PastDue);
        assert_eq!(SubscriptionStatus::from_stripe("incomplete"), SubscriptionStatus::None);
        assert_eq!(
            SubscriptionStatus::from_stripe("incomplete_expired"),
            SubscriptionStatus::Canceled
        );
    }

    #[test]
    fn test_entitlement() {
        assert!(SubscriptionStatus::Trialing.is_entitled());
        assert!(SubscriptionStatus::Active.is_entitled());
        assert!(!SubscriptionStatus::PastDue.is_entitled());
        assert!(!SubscriptionStatus::None.is_entitled());
    }
}
