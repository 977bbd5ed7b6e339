//! Sites: job-site addresses kept for inspections created before the address
//! moved onto the inspection itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::client::join_address;
use crate::error::AppResult;
use crate::utils::{require, FieldErrors};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub id: String,
    pub user_id: String,
    pub client_id: Option<String>,
    pub name: String,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Site {
    pub fn address(&self) -> String {
        join_address(
            self.address_line1.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
            self.postal_code.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewSite {
    #[serde(default)]
    pub name: String,
    pub client_id: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
}

impl NewSite {
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "name", "Name", &self.name);
        errors.max_len("name", Some(&self.name), 200);
        errors.into_result()
    }
}

/// Partial update. `None` leaves a field unchanged; a blank string clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SiteUpdate {
    pub name: Option<String>,
    pub client_id: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
}

impl SiteUpdate {
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        if let Some(ref name) = self.name {
            require(&mut errors, "name", "Name", name);
        }
        errors.into_result()
    }
}
