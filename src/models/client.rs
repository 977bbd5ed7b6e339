//! Clients: the construction companies an inspector works for.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::utils::{is_valid_email, require, FieldErrors};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Client {
    /// Single-line address for list views.
    pub fn address(&self) -> String {
        join_address(
            self.address_line1.as_deref(),
            self.city.as_deref(),
            self.state.as_deref(),
            self.postal_code.as_deref(),
        )
    }
}

pub(crate) fn join_address(
    line1: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
    postal_code: Option<&str>,
) -> String {
    let region = [state, postal_code]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join(" ");
    [line1, city, Some(region.as_str())]
        .into_iter()
        .flatten()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Input for creating a client.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewClient {
    #[serde(default)]
    pub name: String,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
}

impl NewClient {
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        require(&mut errors, "name", "Name", &self.name);
        errors.max_len("name", Some(&self.name), 200);
        check_email(&mut errors, self.email.as_deref());
        errors.max_len("notes", self.notes.as_deref(), 5000);
        errors.into_result()
    }
}

/// Partial update. `None` leaves a field unchanged; a blank string clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub contact_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub notes: Option<String>,
}

impl ClientUpdate {
    pub fn validate(&self) -> AppResult<()> {
        let mut errors = FieldErrors::new();
        if let Some(ref name) = self.name {
            require(&mut errors, "name", "Name", name);
            errors.max_len("name", Some(name), 200);
        }
        check_email(&mut errors, self.email.as_deref());
        errors.max_len("notes", self.notes.as_deref(), 5000);
        errors.into_result()
    }
}

pub(crate) fn check_email(errors: &mut FieldErrors, email: Option<&str>) {
    if let Some(email) = email.map(str::trim).filter(|e| !e.is_empty()) {
        if !is_valid_email(email) {
            errors.add("email", "Enter a valid email address");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_client_requires_name() {
        let err = NewClient::default().validate().unwrap_err();
        assert_eq!(err.code(), "EINVALID");
        assert_eq!(err.fields()[0].field, "name");
    }

    #[test]
    fn test_new_client_checks_email() {
        let client = NewClient {
            name: "Acme Builders".into(),
            email: Some("not-an-email".into()),
            ..Default::default()
        };
        let err = client.validate().unwrap_err();
        assert_eq!(err.fields()[0].field, "email");

        let client = NewClient {
            name: "Acme Builders".into(),
            email: Some("  ".into()),
            ..Default::default()
        };
        assert!(client.validate().is_ok());
    }

    #[test]
    fn test_update_allows_missing_name_but_not_blank() {
        assert!(ClientUpdate::default().validate().is_ok());
        let update = ClientUpdate {
            name: Some(" ".into()),
            ..Default::default()
        };
        assert!(update.validate().is_err());
    }

    #[test]
    fn test_join_address() {
        assert_eq!(
            join_address(Some("1 Main St"), Some("Springfield"), Some("IL"), Some("62701")),
            "1 Main St, Springfield, IL 62701"
        );
        assert_eq!(join_address(None, Some("Springfield"), None, None), "Springfield");
        assert_eq!(join_address(None, None, None, None), "");
    }
}
