//! User record.
//!
//! Users are only referenced by loans here; sign-in and credential checks
//! belong to an external collaborator. The credential is stored as given and
//! is never written to logs or `Debug` output.

use super::{require_text, ValidationError};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use uuid::Uuid;

pub type UserId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    Patron,
    Staff,
    Librarian,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Patron => "patron",
            Self::Staff => "staff",
            Self::Librarian => "librarian",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: UserRole,
    pub credential: String,
}

impl User {
    /// Fresh id; not validated until stored.
    pub fn new(name: impl Into<String>, role: UserRole, credential: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role,
            credential: credential.into(),
        }
    }

    /// Checks the name and the credential length against `min_password_len`.
    pub fn validate(&self, min_password_len: usize) -> Result<(), ValidationError> {
        require_text(&self.name, "name")?;
        validate_password(&self.credential, min_password_len)
    }
}

impl Debug for User {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("credential", &"<redacted>")
            .finish()
    }
}

/// Rejects passwords shorter than `min_len` characters.
pub fn validate_password(password: &str, min_len: usize) -> Result<(), ValidationError> {
    let actual = password.chars().count();
    if actual < min_len {
        return Err(ValidationError::PasswordTooShort {
            min: min_len,
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_password, User, UserRole};
    use crate::model::ValidationError;

    #[test]
    fn debug_output_redacts_credential() {
        let user = User::new("Ana", UserRole::Patron, "s3cret");
        let rendered = format!("{user:?}");
        assert!(!rendered.contains("s3cret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn password_minimum_counts_characters_not_bytes() {
        assert!(validate_password("ção!", 4).is_ok());
        assert_eq!(
            validate_password("abc", 4).unwrap_err(),
            ValidationError::PasswordTooShort { min: 4, actual: 3 }
        );
    }

    #[test]
    fn validate_rejects_blank_name() {
        let user = User::new("  ", UserRole::Staff, "long enough");
        assert_eq!(
            user.validate(4).unwrap_err(),
            ValidationError::MissingField("name")
        );
    }
}
