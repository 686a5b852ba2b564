//! Runtime configuration for viewer sessions and circulation rules.
//!
//! # Invariants
//! - Every field has a default, so an empty JSON object is a valid config.
//! - Loaded configs are validated before use; zero intervals are rejected.

use crate::model::user::UserRole;
use serde::{Deserialize, Deserializer, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

/// Which side of the desk a viewer session represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerRole {
    Librarian,
    Patron,
}

impl ViewerRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Librarian => "librarian",
            Self::Patron => "patron",
        }
    }

    /// Staff and patrons both browse as patrons; only librarians run the desk.
    pub fn for_user_role(role: UserRole) -> Self {
        match role {
            UserRole::Librarian => Self::Librarian,
            UserRole::Patron | UserRole::Staff => Self::Patron,
        }
    }
}

/// Polling cadence and deadline window for one viewer role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewerPolicy {
    pub poll_interval_ms: u64,
    /// Inclusive: a loan `near_deadline_days` days out still warns.
    pub near_deadline_days: i64,
}

impl ViewerPolicy {
    pub const LIBRARIAN: ViewerPolicy = ViewerPolicy {
        poll_interval_ms: 5_000,
        near_deadline_days: 2,
    };
    pub const PATRON: ViewerPolicy = ViewerPolicy {
        poll_interval_ms: 15_000,
        near_deadline_days: 3,
    };

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Partial policy from a config file, layered over the role's defaults.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyOverrides {
    poll_interval_ms: Option<u64>,
    near_deadline_days: Option<i64>,
}

impl PolicyOverrides {
    fn over(self, base: ViewerPolicy) -> ViewerPolicy {
        ViewerPolicy {
            poll_interval_ms: self.poll_interval_ms.unwrap_or(base.poll_interval_ms),
            near_deadline_days: self.near_deadline_days.unwrap_or(base.near_deadline_days),
        }
    }
}

fn librarian_policy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ViewerPolicy, D::Error> {
    PolicyOverrides::deserialize(deserializer).map(|o| o.over(ViewerPolicy::LIBRARIAN))
}

fn patron_policy<'de, D: Deserializer<'de>>(deserializer: D) -> Result<ViewerPolicy, D::Error> {
    PolicyOverrides::deserialize(deserializer).map(|o| o.over(ViewerPolicy::PATRON))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CirculationConfig {
    #[serde(deserialize_with = "librarian_policy")]
    pub librarian: ViewerPolicy,
    #[serde(deserialize_with = "patron_policy")]
    pub patron: ViewerPolicy,
    /// Default due-date offset applied at approval.
    pub loan_period_days: u32,
    pub min_password_len: usize,
    /// How often the store is checked for writes by other processes.
    pub change_check_interval_ms: u64,
}

impl Default for CirculationConfig {
    fn default() -> Self {
        Self {
            librarian: ViewerPolicy::LIBRARIAN,
            patron: ViewerPolicy::PATRON,
            loan_period_days: 7,
            min_password_len: 4,
            change_check_interval_ms: 500,
        }
    }
}

impl CirculationConfig {
    pub fn policy(&self, role: ViewerRole) -> ViewerPolicy {
        match role {
            ViewerRole::Librarian => self.librarian,
            ViewerRole::Patron => self.patron,
        }
    }

    pub fn change_check_interval(&self) -> Duration {
        Duration::from_millis(self.change_check_interval_ms)
    }

    /// Rejects zero intervals, negative deadline windows and zero limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (role, policy) in [("librarian", self.librarian), ("patron", self.patron)] {
            if policy.poll_interval_ms == 0 {
                return Err(ConfigError::Invalid(format!(
                    "{role}.poll_interval_ms must be > 0"
                )));
            }
            if policy.near_deadline_days < 0 {
                return Err(ConfigError::Invalid(format!(
                    "{role}.near_deadline_days must be >= 0"
                )));
            }
        }
        if self.loan_period_days == 0 {
            return Err(ConfigError::Invalid(
                "loan_period_days must be > 0".to_string(),
            ));
        }
        if self.min_password_len == 0 {
            return Err(ConfigError::Invalid(
                "min_password_len must be >= 1".to_string(),
            ));
        }
        if self.change_check_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "change_check_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read config: {err}"),
            Self::Parse(err) => write!(f, "failed to parse config: {err}"),
            Self::Invalid(message) => write!(f, "invalid config: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}

/// Parses and validates a JSON config document.
pub fn parse_config(text: &str) -> Result<CirculationConfig, ConfigError> {
    let config: CirculationConfig = serde_json::from_str(text).map_err(ConfigError::Parse)?;
    config.validate()?;
    Ok(config)
}

/// Reads, parses and validates a JSON config file.
pub fn load_config(path: impl AsRef<Path>) -> Result<CirculationConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
    parse_config(&text)
}
