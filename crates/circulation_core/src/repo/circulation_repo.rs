//! Circulation repository contract and its key-value store implementation.

use crate::model::book::Book;
use crate::model::loan::Loan;
use crate::model::notification::Notification;
use crate::model::user::User;
use crate::store::{KvStore, StoreError, StoreKey};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

#[derive(Debug)]
pub enum RepoError {
    Store(StoreError),
    Decode {
        key: StoreKey,
        source: serde_json::Error,
    },
    Encode {
        key: StoreKey,
        source: serde_json::Error,
    },
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Decode { key, source } => {
                write!(f, "invalid persisted data under `{key}`: {source}")
            }
            Self::Encode { key, source } => write!(f, "failed to encode `{key}`: {source}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Decode { source, .. } | Self::Encode { source, .. } => Some(source),
        }
    }
}

impl From<StoreError> for RepoError {
    fn from(value: StoreError) -> Self {
        Self::Store(value)
    }
}

/// Everything one reconciliation pass looks at, read from scratch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    pub books: Vec<Book>,
    pub loans: Vec<Loan>,
    pub notifications: Vec<Notification>,
}

/// Typed access to the fixed store keys.
pub trait CirculationRepository {
    fn load_books(&self) -> RepoResult<Vec<Book>>;
    fn save_books(&self, books: &[Book]) -> RepoResult<()>;
    fn load_users(&self) -> RepoResult<Vec<User>>;
    fn save_users(&self, users: &[User]) -> RepoResult<()>;
    fn load_loans(&self) -> RepoResult<Vec<Loan>>;
    fn save_loans(&self, loans: &[Loan]) -> RepoResult<()>;
    /// Newest first.
    fn load_notifications(&self) -> RepoResult<Vec<Notification>>;
    fn save_notifications(&self, notifications: &[Notification]) -> RepoResult<()>;
    fn load_session(&self) -> RepoResult<Option<User>>;
    /// `None` removes the session key.
    fn save_session(&self, user: Option<&User>) -> RepoResult<()>;
    /// See [`KvStore::external_version`].
    fn external_version(&self) -> RepoResult<u64>;

    fn snapshot(&self) -> RepoResult<StoreSnapshot> {
        Ok(StoreSnapshot {
            books: self.load_books()?,
            loans: self.load_loans()?,
            notifications: self.load_notifications()?,
        })
    }
}

/// JSON-over-`KvStore` repository.
#[derive(Clone, Copy)]
pub struct StoreRepository<S: KvStore> {
    store: S,
}

impl<S: KvStore> StoreRepository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    fn read_value<T: DeserializeOwned>(&self, key: StoreKey) -> RepoResult<Option<T>> {
        let Some(raw) = self.store.read(key)? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| RepoError::Decode { key, source })
    }

    fn write_value<T: Serialize + ?Sized>(&self, key: StoreKey, value: &T) -> RepoResult<()> {
        let raw =
            serde_json::to_string(value).map_err(|source| RepoError::Encode { key, source })?;
        self.store.write(key, &raw)?;
        Ok(())
    }

    fn read_list<T: DeserializeOwned>(&self, key: StoreKey) -> RepoResult<Vec<T>> {
        Ok(self.read_value(key)?.unwrap_or_default())
    }
}

impl<S: KvStore> CirculationRepository for StoreRepository<S> {
    fn load_books(&self) -> RepoResult<Vec<Book>> {
        self.read_list(StoreKey::Books)
    }

    fn save_books(&self, books: &[Book]) -> RepoResult<()> {
        self.write_value(StoreKey::Books, books)
    }

    fn load_users(&self) -> RepoResult<Vec<User>> {
        self.read_list(StoreKey::Users)
    }

    fn save_users(&self, users: &[User]) -> RepoResult<()> {
        self.write_value(StoreKey::Users, users)
    }

    fn load_loans(&self) -> RepoResult<Vec<Loan>> {
        self.read_list(StoreKey::Loans)
    }

    fn save_loans(&self, loans: &[Loan]) -> RepoResult<()> {
        self.write_value(StoreKey::Loans, loans)
    }

    fn load_notifications(&self) -> RepoResult<Vec<Notification>> {
        self.read_list(StoreKey::Notifications)
    }

    fn save_notifications(&self, notifications: &[Notification]) -> RepoResult<()> {
        self.write_value(StoreKey::Notifications, notifications)
    }

    fn load_session(&self) -> RepoResult<Option<User>> {
        self.read_value(StoreKey::Session)
    }

    fn save_session(&self, user: Option<&User>) -> RepoResult<()> {
        match user {
            Some(user) => self.write_value(StoreKey::Session, user),
            None => Ok(self.store.remove(StoreKey::Session)?),
        }
    }

    fn external_version(&self) -> RepoResult<u64> {
        Ok(self.store.external_version()?)
    }
}
