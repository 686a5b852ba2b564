//! Shared-store adapter boundary.
//!
//! # Responsibility
//! - Name the fixed keys every viewer process reads and writes.
//! - Define the only surface components may use to reach the storage medium.
//!
//! # Invariants
//! - Values are opaque JSON text; typing happens in the repository layer.
//! - Each `write` is independent. There is no multi-key transaction and no
//!   compare-and-swap: the last writer wins.
//! - `external_version` changes only when some *other* writer committed.

use crate::db::DbError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod sqlite_store;

pub use sqlite_store::SqliteKvStore;

pub type StoreResult<T> = Result<T, StoreError>;

/// Fixed keys of the shared store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StoreKey {
    /// Ordered list of book records.
    Books,
    /// Ordered list of user records.
    Users,
    /// Ordered list of loan records.
    Loans,
    /// Notification records, newest first.
    Notifications,
    /// Single signed-in user record, absent when signed out.
    Session,
}

impl StoreKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Books => "books",
            Self::Users => "users",
            Self::Loans => "loans",
            Self::Notifications => "notifications",
            Self::Session => "session",
        }
    }
}

impl Display for StoreKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Store adapter failure.
#[derive(Debug)]
pub enum StoreError {
    Db(DbError),
}

impl Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
        }
    }
}

impl From<DbError> for StoreError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Abstract key-value persistence shared by independent viewer processes.
pub trait KvStore {
    /// Reads the raw value under `key`, `None` when never written or removed.
    fn read(&self, key: StoreKey) -> StoreResult<Option<String>>;
    /// Replaces the value under `key`.
    fn write(&self, key: StoreKey, value: &str) -> StoreResult<()>;
    /// Removes `key`; removing an absent key is not an error.
    fn remove(&self, key: StoreKey) -> StoreResult<()>;
    /// Opaque token that differs between two calls iff another writer
    /// committed in between, even when it wrote the value already stored.
    /// Writes through `self` do not move it.
    fn external_version(&self) -> StoreResult<u64>;
}

impl<S: KvStore + ?Sized> KvStore for &S {
    fn read(&self, key: StoreKey) -> StoreResult<Option<String>> {
        (**self).read(key)
    }

    fn write(&self, key: StoreKey, value: &str) -> StoreResult<()> {
        (**self).write(key, value)
    }

    fn remove(&self, key: StoreKey) -> StoreResult<()> {
        (**self).remove(key)
    }

    fn external_version(&self) -> StoreResult<u64> {
        (**self).external_version()
    }
}
