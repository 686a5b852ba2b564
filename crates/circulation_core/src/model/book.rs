//! Book catalog record.

use super::{require_text, ValidationError};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type BookId = Uuid;

/// Catalog entry with its shelf stock.
///
/// `available_copies` is unsigned, so the non-negativity invariant holds by
/// construction; the inventory ledger clamps decrements at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    pub id: BookId,
    pub title: String,
    pub author: String,
    #[serde(default)]
    pub genre: String,
    /// Cover image URL or path; empty when unknown.
    #[serde(default)]
    pub cover: String,
    pub available_copies: u32,
}

impl Book {
    /// Creates a catalog entry with a generated id.
    pub fn new(
        title: impl Into<String>,
        author: impl Into<String>,
        available_copies: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            author: author.into(),
            genre: String::new(),
            cover: String::new(),
            available_copies,
        }
    }

    /// Title and author are the two fields a catalog entry cannot omit.
    pub fn validate(&self) -> Result<(), ValidationError> {
        require_text(&self.title, "title")?;
        require_text(&self.author, "author")?;
        Ok(())
    }

    pub fn is_available(&self) -> bool {
        self.available_copies > 0
    }
}
