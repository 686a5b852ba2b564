//! Inventory ledger: book records and their shelf counts.
//!
//! # Responsibility
//! - Apply the stock effect of loan transitions (approve: -1, return: +1).
//! - Own catalog edits (add, update, remove, search).
//!
//! # Invariants
//! - `available_copies` never goes below zero; a decrement at zero is
//!   clamped and logged, not raised.
//! - Increments have no upper bound. A duplicated return over-credits stock;
//!   this drift is logged by callers' transitions, never corrected here.
//! - The ledger does not deduplicate: each loan transition must call it
//!   exactly once.

use crate::model::book::{Book, BookId};
use crate::repo::circulation_repo::CirculationRepository;
use crate::service::error::{CirculationError, CirculationResult, EntityRef};
use crate::service::lookup::{BookCandidate, GENRE_UNDEFINED};
use log::{info, warn};
use std::collections::BTreeSet;

/// Input for a manual catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewBook {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub cover: String,
    /// Defaults to one copy when absent.
    pub copies: Option<u32>,
}

/// Full replacement of a catalog entry's editable fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookUpdate {
    pub title: String,
    pub author: String,
    pub genre: String,
    pub cover: String,
    pub copies: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Availability {
    #[default]
    All,
    /// At least one copy on the shelf.
    Available,
    /// No copy on the shelf.
    Unavailable,
}

/// Catalog search options. Empty strings mean "no filter".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    /// Case-insensitive substring of title or author.
    pub text: String,
    pub availability: Availability,
    /// Case-insensitive substring of the genre label.
    pub genre: String,
    /// Case-insensitive substring of the author.
    pub author: String,
}

impl CatalogFilter {
    fn matches(&self, book: &Book) -> bool {
        let availability_ok = match self.availability {
            Availability::All => true,
            Availability::Available => book.available_copies > 0,
            Availability::Unavailable => book.available_copies == 0,
        };
        let text_ok = contains_ci(&book.title, &self.text) || contains_ci(&book.author, &self.text);
        availability_ok
            && text_ok
            && contains_ci(&book.genre, &self.genre)
            && contains_ci(&book.author, &self.author)
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    let needle = needle.trim();
    needle.is_empty() || haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Direction of a stock adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StockDelta {
    Take,
    Restore,
}

/// Catalog entries and their shelf counts.
pub struct InventoryLedger<R: CirculationRepository> {
    repo: R,
}

impl<R: CirculationRepository> InventoryLedger<R> {
    /// Ledger over `repo`; holds no state of its own.
    pub fn new(repo: R) -> Self {
        Self { repo }
    }

    /// Takes one copy off the shelf, clamping at zero.
    ///
    /// Returns the resulting count.
    pub fn decrement(&self, book_id: BookId) -> CirculationResult<u32> {
        self.adjust(book_id, StockDelta::Take)
    }

    /// Puts one copy back on the shelf. No upper bound is enforced.
    pub fn increment(&self, book_id: BookId) -> CirculationResult<u32> {
        self.adjust(book_id, StockDelta::Restore)
    }

    fn adjust(&self, book_id: BookId, delta: StockDelta) -> CirculationResult<u32> {
        let mut books = self.repo.load_books()?;
        let book = books
            .iter_mut()
            .find(|book| book.id == book_id)
            .ok_or(CirculationError::NotFound(EntityRef::Book(book_id)))?;

        let before = book.available_copies;
        book.available_copies = match delta {
            StockDelta::Take => before.saturating_sub(1),
            StockDelta::Restore => before.saturating_add(1),
        };
        let after = book.available_copies;
        if delta == StockDelta::Take && before == 0 {
            warn!("event=inventory_clamped module=inventory status=skip book_id={book_id} copies=0");
        }

        self.repo.save_books(&books)?;
        info!(
            "event=inventory_adjust module=inventory status=ok book_id={book_id} before={before} after={after}"
        );
        Ok(after)
    }

    /// # Contract
    /// - Unknown ids map to `NotFound(EntityRef::Book)`.
    /// - `available_copies` is the current shelf count, never negative.
    pub fn get_book(&self, book_id: BookId) -> CirculationResult<Book> {
        self.repo
            .load_books()?
            .into_iter()
            .find(|book| book.id == book_id)
            .ok_or(CirculationError::NotFound(EntityRef::Book(book_id)))
    }

    /// Adds a manual catalog entry. Title and author are required.
    pub fn add_book(&self, input: NewBook) -> CirculationResult<Book> {
        let mut book = Book::new(
            input.title.trim(),
            input.author.trim(),
            input.copies.unwrap_or(1),
        );
        book.genre = input.genre.trim().to_string();
        book.cover = input.cover.trim().to_string();
        self.insert(book)
    }

    /// Adds a candidate produced by the metadata lookup.
    pub fn add_candidate(&self, candidate: BookCandidate) -> CirculationResult<Book> {
        let mut book = Book::new(candidate.title, candidate.author, candidate.copies);
        book.genre = candidate.genre;
        book.cover = candidate.cover;
        self.insert(book)
    }

    fn insert(&self, book: Book) -> CirculationResult<Book> {
        book.validate()?;
        let mut books = self.repo.load_books()?;
        books.push(book.clone());
        self.repo.save_books(&books)?;
        info!(
            "event=book_add module=inventory status=ok book_id={} copies={}",
            book.id, book.available_copies
        );
        Ok(book)
    }

    /// Replaces every editable field of an existing entry.
    pub fn update_book(&self, book_id: BookId, update: BookUpdate) -> CirculationResult<Book> {
        let mut books = self.repo.load_books()?;
        let book = books
            .iter_mut()
            .find(|book| book.id == book_id)
            .ok_or(CirculationError::NotFound(EntityRef::Book(book_id)))?;

        let edited = Book {
            id: book_id,
            title: update.title.trim().to_string(),
            author: update.author.trim().to_string(),
            genre: update.genre.trim().to_string(),
            cover: update.cover.trim().to_string(),
            available_copies: update.copies,
        };
        edited.validate()?;
        *book = edited.clone();

        self.repo.save_books(&books)?;
        info!(
            "event=book_update module=inventory status=ok book_id={book_id} copies={}",
            edited.available_copies
        );
        Ok(edited)
    }

    /// Deletes a catalog entry. Loans keep their own book snapshot.
    pub fn remove_book(&self, book_id: BookId) -> CirculationResult<()> {
        let mut books = self.repo.load_books()?;
        let before = books.len();
        books.retain(|book| book.id != book_id);
        if books.len() == before {
            return Err(CirculationError::NotFound(EntityRef::Book(book_id)));
        }
        self.repo.save_books(&books)?;
        info!("event=book_remove module=inventory status=ok book_id={book_id}");
        Ok(())
    }

    /// Catalog entries matching `filter`, in stored order.
    pub fn list_books(&self, filter: &CatalogFilter) -> CirculationResult<Vec<Book>> {
        Ok(self
            .repo
            .load_books()?
            .into_iter()
            .filter(|book| filter.matches(book))
            .collect())
    }

    /// Distinct genre labels, sorted, without blanks or the undefined label.
    pub fn genres(&self) -> CirculationResult<Vec<String>> {
        let books = self.repo.load_books()?;
        Ok(distinct_sorted(books.iter().map(|book| book.genre.as_str()))
            .into_iter()
            .filter(|genre| genre != GENRE_UNDEFINED)
            .collect())
    }

    /// Distinct author names, sorted, without blanks.
    pub fn authors(&self) -> CirculationResult<Vec<String>> {
        let books = self.repo.load_books()?;
        Ok(distinct_sorted(books.iter().map(|book| book.author.as_str())))
    }
}

fn distinct_sorted<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    values
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
