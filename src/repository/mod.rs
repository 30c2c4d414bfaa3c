//! Repository layer: storage traits and their backends

pub mod memory;
pub mod postgres;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{Book, BorrowRecord, Patron, UpdateBook},
};

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

/// Catalog storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BookRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Book>>;

    async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>>;

    /// Insert a new book. Fails with `Conflict` if the ISBN is taken.
    async fn create(&self, book: &Book) -> AppResult<()>;

    /// Apply a partial update; `None` when no book has this ISBN
    async fn update_by_isbn(&self, isbn: &str, patch: &UpdateBook) -> AppResult<Option<Book>>;

    /// Remove a book; `None` when no book has this ISBN
    async fn delete_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>>;

    /// Books in creation order, with the total count
    async fn list_page(&self, offset: i64, limit: i64) -> AppResult<(Vec<Book>, i64)>;

    async fn count(&self) -> AppResult<i64>;
}

/// Patron storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PatronRepository: Send + Sync {
    /// Insert a new patron. Fails with `Conflict` if the email is taken.
    async fn create(&self, patron: &Patron) -> AppResult<()>;

    /// Case-insensitive lookup, borrow records included
    async fn find_by_email(&self, email: &str) -> AppResult<Option<Patron>>;

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Patron>>;
}

/// Locked view handed to a ledger rule
#[derive(Debug, Clone, Copy)]
pub struct LendingState<'a> {
    pub patron: Option<&'a Patron>,
    pub book: Option<&'a Book>,
}

/// Mutation decided by a ledger rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerChange {
    /// Take one copy off the shelf and record it on the patron
    Lend(BorrowRecord),
    /// Drop the patron's record and put the copy back if the book still exists
    Release { book_id: Uuid },
}

/// Decision function evaluated while the patron and book are locked
pub type LedgerRule<'a> = dyn Fn(LendingState<'_>) -> AppResult<LedgerChange> + Send + Sync + 'a;

/// Atomic borrow/return storage
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Lock the patron, then the book, evaluate `rule` against that state
    /// and apply its change. Either the whole change is stored or nothing
    /// is; lock waits are bounded and fail with `Busy`.
    async fn transact(
        &self,
        patron_id: Uuid,
        book_id: Uuid,
        rule: &LedgerRule<'_>,
    ) -> AppResult<LedgerChange>;
}

/// Storage handles shared by all services
#[derive(Clone)]
pub struct Repository {
    pub books: Arc<dyn BookRepository>,
    pub patrons: Arc<dyn PatronRepository>,
    pub ledger: Arc<dyn LedgerRepository>,
}

impl Repository {
    /// Process-local storage, lost on shutdown
    pub fn memory(lock_timeout: Duration) -> Self {
        let store = Arc::new(MemoryStore::new(lock_timeout));
        Self {
            books: store.clone(),
            patrons: store.clone(),
            ledger: store,
        }
    }

    /// PostgreSQL storage on an already migrated pool
    pub fn postgres(pool: Pool<Postgres>, lock_timeout: Duration) -> Self {
        let store = Arc::new(PostgresStore::new(pool, lock_timeout));
        Self {
            books: store.clone(),
            patrons: store.clone(),
            ledger: store,
        }
    }
}
