//! In-memory storage for development and tests.
//!
//! Every book and patron document sits behind its own async mutex. The
//! indexes are only held long enough to clone a document handle, so a
//! slow ledger operation on one book never blocks lookups of another.

use std::{collections::HashMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Book, Patron, UpdateBook},
};

use super::{
    BookRepository, LedgerChange, LedgerRepository, LedgerRule, LendingState, PatronRepository,
};

/// A deleted book leaves `None` behind for anyone still holding the handle
type BookSlot = Arc<Mutex<Option<Book>>>;
type PatronSlot = Arc<Mutex<Patron>>;

#[derive(Default)]
struct Catalog {
    /// Insertion order is listing order
    by_id: IndexMap<Uuid, BookSlot>,
    by_isbn: HashMap<String, Uuid>,
}

impl Catalog {
    fn slot_by_isbn(&self, isbn: &str) -> Option<BookSlot> {
        self.by_isbn
            .get(isbn)
            .and_then(|id| self.by_id.get(id))
            .cloned()
    }
}

#[derive(Default)]
struct Registry {
    by_id: HashMap<Uuid, PatronSlot>,
    /// Lowercased email to patron id
    by_email: HashMap<String, Uuid>,
}

pub struct MemoryStore {
    catalog: RwLock<Catalog>,
    registry: RwLock<Registry>,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            catalog: RwLock::new(Catalog::default()),
            registry: RwLock::new(Registry::default()),
            lock_timeout,
        }
    }

    async fn acquire<T>(&self, slot: &Arc<Mutex<T>>, what: &str) -> AppResult<OwnedMutexGuard<T>> {
        tokio::time::timeout(self.lock_timeout, slot.clone().lock_owned())
            .await
            .map_err(|_| {
                tracing::warn!("Timed out waiting for {} lock", what);
                AppError::Busy(format!(
                    "{} is being updated by another request, please retry",
                    what
                ))
            })
    }

    async fn book_slot(&self, id: Uuid) -> Option<BookSlot> {
        self.catalog.read().await.by_id.get(&id).cloned()
    }

    async fn patron_slot(&self, id: Uuid) -> Option<PatronSlot> {
        self.registry.read().await.by_id.get(&id).cloned()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl BookRepository for MemoryStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Book>> {
        let Some(slot) = self.book_slot(id).await else {
            return Ok(None);
        };
        let guard = self.acquire(&slot, "Book").await?;
        Ok(guard.clone())
    }

    async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let Some(slot) = self.catalog.read().await.slot_by_isbn(isbn) else {
            return Ok(None);
        };
        let guard = self.acquire(&slot, "Book").await?;
        Ok(guard.clone())
    }

    async fn create(&self, book: &Book) -> AppResult<()> {
        let mut catalog = self.catalog.write().await;
        if catalog.by_isbn.contains_key(&book.isbn) {
            return Err(AppError::Conflict(
                "Book with this ISBN already exists.".to_string(),
            ));
        }
        catalog.by_isbn.insert(book.isbn.clone(), book.id);
        catalog
            .by_id
            .insert(book.id, Arc::new(Mutex::new(Some(book.clone()))));
        Ok(())
    }

    async fn update_by_isbn(&self, isbn: &str, patch: &UpdateBook) -> AppResult<Option<Book>> {
        let Some(slot) = self.catalog.read().await.slot_by_isbn(isbn) else {
            return Ok(None);
        };
        let mut guard = self.acquire(&slot, "Book").await?;
        Ok((*guard).as_mut().map(|book| {
            patch.apply_to(book);
            book.clone()
        }))
    }

    async fn delete_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let Some(slot) = self.catalog.read().await.slot_by_isbn(isbn) else {
            return Ok(None);
        };
        let mut guard = self.acquire(&slot, "Book").await?;
        let Some(book) = guard.take() else {
            return Ok(None);
        };

        let mut catalog = self.catalog.write().await;
        catalog.by_id.shift_remove(&book.id);
        if catalog.by_isbn.get(&book.isbn) == Some(&book.id) {
            catalog.by_isbn.remove(&book.isbn);
        }
        Ok(Some(book))
    }

    async fn list_page(&self, offset: i64, limit: i64) -> AppResult<(Vec<Book>, i64)> {
        let (slots, total) = {
            let catalog = self.catalog.read().await;
            let slots: Vec<BookSlot> = catalog
                .by_id
                .values()
                .skip(usize::try_from(offset).unwrap_or(0))
                .take(usize::try_from(limit).unwrap_or(0))
                .cloned()
                .collect();
            (slots, catalog.by_id.len() as i64)
        };

        let mut books = Vec::with_capacity(slots.len());
        for slot in slots {
            if let Some(book) = self.acquire(&slot, "Book").await?.clone() {
                books.push(book);
            }
        }
        Ok((books, total))
    }

    async fn count(&self) -> AppResult<i64> {
        Ok(self.catalog.read().await.by_id.len() as i64)
    }
}

#[async_trait]
impl PatronRepository for MemoryStore {
    async fn create(&self, patron: &Patron) -> AppResult<()> {
        let email = patron.email.to_lowercase();
        let mut registry = self.registry.write().await;
        if registry.by_email.contains_key(&email) {
            return Err(AppError::Conflict(
                "User already exists, please login".to_string(),
            ));
        }
        registry.by_email.insert(email, patron.id);
        registry
            .by_id
            .insert(patron.id, Arc::new(Mutex::new(patron.clone())));
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Patron>> {
        let slot = {
            let registry = self.registry.read().await;
            registry
                .by_email
                .get(&email.to_lowercase())
                .and_then(|id| registry.by_id.get(id))
                .cloned()
        };
        let Some(slot) = slot else {
            return Ok(None);
        };
        let guard = self.acquire(&slot, "Patron").await?;
        Ok(Some(guard.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Patron>> {
        let Some(slot) = self.patron_slot(id).await else {
            return Ok(None);
        };
        let guard = self.acquire(&slot, "Patron").await?;
        Ok(Some(guard.clone()))
    }
}

#[async_trait]
impl LedgerRepository for MemoryStore {
    async fn transact(
        &self,
        patron_id: Uuid,
        book_id: Uuid,
        rule: &LedgerRule<'_>,
    ) -> AppResult<LedgerChange> {
        let Some(patron_slot) = self.patron_slot(patron_id).await else {
            rule(LendingState {
                patron: None,
                book: None,
            })?;
            return Err(AppError::Internal(
                "Ledger rule accepted a missing patron".to_string(),
            ));
        };

        // Always patron first, then book
        let mut patron = self.acquire(&patron_slot, "Patron").await?;
        let mut book = match self.book_slot(book_id).await {
            Some(slot) => Some(self.acquire(&slot, "Book").await?),
            None => None,
        };

        let change = rule(LendingState {
            patron: Some(&*patron),
            book: book.as_ref().and_then(|guard| (**guard).as_ref()),
        })?;

        // No await from here on: the change lands whole or not at all
        match &change {
            LedgerChange::Lend(record) => {
                let book = book
                    .as_mut()
                    .and_then(|guard| (**guard).as_mut())
                    .ok_or_else(|| AppError::Internal("Ledger rule lent a missing book".to_string()))?;
                if book.available_copies <= 0 {
                    return Err(AppError::Unavailable(
                        "This book is currently not available.".to_string(),
                    ));
                }
                if patron.has_borrowed(record.book_id) {
                    return Err(AppError::Conflict(
                        "You have already borrowed this book.".to_string(),
                    ));
                }
                book.available_copies -= 1;
                patron.borrowed_items.push(record.clone());
            }
            LedgerChange::Release { book_id } => {
                let position = patron
                    .borrowed_items
                    .iter()
                    .position(|r| r.book_id == *book_id)
                    .ok_or_else(|| {
                        AppError::NotBorrowed("You haven't borrowed this book.".to_string())
                    })?;
                // Every check runs before the first write
                if let Some(book) = book.as_mut().and_then(|guard| (**guard).as_mut()) {
                    book.available_copies =
                        book.available_copies.checked_add(1).ok_or_else(|| {
                            AppError::Internal(format!("Copy counter overflow on book {}", book.id))
                        })?;
                }
                patron.borrowed_items.remove(position);
            }
        }

        Ok(change)
    }
}
