//! Lending ledger: borrow and return.
//!
//! The rules are pure functions of the locked patron/book state. The
//! repository evaluates them inside its critical section and applies the
//! resulting [`LedgerChange`], so the check and the write can never be
//! separated by another request touching the same patron or book.
//!
//! Borrow checks, in order:
//! 1. patron exists
//! 2. book exists
//! 3. patron does not already hold the book
//! 4. patron holds fewer than `max_borrow` books
//! 5. book has a copy on the shelf

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::{
    config::LedgerConfig,
    error::{AppError, AppResult},
    models::{patron::BorrowedItem, BorrowRecord},
    repository::{LedgerChange, LendingState, Repository},
};

/// Borrowing limits
#[derive(Debug, Clone, Copy)]
pub struct LedgerPolicy {
    pub max_borrow: usize,
    pub loan_period: Duration,
}

impl Default for LedgerPolicy {
    fn default() -> Self {
        Self {
            max_borrow: 3,
            loan_period: Duration::days(7),
        }
    }
}

impl From<&LedgerConfig> for LedgerPolicy {
    fn from(config: &LedgerConfig) -> Self {
        Self {
            max_borrow: config.max_borrow,
            loan_period: Duration::days(config.loan_days),
        }
    }
}

fn patron_not_found() -> AppError {
    AppError::NotFound("User not found.".to_string())
}

/// Decide whether `book_id` may be lent to the locked patron
pub fn evaluate_borrow(
    state: LendingState<'_>,
    book_id: Uuid,
    policy: &LedgerPolicy,
    now: DateTime<Utc>,
) -> AppResult<LedgerChange> {
    let patron = state.patron.ok_or_else(patron_not_found)?;
    let book = state
        .book
        .ok_or_else(|| AppError::NotFound("Book not found.".to_string()))?;

    if patron.has_borrowed(book.id) {
        return Err(AppError::Conflict(
            "You have already borrowed this book.".to_string(),
        ));
    }

    if patron.borrowed_items.len() >= policy.max_borrow {
        return Err(AppError::LimitExceeded(format!(
            "You have reached your maximum borrowing limit ({}/{}).",
            patron.borrowed_items.len(),
            policy.max_borrow
        )));
    }

    if book.available_copies <= 0 {
        return Err(AppError::Unavailable(
            "This book is currently not available.".to_string(),
        ));
    }

    Ok(LedgerChange::Lend(BorrowRecord {
        book_id,
        borrowed_at: now,
        due_at: now + policy.loan_period,
    }))
}

/// Decide whether the locked patron may return `book_id`
pub fn evaluate_return(state: LendingState<'_>, book_id: Uuid) -> AppResult<LedgerChange> {
    let patron = state.patron.ok_or_else(patron_not_found)?;

    if !patron.has_borrowed(book_id) {
        return Err(AppError::NotBorrowed(
            "You haven't borrowed this book.".to_string(),
        ));
    }

    Ok(LedgerChange::Release { book_id })
}

#[derive(Clone)]
pub struct LedgerService {
    repository: Repository,
    policy: LedgerPolicy,
}

impl LedgerService {
    pub fn new(repository: Repository, policy: LedgerPolicy) -> Self {
        Self { repository, policy }
    }

    /// Lend one copy of a book to a patron
    pub async fn borrow(&self, patron_id: Uuid, book_id: Uuid) -> AppResult<BorrowRecord> {
        let policy = self.policy;
        let now = Utc::now();

        let change = self
            .repository
            .ledger
            .transact(patron_id, book_id, &move |state| {
                evaluate_borrow(state, book_id, &policy, now)
            })
            .await
            .map_err(|e| {
                tracing::debug!(%patron_id, %book_id, "Borrow refused: {}", e);
                e
            })?;

        match change {
            LedgerChange::Lend(record) => {
                tracing::info!(%patron_id, %book_id, due_at = %record.due_at, "Book borrowed");
                Ok(record)
            }
            other => Err(AppError::Internal(format!(
                "Borrow produced an unexpected ledger change: {:?}",
                other
            ))),
        }
    }

    /// Take a book back from a patron
    pub async fn return_book(&self, patron_id: Uuid, book_id: Uuid) -> AppResult<()> {
        self.repository
            .ledger
            .transact(patron_id, book_id, &move |state| evaluate_return(state, book_id))
            .await
            .map_err(|e| {
                tracing::debug!(%patron_id, %book_id, "Return refused: {}", e);
                e
            })?;

        tracing::info!(%patron_id, %book_id, "Book returned");
        Ok(())
    }

    /// Books the patron currently holds
    pub async fn borrowed_items(&self, patron_id: Uuid) -> AppResult<Vec<BorrowedItem>> {
        let patron = self
            .repository
            .patrons
            .find_by_id(patron_id)
            .await?
            .ok_or_else(patron_not_found)?;

        let now = Utc::now();
        Ok(patron
            .borrowed_items
            .into_iter()
            .map(|record| BorrowedItem {
                overdue: record.is_overdue(now),
                book_id: record.book_id,
                borrowed_at: record.borrowed_at,
                due_at: record.due_at,
            })
            .collect())
    }
}
