//! PostgreSQL storage.
//!
//! Ledger operations run in a single transaction that row-locks the patron
//! and then the book with `SELECT ... FOR UPDATE`. `lock_timeout` bounds the
//! wait, and the copy counter is only ever decremented by a conditional
//! update, so the stock cannot go negative even if a caller bypasses the
//! locks.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgConnection, Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    models::{Book, BorrowRecord, Patron, UpdateBook},
};

use super::{
    BookRepository, LedgerChange, LedgerRepository, LedgerRule, LendingState, PatronRepository,
};

const BOOK_COLUMNS: &str =
    "id, isbn, title, author, published_year, available_copies, created_at";
const PATRON_COLUMNS: &str = "id, name, email, password_hash, created_at";

const UNIQUE_VIOLATION: &str = "23505";
const LOCK_NOT_AVAILABLE: &str = "55P03";

#[derive(Clone)]
pub struct PostgresStore {
    pool: Pool<Postgres>,
    lock_timeout: Duration,
}

impl PostgresStore {
    pub fn new(pool: Pool<Postgres>, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    async fn borrow_records(conn: &mut PgConnection, patron_id: Uuid) -> AppResult<Vec<BorrowRecord>> {
        let records = sqlx::query_as::<_, BorrowRecord>(
            r#"
            SELECT book_id, borrowed_at, due_at
            FROM borrow_records
            WHERE patron_id = $1
            ORDER BY borrowed_at, book_id
            "#,
        )
        .bind(patron_id)
        .fetch_all(conn)
        .await?;
        Ok(records)
    }

    async fn with_records(&self, patron: Option<Patron>) -> AppResult<Option<Patron>> {
        let Some(mut patron) = patron else {
            return Ok(None);
        };
        let mut conn = self.pool.acquire().await?;
        patron.borrowed_items = Self::borrow_records(&mut conn, patron.id).await?;
        Ok(Some(patron))
    }
}

/// SQLSTATE of a database error, if any
fn sql_state(e: &sqlx::Error) -> Option<String> {
    e.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned())
}

fn conflict_on_unique(e: sqlx::Error, message: &str) -> AppError {
    if sql_state(&e).as_deref() == Some(UNIQUE_VIOLATION) {
        AppError::Conflict(message.to_string())
    } else {
        AppError::Database(e)
    }
}

fn busy_on_lock_timeout(e: sqlx::Error) -> AppError {
    if sql_state(&e).as_deref() == Some(LOCK_NOT_AVAILABLE) {
        tracing::warn!("Ledger row lock timed out");
        AppError::Busy("Record is being updated by another request, please retry".to_string())
    } else {
        AppError::Database(e)
    }
}

#[async_trait]
impl BookRepository for PostgresStore {
    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE id = $1",
            BOOK_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn find_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books WHERE isbn = $1",
            BOOK_COLUMNS
        ))
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn create(&self, book: &Book) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO books (id, isbn, title, author, published_year, available_copies, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(book.id)
        .bind(&book.isbn)
        .bind(&book.title)
        .bind(&book.author)
        .bind(book.published_year)
        .bind(book.available_copies)
        .bind(book.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Book with this ISBN already exists."))?;
        Ok(())
    }

    async fn update_by_isbn(&self, isbn: &str, patch: &UpdateBook) -> AppResult<Option<Book>> {
        // NULL parameters keep the current column value
        let book = sqlx::query_as::<_, Book>(&format!(
            r#"
            UPDATE books SET
                title = COALESCE($2, title),
                author = COALESCE($3, author),
                published_year = COALESCE($4, published_year),
                available_copies = COALESCE($5, available_copies),
                updated_at = NOW()
            WHERE isbn = $1
            RETURNING {}
            "#,
            BOOK_COLUMNS
        ))
        .bind(isbn)
        .bind(&patch.title)
        .bind(&patch.author)
        .bind(patch.published_year)
        .bind(patch.quantity)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn delete_by_isbn(&self, isbn: &str) -> AppResult<Option<Book>> {
        let book = sqlx::query_as::<_, Book>(&format!(
            "DELETE FROM books WHERE isbn = $1 RETURNING {}",
            BOOK_COLUMNS
        ))
        .bind(isbn)
        .fetch_optional(&self.pool)
        .await?;
        Ok(book)
    }

    async fn list_page(&self, offset: i64, limit: i64) -> AppResult<(Vec<Book>, i64)> {
        let total = self.count().await?;
        let books = sqlx::query_as::<_, Book>(&format!(
            "SELECT {} FROM books ORDER BY created_at, id OFFSET $1 LIMIT $2",
            BOOK_COLUMNS
        ))
        .bind(offset)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok((books, total))
    }

    async fn count(&self) -> AppResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl PatronRepository for PostgresStore {
    async fn create(&self, patron: &Patron) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO patrons (id, name, email, password_hash, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(patron.id)
        .bind(&patron.name)
        .bind(&patron.email)
        .bind(&patron.password_hash)
        .bind(patron.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "User already exists, please login"))?;
        Ok(())
    }

    async fn find_by_email(&self, email: &str) -> AppResult<Option<Patron>> {
        let patron = sqlx::query_as::<_, Patron>(&format!(
            "SELECT {} FROM patrons WHERE LOWER(email) = LOWER($1)",
            PATRON_COLUMNS
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        self.with_records(patron).await
    }

    async fn find_by_id(&self, id: Uuid) -> AppResult<Option<Patron>> {
        let patron = sqlx::query_as::<_, Patron>(&format!(
            "SELECT {} FROM patrons WHERE id = $1",
            PATRON_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.with_records(patron).await
    }
}

#[async_trait]
impl LedgerRepository for PostgresStore {
    async fn transact(
        &self,
        patron_id: Uuid,
        book_id: Uuid,
        rule: &LedgerRule<'_>,
    ) -> AppResult<LedgerChange> {
        // Dropping `tx` on any early return rolls everything back
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        ))
        .execute(&mut *tx)
        .await?;

        let patron = sqlx::query_as::<_, Patron>(&format!(
            "SELECT {} FROM patrons WHERE id = $1 FOR UPDATE",
            PATRON_COLUMNS
        ))
        .bind(patron_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(busy_on_lock_timeout)?;

        let patron = match patron {
            Some(mut patron) => {
                patron.borrowed_items = Self::borrow_records(&mut tx, patron_id).await?;
                Some(patron)
            }
            None => None,
        };

        let book = if patron.is_some() {
            sqlx::query_as::<_, Book>(&format!(
                "SELECT {} FROM books WHERE id = $1 FOR UPDATE",
                BOOK_COLUMNS
            ))
            .bind(book_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(busy_on_lock_timeout)?
        } else {
            None
        };

        let change = rule(LendingState {
            patron: patron.as_ref(),
            book: book.as_ref(),
        })?;

        match &change {
            LedgerChange::Lend(record) => {
                let taken = sqlx::query(
                    r#"
                    UPDATE books
                    SET available_copies = available_copies - 1, updated_at = NOW()
                    WHERE id = $1 AND available_copies > 0
                    "#,
                )
                .bind(record.book_id)
                .execute(&mut *tx)
                .await?;

                if taken.rows_affected() == 0 {
                    return Err(AppError::Unavailable(
                        "This book is currently not available.".to_string(),
                    ));
                }

                sqlx::query(
                    r#"
                    INSERT INTO borrow_records (patron_id, book_id, borrowed_at, due_at)
                    VALUES ($1, $2, $3, $4)
                    "#,
                )
                .bind(patron_id)
                .bind(record.book_id)
                .bind(record.borrowed_at)
                .bind(record.due_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| conflict_on_unique(e, "You have already borrowed this book."))?;
            }
            LedgerChange::Release { book_id } => {
                let removed = sqlx::query(
                    "DELETE FROM borrow_records WHERE patron_id = $1 AND book_id = $2",
                )
                .bind(patron_id)
                .bind(book_id)
                .execute(&mut *tx)
                .await?;

                if removed.rows_affected() == 0 {
                    return Err(AppError::NotBorrowed(
                        "You haven't borrowed this book.".to_string(),
                    ));
                }

                // No row when the book was deleted in the meantime
                sqlx::query(
                    r#"
                    UPDATE books
                    SET available_copies = available_copies + 1, updated_at = NOW()
                    WHERE id = $1
                    "#,
                )
                .bind(book_id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(change)
    }
}
