//! Catalog management service

use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::CatalogConfig,
    error::{AppError, AppResult},
    models::book::{Book, BookListQuery, BookPage, CreateBook, PageMarker, Pagination, UpdateBook},
    repository::Repository,
};

/// Resolved page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub limit: i64,
}

impl PageRequest {
    /// Parse raw query values; anything that is not a positive integer
    /// falls back to page 1 and the default page size
    pub fn from_query(query: &BookListQuery, config: &CatalogConfig) -> Self {
        fn positive(raw: Option<&str>) -> Option<i64> {
            raw.and_then(|s| s.trim().parse::<i64>().ok()).filter(|n| *n > 0)
        }

        Self {
            page: positive(query.page.as_deref()).unwrap_or(1),
            limit: positive(query.limit.as_deref())
                .unwrap_or(config.default_page_size)
                .min(config.max_page_size),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    /// Neighbouring page markers for a catalog of `total` books
    pub fn pagination(&self, total: i64) -> Pagination {
        let start = self.offset();
        let end = self.page.saturating_mul(self.limit);
        Pagination {
            next: (end < total).then_some(PageMarker {
                page: self.page + 1,
                limit: self.limit,
            }),
            prev: (start > 0).then_some(PageMarker {
                page: self.page - 1,
                limit: self.limit,
            }),
        }
    }
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    config: CatalogConfig,
}

impl CatalogService {
    pub fn new(repository: Repository, config: CatalogConfig) -> Self {
        Self { repository, config }
    }

    /// Add a book; fails with `Conflict` when the ISBN is already catalogued
    pub async fn create_book(&self, request: CreateBook) -> AppResult<Book> {
        request.validate()?;

        if self
            .repository
            .books
            .find_by_isbn(&request.isbn)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "Book with this ISBN already exists.".to_string(),
            ));
        }

        let book = Book {
            id: Uuid::new_v4(),
            isbn: request.isbn,
            title: request.title,
            author: request.author,
            published_year: request.published_year,
            available_copies: request.quantity,
            created_at: Utc::now(),
        };
        self.repository.books.create(&book).await?;

        tracing::info!(book_id = %book.id, isbn = %book.isbn, copies = book.available_copies, "Book added");
        Ok(book)
    }

    pub async fn get_book(&self, id: Uuid) -> AppResult<Book> {
        self.repository
            .books
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found.".to_string()))
    }

    /// Apply only the fields present in `patch`
    pub async fn update_book(&self, isbn: &str, patch: UpdateBook) -> AppResult<Book> {
        patch.validate()?;

        let book = self
            .repository
            .books
            .update_by_isbn(isbn, &patch)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found.".to_string()))?;

        tracing::info!(book_id = %book.id, isbn = %book.isbn, "Book updated");
        Ok(book)
    }

    pub async fn delete_book(&self, isbn: &str) -> AppResult<Book> {
        let book = self
            .repository
            .books
            .delete_by_isbn(isbn)
            .await?
            .ok_or_else(|| AppError::NotFound("Book not found.".to_string()))?;

        tracing::info!(book_id = %book.id, isbn = %book.isbn, "Book deleted");
        Ok(book)
    }

    pub async fn list_books(&self, query: &BookListQuery) -> AppResult<BookPage> {
        let request = PageRequest::from_query(query, &self.config);
        let (items, total) = self
            .repository
            .books
            .list_page(request.offset(), request.limit)
            .await?;

        Ok(BookPage {
            items,
            total,
            pagination: request.pagination(total),
        })
    }

    /// Storage round trip for readiness probes
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.books.count().await.map(|_| ())
    }
}
