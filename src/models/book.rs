//! Book (catalog entry) model and related types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

/// Book as stored in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: Uuid,
    #[serde(rename = "ISBN")]
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub published_year: i32,
    /// Copies on the shelf, i.e. not currently lent
    pub available_copies: i32,
    pub created_at: DateTime<Utc>,
}

/// Create book request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    #[serde(rename = "ISBN")]
    #[validate(length(min = 1, message = "ISBN is required"))]
    pub isbn: String,
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Author is required"))]
    pub author: String,
    pub published_year: i32,
    /// Number of copies provisioned
    #[validate(range(min = 0, max = 1000000, message = "Quantity must be between 0 and 1000000"))]
    pub quantity: i32,
}

/// Partial book update. Absent fields are left unchanged; a present
/// `quantity` of 0 is applied like any other value.
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBook {
    #[validate(length(min = 1, message = "Title cannot be empty"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Author cannot be empty"))]
    pub author: Option<String>,
    pub published_year: Option<i32>,
    #[validate(range(min = 0, max = 1000000, message = "Quantity must be between 0 and 1000000"))]
    pub quantity: Option<i32>,
}

impl UpdateBook {
    /// Apply the provided fields to `book`
    pub fn apply_to(&self, book: &mut Book) {
        if let Some(ref title) = self.title {
            book.title = title.clone();
        }
        if let Some(ref author) = self.author {
            book.author = author.clone();
        }
        if let Some(year) = self.published_year {
            book.published_year = year;
        }
        if let Some(quantity) = self.quantity {
            book.available_copies = quantity;
        }
    }
}

/// Book listing query parameters.
///
/// Values are kept as raw strings: anything that is not a positive
/// integer falls back to the default.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct BookListQuery {
    /// Page number (default: 1)
    pub page: Option<String>,
    /// Books per page (default: 2)
    pub limit: Option<String>,
}

/// Points at a neighbouring page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PageMarker {
    pub page: i64,
    pub limit: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next: Option<PageMarker>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev: Option<PageMarker>,
}

/// One page of the catalog
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct BookPage {
    pub items: Vec<Book>,
    pub total: i64,
    pub pagination: Pagination,
}
