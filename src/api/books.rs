//! Catalog and lending endpoints

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{parse_book_id, ApiJson, AuthenticatedPatron};
use crate::{
    error::{AppError, AppResult},
    models::{
        book::{BookListQuery, BookPage, CreateBook, UpdateBook},
        Book, BorrowRecord,
    },
};

#[derive(Serialize, Deserialize, ToSchema)]
pub struct BookResponse {
    pub message: String,
    pub book: Book,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

/// Optional borrow/return body. The token already names the patron; a
/// `patronId` here must agree with it.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LendingRequest {
    #[serde(alias = "userID")]
    pub patron_id: Option<Uuid>,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct BorrowResponse {
    pub message: String,
    pub record: BorrowRecord,
}

impl LendingRequest {
    /// An empty body means no claim; anything else must be a valid request
    fn from_body(body: &[u8]) -> AppResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::Validation(format!("Invalid request body: {}", e)))
    }
}

/// The patron acting on the ledger: always the token's subject
fn acting_patron(patron: &AuthenticatedPatron, body: &[u8]) -> AppResult<Uuid> {
    let token_patron = patron.patron_id();
    match LendingRequest::from_body(body)?.patron_id {
        Some(claimed) if claimed != token_patron => Err(AppError::Unauthorized(
            "Token does not belong to this patron".to_string(),
        )),
        _ => Ok(token_patron),
    }
}

/// Add a book to the catalog
#[utoipa::path(
    post,
    path = "/book/addbook",
    tag = "books",
    security(("bearer_auth" = [])),
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book added", body = BookResponse),
        (status = 400, description = "Invalid input or duplicate ISBN", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn add_book(
    State(state): State<crate::AppState>,
    _patron: AuthenticatedPatron,
    ApiJson(request): ApiJson<CreateBook>,
) -> AppResult<(StatusCode, Json<BookResponse>)> {
    let book = state.services.catalog.create_book(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(BookResponse {
            message: "Book added successfully.".to_string(),
            book,
        }),
    ))
}

/// Update the book with the given ISBN
#[utoipa::path(
    patch,
    path = "/book/update/{isbn}",
    tag = "books",
    params(("isbn" = String, Path, description = "Book ISBN")),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = BookResponse),
        (status = 400, description = "Invalid input", body = crate::error::ErrorResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_book(
    State(state): State<crate::AppState>,
    Path(isbn): Path<String>,
    ApiJson(patch): ApiJson<UpdateBook>,
) -> AppResult<Json<BookResponse>> {
    let book = state.services.catalog.update_book(&isbn, patch).await?;

    Ok(Json(BookResponse {
        message: "Book details updated successfully.".to_string(),
        book,
    }))
}

/// Remove the book with the given ISBN
#[utoipa::path(
    delete,
    path = "/book/delete/{isbn}",
    tag = "books",
    params(("isbn" = String, Path, description = "Book ISBN")),
    responses(
        (status = 200, description = "Book deleted", body = MessageResponse),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_book(
    State(state): State<crate::AppState>,
    Path(isbn): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    state.services.catalog.delete_book(&isbn).await?;

    Ok(Json(MessageResponse {
        message: "Book deleted successfully.".to_string(),
    }))
}

/// List the catalog one page at a time, in creation order
#[utoipa::path(
    get,
    path = "/book/books",
    tag = "books",
    params(BookListQuery),
    responses(
        (status = 200, description = "One page of books", body = BookPage)
    )
)]
pub async fn list_books(
    State(state): State<crate::AppState>,
    Query(query): Query<BookListQuery>,
) -> AppResult<Json<BookPage>> {
    let page = state.services.catalog.list_books(&query).await?;
    Ok(Json(page))
}

/// Get one book by id
#[utoipa::path(
    get,
    path = "/book/{book_id}",
    tag = "books",
    params(("book_id" = Uuid, Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book details", body = Book),
        (status = 404, description = "Book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_book(
    State(state): State<crate::AppState>,
    Path(book_id): Path<String>,
) -> AppResult<Json<Book>> {
    let book = state.services.catalog.get_book(parse_book_id(&book_id)?).await?;
    Ok(Json(book))
}

/// Borrow a book for the logged-in patron
#[utoipa::path(
    post,
    path = "/book/borrow/{book_id}",
    tag = "ledger",
    security(("bearer_auth" = [])),
    params(("book_id" = Uuid, Path, description = "Book ID")),
    request_body(content = LendingRequest, description = "Optional; patronId must match the token"),
    responses(
        (status = 200, description = "Book borrowed", body = BorrowResponse),
        (status = 400, description = "Already borrowed, limit reached, unavailable or busy", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 404, description = "Patron or book not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrow_book(
    State(state): State<crate::AppState>,
    patron: AuthenticatedPatron,
    Path(book_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<BorrowResponse>> {
    let patron_id = acting_patron(&patron, &body)?;
    let record = state
        .services
        .ledger
        .borrow(patron_id, parse_book_id(&book_id)?)
        .await?;

    Ok(Json(BorrowResponse {
        message: "Book borrowed successfully.".to_string(),
        record,
    }))
}

/// Return a borrowed book
#[utoipa::path(
    delete,
    path = "/book/return/{book_id}",
    tag = "ledger",
    security(("bearer_auth" = [])),
    params(("book_id" = Uuid, Path, description = "Book ID")),
    request_body(content = LendingRequest, description = "Optional; patronId must match the token"),
    responses(
        (status = 200, description = "Book returned", body = MessageResponse),
        (status = 400, description = "Book not borrowed by this patron or busy", body = crate::error::ErrorResponse),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn return_book(
    State(state): State<crate::AppState>,
    patron: AuthenticatedPatron,
    Path(book_id): Path<String>,
    body: Bytes,
) -> AppResult<Json<MessageResponse>> {
    let patron_id = acting_patron(&patron, &body)?;
    state
        .services
        .ledger
        .return_book(patron_id, parse_book_id(&book_id)?)
        .await?;

    Ok(Json(MessageResponse {
        message: "Book returned successfully.".to_string(),
    }))
}
