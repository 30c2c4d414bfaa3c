//! API handlers for the circulation desk REST endpoints

pub mod books;
pub mod health;
pub mod openapi;
pub mod rate_limit;
pub mod users;

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, FromRequestParts},
    http::request::Parts,
    routing::{delete, get, patch, post},
    RequestPartsExt, Router,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use uuid::Uuid;

use crate::{error::AppError, models::PatronClaims, AppState};

/// Extractor for the patron behind a bearer token
pub struct AuthenticatedPatron(pub PatronClaims);

impl AuthenticatedPatron {
    pub fn patron_id(&self) -> Uuid {
        self.0.patron_id
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedPatron {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized("Missing or malformed authorization header".to_string()))?;

        let claims = state.services.auth.authenticate(bearer.token())?;
        Ok(AuthenticatedPatron(claims))
    }
}

/// JSON body extractor whose rejections use the common error body
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Parse a book id from the path. Malformed ids cannot name a book.
pub(crate) fn parse_book_id(raw: &str) -> Result<Uuid, AppError> {
    Uuid::parse_str(raw).map_err(|_| AppError::NotFound("Book not found.".to_string()))
}

/// Welcome text served at the root
pub async fn welcome() -> &'static str {
    "Welcome to the circulation desk API"
}

/// Build the application router with all routes and middleware
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let routes = Router::new()
        .route("/", get(welcome))
        // Health
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        // Patrons
        .route("/user/register", post(users::register))
        .route("/user/login", post(users::login))
        .route("/user/me", get(users::me))
        .route("/user/me/borrowed", get(users::borrowed))
        // Catalog
        .route("/book/addbook", post(books::add_book))
        .route("/book/update/:isbn", patch(books::update_book))
        .route("/book/delete/:isbn", delete(books::delete_book))
        .route("/book/books", get(books::list_books))
        .route("/book/:book_id", get(books::get_book))
        // Ledger
        .route("/book/borrow/:book_id", post(books::borrow_book))
        .route("/book/return/:book_id", delete(books::return_book))
        // Documentation
        .route("/api-docs/openapi.json", get(openapi::openapi_json));

    let routes = rate_limit::apply(routes, &state);

    routes
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}
