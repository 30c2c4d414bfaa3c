//! OpenAPI documentation

use axum::Json;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use crate::api::{books, health, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Circulation Desk API",
        version = "0.1.0",
        description = "Book catalog and lending ledger REST API",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Patrons
        users::register,
        users::login,
        users::me,
        users::borrowed,
        // Catalog
        books::add_book,
        books::update_book,
        books::delete_book,
        books::list_books,
        books::get_book,
        // Ledger
        books::borrow_book,
        books::return_book,
    ),
    components(
        schemas(
            // Patrons
            users::LoginRequest,
            users::LoginResponse,
            users::RegisterResponse,
            crate::models::patron::RegisterPatron,
            crate::models::patron::BorrowedItem,
            crate::models::PatronProfile,
            crate::models::BorrowRecord,
            // Catalog
            crate::models::Book,
            crate::models::CreateBook,
            crate::models::UpdateBook,
            crate::models::BookPage,
            crate::models::book::Pagination,
            crate::models::book::PageMarker,
            books::BookResponse,
            books::MessageResponse,
            // Ledger
            books::LendingRequest,
            books::BorrowResponse,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "users", description = "Patron registration and login"),
        (name = "books", description = "Catalog management"),
        (name = "ledger", description = "Borrowing and returning books")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Serve the generated OpenAPI document
pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}
