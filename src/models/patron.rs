//! Patron model, borrow records and token claims

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Registered patron
#[derive(Debug, Clone, FromRow)]
pub struct Patron {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Argon2 PHC string
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    /// Currently borrowed books, in borrow order
    #[sqlx(skip)]
    pub borrowed_items: Vec<BorrowRecord>,
}

impl Patron {
    pub fn borrow_record(&self, book_id: Uuid) -> Option<&BorrowRecord> {
        self.borrowed_items.iter().find(|r| r.book_id == book_id)
    }

    pub fn has_borrowed(&self, book_id: Uuid) -> bool {
        self.borrow_record(book_id).is_some()
    }
}

/// A book held by a patron until returned
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRecord {
    pub book_id: Uuid,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
}

impl BorrowRecord {
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.due_at < now
    }
}

/// Borrow record as shown to its patron
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowedItem {
    pub book_id: Uuid,
    pub borrowed_at: DateTime<Utc>,
    pub due_at: DateTime<Utc>,
    pub overdue: bool,
}

/// Public view of a patron (never carries the password hash)
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatronProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub borrowed_items: Vec<BorrowRecord>,
}

impl From<Patron> for PatronProfile {
    fn from(patron: Patron) -> Self {
        Self {
            id: patron.id,
            name: patron.name,
            email: patron.email,
            borrowed_items: patron.borrowed_items,
        }
    }
}

/// Registration request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct RegisterPatron {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 4, message = "Password must be at least 4 characters"))]
    pub password: String,
}

/// JWT claims binding a token to a patron
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatronClaims {
    pub sub: String,
    pub patron_id: Uuid,
    pub exp: i64,
    pub iat: i64,
}

impl PatronClaims {
    pub fn new(patron_id: Uuid, issued_at: i64, lifetime_hours: u64) -> Self {
        Self {
            sub: patron_id.to_string(),
            patron_id,
            iat: issued_at,
            exp: issued_at + lifetime_hours as i64 * 3600,
        }
    }

    /// Create a new JWT token
    pub fn create_token(&self, secret: &str) -> Result<String, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{encode, EncodingKey, Header};
        encode(
            &Header::default(),
            self,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    /// Parse and verify a JWT token (signature and expiry)
    pub fn from_token(token: &str, secret: &str) -> Result<Self, jsonwebtoken::errors::Error> {
        use jsonwebtoken::{decode, DecodingKey, Validation};
        let mut validation = Validation::default();
        validation.leeway = 0;
        let token_data = decode::<Self>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )?;
        Ok(token_data.claims)
    }
}
