//! Patron registration, login and bearer token verification

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::AuthConfig,
    error::{AppError, AppResult},
    models::{patron::RegisterPatron, Patron, PatronClaims, PatronProfile},
    repository::Repository,
};

const BAD_CREDENTIALS: &str = "Wrong Credentials";

#[derive(Clone)]
pub struct AuthService {
    repository: Repository,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Register a new patron. The password is stored as an Argon2 hash only.
    pub async fn register(&self, request: RegisterPatron) -> AppResult<Patron> {
        request.validate()?;

        if self
            .repository
            .patrons
            .find_by_email(&request.email)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(
                "User already exists, please login".to_string(),
            ));
        }

        let password_hash = hash_password(request.password).await?;
        let patron = Patron {
            id: Uuid::new_v4(),
            name: request.name,
            email: request.email,
            password_hash,
            created_at: Utc::now(),
            borrowed_items: Vec::new(),
        };

        // The store re-checks email uniqueness for concurrent registrations
        self.repository.patrons.create(&patron).await?;

        tracing::info!(patron_id = %patron.id, "Patron registered");
        Ok(patron)
    }

    /// Check credentials and issue a bearer token
    pub async fn login(&self, email: &str, password: &str) -> AppResult<(String, Patron)> {
        let patron = self
            .repository
            .patrons
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::Unauthorized(BAD_CREDENTIALS.to_string()))?;

        if !verify_password(patron.password_hash.clone(), password.to_string()).await? {
            tracing::debug!(patron_id = %patron.id, "Login refused: wrong password");
            return Err(AppError::Unauthorized(BAD_CREDENTIALS.to_string()));
        }

        let token = self.issue_token(patron.id)?;
        Ok((token, patron))
    }

    /// Sign a token for `patron_id`, valid for the configured lifetime
    pub fn issue_token(&self, patron_id: Uuid) -> AppResult<String> {
        PatronClaims::new(patron_id, Utc::now().timestamp(), self.config.jwt_expiration_hours)
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Verify signature and expiry of a bearer token
    pub fn authenticate(&self, token: &str) -> AppResult<PatronClaims> {
        PatronClaims::from_token(token, &self.config.jwt_secret)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
    }

    pub async fn profile(&self, patron_id: Uuid) -> AppResult<PatronProfile> {
        self.repository
            .patrons
            .find_by_id(patron_id)
            .await?
            .map(PatronProfile::from)
            .ok_or_else(|| AppError::NotFound("User not found.".to_string()))
    }
}

async fn hash_password(password: String) -> AppResult<String> {
    tokio::task::spawn_blocking(move || {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))
    })
    .await
    .map_err(|e| AppError::Internal(format!("Password hashing task failed: {}", e)))?
}

async fn verify_password(hash: String, password: String) -> AppResult<bool> {
    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&hash)
            .map_err(|e| AppError::Internal(format!("Invalid password hash: {}", e)))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    })
    .await
    .map_err(|e| AppError::Internal(format!("Password check task failed: {}", e)))?
}
