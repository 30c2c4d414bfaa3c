//! Patron registration, login and profile endpoints

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{ApiJson, AuthenticatedPatron};
use crate::{
    error::AppResult,
    models::{
        patron::{BorrowedItem, RegisterPatron},
        PatronProfile,
    },
};

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub message: String,
    /// Bearer token for the `Authorization` header
    pub token: String,
    pub token_type: String,
    /// Seconds until the token expires
    pub expires_in: u64,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub message: String,
    pub id: Uuid,
}

/// Register a new patron
#[utoipa::path(
    post,
    path = "/user/register",
    tag = "users",
    request_body = RegisterPatron,
    responses(
        (status = 201, description = "Patron registered", body = RegisterResponse),
        (status = 400, description = "Invalid input or email already registered", body = crate::error::ErrorResponse)
    )
)]
pub async fn register(
    State(state): State<crate::AppState>,
    ApiJson(request): ApiJson<RegisterPatron>,
) -> AppResult<(StatusCode, Json<RegisterResponse>)> {
    let patron = state.services.auth.register(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            message: "User registered successfully".to_string(),
            id: patron.id,
        }),
    ))
}

/// Log in with email and password
#[utoipa::path(
    post,
    path = "/user/login",
    tag = "users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Wrong credentials", body = crate::error::ErrorResponse)
    )
)]
pub async fn login(
    State(state): State<crate::AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let (token, patron) = state
        .services
        .auth
        .login(&request.email, &request.password)
        .await?;

    tracing::info!(patron_id = %patron.id, "Patron logged in");

    Ok(Json(LoginResponse {
        message: "Logged in successfully".to_string(),
        token,
        token_type: "Bearer".to_string(),
        expires_in: state.config.auth.jwt_expiration_hours * 3600,
    }))
}

/// Profile of the logged-in patron
#[utoipa::path(
    get,
    path = "/user/me",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Patron profile", body = PatronProfile),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse),
        (status = 404, description = "Patron no longer exists", body = crate::error::ErrorResponse)
    )
)]
pub async fn me(
    State(state): State<crate::AppState>,
    patron: AuthenticatedPatron,
) -> AppResult<Json<PatronProfile>> {
    let profile = state.services.auth.profile(patron.patron_id()).await?;
    Ok(Json(profile))
}

/// Books currently held by the logged-in patron
#[utoipa::path(
    get,
    path = "/user/me/borrowed",
    tag = "users",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Borrowed books with due dates", body = Vec<BorrowedItem>),
        (status = 401, description = "Not authenticated", body = crate::error::ErrorResponse)
    )
)]
pub async fn borrowed(
    State(state): State<crate::AppState>,
    patron: AuthenticatedPatron,
) -> AppResult<Json<Vec<BorrowedItem>>> {
    let items = state.services.ledger.borrowed_items(patron.patron_id()).await?;
    Ok(Json(items))
}
