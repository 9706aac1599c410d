//! Authentication endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use store::{NewUser, UserInfo};
use tower_sessions::Session;

use crate::auth::{self, CurrentUser};
use crate::error::{ApiError, ApiResult};
use crate::extract::Json;
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/me", get(current_user))
        .route("/api/auth/password", post(change_password))
}

#[derive(Debug, Deserialize)]
struct RegisterRequest {
    username: String,
    password: String,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct ChangePasswordRequest {
    current_password: String,
    new_password: String,
}

/// Register a new user and log them in.
async fn register(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<UserInfo>)> {
    auth::check_password(&req.password).map_err(ApiError::BadRequest)?;
    let password_hash = auth::hash_password(&req.password).map_err(ApiError::Internal)?;

    let user = state
        .repo
        .create_user(NewUser {
            username: req.username,
            password_hash,
            name: req.name,
        })
        .await?;

    auth::start_session(&session, &user).await?;
    tracing::info!("Registered user {} ({})", user.username, user.id);

    Ok((StatusCode::CREATED, Json(user.to_info())))
}

/// Log in with username and password.
async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<UserInfo>> {
    let Some(user) = state.repo.find_user(&req.username).await? else {
        return Err(ApiError::InvalidCredentials);
    };

    let valid = auth::verify_password(&req.password, &user.password_hash)
        .map_err(ApiError::Internal)?;
    if !valid {
        tracing::info!("Failed login for {}", user.username);
        return Err(ApiError::InvalidCredentials);
    }

    auth::start_session(&session, &user).await?;
    Ok(Json(user.to_info()))
}

/// Log out the current user by clearing the session.
async fn logout(session: Session) -> ApiResult<StatusCode> {
    session.flush().await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The user bound to the session, or `null`.
async fn current_user(
    State(state): State<AppState>,
    session: Session,
) -> ApiResult<Json<Option<UserInfo>>> {
    let Some(user_id) = auth::session_user_id(&session).await? else {
        return Ok(Json(None));
    };
    let user = state.repo.get_user(user_id).await?;
    Ok(Json(user.map(|u| u.to_info())))
}

/// Change the password after re-checking the current one.
async fn change_password(
    State(state): State<AppState>,
    session: Session,
    CurrentUser(user): CurrentUser,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<StatusCode> {
    let valid = auth::verify_password(&req.current_password, &user.password_hash)
        .map_err(ApiError::Internal)?;
    if !valid {
        return Err(ApiError::InvalidCredentials);
    }
    auth::check_password(&req.new_password).map_err(ApiError::BadRequest)?;

    let password_hash = auth::hash_password(&req.new_password).map_err(ApiError::Internal)?;
    let user = state.repo.set_password_hash(user.id, password_hash).await?;
    auth::start_session(&session, &user).await?;
    tracing::info!("Password changed for {}", user.username);

    Ok(StatusCode::NO_CONTENT)
}
