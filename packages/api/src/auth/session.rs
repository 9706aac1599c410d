//! Session keys and the authenticated-user extractor.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use store::User;
use tower_sessions::Session;
use uuid::Uuid;

use crate::error::ApiError;
use crate::AppState;

/// Key for storing user ID in session.
pub const SESSION_USER_ID_KEY: &str = "user_id";

/// The user id in the session, if any.
pub async fn session_user_id(session: &Session) -> Result<Option<Uuid>, ApiError> {
    Ok(session.get::<Uuid>(SESSION_USER_ID_KEY).await?)
}

/// Bind `user` to the session under a fresh session id.
pub async fn start_session(session: &Session, user: &User) -> Result<(), ApiError> {
    session.cycle_id().await?;
    session.insert(SESSION_USER_ID_KEY, user.id).await?;
    Ok(())
}

/// Extractor for handlers that require a logged-in user. Rejects with 401 when
/// the session is missing, expired, or points at a user that no longer exists.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|(_, msg)| ApiError::Internal(msg.to_string()))?;

        let Some(user_id) = session_user_id(&session).await? else {
            return Err(ApiError::Unauthorized);
        };

        match state.repo.get_user(user_id).await? {
            Some(user) => Ok(CurrentUser(user)),
            None => {
                tracing::warn!("Session refers to missing user {}", user_id);
                session.flush().await?;
                Err(ApiError::Unauthorized)
            }
        }
    }
}
