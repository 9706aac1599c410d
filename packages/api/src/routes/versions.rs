//! Note version history.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use store::{Note, NoteVersion};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::extract::{Json, Path};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/notes/{id}/versions",
            get(list_versions).post(create_version),
        )
        .route(
            "/api/notes/{id}/versions/{version_id}/restore",
            post(restore_version),
        )
}

async fn list_versions(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<NoteVersion>>> {
    Ok(Json(state.repo.list_versions(user.id, id).await?))
}

async fn create_version(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<(StatusCode, Json<NoteVersion>)> {
    let version = state.repo.create_version(user.id, id).await?;
    Ok((StatusCode::CREATED, Json(version)))
}

async fn restore_version(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, version_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Note>> {
    Ok(Json(state.repo.restore_version(user.id, id, version_id).await?))
}
