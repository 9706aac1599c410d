//! Trash: list, restore, permanent delete.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Serialize;
use store::{Folder, ItemKind, Note, Trash};
use uuid::Uuid;

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::extract::{Json, Path};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/trash", get(list_trash))
        .route("/api/trash/{kind}/{id}/restore", post(restore))
        .route("/api/trash/{kind}/{id}", delete(purge))
}

/// A restored folder or note, tagged with its kind.
#[derive(Debug, Serialize)]
#[serde(tag = "kind", content = "item", rename_all = "lowercase")]
enum Restored {
    Folder(Folder),
    Note(Note),
}

fn parse_kind(raw: &str) -> ApiResult<ItemKind> {
    raw.parse().map_err(ApiError::BadRequest)
}

async fn list_trash(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> ApiResult<Json<Trash>> {
    Ok(Json(state.repo.list_trash(user.id).await?))
}

async fn restore(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((kind, id)): Path<(String, Uuid)>,
) -> ApiResult<Json<Restored>> {
    let restored = match parse_kind(&kind)? {
        ItemKind::Folder => Restored::Folder(state.repo.restore_folder(user.id, id).await?),
        ItemKind::Note => Restored::Note(state.repo.restore_note(user.id, id).await?),
    };
    Ok(Json(restored))
}

/// Remove for good. Children of a folder move to the root.
async fn purge(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((kind, id)): Path<(String, Uuid)>,
) -> ApiResult<StatusCode> {
    let kind = parse_kind(&kind)?;
    match kind {
        ItemKind::Folder => state.repo.purge_folder(user.id, id).await?,
        ItemKind::Note => state.repo.purge_note(user.id, id).await?,
    }
    tracing::info!("User {} permanently deleted {} {}", user.id, kind, id);
    Ok(StatusCode::NO_CONTENT)
}
