//! Folder endpoints: CRUD, favorite and tags.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;
use store::{Folder, FolderPatch, ItemFilter, NewFolder};
use uuid::Uuid;

use super::{parse_scope, ListQuery, TagsBody};
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::extract::{Json, Path, Query};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/folders", get(list_folders).post(create_folder))
        .route(
            "/api/folders/{id}",
            get(get_folder).patch(update_folder).delete(delete_folder),
        )
        .route(
            "/api/folders/{id}/favorite",
            put(favorite_folder).delete(unfavorite_folder),
        )
        .route("/api/folders/{id}/tags", put(set_folder_tags))
        .route(
            "/api/folders/{id}/tags/{tag}",
            post(add_folder_tag).delete(remove_folder_tag),
        )
}

/// List live folders. `?parent_id=root|<uuid>&favorite=true&tag=work`
async fn list_folders(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Folder>>> {
    let filter = ItemFilter {
        scope: parse_scope(query.parent_id.as_deref())?,
        favorite: query.favorite,
        tag: query.tag,
    };
    Ok(Json(state.repo.list_folders(user.id, &filter).await?))
}

async fn create_folder(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(new): Json<NewFolder>,
) -> ApiResult<(StatusCode, Json<Folder>)> {
    let folder = state.repo.create_folder(user.id, new).await?;
    Ok((StatusCode::CREATED, Json(folder)))
}

async fn get_folder(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Folder>> {
    Ok(Json(state.repo.get_folder(user.id, id).await?))
}

async fn update_folder(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<FolderPatch>,
) -> ApiResult<Json<Folder>> {
    Ok(Json(state.repo.update_folder(user.id, id, patch).await?))
}

/// Move to trash.
async fn delete_folder(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Folder>> {
    Ok(Json(state.repo.soft_delete_folder(user.id, id).await?))
}

async fn favorite_folder(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Folder>> {
    Ok(Json(state.repo.set_folder_favorite(user.id, id, true).await?))
}

async fn unfavorite_folder(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Folder>> {
    Ok(Json(state.repo.set_folder_favorite(user.id, id, false).await?))
}

async fn set_folder_tags(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<TagsBody>,
) -> ApiResult<Json<Folder>> {
    Ok(Json(state.repo.set_folder_tags(user.id, id, body.tags).await?))
}

async fn add_folder_tag(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, tag)): Path<(Uuid, String)>,
) -> ApiResult<Json<Folder>> {
    Ok(Json(state.repo.add_folder_tag(user.id, id, &tag).await?))
}

async fn remove_folder_tag(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, tag)): Path<(Uuid, String)>,
) -> ApiResult<Json<Folder>> {
    Ok(Json(state.repo.remove_folder_tag(user.id, id, &tag).await?))
}
