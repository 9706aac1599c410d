//! Note endpoints: CRUD, favorite and tags.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::Router;
use store::{ItemFilter, NewNote, Note, NotePatch};
use uuid::Uuid;

use super::{parse_scope, ListQuery, TagsBody};
use crate::auth::CurrentUser;
use crate::error::ApiResult;
use crate::extract::{Json, Path, Query};
use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/notes", get(list_notes).post(create_note))
        .route(
            "/api/notes/{id}",
            get(get_note).patch(update_note).delete(delete_note),
        )
        .route(
            "/api/notes/{id}/favorite",
            put(favorite_note).delete(unfavorite_note),
        )
        .route("/api/notes/{id}/tags", put(set_note_tags))
        .route(
            "/api/notes/{id}/tags/{tag}",
            post(add_note_tag).delete(remove_note_tag),
        )
}

/// List live notes. `?folder_id=root|<uuid>&favorite=true&tag=work`
async fn list_notes(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Vec<Note>>> {
    let filter = ItemFilter {
        scope: parse_scope(query.folder_id.as_deref())?,
        favorite: query.favorite,
        tag: query.tag,
    };
    Ok(Json(state.repo.list_notes(user.id, &filter).await?))
}

async fn create_note(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(new): Json<NewNote>,
) -> ApiResult<(StatusCode, Json<Note>)> {
    let note = state.repo.create_note(user.id, new).await?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn get_note(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Note>> {
    Ok(Json(state.repo.get_note(user.id, id).await?))
}

async fn update_note(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(patch): Json<NotePatch>,
) -> ApiResult<Json<Note>> {
    Ok(Json(state.repo.update_note(user.id, id, patch).await?))
}

/// Move to trash.
async fn delete_note(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Note>> {
    Ok(Json(state.repo.soft_delete_note(user.id, id).await?))
}

async fn favorite_note(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Note>> {
    Ok(Json(state.repo.set_note_favorite(user.id, id, true).await?))
}

async fn unfavorite_note(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Note>> {
    Ok(Json(state.repo.set_note_favorite(user.id, id, false).await?))
}

async fn set_note_tags(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<TagsBody>,
) -> ApiResult<Json<Note>> {
    Ok(Json(state.repo.set_note_tags(user.id, id, body.tags).await?))
}

async fn add_note_tag(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, tag)): Path<(Uuid, String)>,
) -> ApiResult<Json<Note>> {
    Ok(Json(state.repo.add_note_tag(user.id, id, &tag).await?))
}

async fn remove_note_tag(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path((id, tag)): Path<(Uuid, String)>,
) -> ApiResult<Json<Note>> {
    Ok(Json(state.repo.remove_note_tag(user.id, id, &tag).await?))
}
