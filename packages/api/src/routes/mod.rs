//! REST routes. Every module exposes `routes()`; [`router`] merges them.

mod auth;
mod folders;
mod notes;
mod trash;
mod versions;

use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use store::FolderScope;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/health", get(health))
        .merge(auth::routes())
        .merge(folders::routes())
        .merge(notes::routes())
        .merge(trash::routes())
        .merge(versions::routes())
}

async fn health() -> &'static str {
    "ok"
}

/// Query string shared by the folder and note listings.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct ListQuery {
    pub parent_id: Option<String>,
    pub folder_id: Option<String>,
    pub favorite: Option<bool>,
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TagsBody {
    pub tags: Vec<String>,
}

/// `None` lists everywhere, `"root"` the top level, a UUID one folder.
pub(crate) fn parse_scope(raw: Option<&str>) -> ApiResult<FolderScope> {
    match raw.map(str::trim) {
        None | Some("") => Ok(FolderScope::Any),
        Some("root") => Ok(FolderScope::Root),
        Some(id) => Uuid::parse_str(id)
            .map(FolderScope::In)
            .map_err(|_| ApiError::BadRequest(format!("Invalid folder id: {}", id))),
    }
}
