//! Request shapes accepted by [`crate::Repository`].
//!
//! Patch structs use `Option<Option<_>>` for nullable references: a missing
//! field leaves the value alone, an explicit `null` moves the item to the root.

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewFolder {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FolderPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub parent_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub is_favorite: Option<bool>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewNote {
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub folder_id: Option<Uuid>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NotePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub folder_id: Option<Option<Uuid>>,
    #[serde(default)]
    pub is_favorite: Option<bool>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Where in the tree a listing looks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FolderScope {
    #[default]
    Any,
    Root,
    In(Uuid),
}

impl FolderScope {
    pub fn matches(&self, parent: Option<Uuid>) -> bool {
        match self {
            FolderScope::Any => true,
            FolderScope::Root => parent.is_none(),
            FolderScope::In(id) => parent == Some(*id),
        }
    }
}

/// Filters for folder and note listings. Trashed items are never listed.
#[derive(Clone, Debug, Default)]
pub struct ItemFilter {
    pub scope: FolderScope,
    pub favorite: Option<bool>,
    pub tag: Option<String>,
}

fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(de).map(Some)
}
