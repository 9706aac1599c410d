use thiserror::Error;
use uuid::Uuid;

use crate::models::ItemKind;

/// Errors returned by [`crate::Repository`] and [`crate::ItemStore`] backends.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum StoreError {
    /// A required field is missing or malformed.
    #[error("{0}")]
    Validation(String),

    /// The id does not exist or belongs to another owner.
    #[error("{kind} {id} not found")]
    NotFound { kind: ItemKind, id: Uuid },

    #[error("version {id} not found")]
    VersionNotFound { id: Uuid },

    /// A parent or folder reference points at something the owner can't use.
    #[error("invalid folder reference {id}: {reason}")]
    InvalidReference { id: Uuid, reason: String },

    #[error("folder {folder_id} can not be moved under {parent_id}: would create a cycle")]
    Cycle { folder_id: Uuid, parent_id: Uuid },

    #[error("{0}")]
    Conflict(String),

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
