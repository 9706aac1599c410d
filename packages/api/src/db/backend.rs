use chrono::{DateTime, Utc};
use store::{Folder, ItemStore, MemoryStore, Note, NoteVersion, StoreResult, User};
use uuid::Uuid;

use super::PgStore;

/// The item store the server runs on, chosen at startup.
#[derive(Clone, Debug)]
pub enum Backend {
    Memory(MemoryStore),
    Postgres(PgStore),
}

impl ItemStore for Backend {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        match self {
            Backend::Memory(s) => s.get_user(id).await,
            Backend::Postgres(s) => s.get_user(id).await,
        }
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        match self {
            Backend::Memory(s) => s.get_user_by_username(username).await,
            Backend::Postgres(s) => s.get_user_by_username(username).await,
        }
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        match self {
            Backend::Memory(s) => s.insert_user(user).await,
            Backend::Postgres(s) => s.insert_user(user).await,
        }
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        match self {
            Backend::Memory(s) => s.update_user(user).await,
            Backend::Postgres(s) => s.update_user(user).await,
        }
    }

    async fn get_folder(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Option<Folder>> {
        match self {
            Backend::Memory(s) => s.get_folder(owner_id, id).await,
            Backend::Postgres(s) => s.get_folder(owner_id, id).await,
        }
    }

    async fn list_folders(&self, owner_id: Uuid) -> StoreResult<Vec<Folder>> {
        match self {
            Backend::Memory(s) => s.list_folders(owner_id).await,
            Backend::Postgres(s) => s.list_folders(owner_id).await,
        }
    }

    async fn put_folder(&self, folder: &Folder) -> StoreResult<()> {
        match self {
            Backend::Memory(s) => s.put_folder(folder).await,
            Backend::Postgres(s) => s.put_folder(folder).await,
        }
    }

    async fn purge_folder(&self, owner_id: Uuid, id: Uuid, updated_at: DateTime<Utc>) -> StoreResult<bool> {
        match self {
            Backend::Memory(s) => s.purge_folder(owner_id, id, updated_at).await,
            Backend::Postgres(s) => s.purge_folder(owner_id, id, updated_at).await,
        }
    }

    async fn get_note(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Option<Note>> {
        match self {
            Backend::Memory(s) => s.get_note(owner_id, id).await,
            Backend::Postgres(s) => s.get_note(owner_id, id).await,
        }
    }

    async fn list_notes(&self, owner_id: Uuid) -> StoreResult<Vec<Note>> {
        match self {
            Backend::Memory(s) => s.list_notes(owner_id).await,
            Backend::Postgres(s) => s.list_notes(owner_id).await,
        }
    }

    async fn put_note(&self, note: &Note) -> StoreResult<()> {
        match self {
            Backend::Memory(s) => s.put_note(note).await,
            Backend::Postgres(s) => s.put_note(note).await,
        }
    }

    async fn purge_note(&self, owner_id: Uuid, id: Uuid) -> StoreResult<bool> {
        match self {
            Backend::Memory(s) => s.purge_note(owner_id, id).await,
            Backend::Postgres(s) => s.purge_note(owner_id, id).await,
        }
    }

    async fn list_versions(&self, owner_id: Uuid, note_id: Uuid) -> StoreResult<Vec<NoteVersion>> {
        match self {
            Backend::Memory(s) => s.list_versions(owner_id, note_id).await,
            Backend::Postgres(s) => s.list_versions(owner_id, note_id).await,
        }
    }

    async fn put_version(&self, version: &NoteVersion) -> StoreResult<()> {
        match self {
            Backend::Memory(s) => s.put_version(version).await,
            Backend::Postgres(s) => s.put_version(version).await,
        }
    }
}
