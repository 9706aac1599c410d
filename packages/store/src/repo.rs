//! # Repository: ownership and hierarchy rules on an abstract item store
//!
//! [`Repository`] is the data-access layer every API call goes through. Storage
//! is behind the [`ItemStore`] trait, so the same rules run against the
//! in-memory store (tests, development) and PostgreSQL (the api crate).
//!
//! ## [`ItemStore`] trait
//!
//! Plain record access: get/list/put/delete for users, folders, notes and note
//! versions. Every folder, note and version method takes the owner id and must
//! treat another owner's rows as absent. Backends do no validation.
//!
//! ## Rules enforced here
//!
//! | Rule | Where |
//! |------|-------|
//! | name / title required after trimming | [`create_folder`](Repository::create_folder), [`create_note`](Repository::create_note), updates |
//! | parent / folder references must be a live folder of the same owner | [`check_folder_ref`](Repository::check_folder_ref) |
//! | a folder can't be moved under itself or a descendant | [`check_no_cycle`](Repository::check_no_cycle) |
//! | soft delete only flips `is_deleted` / `deleted_at` | [`soft_delete_folder`](Repository::soft_delete_folder), [`soft_delete_note`](Repository::soft_delete_note) |
//! | trashed items must be restored before editing | [`live_folder`](Repository::live_folder), [`live_note`](Repository::live_note) |
//! | permanent folder delete reparents children to the root | [`purge_folder`](Repository::purge_folder) |
//! | a note's versions go with it | [`purge_note`](Repository::purge_note) |
//! | only trashed items can be purged | [`purge_folder`](Repository::purge_folder), [`purge_note`](Repository::purge_note) |
//!
//! ## Concurrency
//!
//! Every folder and note mutation of one owner runs under that owner's lock,
//! so a validation (parent check, cycle walk) and the write it guards can't
//! interleave with another request of the same owner. Multi-row writes go
//! through single atomic store calls ([`ItemStore::purge_folder`],
//! [`ItemStore::purge_note`]).
//!
//! ## Timestamps
//!
//! [`now`] truncates to microseconds so records survive a Postgres
//! `TIMESTAMPTZ` round trip unchanged.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, SubsecRound, Utc};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{content_sha, Folder, ItemKind, Note, NoteVersion, Tags, Trash, User};
use crate::params::{FolderPatch, ItemFilter, NewFolder, NewNote, NewUser, NotePatch};

const MAX_NAME_LEN: usize = 255;

/// Async trait for storing and retrieving records.
pub trait ItemStore: Send + Sync {
    fn get_user(&self, id: Uuid) -> impl Future<Output = StoreResult<Option<User>>> + Send;
    fn get_user_by_username(
        &self,
        username: &str,
    ) -> impl Future<Output = StoreResult<Option<User>>> + Send;
    /// Insert a new user. Fails with [`StoreError::Conflict`] on a taken username.
    fn insert_user(&self, user: &User) -> impl Future<Output = StoreResult<()>> + Send;
    fn update_user(&self, user: &User) -> impl Future<Output = StoreResult<()>> + Send;

    fn get_folder(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<Folder>>> + Send;
    /// Every folder of the owner, trashed ones included.
    fn list_folders(&self, owner_id: Uuid) -> impl Future<Output = StoreResult<Vec<Folder>>> + Send;
    fn put_folder(&self, folder: &Folder) -> impl Future<Output = StoreResult<()>> + Send;
    /// Remove a folder and move its direct child folders and notes to the root,
    /// stamping them with `updated_at`, as one atomic write. Returns false if
    /// nothing was removed.
    fn purge_folder(
        &self,
        owner_id: Uuid,
        id: Uuid,
        updated_at: DateTime<Utc>,
    ) -> impl Future<Output = StoreResult<bool>> + Send;

    fn get_note(
        &self,
        owner_id: Uuid,
        id: Uuid,
    ) -> impl Future<Output = StoreResult<Option<Note>>> + Send;
    /// Every note of the owner, trashed ones included.
    fn list_notes(&self, owner_id: Uuid) -> impl Future<Output = StoreResult<Vec<Note>>> + Send;
    fn put_note(&self, note: &Note) -> impl Future<Output = StoreResult<()>> + Send;
    /// Remove a note together with its versions as one atomic write. Returns
    /// false if nothing was removed.
    fn purge_note(&self, owner_id: Uuid, id: Uuid) -> impl Future<Output = StoreResult<bool>> + Send;

    /// Versions of a note, newest first.
    fn list_versions(
        &self,
        owner_id: Uuid,
        note_id: Uuid,
    ) -> impl Future<Output = StoreResult<Vec<NoteVersion>>> + Send;
    fn put_version(&self, version: &NoteVersion) -> impl Future<Output = StoreResult<()>> + Send;
}

/// The current time at database precision.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

fn required(field: &str, value: &str) -> StoreResult<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(StoreError::Validation(format!("{} is required", field)));
    }
    if value.chars().count() > MAX_NAME_LEN {
        return Err(StoreError::Validation(format!(
            "{} must be at most {} characters",
            field, MAX_NAME_LEN
        )));
    }
    Ok(value.to_string())
}

fn matches_filter(filter: &ItemFilter, parent: Option<Uuid>, is_favorite: bool, tags: &Tags) -> bool {
    filter.scope.matches(parent)
        && filter.favorite.map_or(true, |f| f == is_favorite)
        && filter.tag.as_deref().map_or(true, |t| tags.contains(t))
}

/// One async mutex per owner, created on demand.
#[derive(Clone, Debug, Default)]
struct OwnerLocks(Arc<Mutex<HashMap<Uuid, Arc<AsyncMutex<()>>>>>);

impl OwnerLocks {
    async fn acquire(&self, owner_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            // Entries only the map still references are idle.
            locks.retain(|id, l| *id == owner_id || Arc::strong_count(l) > 1);
            locks.entry(owner_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

/// Item rules backed by an ItemStore.
#[derive(Clone, Debug)]
pub struct Repository<S: ItemStore> {
    store: S,
    locks: OwnerLocks,
}

impl<S: ItemStore> Repository<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            locks: OwnerLocks::default(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ---- users ----

    /// Create a user. The username is trimmed and lower-cased.
    pub async fn create_user(&self, new: NewUser) -> StoreResult<User> {
        let username = new.username.trim().to_lowercase();
        let len = username.chars().count();
        if !(3..=64).contains(&len) {
            return Err(StoreError::Validation(
                "Username must be between 3 and 64 characters".to_string(),
            ));
        }
        if username.chars().any(char::is_whitespace) {
            return Err(StoreError::Validation(
                "Username must not contain whitespace".to_string(),
            ));
        }
        if new.password_hash.is_empty() {
            return Err(StoreError::Validation("Password is required".to_string()));
        }
        if self.store.get_user_by_username(&username).await?.is_some() {
            return Err(StoreError::Conflict(
                "An account with this username already exists".to_string(),
            ));
        }

        let ts = now();
        let user = User {
            id: Uuid::new_v4(),
            username,
            password_hash: new.password_hash,
            name: new
                .name
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
            created_at: ts,
            updated_at: ts,
        };
        self.store.insert_user(&user).await?;
        Ok(user)
    }

    pub async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.store.get_user(id).await
    }

    pub async fn find_user(&self, username: &str) -> StoreResult<Option<User>> {
        self.store
            .get_user_by_username(&username.trim().to_lowercase())
            .await
    }

    pub async fn set_password_hash(&self, id: Uuid, password_hash: String) -> StoreResult<User> {
        let mut user = self.store.get_user(id).await?.ok_or_else(|| {
            StoreError::Validation("User no longer exists".to_string())
        })?;
        user.password_hash = password_hash;
        user.updated_at = now();
        self.store.update_user(&user).await?;
        Ok(user)
    }

    // ---- reference checks ----

    /// Ensure `folder_id` names a live folder owned by `owner_id`.
    async fn check_folder_ref(&self, owner_id: Uuid, folder_id: Uuid) -> StoreResult<Folder> {
        match self.store.get_folder(owner_id, folder_id).await? {
            None => Err(StoreError::InvalidReference {
                id: folder_id,
                reason: "folder does not exist".to_string(),
            }),
            Some(f) if f.is_deleted => Err(StoreError::InvalidReference {
                id: folder_id,
                reason: "folder is in the trash".to_string(),
            }),
            Some(f) => Ok(f),
        }
    }

    /// Walk up from `parent_id`; reaching `folder_id` means the move would loop.
    async fn check_no_cycle(&self, owner_id: Uuid, folder_id: Uuid, parent_id: Uuid) -> StoreResult<()> {
        let mut seen = HashSet::new();
        let mut current = Some(parent_id);
        while let Some(id) = current {
            if id == folder_id {
                return Err(StoreError::Cycle {
                    folder_id,
                    parent_id,
                });
            }
            // A pre-existing loop further up is not ours to report.
            if !seen.insert(id) {
                break;
            }
            current = self
                .store
                .get_folder(owner_id, id)
                .await?
                .and_then(|f| f.parent_id);
        }
        Ok(())
    }

    async fn live_folder(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Folder> {
        let folder = self.get_folder(owner_id, id).await?;
        if folder.is_deleted {
            return Err(StoreError::Validation(
                "Folder is in the trash; restore it first".to_string(),
            ));
        }
        Ok(folder)
    }

    async fn live_note(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Note> {
        let note = self.get_note(owner_id, id).await?;
        if note.is_deleted {
            return Err(StoreError::Validation(
                "Note is in the trash; restore it first".to_string(),
            ));
        }
        Ok(note)
    }

    // ---- folders ----

    pub async fn create_folder(&self, owner_id: Uuid, new: NewFolder) -> StoreResult<Folder> {
        let _guard = self.locks.acquire(owner_id).await;
        let name = required("Folder name", &new.name)?;
        if let Some(parent_id) = new.parent_id {
            self.check_folder_ref(owner_id, parent_id).await?;
        }

        let ts = now();
        let folder = Folder {
            id: Uuid::new_v4(),
            owner_id,
            name,
            parent_id: new.parent_id,
            is_deleted: false,
            deleted_at: None,
            is_favorite: new.is_favorite,
            tags: new.tags.into_iter().collect(),
            created_at: ts,
            updated_at: ts,
        };
        self.store.put_folder(&folder).await?;
        Ok(folder)
    }

    pub async fn get_folder(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Folder> {
        self.store
            .get_folder(owner_id, id)
            .await?
            .ok_or(StoreError::NotFound {
                kind: ItemKind::Folder,
                id,
            })
    }

    /// Live folders matching the filter, ordered by name.
    pub async fn list_folders(&self, owner_id: Uuid, filter: &ItemFilter) -> StoreResult<Vec<Folder>> {
        let mut folders: Vec<Folder> = self
            .store
            .list_folders(owner_id)
            .await?
            .into_iter()
            .filter(|f| !f.is_deleted)
            .filter(|f| matches_filter(filter, f.parent_id, f.is_favorite, &f.tags))
            .collect();
        folders.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(folders)
    }

    pub async fn update_folder(&self, owner_id: Uuid, id: Uuid, patch: FolderPatch) -> StoreResult<Folder> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut folder = self.live_folder(owner_id, id).await?;

        if let Some(name) = patch.name {
            folder.name = required("Folder name", &name)?;
        }
        if let Some(parent_id) = patch.parent_id {
            if let Some(parent_id) = parent_id {
                self.check_folder_ref(owner_id, parent_id).await?;
                self.check_no_cycle(owner_id, id, parent_id).await?;
            }
            folder.parent_id = parent_id;
        }
        if let Some(is_favorite) = patch.is_favorite {
            folder.is_favorite = is_favorite;
        }
        if let Some(tags) = patch.tags {
            folder.tags = tags.into_iter().collect();
        }

        folder.updated_at = now();
        self.store.put_folder(&folder).await?;
        Ok(folder)
    }

    /// Move to trash. Children are left where they are.
    pub async fn soft_delete_folder(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Folder> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut folder = self.get_folder(owner_id, id).await?;
        if folder.is_deleted {
            return Ok(folder);
        }
        folder.is_deleted = true;
        folder.deleted_at = Some(now());
        self.store.put_folder(&folder).await?;
        Ok(folder)
    }

    pub async fn restore_folder(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Folder> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut folder = self.get_folder(owner_id, id).await?;
        if !folder.is_deleted {
            return Ok(folder);
        }
        folder.is_deleted = false;
        folder.deleted_at = None;
        self.store.put_folder(&folder).await?;
        Ok(folder)
    }

    /// Remove a trashed folder for good. Its direct child folders and notes
    /// move to the root and keep their own trash state.
    pub async fn purge_folder(&self, owner_id: Uuid, id: Uuid) -> StoreResult<()> {
        let _guard = self.locks.acquire(owner_id).await;
        if !self.get_folder(owner_id, id).await?.is_deleted {
            return Err(StoreError::Validation(
                "Folder must be in the trash before it can be deleted permanently".to_string(),
            ));
        }
        if !self.store.purge_folder(owner_id, id, now()).await? {
            return Err(StoreError::NotFound {
                kind: ItemKind::Folder,
                id,
            });
        }
        Ok(())
    }

    pub async fn set_folder_favorite(&self, owner_id: Uuid, id: Uuid, favorite: bool) -> StoreResult<Folder> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut folder = self.live_folder(owner_id, id).await?;
        if folder.is_favorite != favorite {
            folder.is_favorite = favorite;
            folder.updated_at = now();
            self.store.put_folder(&folder).await?;
        }
        Ok(folder)
    }

    pub async fn add_folder_tag(&self, owner_id: Uuid, id: Uuid, tag: &str) -> StoreResult<Folder> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut folder = self.live_folder(owner_id, id).await?;
        if folder.tags.insert(tag) {
            folder.updated_at = now();
            self.store.put_folder(&folder).await?;
        }
        Ok(folder)
    }

    pub async fn remove_folder_tag(&self, owner_id: Uuid, id: Uuid, tag: &str) -> StoreResult<Folder> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut folder = self.live_folder(owner_id, id).await?;
        if folder.tags.remove(tag) {
            folder.updated_at = now();
            self.store.put_folder(&folder).await?;
        }
        Ok(folder)
    }

    /// Replace the whole tag list.
    pub async fn set_folder_tags(&self, owner_id: Uuid, id: Uuid, tags: Vec<String>) -> StoreResult<Folder> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut folder = self.live_folder(owner_id, id).await?;
        folder.tags = tags.into_iter().collect();
        folder.updated_at = now();
        self.store.put_folder(&folder).await?;
        Ok(folder)
    }

    // ---- notes ----

    pub async fn create_note(&self, owner_id: Uuid, new: NewNote) -> StoreResult<Note> {
        let _guard = self.locks.acquire(owner_id).await;
        let title = required("Note title", &new.title)?;
        if let Some(folder_id) = new.folder_id {
            self.check_folder_ref(owner_id, folder_id).await?;
        }

        let ts = now();
        let note = Note {
            id: Uuid::new_v4(),
            owner_id,
            folder_id: new.folder_id,
            title,
            content: new.content,
            is_deleted: false,
            deleted_at: None,
            is_favorite: new.is_favorite,
            tags: new.tags.into_iter().collect(),
            created_at: ts,
            updated_at: ts,
        };
        self.store.put_note(&note).await?;
        Ok(note)
    }

    pub async fn get_note(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Note> {
        self.store
            .get_note(owner_id, id)
            .await?
            .ok_or(StoreError::NotFound {
                kind: ItemKind::Note,
                id,
            })
    }

    /// Live notes matching the filter, most recently updated first.
    pub async fn list_notes(&self, owner_id: Uuid, filter: &ItemFilter) -> StoreResult<Vec<Note>> {
        let mut notes: Vec<Note> = self
            .store
            .list_notes(owner_id)
            .await?
            .into_iter()
            .filter(|n| !n.is_deleted)
            .filter(|n| matches_filter(filter, n.folder_id, n.is_favorite, &n.tags))
            .collect();
        notes.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(notes)
    }

    pub async fn update_note(&self, owner_id: Uuid, id: Uuid, patch: NotePatch) -> StoreResult<Note> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut note = self.live_note(owner_id, id).await?;

        if let Some(title) = patch.title {
            note.title = required("Note title", &title)?;
        }
        if let Some(content) = patch.content {
            note.content = content;
        }
        if let Some(folder_id) = patch.folder_id {
            if let Some(folder_id) = folder_id {
                self.check_folder_ref(owner_id, folder_id).await?;
            }
            note.folder_id = folder_id;
        }
        if let Some(is_favorite) = patch.is_favorite {
            note.is_favorite = is_favorite;
        }
        if let Some(tags) = patch.tags {
            note.tags = tags.into_iter().collect();
        }

        note.updated_at = now();
        self.store.put_note(&note).await?;
        Ok(note)
    }

    pub async fn soft_delete_note(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Note> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut note = self.get_note(owner_id, id).await?;
        if note.is_deleted {
            return Ok(note);
        }
        note.is_deleted = true;
        note.deleted_at = Some(now());
        self.store.put_note(&note).await?;
        Ok(note)
    }

    pub async fn restore_note(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Note> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut note = self.get_note(owner_id, id).await?;
        if !note.is_deleted {
            return Ok(note);
        }
        note.is_deleted = false;
        note.deleted_at = None;
        self.store.put_note(&note).await?;
        Ok(note)
    }

    /// Remove a trashed note and its versions for good.
    pub async fn purge_note(&self, owner_id: Uuid, id: Uuid) -> StoreResult<()> {
        let _guard = self.locks.acquire(owner_id).await;
        if !self.get_note(owner_id, id).await?.is_deleted {
            return Err(StoreError::Validation(
                "Note must be in the trash before it can be deleted permanently".to_string(),
            ));
        }
        if !self.store.purge_note(owner_id, id).await? {
            return Err(StoreError::NotFound {
                kind: ItemKind::Note,
                id,
            });
        }
        Ok(())
    }

    pub async fn set_note_favorite(&self, owner_id: Uuid, id: Uuid, favorite: bool) -> StoreResult<Note> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut note = self.live_note(owner_id, id).await?;
        if note.is_favorite != favorite {
            note.is_favorite = favorite;
            note.updated_at = now();
            self.store.put_note(&note).await?;
        }
        Ok(note)
    }

    pub async fn add_note_tag(&self, owner_id: Uuid, id: Uuid, tag: &str) -> StoreResult<Note> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut note = self.live_note(owner_id, id).await?;
        if note.tags.insert(tag) {
            note.updated_at = now();
            self.store.put_note(&note).await?;
        }
        Ok(note)
    }

    pub async fn remove_note_tag(&self, owner_id: Uuid, id: Uuid, tag: &str) -> StoreResult<Note> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut note = self.live_note(owner_id, id).await?;
        if note.tags.remove(tag) {
            note.updated_at = now();
            self.store.put_note(&note).await?;
        }
        Ok(note)
    }

    /// Replace the whole tag list.
    pub async fn set_note_tags(&self, owner_id: Uuid, id: Uuid, tags: Vec<String>) -> StoreResult<Note> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut note = self.live_note(owner_id, id).await?;
        note.tags = tags.into_iter().collect();
        note.updated_at = now();
        self.store.put_note(&note).await?;
        Ok(note)
    }

    // ---- trash ----

    /// Trashed folders and notes, most recently deleted first.
    pub async fn list_trash(&self, owner_id: Uuid) -> StoreResult<Trash> {
        let mut folders: Vec<Folder> = self
            .store
            .list_folders(owner_id)
            .await?
            .into_iter()
            .filter(|f| f.is_deleted)
            .collect();
        folders.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));

        let mut notes: Vec<Note> = self
            .store
            .list_notes(owner_id)
            .await?
            .into_iter()
            .filter(|n| n.is_deleted)
            .collect();
        notes.sort_by(|a, b| b.deleted_at.cmp(&a.deleted_at));

        Ok(Trash { folders, notes })
    }

    // ---- versions ----

    pub async fn list_versions(&self, owner_id: Uuid, note_id: Uuid) -> StoreResult<Vec<NoteVersion>> {
        self.get_note(owner_id, note_id).await?;
        self.store.list_versions(owner_id, note_id).await
    }

    /// Snapshot the note. If the newest version already holds the same title
    /// and content, that version is returned instead of a duplicate.
    pub async fn create_version(&self, owner_id: Uuid, note_id: Uuid) -> StoreResult<NoteVersion> {
        let _guard = self.locks.acquire(owner_id).await;
        let note = self.live_note(owner_id, note_id).await?;
        self.snapshot(&note).await
    }

    async fn snapshot(&self, note: &Note) -> StoreResult<NoteVersion> {
        let sha = content_sha(&note.title, &note.content);
        let versions = self.store.list_versions(note.owner_id, note.id).await?;
        if let Some(latest) = versions.into_iter().next() {
            if latest.content_sha == sha {
                return Ok(latest);
            }
        }

        let version = NoteVersion {
            id: Uuid::new_v4(),
            note_id: note.id,
            owner_id: note.owner_id,
            title: note.title.clone(),
            content: note.content.clone(),
            content_sha: sha,
            created_at: now(),
        };
        self.store.put_version(&version).await?;
        Ok(version)
    }

    /// Write a version back into its note. The current state is snapshotted
    /// first so the restore can itself be undone.
    pub async fn restore_version(
        &self,
        owner_id: Uuid,
        note_id: Uuid,
        version_id: Uuid,
    ) -> StoreResult<Note> {
        let _guard = self.locks.acquire(owner_id).await;
        let mut note = self.live_note(owner_id, note_id).await?;
        let version = self
            .store
            .list_versions(owner_id, note_id)
            .await?
            .into_iter()
            .find(|v| v.id == version_id)
            .ok_or(StoreError::VersionNotFound { id: version_id })?;

        self.snapshot(&note).await?;

        note.title = version.title;
        note.content = version.content;
        note.updated_at = now();
        self.store.put_note(&note).await?;
        Ok(note)
    }
}
