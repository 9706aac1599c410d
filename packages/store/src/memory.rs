use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{Folder, Note, NoteVersion, User};
use crate::repo::ItemStore;

/// In-memory ItemStore for testing and development.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    users: Arc<Mutex<HashMap<Uuid, User>>>,
    folders: Arc<Mutex<HashMap<Uuid, Folder>>>,
    notes: Arc<Mutex<HashMap<Uuid, Note>>>,
    versions: Arc<Mutex<Vec<NoteVersion>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ItemStore for MemoryStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        Ok(lock(&self.users).get(&id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        Ok(lock(&self.users)
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        let mut users = lock(&self.users);
        if users.values().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(
                "An account with this username already exists".to_string(),
            ));
        }
        users.insert(user.id, user.clone());
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        lock(&self.users).insert(user.id, user.clone());
        Ok(())
    }

    async fn get_folder(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Option<Folder>> {
        Ok(lock(&self.folders)
            .get(&id)
            .filter(|f| f.owner_id == owner_id)
            .cloned())
    }

    async fn list_folders(&self, owner_id: Uuid) -> StoreResult<Vec<Folder>> {
        Ok(lock(&self.folders)
            .values()
            .filter(|f| f.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn put_folder(&self, folder: &Folder) -> StoreResult<()> {
        lock(&self.folders).insert(folder.id, folder.clone());
        Ok(())
    }

    async fn purge_folder(&self, owner_id: Uuid, id: Uuid, updated_at: DateTime<Utc>) -> StoreResult<bool> {
        // Both maps stay locked until every row is moved.
        let mut folders = lock(&self.folders);
        let mut notes = lock(&self.notes);
        if !folders.get(&id).is_some_and(|f| f.owner_id == owner_id) {
            return Ok(false);
        }
        folders.remove(&id);
        for child in folders
            .values_mut()
            .filter(|f| f.owner_id == owner_id && f.parent_id == Some(id))
        {
            child.parent_id = None;
            child.updated_at = updated_at;
        }
        for note in notes
            .values_mut()
            .filter(|n| n.owner_id == owner_id && n.folder_id == Some(id))
        {
            note.folder_id = None;
            note.updated_at = updated_at;
        }
        Ok(true)
    }

    async fn get_note(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Option<Note>> {
        Ok(lock(&self.notes)
            .get(&id)
            .filter(|n| n.owner_id == owner_id)
            .cloned())
    }

    async fn list_notes(&self, owner_id: Uuid) -> StoreResult<Vec<Note>> {
        Ok(lock(&self.notes)
            .values()
            .filter(|n| n.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn put_note(&self, note: &Note) -> StoreResult<()> {
        lock(&self.notes).insert(note.id, note.clone());
        Ok(())
    }

    async fn purge_note(&self, owner_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut notes = lock(&self.notes);
        let mut versions = lock(&self.versions);
        if !notes.get(&id).is_some_and(|n| n.owner_id == owner_id) {
            return Ok(false);
        }
        notes.remove(&id);
        versions.retain(|v| !(v.owner_id == owner_id && v.note_id == id));
        Ok(true)
    }

    async fn list_versions(&self, owner_id: Uuid, note_id: Uuid) -> StoreResult<Vec<NoteVersion>> {
        // Stored oldest first; reversed so the newest comes first even when
        // two snapshots share a timestamp.
        Ok(lock(&self.versions)
            .iter()
            .rev()
            .filter(|v| v.owner_id == owner_id && v.note_id == note_id)
            .cloned()
            .collect())
    }

    async fn put_version(&self, version: &NoteVersion) -> StoreResult<()> {
        lock(&self.versions).push(version.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{FolderPatch, FolderScope, ItemFilter, NewFolder, NewNote, NewUser, NotePatch};
    use crate::repo::Repository;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn folder(name: &str, parent_id: Option<Uuid>) -> NewFolder {
        NewFolder {
            name: name.to_string(),
            parent_id,
            ..Default::default()
        }
    }

    fn note(title: &str, folder_id: Option<Uuid>) -> NewNote {
        NewNote {
            title: title.to_string(),
            content: format!("<p>{}</p>", title),
            folder_id,
            ..Default::default()
        }
    }

    fn move_under(parent: Option<Uuid>) -> FolderPatch {
        FolderPatch {
            parent_id: Some(parent),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_folder_and_note() {
        let repo = Repository::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let work = repo.create_folder(owner, folder("  Work ", None)).await.unwrap();
        assert_eq!(work.name, "Work");
        assert!(work.parent_id.is_none());

        let n = repo.create_note(owner, note("Plan", Some(work.id))).await.unwrap();
        assert_eq!(n.folder_id, Some(work.id));
        assert_eq!(repo.get_note(owner, n.id).await.unwrap(), n);
    }

    #[tokio::test]
    async fn test_create_requires_name_and_title() {
        let repo = Repository::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let err = repo.create_folder(owner, folder("   ", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = repo.create_note(owner, note("", None)).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_parent_must_exist() {
        let repo = Repository::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let err = repo
            .create_folder(owner, folder("orphan", Some(Uuid::new_v4())))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference { .. }));
    }

    #[tokio::test]
    async fn test_cycle_is_rejected() {
        let repo = Repository::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let a = repo.create_folder(owner, folder("A", None)).await.unwrap();
        let b = repo.create_folder(owner, folder("B", Some(a.id))).await.unwrap();

        let err = repo
            .update_folder(owner, a.id, move_under(Some(b.id)))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Cycle {
                folder_id: a.id,
                parent_id: b.id
            }
        );

        // Unchanged after the failed move
        assert!(repo.get_folder(owner, a.id).await.unwrap().parent_id.is_none());
    }

    #[tokio::test]
    async fn test_cycle_deep_and_self() {
        let repo = Repository::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let a = repo.create_folder(owner, folder("A", None)).await.unwrap();
        let b = repo.create_folder(owner, folder("B", Some(a.id))).await.unwrap();
        let c = repo.create_folder(owner, folder("C", Some(b.id))).await.unwrap();

        let err = repo
            .update_folder(owner, a.id, move_under(Some(c.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Cycle { .. }));

        let err = repo
            .update_folder(owner, b.id, move_under(Some(b.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Cycle { .. }));

        // Moving sideways and back to root is fine
        let d = repo.create_folder(owner, folder("D", None)).await.unwrap();
        let moved = repo
            .update_folder(owner, c.id, move_under(Some(d.id)))
            .await
            .unwrap();
        assert_eq!(moved.parent_id, Some(d.id));
        let moved = repo.update_folder(owner, c.id, move_under(None)).await.unwrap();
        assert!(moved.parent_id.is_none());
    }

    #[tokio::test]
    async fn test_cross_owner_move_is_rejected() {
        let repo = Repository::new(MemoryStore::new());
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        let f = repo.create_folder(u1, folder("F", None)).await.unwrap();
        let foreign = repo.create_folder(u2, folder("G", None)).await.unwrap();
        let n = repo.create_note(u1, note("N", Some(f.id))).await.unwrap();

        let err = repo
            .update_note(
                u1,
                n.id,
                NotePatch {
                    folder_id: Some(Some(foreign.id)),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference { .. }));
        assert_eq!(repo.get_note(u1, n.id).await.unwrap().folder_id, Some(f.id));

        let err = repo
            .update_folder(u1, f.id, move_under(Some(foreign.id)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference { .. }));
    }

    #[tokio::test]
    async fn test_other_owner_sees_not_found() {
        let repo = Repository::new(MemoryStore::new());
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        let n = repo.create_note(u1, note("secret", None)).await.unwrap();
        let err = repo.get_note(u2, n.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
        assert!(repo.soft_delete_note(u2, n.id).await.is_err());
        assert!(repo.purge_note(u2, n.id).await.is_err());
        assert!(!repo.get_note(u1, n.id).await.unwrap().is_deleted);
    }

    #[tokio::test]
    async fn test_soft_delete_then_restore_is_identity() {
        let repo = Repository::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let f = repo.create_folder(owner, folder("F", None)).await.unwrap();
        let n = repo.create_note(owner, note("N", Some(f.id))).await.unwrap();
        let n = repo.add_note_tag(owner, n.id, "draft").await.unwrap();

        let deleted = repo.soft_delete_note(owner, n.id).await.unwrap();
        assert!(deleted.is_deleted);
        assert!(deleted.deleted_at.is_some());
        assert!(!deleted.tags.contains("deleted"));
        assert_eq!(deleted.tags, n.tags);

        let restored = repo.restore_note(owner, n.id).await.unwrap();
        assert_eq!(restored, n);

        let deleted = repo.soft_delete_folder(owner, f.id).await.unwrap();
        assert!(deleted.is_deleted);
        let restored = repo.restore_folder(owner, f.id).await.unwrap();
        assert_eq!(restored, f);
    }

    #[tokio::test]
    async fn test_soft_delete_does_not_cascade() {
        let repo = Repository::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let f = repo.create_folder(owner, folder("F", None)).await.unwrap();
        let child = repo.create_folder(owner, folder("child", Some(f.id))).await.unwrap();
        let n = repo.create_note(owner, note("N", Some(f.id))).await.unwrap();

        repo.soft_delete_folder(owner, f.id).await.unwrap();

        let child = repo.get_folder(owner, child.id).await.unwrap();
        assert!(!child.is_deleted);
        assert_eq!(child.parent_id, Some(f.id));
        assert!(!repo.get_note(owner, n.id).await.unwrap().is_deleted);

        let trash = repo.list_trash(owner).await.unwrap();
        assert_eq!(trash.folders.len(), 1);
        assert!(trash.notes.is_empty());

        // Can't file new things under a trashed folder
        let err = repo.create_note(owner, note("late", Some(f.id))).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference { .. }));
    }

    #[tokio::test]
    async fn test_trashed_items_are_read_only() {
        let repo = Repository::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let n = repo.create_note(owner, note("N", None)).await.unwrap();
        repo.soft_delete_note(owner, n.id).await.unwrap();

        let err = repo.set_note_favorite(owner, n.id, true).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(repo.list_notes(owner, &ItemFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_folder_reparents_children() {
        let repo = Repository::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let f = repo.create_folder(owner, folder("F", None)).await.unwrap();
        let child = repo.create_folder(owner, folder("child", Some(f.id))).await.unwrap();
        let n = repo.create_note(owner, note("N", Some(f.id))).await.unwrap();
        repo.soft_delete_note(owner, n.id).await.unwrap();

        repo.soft_delete_folder(owner, f.id).await.unwrap();
        repo.purge_folder(owner, f.id).await.unwrap();

        assert!(matches!(
            repo.get_folder(owner, f.id).await.unwrap_err(),
            StoreError::NotFound { .. }
        ));
        assert!(repo.get_folder(owner, child.id).await.unwrap().parent_id.is_none());

        let n = repo.get_note(owner, n.id).await.unwrap();
        assert!(n.folder_id.is_none());
        assert!(n.is_deleted);

        // Restoring the orphaned note lands it at the root
        let n = repo.restore_note(owner, n.id).await.unwrap();
        assert!(n.folder_id.is_none());
    }

    #[tokio::test]
    async fn test_favorite_and_tags_idempotent() {
        let repo = Repository::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let f = repo.create_folder(owner, folder("F", None)).await.unwrap();
        let once = repo.set_folder_favorite(owner, f.id, true).await.unwrap();
        let twice = repo.set_folder_favorite(owner, f.id, true).await.unwrap();
        assert!(twice.is_favorite);
        assert_eq!(once, twice);

        let once = repo.add_folder_tag(owner, f.id, "x").await.unwrap();
        let twice = repo.add_folder_tag(owner, f.id, "x").await.unwrap();
        assert_eq!(twice.tags.len(), 1);
        assert_eq!(once, twice);

        let before = repo.get_folder(owner, f.id).await.unwrap();
        let after = repo.remove_folder_tag(owner, f.id, "missing").await.unwrap();
        assert_eq!(before, after);

        let tagged = repo
            .set_folder_tags(owner, f.id, vec!["b".into(), "a".into(), "b".into()])
            .await
            .unwrap();
        assert_eq!(tagged.tags.as_slice(), &["b".to_string(), "a".to_string()]);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let repo = Repository::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let f = repo.create_folder(owner, folder("F", None)).await.unwrap();
        let a = repo.create_note(owner, note("a", Some(f.id))).await.unwrap();
        let b = repo.create_note(owner, note("b", None)).await.unwrap();
        repo.set_note_favorite(owner, b.id, true).await.unwrap();
        repo.add_note_tag(owner, a.id, "work").await.unwrap();

        let in_f = ItemFilter {
            scope: FolderScope::In(f.id),
            ..Default::default()
        };
        let notes = repo.list_notes(owner, &in_f).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].id, a.id);

        let root = ItemFilter {
            scope: FolderScope::Root,
            ..Default::default()
        };
        assert_eq!(repo.list_notes(owner, &root).await.unwrap()[0].id, b.id);

        let favs = ItemFilter {
            favorite: Some(true),
            ..Default::default()
        };
        assert_eq!(repo.list_notes(owner, &favs).await.unwrap()[0].id, b.id);

        let tagged = ItemFilter {
            tag: Some("work".to_string()),
            ..Default::default()
        };
        assert_eq!(repo.list_notes(owner, &tagged).await.unwrap()[0].id, a.id);

        assert_eq!(repo.list_folders(owner, &root).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_versions_create_list_restore() {
        let repo = Repository::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let n = repo.create_note(owner, note("Draft", None)).await.unwrap();
        let v1 = repo.create_version(owner, n.id).await.unwrap();
        assert_eq!(v1.content, n.content);

        // Same content: no duplicate snapshot
        let again = repo.create_version(owner, n.id).await.unwrap();
        assert_eq!(again.id, v1.id);
        assert_eq!(repo.list_versions(owner, n.id).await.unwrap().len(), 1);

        repo.update_note(
            owner,
            n.id,
            NotePatch {
                content: Some("<p>rewritten</p>".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let restored = repo.restore_version(owner, n.id, v1.id).await.unwrap();
        assert_eq!(restored.content, n.content);

        // The rewritten state was snapshotted before restoring
        let versions = repo.list_versions(owner, n.id).await.unwrap();
        assert_eq!(versions.len(), 2);
        assert_eq!(versions[0].content, "<p>rewritten</p>");

        let err = repo
            .restore_version(owner, n.id, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::VersionNotFound { .. }));

        let err = repo.purge_note(owner, n.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        repo.create_version(owner, n.id).await.unwrap();

        repo.soft_delete_note(owner, n.id).await.unwrap();
        let err = repo.create_version(owner, n.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        repo.purge_note(owner, n.id).await.unwrap();
        assert!(repo.store().list_versions(owner, n.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_users() {
        let repo = Repository::new(MemoryStore::new());

        let user = repo
            .create_user(NewUser {
                username: " Alice ".to_string(),
                password_hash: "hash".to_string(),
                name: Some("  ".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(user.username, "alice");
        assert!(user.name.is_none());
        assert_eq!(user.to_info().display_name(), "alice");

        let err = repo
            .create_user(NewUser {
                username: "ALICE".to_string(),
                password_hash: "other".to_string(),
                name: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        assert_eq!(repo.find_user("Alice").await.unwrap().unwrap().id, user.id);

        let updated = repo.set_password_hash(user.id, "new".to_string()).await.unwrap();
        assert_eq!(updated.password_hash, "new");
    }

    /// Wraps a MemoryStore: folder reads yield to the scheduler like a network
    /// round trip would, and writes can be switched to fail.
    #[derive(Clone, Default)]
    struct FlakyStore {
        inner: MemoryStore,
        fail_puts: Arc<AtomicBool>,
        fail_purges: Arc<AtomicBool>,
    }

    impl FlakyStore {
        fn check(flag: &AtomicBool) -> StoreResult<()> {
            if flag.load(Ordering::SeqCst) {
                return Err(StoreError::Backend("connection reset".to_string()));
            }
            Ok(())
        }
    }

    impl ItemStore for FlakyStore {
        async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
            self.inner.get_user(id).await
        }

        async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
            self.inner.get_user_by_username(username).await
        }

        async fn insert_user(&self, user: &User) -> StoreResult<()> {
            self.inner.insert_user(user).await
        }

        async fn update_user(&self, user: &User) -> StoreResult<()> {
            self.inner.update_user(user).await
        }

        async fn get_folder(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Option<Folder>> {
            let folder = self.inner.get_folder(owner_id, id).await;
            tokio::task::yield_now().await;
            folder
        }

        async fn list_folders(&self, owner_id: Uuid) -> StoreResult<Vec<Folder>> {
            self.inner.list_folders(owner_id).await
        }

        async fn put_folder(&self, folder: &Folder) -> StoreResult<()> {
            Self::check(&self.fail_puts)?;
            self.inner.put_folder(folder).await
        }

        async fn purge_folder(&self, owner_id: Uuid, id: Uuid, at: DateTime<Utc>) -> StoreResult<bool> {
            Self::check(&self.fail_purges)?;
            self.inner.purge_folder(owner_id, id, at).await
        }

        async fn get_note(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Option<Note>> {
            self.inner.get_note(owner_id, id).await
        }

        async fn list_notes(&self, owner_id: Uuid) -> StoreResult<Vec<Note>> {
            self.inner.list_notes(owner_id).await
        }

        async fn put_note(&self, note: &Note) -> StoreResult<()> {
            Self::check(&self.fail_puts)?;
            self.inner.put_note(note).await
        }

        async fn purge_note(&self, owner_id: Uuid, id: Uuid) -> StoreResult<bool> {
            Self::check(&self.fail_purges)?;
            self.inner.purge_note(owner_id, id).await
        }

        async fn list_versions(&self, owner_id: Uuid, note_id: Uuid) -> StoreResult<Vec<NoteVersion>> {
            self.inner.list_versions(owner_id, note_id).await
        }

        async fn put_version(&self, version: &NoteVersion) -> StoreResult<()> {
            self.inner.put_version(version).await
        }
    }

    #[tokio::test]
    async fn test_concurrent_moves_cannot_form_a_cycle() {
        let repo = Repository::new(FlakyStore::default());
        let owner = Uuid::new_v4();

        let a = repo.create_folder(owner, folder("A", None)).await.unwrap();
        let b = repo.create_folder(owner, folder("B", None)).await.unwrap();

        let (r1, r2) = tokio::join!(
            repo.update_folder(owner, a.id, move_under(Some(b.id))),
            repo.update_folder(owner, b.id, move_under(Some(a.id))),
        );
        assert!(r1.is_ok() != r2.is_ok(), "exactly one move may win");
        let loser = if r1.is_err() { r1 } else { r2 };
        assert!(matches!(loser.unwrap_err(), StoreError::Cycle { .. }));

        let a = repo.get_folder(owner, a.id).await.unwrap();
        let b = repo.get_folder(owner, b.id).await.unwrap();
        assert!(!(a.parent_id == Some(b.id) && b.parent_id == Some(a.id)));
    }

    #[tokio::test]
    async fn test_purge_folder_is_a_single_write() {
        let store = FlakyStore::default();
        let repo = Repository::new(store.clone());
        let owner = Uuid::new_v4();

        let f = repo.create_folder(owner, folder("F", None)).await.unwrap();
        let child = repo.create_folder(owner, folder("child", Some(f.id))).await.unwrap();
        let n1 = repo.create_note(owner, note("one", Some(f.id))).await.unwrap();
        let n2 = repo.create_note(owner, note("two", Some(f.id))).await.unwrap();
        repo.soft_delete_folder(owner, f.id).await.unwrap();

        // A failing purge leaves everything as it was
        store.fail_purges.store(true, Ordering::SeqCst);
        let err = repo.purge_folder(owner, f.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Backend(_)));
        assert!(repo.get_folder(owner, f.id).await.is_ok());
        assert_eq!(repo.get_folder(owner, child.id).await.unwrap().parent_id, Some(f.id));
        for id in [n1.id, n2.id] {
            assert_eq!(repo.get_note(owner, id).await.unwrap().folder_id, Some(f.id));
        }

        // Row-by-row writes are not needed to reparent
        store.fail_purges.store(false, Ordering::SeqCst);
        store.fail_puts.store(true, Ordering::SeqCst);
        repo.purge_folder(owner, f.id).await.unwrap();
        assert!(repo.get_folder(owner, f.id).await.is_err());
        assert!(repo.get_folder(owner, child.id).await.unwrap().parent_id.is_none());
        for id in [n1.id, n2.id] {
            assert!(repo.get_note(owner, id).await.unwrap().folder_id.is_none());
        }
    }

    #[tokio::test]
    async fn test_failed_note_purge_keeps_versions() {
        let store = FlakyStore::default();
        let repo = Repository::new(store.clone());
        let owner = Uuid::new_v4();

        let n = repo.create_note(owner, note("N", None)).await.unwrap();
        repo.create_version(owner, n.id).await.unwrap();
        repo.soft_delete_note(owner, n.id).await.unwrap();

        store.fail_purges.store(true, Ordering::SeqCst);
        assert!(repo.purge_note(owner, n.id).await.is_err());
        assert!(repo.get_note(owner, n.id).await.is_ok());
        assert_eq!(repo.list_versions(owner, n.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_purge_requires_trash() {
        let repo = Repository::new(MemoryStore::new());
        let owner = Uuid::new_v4();

        let f = repo.create_folder(owner, folder("F", None)).await.unwrap();
        let n = repo.create_note(owner, note("N", None)).await.unwrap();

        let err = repo.purge_folder(owner, f.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let err = repo.purge_note(owner, n.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        assert!(repo.get_folder(owner, f.id).await.is_ok());
        assert!(repo.get_note(owner, n.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_username_length_counts_characters() {
        let repo = Repository::new(MemoryStore::new());
        let user = |username: String| NewUser {
            username,
            password_hash: "hash".to_string(),
            name: None,
        };

        // 3 characters, 6 bytes
        assert!(repo.create_user(user("äöü".to_string())).await.is_ok());
        // 64 characters, 128 bytes
        assert!(repo.create_user(user("é".repeat(64))).await.is_ok());
        let err = repo.create_user(user("é".repeat(65))).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        let err = repo.create_user(user("ab".to_string())).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }
}
