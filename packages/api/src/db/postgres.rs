//! # PostgreSQL item store
//!
//! [`PgStore`] implements [`ItemStore`] with runtime-checked `sqlx` queries
//! against the tables created by `migrations/`. Every folder, note and version
//! query filters on `owner_id`, which is how another owner's rows stay invisible.
//! The multi-row purges run inside a single transaction.
//!
//! Rows are loaded into `*Row` structs deriving [`FromRow`] and converted into
//! the `store` models; the only real conversion is `TEXT[]` → [`Tags`].

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use store::{Folder, ItemStore, Note, NoteVersion, StoreError, StoreResult, Tags, User};
use uuid::Uuid;

#[derive(Clone, Debug)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    username: String,
    password: String,
    name: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(r: UserRow) -> Self {
        User {
            id: r.id,
            username: r.username,
            password_hash: r.password,
            name: r.name,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct FolderRow {
    id: Uuid,
    owner_id: Uuid,
    name: String,
    parent_id: Option<Uuid>,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    is_favorite: bool,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FolderRow> for Folder {
    fn from(r: FolderRow) -> Self {
        Folder {
            id: r.id,
            owner_id: r.owner_id,
            name: r.name,
            parent_id: r.parent_id,
            is_deleted: r.is_deleted,
            deleted_at: r.deleted_at,
            is_favorite: r.is_favorite,
            tags: Tags::from(r.tags),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct NoteRow {
    id: Uuid,
    owner_id: Uuid,
    folder_id: Option<Uuid>,
    title: String,
    content: String,
    is_deleted: bool,
    deleted_at: Option<DateTime<Utc>>,
    is_favorite: bool,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<NoteRow> for Note {
    fn from(r: NoteRow) -> Self {
        Note {
            id: r.id,
            owner_id: r.owner_id,
            folder_id: r.folder_id,
            title: r.title,
            content: r.content,
            is_deleted: r.is_deleted,
            deleted_at: r.deleted_at,
            is_favorite: r.is_favorite,
            tags: Tags::from(r.tags),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct VersionRow {
    id: Uuid,
    note_id: Uuid,
    owner_id: Uuid,
    title: String,
    content: String,
    content_sha: String,
    created_at: DateTime<Utc>,
}

impl From<VersionRow> for NoteVersion {
    fn from(r: VersionRow) -> Self {
        NoteVersion {
            id: r.id,
            note_id: r.note_id,
            owner_id: r.owner_id,
            title: r.title,
            content: r.content,
            content_sha: r.content_sha,
            created_at: r.created_at,
        }
    }
}

impl ItemStore for PgStore {
    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.map(User::from))
    }

    async fn get_user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        Ok(row.map(User::from))
    }

    async fn insert_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO users (id, username, password, name, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id)
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(user.created_at)
        .bind(user.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict(
                "An account with this username already exists".to_string(),
            ),
            e => backend(e),
        })?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> StoreResult<()> {
        sqlx::query("UPDATE users SET password = $2, name = $3, updated_at = $4 WHERE id = $1")
            .bind(user.id)
            .bind(&user.password_hash)
            .bind(&user.name)
            .bind(user.updated_at)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn get_folder(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Option<Folder>> {
        let row: Option<FolderRow> =
            sqlx::query_as("SELECT * FROM folders WHERE id = $1 AND owner_id = $2")
                .bind(id)
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        Ok(row.map(Folder::from))
    }

    async fn list_folders(&self, owner_id: Uuid) -> StoreResult<Vec<Folder>> {
        let rows: Vec<FolderRow> = sqlx::query_as("SELECT * FROM folders WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(Folder::from).collect())
    }

    async fn put_folder(&self, folder: &Folder) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO folders (id, owner_id, name, parent_id, is_deleted, deleted_at, is_favorite, tags, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
             ON CONFLICT (id) DO UPDATE SET
                name = $3,
                parent_id = $4,
                is_deleted = $5,
                deleted_at = $6,
                is_favorite = $7,
                tags = $8,
                updated_at = $10
             WHERE folders.owner_id = $2",
        )
        .bind(folder.id)
        .bind(folder.owner_id)
        .bind(&folder.name)
        .bind(folder.parent_id)
        .bind(folder.is_deleted)
        .bind(folder.deleted_at)
        .bind(folder.is_favorite)
        .bind(folder.tags.as_slice())
        .bind(folder.created_at)
        .bind(folder.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn purge_folder(&self, owner_id: Uuid, id: Uuid, updated_at: DateTime<Utc>) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let deleted = sqlx::query("DELETE FROM folders WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if deleted.rows_affected() == 0 {
            // Dropping the transaction rolls it back.
            return Ok(false);
        }

        sqlx::query(
            "UPDATE folders SET parent_id = NULL, updated_at = $3 WHERE owner_id = $1 AND parent_id = $2",
        )
        .bind(owner_id)
        .bind(id)
        .bind(updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        sqlx::query(
            "UPDATE notes SET folder_id = NULL, updated_at = $3 WHERE owner_id = $1 AND folder_id = $2",
        )
        .bind(owner_id)
        .bind(id)
        .bind(updated_at)
        .execute(&mut *tx)
        .await
        .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(true)
    }

    async fn get_note(&self, owner_id: Uuid, id: Uuid) -> StoreResult<Option<Note>> {
        let row: Option<NoteRow> =
            sqlx::query_as("SELECT * FROM notes WHERE id = $1 AND owner_id = $2")
                .bind(id)
                .bind(owner_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;
        Ok(row.map(Note::from))
    }

    async fn list_notes(&self, owner_id: Uuid) -> StoreResult<Vec<Note>> {
        let rows: Vec<NoteRow> = sqlx::query_as("SELECT * FROM notes WHERE owner_id = $1")
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(Note::from).collect())
    }

    async fn put_note(&self, note: &Note) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO notes (id, owner_id, folder_id, title, content, is_deleted, deleted_at, is_favorite, tags, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
             ON CONFLICT (id) DO UPDATE SET
                folder_id = $3,
                title = $4,
                content = $5,
                is_deleted = $6,
                deleted_at = $7,
                is_favorite = $8,
                tags = $9,
                updated_at = $11
             WHERE notes.owner_id = $2",
        )
        .bind(note.id)
        .bind(note.owner_id)
        .bind(note.folder_id)
        .bind(&note.title)
        .bind(&note.content)
        .bind(note.is_deleted)
        .bind(note.deleted_at)
        .bind(note.is_favorite)
        .bind(note.tags.as_slice())
        .bind(note.created_at)
        .bind(note.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn purge_note(&self, owner_id: Uuid, id: Uuid) -> StoreResult<bool> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        let deleted = sqlx::query("DELETE FROM notes WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;
        if deleted.rows_affected() == 0 {
            return Ok(false);
        }

        sqlx::query("DELETE FROM note_versions WHERE note_id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        tx.commit().await.map_err(backend)?;
        Ok(true)
    }

    async fn list_versions(&self, owner_id: Uuid, note_id: Uuid) -> StoreResult<Vec<NoteVersion>> {
        let rows: Vec<VersionRow> = sqlx::query_as(
            "SELECT * FROM note_versions WHERE note_id = $1 AND owner_id = $2 ORDER BY created_at DESC",
        )
        .bind(note_id)
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;
        Ok(rows.into_iter().map(NoteVersion::from).collect())
    }

    async fn put_version(&self, version: &NoteVersion) -> StoreResult<()> {
        sqlx::query(
            "INSERT INTO note_versions (id, note_id, owner_id, title, content, content_sha, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(version.id)
        .bind(version.note_id)
        .bind(version.owner_id)
        .bind(&version.title)
        .bind(&version.content)
        .bind(&version.content_sha)
        .bind(version.created_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}
