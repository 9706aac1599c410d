//! # File-backed session store
//!
//! [`FileSessionStore`] keeps every session record in one JSON document on disk:
//!
//! ```text
//! {
//!   "<session id>": {
//!     "payload": { "cookie": { "expires": "...", "max_age_ms": 604800000 }, "data": { "user_id": "..." } },
//!     "expires_at": 1767225600000
//!   }
//! }
//! ```
//!
//! The whole map is held in memory behind a [`tokio::sync::Mutex`] and every
//! mutation rewrites the full snapshot while the lock is held, so concurrent
//! requests can't interleave their read-modify-write. Snapshots are written to
//! a `.tmp` sibling and renamed into place.
//!
//! Persistence problems never fail a request: an unreadable file at startup
//! means starting empty, and a failed write is logged and dropped. Use
//! [`FileSessionStore::flush`] where the caller wants the error.
//!
//! The store speaks two dialects: the plain [`get`](FileSessionStore::get) /
//! [`set`](FileSessionStore::set) / [`destroy`](FileSessionStore::destroy) /
//! [`touch`](FileSessionStore::touch) API over [`SessionPayload`], and
//! [`tower_sessions::SessionStore`] over [`Record`] for the session layer.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};
use tokio::sync::Mutex;
use tower_sessions::session::{Id, Record};
use tower_sessions::session_store::{self, ExpiredDeletion, SessionStore};

/// Default lifetime of a record whose cookie carries no expiry information.
pub const DEFAULT_FALLBACK_TTL: Duration = Duration::hours(24);

/// Expiry information carried by the session cookie.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CookieMeta {
    /// Absolute expiry date
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires: Option<OffsetDateTime>,
    /// Lifetime in milliseconds, counted from the write
    #[serde(default)]
    pub max_age_ms: Option<i64>,
}

/// What a caller stores under a session id.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    #[serde(default)]
    pub cookie: CookieMeta,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct StoredSession {
    payload: SessionPayload,
    /// Epoch milliseconds
    expires_at: i64,
}

impl StoredSession {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expires_at <= now_ms
    }
}

type Snapshot = HashMap<String, StoredSession>;

#[derive(Debug)]
struct Inner {
    path: PathBuf,
    fallback_ttl: Duration,
    sessions: Mutex<Snapshot>,
}

/// Session records persisted as a single JSON file.
#[derive(Clone, Debug)]
pub struct FileSessionStore {
    inner: Arc<Inner>,
}

fn epoch_ms(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000_000) as i64
}

fn now_ms() -> i64 {
    epoch_ms(OffsetDateTime::now_utc())
}

impl FileSessionStore {
    /// Open the store at `path`, loading whatever snapshot is there.
    pub async fn open(path: impl Into<PathBuf>, fallback_ttl: Duration) -> Self {
        let path = path.into();
        let sessions = load_snapshot(&path).await;
        tracing::info!("Loaded {} session(s) from {}", sessions.len(), path.display());
        Self {
            inner: Arc::new(Inner {
                path,
                fallback_ttl,
                sessions: Mutex::new(sessions),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Expiry for a payload: the cookie's absolute date, else its max-age from
    /// `now`, else the fallback window.
    pub fn compute_expiry(&self, cookie: &CookieMeta, now: OffsetDateTime) -> i64 {
        if let Some(expires) = cookie.expires {
            return epoch_ms(expires);
        }
        if let Some(max_age_ms) = cookie.max_age_ms {
            return epoch_ms(now).saturating_add(max_age_ms);
        }
        epoch_ms(now.saturating_add(self.inner.fallback_ttl))
    }

    /// The payload under `session_id`, if present and unexpired. An expired
    /// record is destroyed on the way out.
    pub async fn get(&self, session_id: &str) -> Option<SessionPayload> {
        let mut sessions = self.inner.sessions.lock().await;
        let expired = match sessions.get(session_id) {
            None => return None,
            Some(s) => s.is_expired(now_ms()),
        };
        if expired {
            sessions.remove(session_id);
            self.persist(&sessions).await;
            return None;
        }
        sessions.get(session_id).map(|s| s.payload.clone())
    }

    pub async fn set(&self, session_id: &str, payload: SessionPayload) {
        let expires_at = self.compute_expiry(&payload.cookie, OffsetDateTime::now_utc());
        let mut sessions = self.inner.sessions.lock().await;
        sessions.insert(
            session_id.to_string(),
            StoredSession {
                payload,
                expires_at,
            },
        );
        self.persist(&sessions).await;
    }

    pub async fn destroy(&self, session_id: &str) {
        let mut sessions = self.inner.sessions.lock().await;
        if sessions.remove(session_id).is_some() {
            self.persist(&sessions).await;
        }
    }

    /// Replace the payload of an existing record and recompute its expiry.
    /// An unknown id is ignored rather than created.
    pub async fn touch(&self, session_id: &str, payload: SessionPayload) {
        let expires_at = self.compute_expiry(&payload.cookie, OffsetDateTime::now_utc());
        let mut sessions = self.inner.sessions.lock().await;
        let Some(stored) = sessions.get_mut(session_id) else {
            return;
        };
        stored.payload = payload;
        stored.expires_at = expires_at;
        self.persist(&sessions).await;
    }

    /// Drop every expired record. Returns how many were removed.
    pub async fn clear_expired(&self) -> usize {
        let now = now_ms();
        let mut sessions = self.inner.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired(now));
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::debug!("Removed {} expired session(s)", removed);
            self.persist(&sessions).await;
        }
        removed
    }

    /// Expiry timestamp (epoch ms) of a record, expired or not.
    pub async fn expires_at(&self, session_id: &str) -> Option<i64> {
        self.inner
            .sessions
            .lock()
            .await
            .get(session_id)
            .map(|s| s.expires_at)
    }

    pub async fn len(&self) -> usize {
        self.inner.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Write the current snapshot, reporting failure to the caller.
    pub async fn flush(&self) -> std::io::Result<()> {
        let sessions = self.inner.sessions.lock().await;
        write_snapshot(&self.inner.path, &sessions).await
    }

    async fn persist(&self, sessions: &Snapshot) {
        if let Err(e) = write_snapshot(&self.inner.path, sessions).await {
            tracing::error!(
                "Failed to write session store {}: {}",
                self.inner.path.display(),
                e
            );
        }
    }
}

async fn load_snapshot(path: &Path) -> Snapshot {
    let raw = match tokio::fs::read(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Snapshot::new(),
        Err(e) => {
            tracing::warn!("Failed to read session store {}: {}; starting empty", path.display(), e);
            return Snapshot::new();
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(sessions) => sessions,
        Err(e) => {
            tracing::warn!("Corrupt session store {}: {}; starting empty", path.display(), e);
            Snapshot::new()
        }
    }
}

async fn write_snapshot(path: &Path, sessions: &Snapshot) -> std::io::Result<()> {
    let json = serde_json::to_vec(sessions)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await
}

fn payload_from_record(record: &Record) -> SessionPayload {
    SessionPayload {
        cookie: CookieMeta {
            expires: Some(record.expiry_date),
            max_age_ms: None,
        },
        data: record.data.clone(),
    }
}

fn record_from_payload(id: Id, payload: SessionPayload, expires_at: i64) -> session_store::Result<Record> {
    let expiry_date = OffsetDateTime::from_unix_timestamp_nanos(expires_at as i128 * 1_000_000)
        .map_err(|e| session_store::Error::Decode(e.to_string()))?;
    Ok(Record {
        id,
        data: payload.data,
        expiry_date,
    })
}

#[async_trait]
impl SessionStore for FileSessionStore {
    async fn create(&self, record: &mut Record) -> session_store::Result<()> {
        let mut sessions = self.inner.sessions.lock().await;
        while sessions.contains_key(&record.id.to_string()) {
            record.id = Id::default();
        }
        let payload = payload_from_record(record);
        let expires_at = self.compute_expiry(&payload.cookie, OffsetDateTime::now_utc());
        sessions.insert(
            record.id.to_string(),
            StoredSession {
                payload,
                expires_at,
            },
        );
        self.persist(&sessions).await;
        Ok(())
    }

    async fn save(&self, record: &Record) -> session_store::Result<()> {
        self.set(&record.id.to_string(), payload_from_record(record))
            .await;
        Ok(())
    }

    async fn load(&self, session_id: &Id) -> session_store::Result<Option<Record>> {
        let key = session_id.to_string();
        let Some(payload) = self.get(&key).await else {
            return Ok(None);
        };
        let expires_at = self
            .expires_at(&key)
            .await
            .unwrap_or_else(|| self.compute_expiry(&payload.cookie, OffsetDateTime::now_utc()));
        record_from_payload(*session_id, payload, expires_at).map(Some)
    }

    async fn delete(&self, session_id: &Id) -> session_store::Result<()> {
        self.destroy(&session_id.to_string()).await;
        Ok(())
    }
}

#[async_trait]
impl ExpiredDeletion for FileSessionStore {
    async fn delete_expired(&self) -> session_store::Result<()> {
        self.clear_expired().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(user: &str, cookie: CookieMeta) -> SessionPayload {
        let mut data = HashMap::new();
        data.insert("user_id".to_string(), json!(user));
        SessionPayload { cookie, data }
    }

    fn expires_in(d: Duration) -> CookieMeta {
        CookieMeta {
            expires: Some(OffsetDateTime::now_utc() + d),
            max_age_ms: None,
        }
    }

    async fn open_in(dir: &tempfile::TempDir) -> FileSessionStore {
        FileSessionStore::open(dir.path().join("sessions.json"), DEFAULT_FALLBACK_TTL).await
    }

    #[tokio::test]
    async fn test_get_after_set_returns_payload() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;

        let p = payload("u1", expires_in(Duration::hours(1)));
        store.set("sid", p.clone()).await;
        assert_eq!(store.get("sid").await, Some(p));
        assert_eq!(store.get("other").await, None);
    }

    #[tokio::test]
    async fn test_expired_get_destroys_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;

        store
            .set("old", payload("u1", expires_in(Duration::seconds(-5))))
            .await;
        assert_eq!(store.len().await, 1);

        assert_eq!(store.get("old").await, None);
        assert!(store.is_empty().await);

        // Removal was persisted too
        let reopened = open_in(&dir).await;
        assert!(reopened.is_empty().await);
    }

    #[tokio::test]
    async fn test_expiry_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileSessionStore::open(dir.path().join("s.json"), Duration::minutes(10)).await;
        let now = OffsetDateTime::now_utc();

        let absolute = now + Duration::days(3);
        let both = CookieMeta {
            expires: Some(absolute),
            max_age_ms: Some(1_000),
        };
        assert_eq!(store.compute_expiry(&both, now), epoch_ms(absolute));

        let max_age = CookieMeta {
            expires: None,
            max_age_ms: Some(60_000),
        };
        assert_eq!(store.compute_expiry(&max_age, now), epoch_ms(now) + 60_000);

        let fallback = store.compute_expiry(&CookieMeta::default(), now);
        assert_eq!(fallback, epoch_ms(now) + 10 * 60 * 1000);
    }

    #[tokio::test]
    async fn test_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let p = payload("u1", expires_in(Duration::hours(1)));
        {
            let store = open_in(&dir).await;
            store.set("a", p.clone()).await;
            store.set("b", payload("u2", CookieMeta::default())).await;
            store.destroy("b").await;
        }

        let store = open_in(&dir).await;
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get("a").await, Some(p));
    }

    #[tokio::test]
    async fn test_corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sessions.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = FileSessionStore::open(&path, DEFAULT_FALLBACK_TTL).await;
        assert!(store.is_empty().await);

        // And it recovers on the next write
        store.set("sid", payload("u1", CookieMeta::default())).await;
        assert_eq!(open_in(&dir).await.len().await, 1);
    }

    #[tokio::test]
    async fn test_write_failure_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        // The parent "directory" is a plain file, so every write fails
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, b"").unwrap();
        let store = FileSessionStore::open(blocker.join("sessions.json"), DEFAULT_FALLBACK_TTL).await;

        store.set("sid", payload("u1", CookieMeta::default())).await;
        assert!(store.get("sid").await.is_some());
        assert!(store.flush().await.is_err());
    }

    #[tokio::test]
    async fn test_touch_replaces_existing_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;

        store.set("sid", payload("u1", expires_in(Duration::minutes(1)))).await;
        let before = store.expires_at("sid").await.unwrap();

        let refreshed = payload("u2", expires_in(Duration::hours(2)));
        store.touch("sid", refreshed.clone()).await;
        let after = store.expires_at("sid").await.unwrap();
        assert!(after > before);
        assert_eq!(store.get("sid").await.unwrap(), refreshed);

        // Survives a restart like any other write
        let reopened = open_in(&dir).await;
        assert_eq!(reopened.get("sid").await.unwrap(), refreshed);

        store.touch("missing", refreshed).await;
        assert_eq!(store.len().await, 1);
        assert!(store.get("missing").await.is_none());
    }

    #[tokio::test]
    async fn test_clear_expired() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;

        store.set("live", payload("u1", expires_in(Duration::hours(1)))).await;
        store.set("dead1", payload("u2", expires_in(Duration::seconds(-1)))).await;
        store.set("dead2", payload("u3", expires_in(Duration::seconds(-1)))).await;

        assert_eq!(store.clear_expired().await, 2);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.clear_expired().await, 0);
    }

    #[tokio::test]
    async fn test_session_store_trait_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;

        let mut data = HashMap::new();
        data.insert("user_id".to_string(), json!("abc"));
        let mut record = Record {
            id: Id::default(),
            data,
            expiry_date: OffsetDateTime::now_utc() + Duration::hours(1),
        };
        store.create(&mut record).await.unwrap();

        let loaded = store.load(&record.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, record.id);
        assert_eq!(loaded.data, record.data);
        assert_eq!(
            epoch_ms(loaded.expiry_date),
            epoch_ms(record.expiry_date)
        );

        store.delete(&record.id).await.unwrap();
        assert!(store.load(&record.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_writers_keep_every_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = open_in(&dir).await;

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set(&format!("sid{}", i), payload("u", CookieMeta::default()))
                    .await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(open_in(&dir).await.len().await, 16);
    }
}
