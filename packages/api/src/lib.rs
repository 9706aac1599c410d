//! # API crate: the HTTP surface of the notes server
//!
//! Everything the `server` binary mounts lives here: the axum routes, session
//! persistence, password auth, the Postgres item store and configuration. The
//! hierarchy rules themselves live in the `store` crate; handlers only translate
//! between HTTP and [`store::Repository`].
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`auth`] | Argon2id password hashing, session keys, the [`auth::CurrentUser`] extractor |
//! | [`config`] | `notes.toml` + environment configuration |
//! | [`db`] | PostgreSQL pool, migrations, [`db::PgStore`], the [`db::Backend`] switch |
//! | [`error`] | [`error::ApiError`] and its status-code mapping |
//! | [`extract`] | `Json` / `Path` / `Query` extractors that reject with [`error::ApiError`] |
//! | [`routes`] | REST handlers for auth, folders, notes, tags, favorites, trash and versions |
//! | [`sessions`] | File-backed `tower-sessions` store and the [`sessions::SessionBackend`] switch |
//!
//! ## Request lifecycle
//!
//! [`app`] wraps the routes in a `SessionManagerLayer` (cookie `id`, `SameSite=Lax`,
//! inactivity expiry) and a `TraceLayer`. Handlers that need a user take
//! [`auth::CurrentUser`], which turns a missing or expired session into a 401.

use axum::Router;
use store::Repository;
use tower_http::trace::TraceLayer;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod routes;
pub mod sessions;

pub use config::ServerConfig;
pub use db::Backend;
pub use error::{ApiError, ApiResult};

/// Shared state handed to every handler.
#[derive(Clone, Debug)]
pub struct AppState {
    pub repo: Repository<Backend>,
}

impl AppState {
    pub fn new(backend: Backend) -> Self {
        Self {
            repo: Repository::new(backend),
        }
    }
}

/// Build the full application router.
pub fn app<S>(state: AppState, session_store: S, config: &ServerConfig) -> Router
where
    S: SessionStore + Clone,
{
    let session_layer = SessionManagerLayer::new(session_store)
        .with_secure(config.secure_cookies)
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(config.session.inactivity()));

    routes::router()
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http())
}
