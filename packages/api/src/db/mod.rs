//! # Database module: PostgreSQL pool, migrations and the item store backends
//!
//! ## Design
//!
//! The pool is owned by the server's [`crate::AppState`] rather than a
//! process-wide singleton: [`connect`] opens it (up to 5 connections) and the
//! binary hands it to [`PgStore`] and, when configured, to the Postgres session
//! store.
//!
//! ## Re-exports
//!
//! - [`connect`] / [`migrate`]: open the pool, apply `migrations/`.
//! - [`PgStore`]: `sqlx` implementation of [`store::ItemStore`].
//! - [`Backend`]: Postgres or in-memory, picked from configuration.

mod backend;
mod pool;
mod postgres;

pub use backend::Backend;
pub use pool::{connect, migrate};
pub use postgres::PgStore;
