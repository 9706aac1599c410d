use anyhow::Context;
use api::config::SessionBackendKind;
use api::sessions::{FileSessionStore, SessionBackend};
use api::{AppState, Backend, ServerConfig};
use store::MemoryStore;
use tower_sessions::ExpiredDeletion;
use tower_sessions_sqlx_store::PostgresStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn")),
        )
        .init();

    let config = ServerConfig::load().context("Failed to load configuration")?;

    let pool = match &config.database_url {
        Some(url) => {
            let pool = api::db::connect(url)
                .await
                .context("Failed to connect to database")?;
            api::db::migrate(&pool)
                .await
                .context("Failed to run migrations")?;
            Some(pool)
        }
        None => None,
    };

    let backend = match &pool {
        Some(pool) => Backend::Postgres(api::db::PgStore::new(pool.clone())),
        None => {
            tracing::warn!("DATABASE_URL not set, items are kept in memory only");
            Backend::Memory(MemoryStore::new())
        }
    };

    let sessions = match config.session.backend {
        SessionBackendKind::File => {
            let store =
                FileSessionStore::open(&config.session.file, config.session.fallback_ttl()).await;
            tracing::info!(
                "Using file session store at {} ({} sessions)",
                config.session.file.display(),
                store.len().await
            );
            SessionBackend::File(store)
        }
        SessionBackendKind::Postgres => {
            let pool = pool
                .clone()
                .context("The postgres session backend needs DATABASE_URL")?;
            let store = PostgresStore::new(pool);
            store
                .migrate()
                .await
                .context("Failed to migrate session table")?;
            SessionBackend::Postgres(store)
        }
    };

    if let Some(period) = config.session.sweep_interval() {
        let sweeper = sessions.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                if let Err(e) = sweeper.delete_expired().await {
                    tracing::warn!("Failed to sweep expired sessions: {}", e);
                }
            }
        });
    }

    let router = api::app(AppState::new(backend), sessions, &config);

    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
}
