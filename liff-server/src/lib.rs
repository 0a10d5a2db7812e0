//! User store backing LIFF profile write-through.
//!
//! Serves the SQLite-backed [`SqliteUserRepository`](repository::SqliteUserRepository)
//! over HTTP so a session's `RemoteUserRepository` can upsert the profile it
//! fetched, plus the two front-end actions (save profile, update friendship).

pub mod actions;
pub mod config;
pub mod db;
pub mod repository;
pub mod user;
pub mod web;

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use crate::config::ServerConfig;
use crate::db::Db;
use crate::repository::SqliteUserRepository;
use crate::web::AppState;

/// Open the store and serve until the listener fails.
pub async fn run(config: ServerConfig) -> anyhow::Result<()> {
    let db = match config.db_path {
        Some(ref path) => {
            tracing::info!("Opening user store at {path}");
            Db::open(path).with_context(|| format!("opening database {path}"))?
        }
        None => {
            tracing::warn!("No --db-path given, users are kept in memory only");
            Db::open_memory()?
        }
    };
    let repository = Arc::new(SqliteUserRepository::new(db));
    let router = web::router(AppState::new(repository), &config.cors_origins);

    let listener = TcpListener::bind(&config.listen_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!("HTTP listener on {addr}");
    axum::serve(listener, router).await?;
    Ok(())
}
