//! [`UserRepository`] over the SQLite [`Db`].

use std::sync::Arc;

use async_trait::async_trait;
use liff_core::{PersistedUser, StoreError, StoreResult, UserRecord, UserRepository};
use parking_lot::Mutex;

use crate::db::Db;

pub struct SqliteUserRepository {
    db: Arc<Mutex<Db>>,
}

impl SqliteUserRepository {
    pub fn new(db: Db) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
        }
    }

    /// Shared handle to the underlying database.
    pub fn db(&self) -> Arc<Mutex<Db>> {
        Arc::clone(&self.db)
    }
}

fn backend(e: rusqlite::Error) -> StoreError {
    tracing::error!("user store query failed: {e}");
    StoreError::Backend(e.to_string())
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find_by_user_id(&self, user_id: &str) -> StoreResult<Option<PersistedUser>> {
        self.db.lock().get_user(user_id).map_err(backend)
    }

    async fn save(&self, record: &UserRecord) -> StoreResult<PersistedUser> {
        record.validate()?;
        self.db
            .lock()
            .upsert_user(record, chrono::Utc::now())
            .map_err(backend)
    }

    async fn find_by_friendship(&self, is_friend: bool) -> StoreResult<Vec<PersistedUser>> {
        self.db.lock().users_by_friendship(is_friend).map_err(backend)
    }

    async fn delete(&self, user_id: &str) -> StoreResult<bool> {
        self.db.lock().delete_user(user_id).map_err(backend)
    }
}
