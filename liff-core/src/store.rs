//! User persistence contract.
//!
//! A [`UserRepository`] stores one [`PersistedUser`] per LINE `user_id`. Every
//! write is an upsert: the first save creates the record, later saves
//! overwrite the profile fields and the friendship flag (last write wins).
//! Saving the same data twice changes nothing, `updated_at` included.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use liff_sdk::{Friendship, Profile};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// The write payload of an upsert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub user_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// `None` when the friendship flag is unknown; the stored flag is kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_friend: Option<bool>,
}

impl UserRecord {
    pub fn from_profile(profile: &Profile, friendship: Option<Friendship>) -> Self {
        Self {
            user_id: profile.user_id().to_string(),
            display_name: profile.display_name().to_string(),
            picture_url: profile.picture_url().map(str::to_string),
            status_message: profile.status_message().map(str::to_string),
            is_friend: friendship.map(|f| f.is_friend),
        }
    }

    pub fn validate(&self) -> StoreResult<()> {
        if self.user_id.trim().is_empty() {
            return Err(StoreError::Invalid("user_id is required".into()));
        }
        if self.display_name.trim().is_empty() {
            return Err(StoreError::Invalid("display_name is required".into()));
        }
        Ok(())
    }
}

/// A stored user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedUser {
    pub user_id: String,
    pub display_name: String,
    pub picture_url: Option<String>,
    pub status_message: Option<String>,
    pub is_friend: Option<bool>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedUser {
    pub fn create(record: &UserRecord, now: DateTime<Utc>) -> Self {
        Self {
            user_id: record.user_id.clone(),
            display_name: record.display_name.clone(),
            picture_url: record.picture_url.clone(),
            status_message: record.status_message.clone(),
            is_friend: record.is_friend,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply an upsert to an existing record. Returns whether anything changed;
    /// `updated_at` only moves when it did.
    pub fn merge(&mut self, record: &UserRecord, now: DateTime<Utc>) -> bool {
        let is_friend = record.is_friend.or(self.is_friend);
        let changed = self.display_name != record.display_name
            || self.picture_url != record.picture_url
            || self.status_message != record.status_message
            || self.is_friend != is_friend;
        if changed {
            self.display_name = record.display_name.clone();
            self.picture_url = record.picture_url.clone();
            self.status_message = record.status_message.clone();
            self.is_friend = is_friend;
            self.updated_at = now;
        }
        changed
    }
}

/// Why a save did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// The payload or the session state was not acceptable.
    Invalid,
    /// The user the operation refers to does not exist.
    NotFound,
    /// The store could not be reached or failed.
    Unavailable,
}

impl From<&StoreError> for FailureReason {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::Invalid(_) => FailureReason::Invalid,
            StoreError::Rejected { status: 404, .. } => FailureReason::NotFound,
            StoreError::Rejected { status, .. } if (400..500).contains(status) => {
                FailureReason::Invalid
            }
            _ => FailureReason::Unavailable,
        }
    }
}

/// Result of an explicit save, shaped for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistOutcome {
    pub success: bool,
    pub user_id: Option<String>,
    pub message: String,
    /// Set on failures only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<FailureReason>,
}

impl PersistOutcome {
    pub fn saved(user_id: impl Into<String>) -> Self {
        Self::succeeded(user_id, "profile saved")
    }

    pub fn succeeded(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            user_id: Some(user_id.into()),
            message: message.into(),
            reason: None,
        }
    }

    pub fn failed(reason: FailureReason, message: impl Into<String>) -> Self {
        Self {
            success: false,
            user_id: None,
            message: message.into(),
            reason: Some(reason),
        }
    }

    pub fn from_error(err: &StoreError) -> Self {
        Self::failed(err.into(), err.to_string())
    }
}

/// Durable user store keyed by `user_id`.
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    async fn find_by_user_id(&self, user_id: &str) -> StoreResult<Option<PersistedUser>>;

    /// Upsert. Safe under concurrent writes for the same key.
    async fn save(&self, record: &UserRecord) -> StoreResult<PersistedUser>;

    async fn find_by_friendship(&self, is_friend: bool) -> StoreResult<Vec<PersistedUser>>;

    /// Administrative removal. Returns whether a record existed.
    async fn delete(&self, user_id: &str) -> StoreResult<bool>;
}

/// In-process repository, used when no backend is configured and in tests.
#[derive(Debug, Default)]
pub struct MemoryUserRepository {
    users: Mutex<BTreeMap<String, PersistedUser>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.lock().is_empty()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn find_by_user_id(&self, user_id: &str) -> StoreResult<Option<PersistedUser>> {
        Ok(self.users.lock().get(user_id).cloned())
    }

    async fn save(&self, record: &UserRecord) -> StoreResult<PersistedUser> {
        record.validate()?;
        let now = Utc::now();
        let mut users = self.users.lock();
        let user = users
            .entry(record.user_id.clone())
            .and_modify(|existing| {
                existing.merge(record, now);
            })
            .or_insert_with(|| PersistedUser::create(record, now));
        Ok(user.clone())
    }

    async fn find_by_friendship(&self, is_friend: bool) -> StoreResult<Vec<PersistedUser>> {
        Ok(self
            .users
            .lock()
            .values()
            .filter(|u| u.is_friend == Some(is_friend))
            .cloned()
            .collect())
    }

    async fn delete(&self, user_id: &str) -> StoreResult<bool> {
        Ok(self.users.lock().remove(user_id).is_some())
    }
}
