//! Server actions called by the LIFF front end.
//!
//! Actions never return an error to the caller; failures come back as an
//! [`ActionResult`] with `success: false` and a message.

use liff_core::{
    FailureReason, PersistOutcome, PersistedUser, StoreResult, UserRecord, UserRepository,
};
use serde::{Deserialize, Serialize};

use crate::user::{UserAggregate, UserEvent};

/// `{success, user_id, message}` as returned by every action.
pub type ActionResult = PersistOutcome;

#[derive(Debug, Clone, Deserialize)]
pub struct SaveUserProfileCommand {
    pub user_id: String,
    pub display_name: String,
    #[serde(default)]
    pub picture_url: Option<String>,
    #[serde(default)]
    pub status_message: Option<String>,
    #[serde(default)]
    pub is_friend: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateFriendshipCommand {
    pub user_id: String,
    pub is_friend: bool,
}

/// Friendship flag as stored; `is_friend` is `None` until first reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendshipView {
    pub user_id: String,
    pub is_friend: Option<bool>,
}

/// Create or update a user from a fetched profile.
pub async fn save_user_profile(
    repo: &dyn UserRepository,
    command: SaveUserProfileCommand,
) -> ActionResult {
    let existing = match repo.find_by_user_id(&command.user_id).await {
        Ok(existing) => existing,
        Err(e) => return ActionResult::from_error(&e),
    };

    let aggregate = match existing {
        Some(user) => {
            let mut aggregate = UserAggregate::from_persisted(&user);
            if let Err(e) = aggregate.update_profile(
                command.display_name,
                command.picture_url,
                command.status_message,
            ) {
                return ActionResult::from_error(&e);
            }
            if let Some(is_friend) = command.is_friend {
                aggregate.set_friendship(is_friend);
            }
            aggregate
        }
        None => {
            let record = UserRecord {
                user_id: command.user_id,
                display_name: command.display_name,
                picture_url: command.picture_url,
                status_message: command.status_message,
                is_friend: command.is_friend,
            };
            match UserAggregate::create(record) {
                Ok(aggregate) => aggregate,
                Err(e) => {
                    tracing::warn!("rejected profile save: {e}");
                    return ActionResult::from_error(&e);
                }
            }
        }
    };

    commit(repo, aggregate, "profile saved").await
}

/// Update the friendship flag of a known user.
pub async fn update_user_friendship(
    repo: &dyn UserRepository,
    user_id: &str,
    is_friend: bool,
) -> ActionResult {
    let user = match repo.find_by_user_id(user_id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return ActionResult::failed(
                FailureReason::NotFound,
                format!("user {user_id} not found"),
            );
        }
        Err(e) => return ActionResult::from_error(&e),
    };
    let mut aggregate = UserAggregate::from_persisted(&user);
    aggregate.set_friendship(is_friend);
    commit(repo, aggregate, "friendship updated").await
}

pub async fn get_user_profile(
    repo: &dyn UserRepository,
    user_id: &str,
) -> StoreResult<Option<PersistedUser>> {
    repo.find_by_user_id(user_id).await
}

pub async fn get_user_friendship(
    repo: &dyn UserRepository,
    user_id: &str,
) -> StoreResult<Option<FriendshipView>> {
    Ok(repo
        .find_by_user_id(user_id)
        .await?
        .map(|user| FriendshipView {
            user_id: user.user_id,
            is_friend: user.is_friend,
        }))
}

async fn commit(
    repo: &dyn UserRepository,
    mut aggregate: UserAggregate,
    message: &str,
) -> ActionResult {
    let events = aggregate.take_events();
    if events.is_empty() {
        tracing::debug!("no changes for user {}", aggregate.user_id());
        return ActionResult::succeeded(aggregate.user_id(), "no changes");
    }
    match repo.save(aggregate.record()).await {
        Ok(user) => {
            for event in &events {
                log_event(event);
            }
            ActionResult::succeeded(user.user_id, message)
        }
        Err(e) => {
            tracing::error!("failed to save user {}: {e}", aggregate.user_id());
            ActionResult::from_error(&e)
        }
    }
}

fn log_event(event: &UserEvent) {
    match event {
        UserEvent::ProfileUpdated {
            user_id,
            display_name,
        } => tracing::info!("profile updated for {user_id} ({display_name})"),
        UserEvent::FriendshipChanged { user_id, is_friend } => {
            tracing::info!("friendship for {user_id} is now {is_friend}")
        }
    }
}
