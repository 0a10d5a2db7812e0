//! User aggregate and its domain events.

use liff_core::{PersistedUser, StoreError, StoreResult, UserRecord};
use serde::Serialize;

/// What changed on a user, recorded by the aggregate and logged by actions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum UserEvent {
    ProfileUpdated {
        user_id: String,
        display_name: String,
    },
    FriendshipChanged {
        user_id: String,
        is_friend: bool,
    },
}

/// A user under modification.
#[derive(Debug, Clone)]
pub struct UserAggregate {
    state: UserRecord,
    events: Vec<UserEvent>,
}

impl UserAggregate {
    /// A user seen for the first time.
    pub fn create(record: UserRecord) -> StoreResult<Self> {
        record.validate()?;
        let mut events = vec![UserEvent::ProfileUpdated {
            user_id: record.user_id.clone(),
            display_name: record.display_name.clone(),
        }];
        if let Some(is_friend) = record.is_friend {
            events.push(UserEvent::FriendshipChanged {
                user_id: record.user_id.clone(),
                is_friend,
            });
        }
        Ok(Self {
            state: record,
            events,
        })
    }

    pub fn from_persisted(user: &PersistedUser) -> Self {
        Self {
            state: UserRecord {
                user_id: user.user_id.clone(),
                display_name: user.display_name.clone(),
                picture_url: user.picture_url.clone(),
                status_message: user.status_message.clone(),
                is_friend: user.is_friend,
            },
            events: Vec::new(),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.state.user_id
    }

    pub fn record(&self) -> &UserRecord {
        &self.state
    }

    pub fn update_profile(
        &mut self,
        display_name: String,
        picture_url: Option<String>,
        status_message: Option<String>,
    ) -> StoreResult<()> {
        if display_name.trim().is_empty() {
            return Err(StoreError::Invalid("display_name is required".into()));
        }
        let changed = self.state.display_name != display_name
            || self.state.picture_url != picture_url
            || self.state.status_message != status_message;
        if changed {
            self.state.display_name = display_name;
            self.state.picture_url = picture_url;
            self.state.status_message = status_message;
            self.events.push(UserEvent::ProfileUpdated {
                user_id: self.state.user_id.clone(),
                display_name: self.state.display_name.clone(),
            });
        }
        Ok(())
    }

    pub fn set_friendship(&mut self, is_friend: bool) {
        if self.state.is_friend != Some(is_friend) {
            self.state.is_friend = Some(is_friend);
            self.events.push(UserEvent::FriendshipChanged {
                user_id: self.state.user_id.clone(),
                is_friend,
            });
        }
    }

    /// Drain the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<UserEvent> {
        std::mem::take(&mut self.events)
    }
}
