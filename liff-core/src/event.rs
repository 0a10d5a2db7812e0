//! Session events and their versioned envelope.

use liff_sdk::{Language, Os, Profile, Version};
use serde::Serialize;

/// Events broadcast by the [`crate::SessionController`].
///
/// Serialized with `#[serde(tag = "type", content = "data")]` so a UI layer
/// can switch on `type` and read `data` accordingly.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum SessionEvent {
    Initialized {
        os: Os,
        language: Language,
        sdk_version: Version,
    },
    InitFailed {
        reason: String,
    },
    StatusChecked {
        is_logged_in: bool,
        is_in_client: bool,
    },
    ProfileLoaded(Profile),
    FriendshipLoaded {
        is_friend: bool,
    },
    LoggedOut,
    Persisted {
        user_id: String,
    },
    PersistFailed {
        user_id: String,
        reason: String,
    },
    Error {
        message: String,
    },
}

/// Versioned envelope around every [`SessionEvent`].
///
/// - `version`: schema version (1).
/// - `seq`: monotonically increasing per controller.
/// - `timestamp_ms`: UTC milliseconds when the envelope was created.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    pub version: u32,
    pub seq: u64,
    pub timestamp_ms: i64,
    pub event: SessionEvent,
}

impl EventEnvelope {
    pub fn new(seq: u64, event: SessionEvent) -> Self {
        Self {
            version: 1,
            seq,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            event,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_serialization() {
        let envelope = EventEnvelope::new(7, SessionEvent::LoggedOut);
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["version"], 1);
        assert_eq!(json["seq"], 7);
        assert!(json["timestamp_ms"].as_i64().unwrap() > 0);
        assert_eq!(json["event"]["type"], "logged_out");
    }

    #[test]
    fn profile_event_carries_profile_fields() {
        let profile = Profile::new("U1", "Alice", None, Some("hello".into())).unwrap();
        let json = serde_json::to_value(SessionEvent::ProfileLoaded(profile)).unwrap();
        assert_eq!(json["type"], "profile_loaded");
        assert_eq!(json["data"]["user_id"], "U1");
        assert_eq!(json["data"]["status_message"], "hello");
        assert!(json["data"].get("picture_url").is_none());
    }

    #[test]
    fn status_event_shape() {
        let json = serde_json::to_value(SessionEvent::StatusChecked {
            is_logged_in: true,
            is_in_client: false,
        })
        .unwrap();
        assert_eq!(json["type"], "status_checked");
        assert_eq!(json["data"]["is_logged_in"], true);
    }
}
