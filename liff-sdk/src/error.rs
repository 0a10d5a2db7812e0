//! Error types for the gate and the SDK capability surface.

use std::fmt;

/// Error codes reported by the underlying client SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SdkErrorCode {
    /// The user dismissed a prompt (scanner, share picker, permission dialog).
    UserCancel,
    /// The user or channel configuration refused the operation.
    Forbidden,
    Unauthorized,
    InitFailed,
    InvalidArgument,
    InvalidConfig,
    ExceptionInSubwindow,
    /// Anything the SDK reports that we do not model.
    Unknown(String),
}

impl SdkErrorCode {
    /// Parse the SDK's string code (`"USER_CANCEL"`, `"FORBIDDEN"`, ...).
    pub fn from_code(code: &str) -> Self {
        match code {
            "USER_CANCEL" => Self::UserCancel,
            "FORBIDDEN" => Self::Forbidden,
            "UNAUTHORIZED" => Self::Unauthorized,
            "INIT_FAILED" => Self::InitFailed,
            "INVALID_ARGUMENT" => Self::InvalidArgument,
            "INVALID_CONFIG" => Self::InvalidConfig,
            "EXCEPTION_IN_SUBWINDOW" => Self::ExceptionInSubwindow,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::UserCancel => "USER_CANCEL",
            Self::Forbidden => "FORBIDDEN",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::InitFailed => "INIT_FAILED",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidConfig => "INVALID_CONFIG",
            Self::ExceptionInSubwindow => "EXCEPTION_IN_SUBWINDOW",
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for SdkErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised by the client SDK itself.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code}: {message}")]
pub struct SdkError {
    pub code: SdkErrorCode,
    pub message: String,
}

impl SdkError {
    pub fn new(code: SdkErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn cancelled() -> Self {
        Self::new(SdkErrorCode::UserCancel, "cancelled by user")
    }

    /// Whether the user (or the channel's consent settings) declined the
    /// operation. Declined operations resolve to a neutral result.
    pub fn is_declined(&self) -> bool {
        matches!(self.code, SdkErrorCode::UserCancel | SdkErrorCode::Forbidden)
    }
}

/// Errors surfaced by [`crate::LiffGate`] and the value objects.
///
/// `Clone` so that every waiter of a single in-flight initialization receives
/// the same outcome.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LiffError {
    /// A required setting is missing. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),
    /// The SDK failed to load or `init` rejected.
    #[error("LIFF initialization failed: {0}")]
    Initialization(String),
    /// A ready-required operation ran before `initialize` was ever called.
    #[error("LIFF has not been initialized")]
    NotInitialized,
    /// The handle is unusable (last initialization failed, or the SDK's ready
    /// signal rejected).
    #[error("LIFF is not ready: {0}")]
    NotReady(String),
    /// A synchronous operation needed the handle before it was ever loaded.
    #[error("LIFF is not loaded")]
    HandleUnavailable,
    /// The user declined the operation. Prompt-style gate operations turn
    /// this into a neutral result; elsewhere it propagates.
    #[error("operation declined: {0}")]
    Declined(String),
    /// A value object rejected its input.
    #[error("invalid value: {0}")]
    InvalidValue(String),
    /// Unexpected SDK failure.
    #[error("LIFF SDK error: {0}")]
    Sdk(SdkError),
}

impl From<SdkError> for LiffError {
    fn from(err: SdkError) -> Self {
        if err.is_declined() {
            LiffError::Declined(err.to_string())
        } else {
            LiffError::Sdk(err)
        }
    }
}

pub type Result<T, E = LiffError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_codes() {
        assert_eq!(SdkErrorCode::from_code("USER_CANCEL"), SdkErrorCode::UserCancel);
        assert_eq!(SdkErrorCode::from_code("FORBIDDEN"), SdkErrorCode::Forbidden);
        assert_eq!(
            SdkErrorCode::from_code("SOMETHING_NEW"),
            SdkErrorCode::Unknown("SOMETHING_NEW".to_string())
        );
        assert_eq!(SdkErrorCode::Unknown("X".into()).as_str(), "X");
    }

    #[test]
    fn declined_errors_map_to_declined() {
        let err: LiffError = SdkError::cancelled().into();
        assert!(matches!(err, LiffError::Declined(_)));

        let err: LiffError = SdkError::new(SdkErrorCode::Unauthorized, "token expired").into();
        match err {
            LiffError::Sdk(inner) => assert_eq!(inner.code, SdkErrorCode::Unauthorized),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn display_includes_code() {
        let err = SdkError::new(SdkErrorCode::InitFailed, "network");
        assert_eq!(err.to_string(), "INIT_FAILED: network");
    }
}
