//! Capability traits implemented by a concrete client SDK binding.
//!
//! The gate never talks to a global SDK object. A binding (wasm-bindgen glue
//! in the browser, a test double in CI) implements [`SdkClient`] and is
//! produced lazily by an [`SdkLoader`].

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::SdkError;
use crate::value::{FeaturePermission, InitConfig, PermissionStatus};

/// Profile exactly as the SDK reports it, before validation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SdkProfile {
    pub user_id: String,
    pub display_name: String,
    pub picture_url: Option<String>,
    pub status_message: Option<String>,
}

/// A loaded client SDK instance.
///
/// Synchronous accessors mirror the SDK methods that answer from local state
/// once the script is loaded; everything that talks to the LINE platform is
/// async.
#[async_trait]
pub trait SdkClient: Send + Sync + 'static {
    /// `init(config)`: must be called exactly once per handle.
    async fn init(&self, config: &InitConfig) -> Result<(), SdkError>;

    /// The SDK's own readiness signal. May never resolve.
    async fn ready(&self) -> Result<(), SdkError>;

    /// Session flags read from SDK storage. Fails when that storage cannot
    /// be read (blocked cookies, a corrupted token).
    fn is_logged_in(&self) -> Result<bool, SdkError>;
    fn is_in_client(&self) -> Result<bool, SdkError>;

    /// Starts the login flow. In the browser this usually navigates away.
    async fn login(&self) -> Result<(), SdkError>;
    fn logout(&self);

    async fn get_profile(&self) -> Result<SdkProfile, SdkError>;
    async fn get_friendship(&self) -> Result<bool, SdkError>;

    /// `None` until the SDK has inspected the runtime.
    fn get_os(&self) -> Option<String>;
    fn get_language(&self) -> Option<String>;
    fn get_version(&self) -> String;
    fn get_line_version(&self) -> Option<String>;
    fn is_api_available(&self, api: &str) -> bool;

    fn open_window(&self, url: &str, external: bool);
    fn close_window(&self);

    async fn scan_code(&self) -> Result<Option<String>, SdkError>;
    async fn query_permission(
        &self,
        permission: FeaturePermission,
    ) -> Result<PermissionStatus, SdkError>;
    async fn request_all_permissions(&self) -> Result<(), SdkError>;

    /// Returns `true` when the user picked targets and the messages were sent.
    async fn share_target_picker(&self, messages: &[serde_json::Value]) -> Result<bool, SdkError>;
    async fn send_messages(&self, messages: &[serde_json::Value]) -> Result<(), SdkError>;

    fn get_id(&self) -> Option<String>;
    fn get_context(&self) -> Option<serde_json::Value>;
    fn get_id_token(&self) -> Option<String>;
    fn get_decoded_id_token(&self) -> Option<serde_json::Value>;
    fn get_access_token(&self) -> Option<String>;

    async fn create_permanent_link(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<String, SdkError>;
    async fn set_language(&self, lang: &str) -> Result<(), SdkError>;
}

/// Loads the SDK on first use (dynamic import in the browser).
#[async_trait]
pub trait SdkLoader: Send + Sync + 'static {
    async fn load(&self) -> Result<Arc<dyn SdkClient>, SdkError>;
}
