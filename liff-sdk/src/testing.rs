//! In-process SDK doubles.
//!
//! [`MockSdk`] records how often each capability was called and lets a test
//! script outcomes (failing init, a ready signal that never fires, a held
//! profile fetch). [`MockLoader`] hands out one shared `MockSdk` and counts
//! loads.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::client::{SdkClient, SdkLoader, SdkProfile};
use crate::error::{SdkError, SdkErrorCode};
use crate::value::{FeaturePermission, InitConfig, PermissionStatus};

/// How the mock's `ready()` behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadyBehavior {
    Immediate,
    /// Never resolves; exercises the bounded wait.
    Never,
    Fail(String),
}

/// A gate that holds an async call until the test opens it.
#[derive(Debug)]
pub struct Latch {
    semaphore: Semaphore,
}

impl Latch {
    fn closed() -> Self {
        Self {
            semaphore: Semaphore::new(0),
        }
    }

    fn open() -> Self {
        Self {
            semaphore: Semaphore::new(Semaphore::MAX_PERMITS),
        }
    }

    /// Let every pending and future waiter through.
    pub fn release(&self) {
        self.semaphore.add_permits(Semaphore::MAX_PERMITS - self.semaphore.available_permits());
    }

    async fn wait(&self) {
        // The permit goes straight back, so an open latch stays open.
        let _ = self.semaphore.acquire().await;
    }
}

/// Scripted outcomes; every field can be changed between calls.
#[derive(Debug, Clone)]
pub struct MockScript {
    pub init_error: Option<SdkError>,
    pub ready: ReadyBehavior,
    pub logged_in: bool,
    pub in_client: bool,
    /// Returned by both session flag reads when set.
    pub status_error: Option<SdkError>,
    /// When `true`, a successful `login()` flips `logged_in`.
    pub login_completes_in_page: bool,
    pub profile: Result<SdkProfile, SdkError>,
    pub friendship: Result<bool, SdkError>,
    pub os: Option<String>,
    pub language: Option<String>,
    pub version: String,
    pub line_version: Option<String>,
    pub unavailable_apis: Vec<String>,
    pub scan: Result<Option<String>, SdkError>,
    pub permission: Result<PermissionStatus, SdkError>,
    pub share: Result<bool, SdkError>,
    pub liff_id: Option<String>,
    pub context: Option<serde_json::Value>,
    pub id_token: Option<String>,
    pub decoded_id_token: Option<serde_json::Value>,
    pub access_token: Option<String>,
}

impl Default for MockScript {
    fn default() -> Self {
        Self {
            init_error: None,
            ready: ReadyBehavior::Immediate,
            logged_in: true,
            in_client: false,
            status_error: None,
            login_completes_in_page: false,
            profile: Ok(SdkProfile {
                user_id: "U1".into(),
                display_name: "Alice".into(),
                picture_url: Some("https://profile.line-scdn.net/alice".into()),
                status_message: None,
            }),
            friendship: Ok(true),
            os: Some("web".into()),
            language: Some("ja".into()),
            version: "2.22.3".into(),
            line_version: None,
            unavailable_apis: Vec::new(),
            scan: Ok(Some("https://line.me/R/ti/p/@bot".into())),
            permission: Ok(PermissionStatus::Granted),
            share: Ok(true),
            liff_id: Some("valid-id".into()),
            context: None,
            id_token: None,
            decoded_id_token: None,
            access_token: Some("mock-access-token-0123456789".into()),
        }
    }
}

/// Per-method call counters.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub init: AtomicUsize,
    pub ready: AtomicUsize,
    pub login: AtomicUsize,
    pub logout: AtomicUsize,
    pub get_profile: AtomicUsize,
    pub get_friendship: AtomicUsize,
    pub scan_code: AtomicUsize,
    pub send_messages: AtomicUsize,
    pub set_language: AtomicUsize,
}

impl CallCounts {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Scriptable [`SdkClient`].
#[derive(Debug)]
pub struct MockSdk {
    pub script: Mutex<MockScript>,
    pub calls: CallCounts,
    /// Holds `init` until released. Open by default.
    pub init_latch: Latch,
    /// Holds `get_profile` until released. Open by default.
    pub profile_latch: Latch,
    pub opened_windows: Mutex<Vec<(String, bool)>>,
    pub closed: AtomicBool,
    pub sent: Mutex<Vec<serde_json::Value>>,
    pub language_set: Mutex<Option<String>>,
}

impl Default for MockSdk {
    fn default() -> Self {
        Self::with_script(MockScript::default())
    }
}

impl MockSdk {
    pub fn with_script(script: MockScript) -> Self {
        Self {
            script: Mutex::new(script),
            calls: CallCounts::default(),
            init_latch: Latch::open(),
            profile_latch: Latch::open(),
            opened_windows: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
            language_set: Mutex::new(None),
        }
    }

    /// Start with `init` held until `init_latch.release()`.
    pub fn hold_init(mut self) -> Self {
        self.init_latch = Latch::closed();
        self
    }

    /// Start with `get_profile` held until `profile_latch.release()`.
    pub fn hold_profile(mut self) -> Self {
        self.profile_latch = Latch::closed();
        self
    }

    pub fn edit(&self, f: impl FnOnce(&mut MockScript)) {
        f(&mut self.script.lock());
    }

    pub fn init_calls(&self) -> usize {
        CallCounts::get(&self.calls.init)
    }
}

#[async_trait]
impl SdkClient for MockSdk {
    async fn init(&self, _config: &InitConfig) -> Result<(), SdkError> {
        self.calls.init.fetch_add(1, Ordering::SeqCst);
        self.init_latch.wait().await;
        let err = self.script.lock().init_error.clone();
        match err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn ready(&self) -> Result<(), SdkError> {
        self.calls.ready.fetch_add(1, Ordering::SeqCst);
        let behavior = self.script.lock().ready.clone();
        match behavior {
            ReadyBehavior::Immediate => Ok(()),
            ReadyBehavior::Never => futures::future::pending().await,
            ReadyBehavior::Fail(msg) => Err(SdkError::new(SdkErrorCode::InitFailed, msg)),
        }
    }

    fn is_logged_in(&self) -> Result<bool, SdkError> {
        let script = self.script.lock();
        match &script.status_error {
            Some(e) => Err(e.clone()),
            None => Ok(script.logged_in),
        }
    }

    fn is_in_client(&self) -> Result<bool, SdkError> {
        let script = self.script.lock();
        match &script.status_error {
            Some(e) => Err(e.clone()),
            None => Ok(script.in_client),
        }
    }

    async fn login(&self) -> Result<(), SdkError> {
        self.calls.login.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock();
        if script.login_completes_in_page {
            script.logged_in = true;
        }
        Ok(())
    }

    fn logout(&self) {
        self.calls.logout.fetch_add(1, Ordering::SeqCst);
        self.script.lock().logged_in = false;
    }

    async fn get_profile(&self) -> Result<SdkProfile, SdkError> {
        self.calls.get_profile.fetch_add(1, Ordering::SeqCst);
        self.profile_latch.wait().await;
        self.script.lock().profile.clone()
    }

    async fn get_friendship(&self) -> Result<bool, SdkError> {
        self.calls.get_friendship.fetch_add(1, Ordering::SeqCst);
        self.script.lock().friendship.clone()
    }

    fn get_os(&self) -> Option<String> {
        self.script.lock().os.clone()
    }

    fn get_language(&self) -> Option<String> {
        self.script.lock().language.clone()
    }

    fn get_version(&self) -> String {
        self.script.lock().version.clone()
    }

    fn get_line_version(&self) -> Option<String> {
        self.script.lock().line_version.clone()
    }

    fn is_api_available(&self, api: &str) -> bool {
        !self.script.lock().unavailable_apis.iter().any(|a| a == api)
    }

    fn open_window(&self, url: &str, external: bool) {
        self.opened_windows.lock().push((url.to_string(), external));
    }

    fn close_window(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    async fn scan_code(&self) -> Result<Option<String>, SdkError> {
        self.calls.scan_code.fetch_add(1, Ordering::SeqCst);
        self.script.lock().scan.clone()
    }

    async fn query_permission(
        &self,
        _permission: FeaturePermission,
    ) -> Result<PermissionStatus, SdkError> {
        self.script.lock().permission.clone()
    }

    async fn request_all_permissions(&self) -> Result<(), SdkError> {
        self.script.lock().permission.clone().map(|_| ())
    }

    async fn share_target_picker(&self, messages: &[serde_json::Value]) -> Result<bool, SdkError> {
        let outcome = self.script.lock().share.clone();
        if matches!(outcome, Ok(true)) {
            self.sent.lock().extend_from_slice(messages);
        }
        outcome
    }

    async fn send_messages(&self, messages: &[serde_json::Value]) -> Result<(), SdkError> {
        self.calls.send_messages.fetch_add(1, Ordering::SeqCst);
        self.sent.lock().extend_from_slice(messages);
        Ok(())
    }

    fn get_id(&self) -> Option<String> {
        self.script.lock().liff_id.clone()
    }

    fn get_context(&self) -> Option<serde_json::Value> {
        self.script.lock().context.clone()
    }

    fn get_id_token(&self) -> Option<String> {
        self.script.lock().id_token.clone()
    }

    fn get_decoded_id_token(&self) -> Option<serde_json::Value> {
        self.script.lock().decoded_id_token.clone()
    }

    fn get_access_token(&self) -> Option<String> {
        self.script.lock().access_token.clone()
    }

    async fn create_permanent_link(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<String, SdkError> {
        let id = self.script.lock().liff_id.clone().unwrap_or_default();
        let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
        let mut link = format!("https://liff.line.me/{id}");
        if !query.is_empty() {
            link.push('?');
            link.push_str(&query.join("&"));
        }
        Ok(link)
    }

    async fn set_language(&self, lang: &str) -> Result<(), SdkError> {
        self.calls.set_language.fetch_add(1, Ordering::SeqCst);
        *self.language_set.lock() = Some(lang.to_string());
        Ok(())
    }
}

/// Loader that always hands out the same [`MockSdk`].
#[derive(Debug)]
pub struct MockLoader {
    pub sdk: Arc<MockSdk>,
    pub loads: AtomicUsize,
    /// When set, the next loads fail with this error.
    pub load_error: Mutex<Option<SdkError>>,
}

impl MockLoader {
    pub fn new(sdk: Arc<MockSdk>) -> Self {
        Self {
            sdk,
            loads: AtomicUsize::new(0),
            load_error: Mutex::new(None),
        }
    }

    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SdkLoader for MockLoader {
    async fn load(&self) -> Result<Arc<dyn SdkClient>, SdkError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let err = self.load_error.lock().clone();
        if let Some(e) = err {
            return Err(e);
        }
        Ok(self.sdk.clone() as Arc<dyn SdkClient>)
    }
}
