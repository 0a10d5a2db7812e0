//! The SDK gate.
//!
//! Owns the single client handle and its initialization state:
//!
//! - **Lazy load**: the handle is produced by the [`SdkLoader`] on first use
//!   and cached for the life of the gate. A failed load is not cached.
//! - **Single-flight init**: concurrent `initialize` calls share one in-flight
//!   future, so the SDK's `init` runs once per attempt and every waiter sees
//!   the same outcome. A failed attempt leaves the gate in `Failed`, from
//!   which a later `initialize` starts over.
//! - **Readiness barrier**: ready-required operations go through
//!   [`LiffGate::ensure_ready`], which also waits (bounded) for the SDK's own
//!   ready signal. If that signal hangs, the gate logs a warning and carries
//!   on in degraded mode instead of blocking forever.
//!
//! Operations that the SDK answers from local state once loaded (login flag,
//! version, OS, language) skip the barrier and fall back to sane defaults
//! when the SDK has not produced a value yet.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

use crate::client::{SdkClient, SdkLoader};
use crate::config::{DEFAULT_FALLBACK_LANGUAGE, DEFAULT_READY_TIMEOUT, LiffConfig};
use crate::error::{LiffError, Result, SdkError};
use crate::plugin::{LiffPlugin, PluginRegistry};
use crate::value::{
    AccessToken, ApiAvailability, DecodedIdToken, ExternalWindow, FeaturePermission, Friendship,
    IdToken, InitConfig, Language, LiffContext, LiffId, MessageBatch, Os, PermanentLink,
    PermissionStatus, Profile, ScanCode, SessionStatus, UniversalLink, Version,
};

/// The loaded SDK instance. One per gate; cloning shares it.
pub type ClientHandle = Arc<dyn SdkClient>;

type InitFlight = Shared<BoxFuture<'static, Result<ClientHandle>>>;

enum InitState {
    Uninitialized,
    Initializing(InitFlight),
    Ready(ClientHandle),
    Failed(LiffError),
}

/// Observable view of the gate's initialization state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitPhase {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

/// Tunables that do not belong to the SDK's own `init` arguments.
#[derive(Debug, Clone)]
pub struct GateOptions {
    pub ready_timeout: Duration,
    pub fallback_language: String,
    pub user_agent: Option<String>,
}

impl Default for GateOptions {
    fn default() -> Self {
        Self {
            ready_timeout: DEFAULT_READY_TIMEOUT,
            fallback_language: DEFAULT_FALLBACK_LANGUAGE.to_string(),
            user_agent: None,
        }
    }
}

impl From<&LiffConfig> for GateOptions {
    fn from(config: &LiffConfig) -> Self {
        Self {
            ready_timeout: config.ready_timeout,
            fallback_language: config.fallback_language.clone(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// Handle to the gate. Cheap to clone; all clones share one SDK instance.
#[derive(Clone)]
pub struct LiffGate {
    inner: Arc<GateInner>,
}

struct GateInner {
    loader: Arc<dyn SdkLoader>,
    handle: Mutex<Option<ClientHandle>>,
    /// Serializes loads so the loader runs at most once concurrently.
    load_lock: tokio::sync::Mutex<()>,
    state: Mutex<InitState>,
    /// Set once the ready signal resolved or timed out.
    ready_settled: AtomicBool,
    degraded: AtomicBool,
    plugins: PluginRegistry,
    options: GateOptions,
}

impl LiffGate {
    pub fn new(loader: Arc<dyn SdkLoader>, options: GateOptions) -> Self {
        Self {
            inner: Arc::new(GateInner {
                loader,
                handle: Mutex::new(None),
                load_lock: tokio::sync::Mutex::new(()),
                state: Mutex::new(InitState::Uninitialized),
                ready_settled: AtomicBool::new(false),
                degraded: AtomicBool::new(false),
                plugins: PluginRegistry::default(),
                options,
            }),
        }
    }

    pub fn from_config(loader: Arc<dyn SdkLoader>, config: &LiffConfig) -> Self {
        Self::new(loader, GateOptions::from(config))
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Initialize the SDK.
    ///
    /// Joins an in-flight attempt if there is one, returns immediately if the
    /// gate is already ready, and otherwise starts a new attempt.
    pub async fn initialize(&self, config: &InitConfig) -> Result<()> {
        let flight = {
            let mut state = self.inner.state.lock();
            match &*state {
                InitState::Ready(_) => {
                    tracing::warn!("LIFF already initialized, ignoring initialize");
                    return Ok(());
                }
                InitState::Initializing(flight) => {
                    tracing::debug!("LIFF initialization in progress, joining it");
                    flight.clone()
                }
                InitState::Uninitialized | InitState::Failed(_) => {
                    if !config.liff_id.is_canonical() {
                        tracing::warn!(
                            "LIFF ID {} does not look like a console-issued id",
                            config.liff_id
                        );
                    }
                    let flight = GateInner::start_init(Arc::clone(&self.inner), config.clone());
                    *state = InitState::Initializing(flight.clone());
                    flight
                }
            }
        };
        flight.await.map(|_| ())
    }

    /// Wait for initialization and the SDK's ready signal, returning the handle.
    pub async fn ensure_ready(&self) -> Result<ClientHandle> {
        enum Pending {
            Flight(InitFlight),
            Ready(ClientHandle),
        }

        let pending = {
            let state = self.inner.state.lock();
            match &*state {
                InitState::Uninitialized => return Err(LiffError::NotInitialized),
                InitState::Failed(err) => return Err(LiffError::NotReady(err.to_string())),
                InitState::Initializing(flight) => Pending::Flight(flight.clone()),
                InitState::Ready(handle) => Pending::Ready(Arc::clone(handle)),
            }
        };
        let handle = match pending {
            Pending::Flight(flight) => flight.await?,
            Pending::Ready(handle) => handle,
        };
        self.inner.await_ready_signal(&handle).await?;
        Ok(handle)
    }

    pub fn phase(&self) -> InitPhase {
        match &*self.inner.state.lock() {
            InitState::Uninitialized => InitPhase::Uninitialized,
            InitState::Initializing(_) => InitPhase::Initializing,
            InitState::Ready(_) => InitPhase::Ready,
            InitState::Failed(_) => InitPhase::Failed,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.phase() == InitPhase::Ready
    }

    /// Whether the SDK's ready signal timed out and the gate runs degraded.
    pub fn is_degraded(&self) -> bool {
        self.inner.degraded.load(Ordering::Acquire)
    }

    /// Whether the SDK has been loaded (initialized or not).
    pub fn is_loaded(&self) -> bool {
        self.inner.handle.lock().is_some()
    }

    // ── Pre-ready-safe ─────────────────────────────────────────────────

    pub async fn is_logged_in(&self) -> Result<bool> {
        Ok(self.inner.load_handle().await?.is_logged_in()?)
    }

    pub async fn is_in_client(&self) -> Result<bool> {
        Ok(self.inner.load_handle().await?.is_in_client()?)
    }

    /// Fresh login / host-app status.
    pub async fn session_status(&self) -> Result<SessionStatus> {
        let client = self.inner.load_handle().await?;
        Ok(SessionStatus {
            is_logged_in: client.is_logged_in()?,
            is_in_client: client.is_in_client()?,
        })
    }

    pub async fn version(&self) -> Result<Version> {
        Ok(Version::new(self.inner.load_handle().await?.get_version()))
    }

    /// Version of the LINE app; `None` outside the LINE in-app browser.
    pub async fn line_version(&self) -> Result<Option<Version>> {
        Ok(self.inner.load_handle().await?.get_line_version().map(Version::new))
    }

    /// OS reported by the SDK, else guessed from the user agent, else `web`.
    pub async fn os(&self) -> Result<Os> {
        let client = self.inner.load_handle().await?;
        if let Some(os) = client.get_os().as_deref().and_then(Os::parse) {
            return Ok(os);
        }
        Ok(self
            .inner
            .options
            .user_agent
            .as_deref()
            .map(Os::from_user_agent)
            .unwrap_or(Os::Web))
    }

    /// Language reported by the SDK, else the configured fallback locale.
    pub async fn language(&self) -> Result<Language> {
        let client = self.inner.load_handle().await?;
        let lang = client
            .get_language()
            .filter(|l| !l.is_empty())
            .unwrap_or_else(|| self.inner.options.fallback_language.clone());
        Ok(Language::new(lang))
    }

    pub async fn is_api_available(&self, api: &str) -> Result<ApiAvailability> {
        let client = self.inner.load_handle().await?;
        Ok(ApiAvailability {
            api_name: api.to_string(),
            available: client.is_api_available(api),
        })
    }

    /// Start the login flow unless the user is already logged in.
    pub async fn login(&self) -> Result<()> {
        let client = self.inner.load_handle().await?;
        if client.is_logged_in()? {
            tracing::debug!("already logged in, skipping LIFF login");
            return Ok(());
        }
        client.login().await?;
        Ok(())
    }

    /// Install a plugin on the loaded SDK. Plugins should be installed before
    /// `initialize`, so this does not wait for readiness.
    pub async fn use_plugin(&self, plugin: &dyn LiffPlugin) -> Result<()> {
        let client = self.inner.load_handle().await?;
        self.inner.plugins.install(plugin, client.as_ref())
    }

    pub fn installed_plugins(&self) -> Vec<String> {
        self.inner.plugins.names()
    }

    // ── Ready-required ─────────────────────────────────────────────────

    pub async fn profile(&self) -> Result<Profile> {
        let client = self.ensure_ready().await?;
        let raw = client.get_profile().await?;
        Profile::new(raw.user_id, raw.display_name, raw.picture_url, raw.status_message)
    }

    pub async fn friendship(&self) -> Result<Friendship> {
        let client = self.ensure_ready().await?;
        let is_friend = client.get_friendship().await?;
        Ok(Friendship { is_friend })
    }

    pub async fn logout(&self) -> Result<()> {
        let client = self.ensure_ready().await?;
        client.logout();
        Ok(())
    }

    /// `None` when the user declined the permission prompt.
    pub async fn query_permission(
        &self,
        permission: FeaturePermission,
    ) -> Result<Option<PermissionStatus>> {
        let client = self.ensure_ready().await?;
        declined_to_none("permission query", client.query_permission(permission).await)
    }

    pub async fn request_all_permissions(&self) -> Result<()> {
        let client = self.ensure_ready().await?;
        declined_to_none("permission request", client.request_all_permissions().await)?;
        Ok(())
    }

    /// Scan a code. Cancellation or an unavailable scanner yields `None`.
    pub async fn scan_code(&self) -> Result<Option<ScanCode>> {
        let client = self.ensure_ready().await?;
        if !client.is_api_available("scanCode") {
            tracing::warn!("scanCode API is not available");
            return Ok(None);
        }
        let value = declined_to_none("scan", client.scan_code().await)?.flatten();
        Ok(value.filter(|v| !v.is_empty()).map(ScanCode::new))
    }

    /// Open the share target picker. Returns whether anything was shared.
    pub async fn share_target_picker(&self, messages: &MessageBatch) -> Result<bool> {
        let client = self.ensure_ready().await?;
        if !client.is_api_available("shareTargetPicker") {
            tracing::warn!("shareTargetPicker API is not available");
            return Ok(false);
        }
        let sent = declined_to_none("share", client.share_target_picker(messages.as_slice()).await)?;
        Ok(sent.unwrap_or(false))
    }

    /// Send messages to the current chat. Returns `false` if unavailable.
    pub async fn send_messages(&self, messages: &MessageBatch) -> Result<bool> {
        let client = self.ensure_ready().await?;
        if !client.is_api_available("sendMessages") {
            tracing::warn!("sendMessages API is not available");
            return Ok(false);
        }
        client.send_messages(messages.as_slice()).await?;
        Ok(true)
    }

    pub async fn open_universal_link(&self, link: &UniversalLink) -> Result<()> {
        let client = self.ensure_ready().await?;
        client.open_window(link.as_str(), true);
        Ok(())
    }

    pub async fn id(&self) -> Result<Option<LiffId>> {
        let client = self.ensure_ready().await?;
        Ok(client.get_id().and_then(|id| LiffId::new(id).ok()))
    }

    pub async fn context(&self) -> Result<Option<LiffContext>> {
        let client = self.ensure_ready().await?;
        let Some(raw) = client.get_context() else {
            return Ok(None);
        };
        match serde_json::from_value(raw) {
            Ok(ctx) => Ok(Some(ctx)),
            Err(e) => {
                tracing::warn!("unrecognized LIFF context: {e}");
                Ok(None)
            }
        }
    }

    pub async fn id_token(&self) -> Result<Option<IdToken>> {
        let client = self.ensure_ready().await?;
        Ok(client.get_id_token().filter(|t| !t.is_empty()).map(IdToken))
    }

    /// Decoded ID token; `None` if absent or missing `exp`/`iat`.
    pub async fn decoded_id_token(&self) -> Result<Option<DecodedIdToken>> {
        let client = self.ensure_ready().await?;
        let Some(raw) = client.get_decoded_id_token() else {
            return Ok(None);
        };
        match DecodedIdToken::from_json(raw) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                tracing::error!("discarding decoded ID token: {e}");
                Ok(None)
            }
        }
    }

    pub async fn access_token(&self) -> Result<Option<AccessToken>> {
        let client = self.ensure_ready().await?;
        Ok(client.get_access_token().and_then(|t| AccessToken::new(t).ok()))
    }

    pub async fn create_permanent_link(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<PermanentLink> {
        let client = self.ensure_ready().await?;
        Ok(PermanentLink(client.create_permanent_link(params).await?))
    }

    pub async fn set_language(&self, lang: &Language) -> Result<()> {
        let client = self.ensure_ready().await?;
        client.set_language(lang.as_str()).await?;
        Ok(())
    }

    // ── Synchronous window operations ──────────────────────────────────

    /// Open a URL. Fails fast if the SDK was never loaded.
    pub fn open_window(&self, window: &ExternalWindow) -> Result<()> {
        let client = self.inner.loaded_handle()?;
        client.open_window(window.url(), window.external());
        Ok(())
    }

    /// Close the LIFF window. Fails fast if the SDK was never loaded.
    pub fn close_window(&self) -> Result<()> {
        self.inner.loaded_handle()?.close_window();
        Ok(())
    }
}

impl GateInner {
    fn start_init(inner: Arc<GateInner>, config: InitConfig) -> InitFlight {
        async move {
            let outcome = inner.run_init(&config).await;
            // The flight records its own outcome so a late waiter can never
            // overwrite a newer attempt.
            {
                let mut state = inner.state.lock();
                *state = match &outcome {
                    Ok(handle) => InitState::Ready(Arc::clone(handle)),
                    Err(err) => InitState::Failed(err.clone()),
                };
            }
            outcome
        }
        .boxed()
        .shared()
    }

    async fn run_init(&self, config: &InitConfig) -> Result<ClientHandle> {
        let client = self.load_handle().await?;
        tracing::info!("initializing LIFF {}", config.liff_id);
        match client.init(config).await {
            Ok(()) => {
                tracing::info!("LIFF initialized");
                Ok(client)
            }
            Err(e) => {
                tracing::error!("LIFF initialization failed: {e}");
                Err(LiffError::Initialization(e.message))
            }
        }
    }

    async fn load_handle(&self) -> Result<ClientHandle> {
        let cached = self.handle.lock().clone();
        if let Some(handle) = cached {
            return Ok(handle);
        }
        let _guard = self.load_lock.lock().await;
        let cached = self.handle.lock().clone();
        if let Some(handle) = cached {
            return Ok(handle);
        }
        tracing::debug!("loading LIFF SDK");
        let handle = self.loader.load().await.map_err(|e| {
            tracing::error!("failed to load LIFF SDK: {e}");
            LiffError::Initialization(format!("failed to load SDK: {}", e.message))
        })?;
        *self.handle.lock() = Some(Arc::clone(&handle));
        Ok(handle)
    }

    fn loaded_handle(&self) -> Result<ClientHandle> {
        let cached = self.handle.lock().clone();
        match cached {
            Some(handle) => Ok(handle),
            None => {
                tracing::error!("LIFF not loaded, window operation rejected");
                Err(LiffError::HandleUnavailable)
            }
        }
    }

    async fn await_ready_signal(&self, client: &ClientHandle) -> Result<()> {
        if self.ready_settled.load(Ordering::Acquire) {
            return Ok(());
        }
        let timeout = self.options.ready_timeout;
        match tokio::time::timeout(timeout, client.ready()).await {
            Ok(Ok(())) => {
                self.ready_settled.store(true, Ordering::Release);
                Ok(())
            }
            Ok(Err(e)) => Err(LiffError::NotReady(e.to_string())),
            Err(_) => {
                tracing::warn!(
                    "LIFF ready signal did not resolve within {timeout:?}, continuing degraded"
                );
                self.degraded.store(true, Ordering::Release);
                self.ready_settled.store(true, Ordering::Release);
                Ok(())
            }
        }
    }
}

/// Map a declined SDK error to `None`; other errors propagate.
fn declined_to_none<T>(what: &str, result: std::result::Result<T, SdkError>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) if e.is_declined() => {
            tracing::debug!("{what} declined: {e}");
            Ok(None)
        }
        Err(e) => Err(LiffError::Sdk(e)),
    }
}
