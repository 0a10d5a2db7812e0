//! Profile/session controller.
//!
//! Sequences one session cycle on top of the [`LiffGate`]:
//!
//! ```text
//! Idle → Initializing → CheckingStatus ─┬─ logged out ──────────────→ Ready
//!             │                         └─ logged in → FetchingData → Ready
//!             └─ init failed → Error
//! ```
//!
//! Every cycle runs under an epoch. `unmount`, `resume` and `logout` bump the
//! epoch; a continuation whose epoch is no longer current drops its result
//! instead of committing it. SDK calls themselves are never cancelled.
//!
//! The snapshot lives in a `watch` channel. Epoch checks and epoch bumps both
//! happen under the channel's write lock, so a stale commit cannot slip in
//! between a bump and the state reset that goes with it.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use liff_sdk::{
    ExternalWindow, Friendship, InitConfig, Language, LiffGate, Os, Profile, ScanCode, Version,
};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::event::{EventEnvelope, SessionEvent};
use crate::store::{FailureReason, PersistOutcome, UserRecord, UserRepository};

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Initializing,
    CheckingStatus,
    FetchingData,
    Ready,
    Error,
}

/// Read-only view of the session published to the UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub is_initialized: bool,
    pub is_logged_in: bool,
    pub is_in_client: bool,
    pub profile: Option<Profile>,
    pub friendship: Option<Friendship>,
    pub error: Option<String>,
    pub os: Option<Os>,
    pub language: Option<Language>,
    pub sdk_version: Option<Version>,
    pub line_version: Option<Version>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            phase: SessionPhase::Idle,
            is_initialized: false,
            is_logged_in: false,
            is_in_client: false,
            profile: None,
            friendship: None,
            error: None,
            os: None,
            language: None,
            sdk_version: None,
            line_version: None,
        }
    }
}

impl SessionSnapshot {
    fn clear_session(&mut self) {
        self.is_logged_in = false;
        self.profile = None;
        self.friendship = None;
    }
}

/// Drives session cycles and owns the published snapshot.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    gate: LiffGate,
    init_config: InitConfig,
    repository: Option<Arc<dyn UserRepository>>,
    epoch: AtomicU64,
    /// Epoch of the cycle currently inside `Initializing`, if any.
    mounting: Mutex<Option<u64>>,
    snapshot: watch::Sender<SessionSnapshot>,
    events: broadcast::Sender<EventEnvelope>,
    seq: AtomicU64,
}

impl SessionController {
    /// `repository` receives the write-through after each successful
    /// profile fetch; without one, persistence is skipped.
    pub fn new(
        gate: LiffGate,
        init_config: InitConfig,
        repository: Option<Arc<dyn UserRepository>>,
    ) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                gate,
                init_config,
                repository,
                epoch: AtomicU64::new(0),
                mounting: Mutex::new(None),
                snapshot,
                events,
                seq: AtomicU64::new(0),
            }),
        }
    }

    pub fn gate(&self) -> &LiffGate {
        &self.inner.gate
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.snapshot.subscribe()
    }

    pub fn events(&self) -> broadcast::Receiver<EventEnvelope> {
        self.inner.events.subscribe()
    }

    /// Current session cycle.
    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::Acquire)
    }

    // ── Lifecycle ──────────────────────────────────────────────────────

    /// Run the mount sequence for the current cycle.
    ///
    /// Suppressed while this cycle is still initializing.
    pub async fn mount(&self) {
        let epoch = self.epoch();
        let Some(guard) = MountGuard::acquire(&self.inner.mounting, epoch) else {
            tracing::debug!("mount suppressed, cycle {epoch} is still initializing");
            return;
        };
        self.run_cycle(epoch, guard).await;
    }

    /// Tear down: results still in flight are discarded and the snapshot
    /// returns to `Idle`.
    pub fn unmount(&self) {
        let epoch = self.inner.bump_epoch(|snap| *snap = SessionSnapshot::default());
        tracing::debug!("session unmounted, now at cycle {epoch}");
    }

    /// Start a fresh cycle, superseding the current one. Used after the user
    /// returns from a login redirect.
    pub async fn resume(&self) {
        let epoch = self.inner.bump_epoch(|_| {});
        tracing::debug!("resuming session as cycle {epoch}");
        self.mount().await;
    }

    // ── Actions ────────────────────────────────────────────────────────

    pub async fn login(&self) {
        let snap = self.snapshot();
        let epoch = self.epoch();
        if !snap.is_initialized {
            self.inner.record_error(epoch, "LIFF is not initialized".to_string());
            return;
        }
        if snap.is_logged_in {
            tracing::debug!("already logged in, login ignored");
            return;
        }
        if let Err(e) = self.inner.gate.login().await {
            self.inner.record_error(epoch, e.to_string());
            return;
        }
        // Outside the LINE app login usually navigates away. When it
        // completes in-page, pick the session up again.
        if let Ok(true) = self.inner.gate.is_logged_in().await {
            tracing::info!("login completed in page");
            self.resume().await;
        }
    }

    /// Log out. Only valid from `Ready` while logged in; returns whether a
    /// logout happened.
    pub async fn logout(&self) -> bool {
        let snap = self.snapshot();
        if snap.phase != SessionPhase::Ready || !snap.is_logged_in {
            tracing::debug!("logout ignored in phase {:?}", snap.phase);
            return false;
        }
        if let Err(e) = self.inner.gate.logout().await {
            self.inner.record_error(self.epoch(), e.to_string());
            return false;
        }
        let epoch = self.inner.bump_epoch(|snap| {
            snap.clear_session();
            snap.error = None;
        });
        tracing::info!("logged out, now at cycle {epoch}");
        self.inner.emit(SessionEvent::LoggedOut);
        true
    }

    /// Re-fetch profile and friendship for the logged-in user.
    pub async fn refresh_profile(&self) {
        let snap = self.snapshot();
        if !snap.is_initialized || !snap.is_logged_in {
            tracing::debug!("refresh ignored, no logged-in session");
            return;
        }
        self.fetch_data(self.epoch()).await;
    }

    /// Cached profile when present, else fetched once. `None` without a
    /// logged-in session.
    pub async fn profile(&self) -> Option<Profile> {
        let snap = self.snapshot();
        if !snap.is_initialized || !snap.is_logged_in {
            tracing::debug!("profile requested without a logged-in session");
            return None;
        }
        if let Some(profile) = snap.profile {
            return Some(profile);
        }
        let epoch = self.epoch();
        match self.inner.gate.profile().await {
            Ok(profile) => {
                if self.inner.commit(epoch, |s| s.profile = Some(profile.clone())) {
                    self.inner.emit(SessionEvent::ProfileLoaded(profile.clone()));
                }
                Some(profile)
            }
            Err(e) => {
                self.inner.record_error(epoch, e.to_string());
                None
            }
        }
    }

    pub fn open_external_window(&self, url: &str, external: bool) -> bool {
        let opened = ExternalWindow::new(url, external)
            .and_then(|window| self.inner.gate.open_window(&window));
        match opened {
            Ok(()) => true,
            Err(e) => {
                self.inner.record_error(self.epoch(), e.to_string());
                false
            }
        }
    }

    pub fn close_window(&self) -> bool {
        match self.inner.gate.close_window() {
            Ok(()) => true,
            Err(e) => {
                self.inner.record_error(self.epoch(), e.to_string());
                false
            }
        }
    }

    /// `None` when cancelled, unavailable or failed; failures land in `error`.
    pub async fn scan_code(&self) -> Option<ScanCode> {
        let epoch = self.epoch();
        match self.inner.gate.scan_code().await {
            Ok(code) => code,
            Err(e) => {
                self.inner.record_error(epoch, e.to_string());
                None
            }
        }
    }

    /// Save the current profile explicitly.
    pub async fn persist_user_data(&self) -> PersistOutcome {
        let snap = self.snapshot();
        let Some(profile) = snap.profile else {
            return PersistOutcome::failed(FailureReason::Invalid, "no profile loaded");
        };
        self.persist(UserRecord::from_profile(&profile, snap.friendship)).await
    }

    // ── Cycle ──────────────────────────────────────────────────────────

    async fn run_cycle(&self, epoch: u64, guard: MountGuard<'_>) {
        let inner = &self.inner;
        inner.commit(epoch, |s| {
            s.phase = SessionPhase::Initializing;
            s.error = None;
        });

        let init = inner.gate.initialize(&inner.init_config).await;
        drop(guard);

        if let Err(e) = init {
            let reason = e.to_string();
            tracing::error!("session init failed: {reason}");
            let committed = inner.commit(epoch, |s| {
                s.phase = SessionPhase::Error;
                s.is_initialized = false;
                s.clear_session();
                s.error = Some(reason.clone());
            });
            if committed {
                inner.emit(SessionEvent::InitFailed { reason });
            }
            return;
        }

        let gate = &inner.gate;
        let os = gate.os().await.unwrap_or(Os::Web);
        let language = gate.language().await.ok();
        let sdk_version = gate.version().await.ok();
        let line_version = gate.line_version().await.ok().flatten();

        let committed = inner.commit(epoch, |s| {
            s.phase = SessionPhase::CheckingStatus;
            s.is_initialized = true;
            s.os = Some(os);
            s.language = language.clone();
            s.sdk_version = sdk_version.clone();
            s.line_version = line_version.clone();
        });
        if !committed {
            return;
        }
        if let (Some(language), Some(sdk_version)) = (language, sdk_version) {
            inner.emit(SessionEvent::Initialized {
                os,
                language,
                sdk_version,
            });
        }
        self.check_status(epoch).await;
    }

    async fn check_status(&self, epoch: u64) {
        let inner = &self.inner;
        let status = match inner.gate.session_status().await {
            Ok(status) => status,
            Err(e) => {
                let message = e.to_string();
                tracing::warn!("session status check failed: {message}");
                let committed = inner.commit(epoch, |s| {
                    s.phase = SessionPhase::Error;
                    s.is_in_client = false;
                    s.clear_session();
                    s.error = Some(message.clone());
                });
                if committed {
                    inner.emit(SessionEvent::Error { message });
                }
                return;
            }
        };

        let committed = inner.commit(epoch, |s| {
            s.is_logged_in = status.is_logged_in;
            s.is_in_client = status.is_in_client;
            if status.is_logged_in {
                s.phase = SessionPhase::FetchingData;
            } else {
                s.profile = None;
                s.friendship = None;
                s.phase = SessionPhase::Ready;
            }
        });
        if !committed {
            return;
        }
        inner.emit(SessionEvent::StatusChecked {
            is_logged_in: status.is_logged_in,
            is_in_client: status.is_in_client,
        });
        if status.is_logged_in {
            self.fetch_data(epoch).await;
        }
    }

    /// Fetch profile and friendship side by side. A failure only unsets its
    /// own field; the profile error is surfaced in `error`.
    async fn fetch_data(&self, epoch: u64) {
        let inner = &self.inner;
        if !inner.commit(epoch, |s| s.phase = SessionPhase::FetchingData) {
            return;
        }

        let (profile, friendship) = tokio::join!(inner.gate.profile(), inner.gate.friendship());
        if let Err(e) = &friendship {
            tracing::warn!("friendship fetch failed: {e}");
        }
        let profile_error = profile.as_ref().err().map(|e| e.to_string());
        let friendship = friendship.ok();

        let committed = inner.commit(epoch, |s| {
            s.profile = profile.as_ref().ok().cloned();
            s.friendship = friendship;
            s.error = profile_error.clone();
            s.phase = SessionPhase::Ready;
        });
        if !committed {
            return;
        }

        if let Some(f) = friendship {
            inner.emit(SessionEvent::FriendshipLoaded {
                is_friend: f.is_friend,
            });
        }
        match profile {
            Ok(profile) => {
                inner.emit(SessionEvent::ProfileLoaded(profile.clone()));
                self.spawn_persist(UserRecord::from_profile(&profile, friendship));
            }
            Err(_) => {
                if let Some(message) = profile_error {
                    tracing::warn!("profile fetch failed: {message}");
                    inner.emit(SessionEvent::Error { message });
                }
            }
        }
    }

    // ── Persistence ────────────────────────────────────────────────────

    fn spawn_persist(&self, record: UserRecord) {
        if self.inner.repository.is_none() {
            tracing::debug!("no user repository configured, skipping write-through");
            return;
        }
        let this = self.clone();
        tokio::spawn(async move {
            this.persist(record).await;
        });
    }

    async fn persist(&self, record: UserRecord) -> PersistOutcome {
        let Some(repository) = &self.inner.repository else {
            return PersistOutcome::failed(
                FailureReason::Unavailable,
                "no user repository configured",
            );
        };
        let user_id = record.user_id.clone();
        match repository.save(&record).await {
            Ok(saved) => {
                tracing::info!("persisted user {user_id}");
                self.inner.emit(SessionEvent::Persisted {
                    user_id: saved.user_id.clone(),
                });
                PersistOutcome::saved(saved.user_id)
            }
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!("failed to persist user {user_id}: {reason}");
                self.inner.emit(SessionEvent::PersistFailed { user_id, reason });
                PersistOutcome::from_error(&e)
            }
        }
    }
}

/// Marks a cycle as initializing. Released on drop, so a mount future
/// dropped mid-init does not block later mounts of the same cycle.
struct MountGuard<'a> {
    mounting: &'a Mutex<Option<u64>>,
    epoch: u64,
}

impl<'a> MountGuard<'a> {
    fn acquire(mounting: &'a Mutex<Option<u64>>, epoch: u64) -> Option<Self> {
        let mut current = mounting.lock();
        if *current == Some(epoch) {
            return None;
        }
        *current = Some(epoch);
        Some(Self { mounting, epoch })
    }
}

impl Drop for MountGuard<'_> {
    fn drop(&mut self) {
        let mut current = self.mounting.lock();
        if *current == Some(self.epoch) {
            *current = None;
        }
    }
}

impl Inner {
    /// Apply `f` to the snapshot if `epoch` is still current.
    fn commit(&self, epoch: u64, f: impl FnOnce(&mut SessionSnapshot)) -> bool {
        let mut committed = false;
        self.snapshot.send_if_modified(|snap| {
            if self.epoch.load(Ordering::Acquire) != epoch {
                return false;
            }
            let before = snap.phase;
            f(snap);
            if before != snap.phase {
                tracing::debug!("session phase {before:?} -> {:?} (cycle {epoch})", snap.phase);
            }
            committed = true;
            true
        });
        if !committed {
            tracing::debug!("discarding result from superseded cycle {epoch}");
        }
        committed
    }

    /// Advance to a new cycle and apply `f` atomically with the bump.
    fn bump_epoch(&self, f: impl FnOnce(&mut SessionSnapshot)) -> u64 {
        let mut next = 0;
        self.snapshot.send_modify(|snap| {
            next = self.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            f(snap);
        });
        next
    }

    fn record_error(&self, epoch: u64, message: String) {
        tracing::warn!("session error: {message}");
        if self.commit(epoch, |s| s.error = Some(message.clone())) {
            self.emit(SessionEvent::Error { message });
        }
    }

    fn emit(&self, event: SessionEvent) {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        // No subscribers is fine.
        let _ = self.events.send(EventEnvelope::new(seq, event));
    }
}
