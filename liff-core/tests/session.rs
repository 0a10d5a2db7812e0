//! Session controller against the in-crate SDK double.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use liff_core::{
    EventEnvelope, FailureReason, MemoryUserRepository, PersistedUser, SessionController,
    SessionEvent, SessionPhase, StoreError, StoreResult, UserRecord, UserRepository,
};
use liff_sdk::testing::{CallCounts, MockLoader, MockSdk};
use liff_sdk::{Friendship, GateOptions, InitConfig, LiffGate, LiffId, SdkError, SdkErrorCode};
use tokio::sync::broadcast;

#[derive(Default)]
struct CountingRepo {
    inner: MemoryUserRepository,
    saves: AtomicUsize,
    fail: bool,
}

impl CountingRepo {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserRepository for CountingRepo {
    async fn find_by_user_id(&self, user_id: &str) -> StoreResult<Option<PersistedUser>> {
        self.inner.find_by_user_id(user_id).await
    }

    async fn save(&self, record: &UserRecord) -> StoreResult<PersistedUser> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StoreError::Backend("disk full".into()));
        }
        self.inner.save(record).await
    }

    async fn find_by_friendship(&self, is_friend: bool) -> StoreResult<Vec<PersistedUser>> {
        self.inner.find_by_friendship(is_friend).await
    }

    async fn delete(&self, user_id: &str) -> StoreResult<bool> {
        self.inner.delete(user_id).await
    }
}

fn setup_with(sdk: MockSdk, repo: CountingRepo) -> (SessionController, Arc<MockSdk>, Arc<CountingRepo>) {
    let sdk = Arc::new(sdk);
    let loader = Arc::new(MockLoader::new(Arc::clone(&sdk)));
    let gate = LiffGate::new(loader, GateOptions::default());
    let repo = Arc::new(repo);
    let controller = SessionController::new(
        gate,
        InitConfig::new(LiffId::new("valid-id").unwrap()),
        Some(repo.clone() as Arc<dyn UserRepository>),
    );
    (controller, sdk, repo)
}

fn setup(sdk: MockSdk) -> (SessionController, Arc<MockSdk>, Arc<CountingRepo>) {
    setup_with(sdk, CountingRepo::default())
}

async fn wait_for_event(
    rx: &mut broadcast::Receiver<EventEnvelope>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let envelope = rx.recv().await.expect("event stream closed");
            if pred(&envelope.event) {
                return envelope.event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

async fn yield_until(cond: impl Fn() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

#[tokio::test]
async fn logged_in_mount_settles_ready_and_saves_once() {
    let (controller, sdk, repo) = setup(MockSdk::default());
    let mut events = controller.events();

    controller.mount().await;

    let snap = controller.snapshot();
    assert_eq!(snap.phase, SessionPhase::Ready);
    assert!(snap.is_initialized);
    assert!(snap.is_logged_in);
    assert_eq!(snap.profile.as_ref().unwrap().user_id(), "U1");
    assert_eq!(snap.profile.as_ref().unwrap().display_name(), "Alice");
    assert_eq!(snap.friendship, Some(Friendship { is_friend: true }));
    assert_eq!(snap.error, None);
    assert_eq!(snap.sdk_version.as_ref().unwrap().as_str(), "2.22.3");

    let event = wait_for_event(&mut events, |e| matches!(e, SessionEvent::Persisted { .. })).await;
    assert_eq!(event, SessionEvent::Persisted { user_id: "U1".into() });
    assert_eq!(repo.saves(), 1);
    let stored = repo.find_by_user_id("U1").await.unwrap().unwrap();
    assert_eq!(stored.display_name, "Alice");
    assert_eq!(stored.is_friend, Some(true));
    assert_eq!(sdk.init_calls(), 1);
}

#[tokio::test]
async fn init_failure_is_terminal_for_the_cycle() {
    let sdk = MockSdk::default();
    sdk.edit(|s| s.init_error = Some(SdkError::new(SdkErrorCode::InitFailed, "network")));
    let (controller, _sdk, repo) = setup(sdk);
    let mut events = controller.events();

    controller.mount().await;

    let snap = controller.snapshot();
    assert_eq!(snap.phase, SessionPhase::Error);
    assert!(snap.error.as_deref().unwrap().contains("network"));
    assert_eq!(snap.profile, None);
    assert!(!snap.is_initialized);
    let event = wait_for_event(&mut events, |e| matches!(e, SessionEvent::InitFailed { .. })).await;
    assert!(matches!(event, SessionEvent::InitFailed { reason } if reason.contains("network")));
    assert_eq!(repo.saves(), 0);
}

#[tokio::test]
async fn login_when_logged_in_is_a_no_op_and_profile_is_cached() {
    let (controller, sdk, _repo) = setup(MockSdk::default());
    controller.mount().await;

    controller.login().await;
    assert_eq!(sdk.init_calls(), 1);
    assert_eq!(CallCounts::get(&sdk.calls.login), 0);

    let first = controller.profile().await.unwrap();
    let second = controller.profile().await.unwrap();
    assert_eq!(first, second);
    assert_eq!(CallCounts::get(&sdk.calls.get_profile), 1);
    assert_eq!(CallCounts::get(&sdk.calls.get_friendship), 1);
}

#[tokio::test]
async fn cancelled_scan_resolves_to_none() {
    let (controller, sdk, _repo) = setup(MockSdk::default());
    controller.mount().await;
    sdk.edit(|s| s.scan = Err(SdkError::cancelled()));

    assert_eq!(controller.scan_code().await, None);
    assert_eq!(controller.snapshot().error, None);
}

#[tokio::test]
async fn logged_out_mount_clears_profile() {
    let sdk = MockSdk::default();
    sdk.edit(|s| s.logged_in = false);
    let (controller, sdk, repo) = setup(sdk);

    controller.mount().await;

    let snap = controller.snapshot();
    assert_eq!(snap.phase, SessionPhase::Ready);
    assert!(!snap.is_logged_in);
    assert_eq!(snap.profile, None);
    assert_eq!(snap.friendship, None);
    assert_eq!(CallCounts::get(&sdk.calls.get_profile), 0);
    assert_eq!(repo.saves(), 0);
}

#[tokio::test]
async fn logout_clears_session_state() {
    let (controller, sdk, _repo) = setup(MockSdk::default());
    let mut events = controller.events();
    assert!(!controller.logout().await, "logout before mount must be ignored");

    controller.mount().await;
    let epoch = controller.epoch();
    assert!(controller.logout().await);

    let snap = controller.snapshot();
    assert!(!snap.is_logged_in);
    assert_eq!(snap.profile, None);
    assert_eq!(snap.friendship, None);
    assert_eq!(snap.phase, SessionPhase::Ready);
    assert_eq!(controller.epoch(), epoch + 1);
    assert_eq!(CallCounts::get(&sdk.calls.logout), 1);
    wait_for_event(&mut events, |e| *e == SessionEvent::LoggedOut).await;

    assert!(!controller.logout().await, "second logout must be ignored");
}

#[tokio::test]
async fn profile_after_logout_stays_empty() {
    let (controller, sdk, _repo) = setup(MockSdk::default());
    controller.mount().await;
    assert!(controller.logout().await);

    assert_eq!(controller.profile().await, None);
    let snap = controller.snapshot();
    assert!(!snap.is_logged_in);
    assert_eq!(snap.profile, None);
    assert_eq!(CallCounts::get(&sdk.calls.get_profile), 1);
}

#[tokio::test]
async fn profile_before_mount_does_not_reach_the_sdk() {
    let (controller, sdk, _repo) = setup(MockSdk::default());
    assert_eq!(controller.profile().await, None);
    assert_eq!(controller.snapshot().profile, None);
    assert_eq!(CallCounts::get(&sdk.calls.get_profile), 0);
}

#[tokio::test]
async fn status_failure_falls_back_to_logged_out() {
    let sdk = MockSdk::default();
    sdk.edit(|s| {
        s.status_error = Some(SdkError::new(
            SdkErrorCode::Unknown("STORAGE".into()),
            "storage blocked",
        ))
    });
    let (controller, sdk, repo) = setup(sdk);
    let mut events = controller.events();

    controller.mount().await;

    let snap = controller.snapshot();
    assert_eq!(snap.phase, SessionPhase::Error);
    assert!(snap.is_initialized);
    assert!(!snap.is_logged_in);
    assert!(!snap.is_in_client);
    assert_eq!(snap.profile, None);
    assert_eq!(snap.friendship, None);
    assert!(snap.error.as_deref().unwrap().contains("storage blocked"));
    wait_for_event(&mut events, |e| matches!(e, SessionEvent::Error { .. })).await;
    assert_eq!(CallCounts::get(&sdk.calls.get_profile), 0);
    assert_eq!(repo.saves(), 0);
}

#[tokio::test]
async fn stale_fetch_does_not_overwrite_a_newer_cycle() {
    let (controller, sdk, repo) = setup(MockSdk::default().hold_profile());

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.mount().await }
    });
    yield_until(|| CallCounts::get(&sdk.calls.get_profile) == 1).await;
    assert_eq!(controller.snapshot().phase, SessionPhase::FetchingData);

    // Remount with a logged-out session while the first fetch is pending.
    controller.unmount();
    sdk.edit(|s| s.logged_in = false);
    controller.mount().await;
    assert_eq!(controller.snapshot().phase, SessionPhase::Ready);

    sdk.profile_latch.release();
    first.await.unwrap();

    let snap = controller.snapshot();
    assert_eq!(snap.phase, SessionPhase::Ready);
    assert!(!snap.is_logged_in);
    assert_eq!(snap.profile, None);
    assert_eq!(snap.friendship, None);
    assert_eq!(repo.saves(), 0);
}

#[tokio::test]
async fn second_mount_while_initializing_is_suppressed() {
    let (controller, sdk, _repo) = setup(MockSdk::default().hold_init());

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.mount().await }
    });
    yield_until(|| sdk.init_calls() == 1).await;

    // Returns immediately instead of waiting on the held init.
    controller.mount().await;
    assert_eq!(controller.snapshot().phase, SessionPhase::Initializing);

    sdk.init_latch.release();
    first.await.unwrap();
    assert_eq!(controller.snapshot().phase, SessionPhase::Ready);
    assert_eq!(sdk.init_calls(), 1);
}

#[tokio::test]
async fn dropped_mount_does_not_block_the_next_mount() {
    let (controller, sdk, _repo) = setup(MockSdk::default().hold_init());

    let dropped = tokio::time::timeout(Duration::from_millis(20), controller.mount()).await;
    assert!(dropped.is_err());
    assert_eq!(controller.snapshot().phase, SessionPhase::Initializing);
    assert_eq!(sdk.init_calls(), 1);

    let retry = tokio::spawn({
        let controller = controller.clone();
        async move { controller.mount().await }
    });
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
    sdk.init_latch.release();
    retry.await.unwrap();

    assert_eq!(controller.snapshot().phase, SessionPhase::Ready);
    assert_eq!(sdk.init_calls(), 1);
}

#[tokio::test]
async fn remount_after_unmount_joins_the_pending_init() {
    let (controller, sdk, _repo) = setup(MockSdk::default().hold_init());

    let first = tokio::spawn({
        let controller = controller.clone();
        async move { controller.mount().await }
    });
    yield_until(|| sdk.init_calls() == 1).await;

    controller.unmount();
    let second = tokio::spawn({
        let controller = controller.clone();
        async move { controller.mount().await }
    });
    yield_until(|| controller.snapshot().phase == SessionPhase::Initializing).await;

    sdk.init_latch.release();
    first.await.unwrap();
    second.await.unwrap();

    let snap = controller.snapshot();
    assert_eq!(snap.phase, SessionPhase::Ready);
    assert_eq!(snap.profile.unwrap().user_id(), "U1");
    assert_eq!(sdk.init_calls(), 1);
}

#[tokio::test]
async fn in_page_login_reruns_the_session() {
    let sdk = MockSdk::default();
    sdk.edit(|s| {
        s.logged_in = false;
        s.login_completes_in_page = true;
    });
    let (controller, sdk, repo) = setup(sdk);
    let mut events = controller.events();

    controller.mount().await;
    assert!(!controller.snapshot().is_logged_in);

    controller.login().await;
    assert_eq!(CallCounts::get(&sdk.calls.login), 1);
    let snap = controller.snapshot();
    assert!(snap.is_logged_in);
    assert_eq!(snap.profile.unwrap().user_id(), "U1");

    wait_for_event(&mut events, |e| matches!(e, SessionEvent::Persisted { .. })).await;
    assert_eq!(repo.saves(), 1);
    assert_eq!(sdk.init_calls(), 1);
}

#[tokio::test]
async fn login_before_mount_records_an_error() {
    let (controller, sdk, _repo) = setup(MockSdk::default());
    controller.login().await;
    assert_eq!(controller.snapshot().error.as_deref(), Some("LIFF is not initialized"));
    assert_eq!(CallCounts::get(&sdk.calls.login), 0);
}

#[tokio::test]
async fn friendship_failure_is_isolated() {
    let sdk = MockSdk::default();
    sdk.edit(|s| s.friendship = Err(SdkError::new(SdkErrorCode::Unauthorized, "no scope")));
    let (controller, _sdk, repo) = setup(sdk);
    let mut events = controller.events();

    controller.mount().await;

    let snap = controller.snapshot();
    assert_eq!(snap.phase, SessionPhase::Ready);
    assert_eq!(snap.profile.unwrap().user_id(), "U1");
    assert_eq!(snap.friendship, None);
    assert_eq!(snap.error, None);

    wait_for_event(&mut events, |e| matches!(e, SessionEvent::Persisted { .. })).await;
    let stored = repo.find_by_user_id("U1").await.unwrap().unwrap();
    assert_eq!(stored.is_friend, None);
}

#[tokio::test]
async fn profile_failure_is_isolated() {
    let sdk = MockSdk::default();
    sdk.edit(|s| s.profile = Err(SdkError::new(SdkErrorCode::Unauthorized, "token expired")));
    let (controller, _sdk, repo) = setup(sdk);

    controller.mount().await;

    let snap = controller.snapshot();
    assert_eq!(snap.phase, SessionPhase::Ready);
    assert_eq!(snap.profile, None);
    assert_eq!(snap.friendship, Some(Friendship { is_friend: true }));
    assert!(snap.error.unwrap().contains("token expired"));
    tokio::task::yield_now().await;
    assert_eq!(repo.saves(), 0);
}

#[tokio::test]
async fn persistence_failure_does_not_block_ready() {
    let (controller, _sdk, repo) = setup_with(MockSdk::default(), CountingRepo::failing());
    let mut events = controller.events();

    controller.mount().await;
    assert_eq!(controller.snapshot().phase, SessionPhase::Ready);

    let event =
        wait_for_event(&mut events, |e| matches!(e, SessionEvent::PersistFailed { .. })).await;
    assert!(matches!(event, SessionEvent::PersistFailed { reason, .. } if reason.contains("disk full")));
    assert_eq!(controller.snapshot().error, None);

    let outcome = controller.persist_user_data().await;
    assert!(!outcome.success);
    assert_eq!(outcome.reason, Some(FailureReason::Unavailable));
    assert_eq!(repo.saves(), 2);
}

#[tokio::test]
async fn explicit_persist_reports_the_user() {
    let (controller, _sdk, _repo) = setup(MockSdk::default());
    let outcome = controller.persist_user_data().await;
    assert!(!outcome.success);
    assert_eq!(outcome.message, "no profile loaded");
    assert_eq!(outcome.reason, Some(FailureReason::Invalid));

    controller.mount().await;
    let outcome = controller.persist_user_data().await;
    assert!(outcome.success);
    assert_eq!(outcome.user_id.as_deref(), Some("U1"));
}

#[tokio::test]
async fn window_errors_are_captured() {
    let (controller, sdk, _repo) = setup(MockSdk::default());
    assert!(!controller.open_external_window("https://example.com", true));
    assert_eq!(controller.snapshot().error.as_deref(), Some("LIFF is not loaded"));

    controller.mount().await;
    assert!(controller.open_external_window("https://example.com", false));
    assert!(!controller.open_external_window("", false));
    assert!(controller.close_window());
    assert_eq!(sdk.opened_windows.lock().len(), 1);
}

#[tokio::test]
async fn refresh_picks_up_profile_changes() {
    let (controller, sdk, _repo) = setup(MockSdk::default());
    controller.mount().await;

    sdk.edit(|s| {
        if let Ok(profile) = s.profile.as_mut() {
            profile.display_name = "Alicia".into();
        }
        s.friendship = Ok(false);
    });
    controller.refresh_profile().await;

    let snap = controller.snapshot();
    assert_eq!(snap.profile.unwrap().display_name(), "Alicia");
    assert_eq!(snap.friendship, Some(Friendship { is_friend: false }));
    assert_eq!(CallCounts::get(&sdk.calls.get_profile), 2);
}
