//! Session coordination for LIFF apps.
//!
//! [`SessionController`] sequences init → status check → profile fetch on top
//! of a [`liff_sdk::LiffGate`], publishes a [`SessionSnapshot`] and writes the
//! fetched profile through to a [`UserRepository`].

pub mod error;
pub mod event;
pub mod remote;
pub mod session;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use event::{EventEnvelope, SessionEvent};
pub use remote::RemoteUserRepository;
pub use session::{SessionController, SessionPhase, SessionSnapshot};
pub use store::{
    FailureReason, MemoryUserRepository, PersistOutcome, PersistedUser, UserRecord,
    UserRepository,
};
