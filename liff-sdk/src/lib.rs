//! Readiness gate around the LINE Front-end Framework (LIFF) client SDK.
//!
//! The SDK is reached through [`SdkClient`], loaded lazily by an
//! [`SdkLoader`] and guarded by [`LiffGate`], which owns the single handle,
//! runs `init` at most once per attempt and makes sure ready-required
//! operations never reach an uninitialized SDK.
//!
//! ```ignore
//! let config = LiffConfig::from_env()?;
//! let gate = LiffGate::from_config(loader, &config);
//! gate.initialize(&config.init_config()).await?;
//! let profile = gate.profile().await?;
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod gate;
pub mod plugin;
pub mod value;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{SdkClient, SdkLoader, SdkProfile};
pub use config::LiffConfig;
pub use error::{LiffError, Result, SdkError, SdkErrorCode};
pub use gate::{ClientHandle, GateOptions, InitPhase, LiffGate};
pub use plugin::LiffPlugin;
pub use value::*;
