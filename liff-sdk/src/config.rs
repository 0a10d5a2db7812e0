//! Gate configuration, resolved from the environment.
//!
//! `LIFF_ID` is mandatory (falls back to `LINE_LIFF_ID`). Everything else has
//! a default.

use std::time::Duration;

use crate::error::{LiffError, Result};
use crate::value::{InitConfig, LiffId};

/// Default bound on the SDK's own ready signal.
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(5);
/// Locale reported when the SDK has not produced one yet.
pub const DEFAULT_FALLBACK_LANGUAGE: &str = "en";

/// Settings for [`crate::LiffGate`] and the init call it performs.
#[derive(Debug, Clone)]
pub struct LiffConfig {
    pub liff_id: LiffId,
    pub with_login_on_external_browser: bool,
    /// How long `ensure_ready` waits for the SDK's ready signal before
    /// continuing in degraded mode.
    pub ready_timeout: Duration,
    pub fallback_language: String,
    /// Host user agent, used to guess the OS before the SDK reports one.
    pub user_agent: Option<String>,
}

impl LiffConfig {
    pub fn new(liff_id: LiffId) -> Self {
        Self {
            liff_id,
            with_login_on_external_browser: false,
            ready_timeout: DEFAULT_READY_TIMEOUT,
            fallback_language: DEFAULT_FALLBACK_LANGUAGE.to_string(),
            user_agent: None,
        }
    }

    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let raw_id = non_empty("LIFF_ID").or_else(|| non_empty("LINE_LIFF_ID")).ok_or_else(|| {
            LiffError::Configuration(
                "LIFF_ID is not set (also checked LINE_LIFF_ID); LIFF features cannot start"
                    .to_string(),
            )
        })?;
        let liff_id = LiffId::new(raw_id).map_err(|e| LiffError::Configuration(e.to_string()))?;

        let mut config = Self::new(liff_id);

        if let Some(ms) = non_empty("LIFF_READY_TIMEOUT_MS") {
            let ms: u64 = ms.trim().parse().map_err(|_| {
                LiffError::Configuration(format!("LIFF_READY_TIMEOUT_MS is not a number: {ms}"))
            })?;
            config.ready_timeout = Duration::from_millis(ms);
        }
        if let Some(flag) = non_empty("LIFF_LOGIN_EXTERNAL_BROWSER") {
            config.with_login_on_external_browser = parse_flag(&flag).ok_or_else(|| {
                LiffError::Configuration(format!("LIFF_LOGIN_EXTERNAL_BROWSER is not a boolean: {flag}"))
            })?;
        }
        if let Some(lang) = non_empty("LIFF_FALLBACK_LANGUAGE") {
            config.fallback_language = lang;
        }
        config.user_agent = non_empty("LIFF_USER_AGENT");

        Ok(config)
    }

    pub fn init_config(&self) -> InitConfig {
        InitConfig::new(self.liff_id.clone())
            .with_login_on_external_browser(self.with_login_on_external_browser)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_id_is_a_configuration_error() {
        let err = LiffConfig::from_lookup(lookup(&[])).unwrap_err();
        match err {
            LiffError::Configuration(msg) => assert!(msg.contains("LIFF_ID")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(LiffConfig::from_lookup(lookup(&[("LIFF_ID", "  ")])).is_err());
    }

    #[test]
    fn falls_back_to_line_liff_id() {
        let config = LiffConfig::from_lookup(lookup(&[("LINE_LIFF_ID", "fallback-id")])).unwrap();
        assert_eq!(config.liff_id.as_str(), "fallback-id");
        assert_eq!(config.ready_timeout, DEFAULT_READY_TIMEOUT);
        assert_eq!(config.fallback_language, "en");
    }

    #[test]
    fn reads_optional_settings() {
        let config = LiffConfig::from_lookup(lookup(&[
            ("LIFF_ID", "primary"),
            ("LINE_LIFF_ID", "ignored"),
            ("LIFF_READY_TIMEOUT_MS", "250"),
            ("LIFF_LOGIN_EXTERNAL_BROWSER", "true"),
            ("LIFF_FALLBACK_LANGUAGE", "ja"),
            ("LIFF_USER_AGENT", "Mozilla/5.0 (iPhone)"),
        ]))
        .unwrap();
        assert_eq!(config.liff_id.as_str(), "primary");
        assert_eq!(config.ready_timeout, Duration::from_millis(250));
        assert!(config.with_login_on_external_browser);
        assert_eq!(config.fallback_language, "ja");
        assert!(config.init_config().with_login_on_external_browser);
    }

    #[test]
    fn rejects_malformed_timeout() {
        let err =
            LiffConfig::from_lookup(lookup(&[("LIFF_ID", "x"), ("LIFF_READY_TIMEOUT_MS", "soon")]))
                .unwrap_err();
        assert!(matches!(err, LiffError::Configuration(_)));
    }
}
