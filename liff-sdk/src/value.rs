//! Value objects exchanged with the client SDK.
//!
//! Every constructor validates its input once; after that the values are
//! immutable and a new instance replaces an old one rather than mutating it.

use serde::{Deserialize, Serialize};

use crate::error::{LiffError, Result};

// ── Identity & init ────────────────────────────────────────────────────

/// The LIFF app identifier issued by the developer console.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LiffId(String);

impl LiffId {
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(LiffError::InvalidValue("LIFF ID cannot be empty".into()));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id has the console's `<13 digits>-<32 alphanumerics>` shape.
    ///
    /// Non-canonical ids are still accepted (test channels and proxies use
    /// their own ids); the gate only warns about them.
    pub fn is_canonical(&self) -> bool {
        let Some((channel, suffix)) = self.0.split_once('-') else {
            return false;
        };
        channel.len() == 13
            && channel.bytes().all(|b| b.is_ascii_digit())
            && suffix.len() == 32
            && suffix.bytes().all(|b| b.is_ascii_alphanumeric())
    }
}

impl TryFrom<String> for LiffId {
    type Error = LiffError;

    fn try_from(value: String) -> Result<Self> {
        Self::new(value)
    }
}

impl From<LiffId> for String {
    fn from(id: LiffId) -> Self {
        id.0
    }
}

impl std::fmt::Display for LiffId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Arguments passed to the SDK's `init`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitConfig {
    pub liff_id: LiffId,
    pub with_login_on_external_browser: bool,
}

impl InitConfig {
    pub fn new(liff_id: LiffId) -> Self {
        Self {
            liff_id,
            with_login_on_external_browser: false,
        }
    }

    pub fn with_login_on_external_browser(mut self, enabled: bool) -> Self {
        self.with_login_on_external_browser = enabled;
        self
    }
}

// ── Session & user ─────────────────────────────────────────────────────

/// Login / host-app status, always queried fresh from the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SessionStatus {
    pub is_logged_in: bool,
    pub is_in_client: bool,
}

/// A LINE user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ProfileFields")]
pub struct Profile {
    user_id: String,
    display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    picture_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_message: Option<String>,
}

#[derive(Deserialize)]
struct ProfileFields {
    user_id: String,
    display_name: String,
    #[serde(default)]
    picture_url: Option<String>,
    #[serde(default)]
    status_message: Option<String>,
}

impl TryFrom<ProfileFields> for Profile {
    type Error = LiffError;

    fn try_from(f: ProfileFields) -> Result<Self> {
        Profile::new(f.user_id, f.display_name, f.picture_url, f.status_message)
    }
}

impl Profile {
    pub fn new(
        user_id: impl Into<String>,
        display_name: impl Into<String>,
        picture_url: Option<String>,
        status_message: Option<String>,
    ) -> Result<Self> {
        let user_id = user_id.into();
        if user_id.is_empty() {
            return Err(LiffError::InvalidValue("profile userId is required".into()));
        }
        Ok(Self {
            user_id,
            display_name: display_name.into(),
            // The SDK reports absent fields as empty strings on some platforms.
            picture_url: picture_url.filter(|s| !s.is_empty()),
            status_message: status_message.filter(|s| !s.is_empty()),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn picture_url(&self) -> Option<&str> {
        self.picture_url.as_deref()
    }

    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }
}

/// Whether the user has added the channel's bot as a friend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Friendship {
    pub is_friend: bool,
}

// ── Environment ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    Ios,
    Android,
    Web,
}

impl Os {
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "ios" => Some(Os::Ios),
            "android" => Some(Os::Android),
            "web" => Some(Os::Web),
            _ => None,
        }
    }

    /// Best-effort guess used before the SDK reports an OS.
    pub fn from_user_agent(ua: &str) -> Self {
        if ua.to_ascii_lowercase().contains("android") {
            Os::Android
        } else if ["iPad", "iPhone", "iPod"].iter().any(|d| ua.contains(d)) {
            Os::Ios
        } else {
            Os::Web
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Ios => "ios",
            Os::Android => "android",
            Os::Web => "web",
        }
    }
}

/// A BCP 47 language tag such as `ja-JP`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Language(String);

impl Language {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn code(&self) -> &str {
        self.0.split('-').next().unwrap_or(&self.0)
    }

    pub fn region(&self) -> Option<&str> {
        self.0.split('-').nth(1)
    }
}

/// A dotted version string (`2.22.3`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn new(v: impl Into<String>) -> Self {
        Self(v.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric component-wise comparison; missing or non-numeric parts count as 0.
    pub fn is_greater_than(&self, other: &str) -> bool {
        compare_versions(&self.0, other) == std::cmp::Ordering::Greater
    }
}

fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    let parse = |s: &str| -> Vec<u64> { s.split('.').map(|p| p.parse().unwrap_or(0)).collect() };
    let (pa, pb) = (parse(a), parse(b));
    for i in 0..pa.len().max(pb.len()) {
        let x = pa.get(i).copied().unwrap_or(0);
        let y = pb.get(i).copied().unwrap_or(0);
        if x != y {
            return x.cmp(&y);
        }
    }
    std::cmp::Ordering::Equal
}

/// Result of `isApiAvailable(name)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApiAvailability {
    pub api_name: String,
    pub available: bool,
}

// ── Scanning & permissions ─────────────────────────────────────────────

/// A value read by the code scanner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ScanCode(String);

impl ScanCode {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn value(&self) -> &str {
        &self.0
    }

    pub fn is_url(&self) -> bool {
        url::Url::parse(&self.0).is_ok()
    }
}

/// Features whose permission can be queried through `permission.query`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FeaturePermission {
    MultipleTabs,
    ScanCode,
    ShareTargetPicker,
}

impl FeaturePermission {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeaturePermission::MultipleTabs => "multipleTabs",
            FeaturePermission::ScanCode => "scanCode",
            FeaturePermission::ShareTargetPicker => "shareTargetPicker",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionStatus {
    Granted,
    Denied,
    Prompt,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }

    pub fn is_denied(&self) -> bool {
        matches!(self, PermissionStatus::Denied)
    }
}

// ── Windows & links ────────────────────────────────────────────────────

/// Arguments for `openWindow`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExternalWindow {
    url: String,
    external: bool,
}

impl ExternalWindow {
    pub fn new(url: impl Into<String>, external: bool) -> Result<Self> {
        let url = url.into();
        if url.is_empty() {
            return Err(LiffError::InvalidValue("URL cannot be empty".into()));
        }
        Ok(Self { url, external })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn external(&self) -> bool {
        self.external
    }
}

/// A universal link opened in the external browser / app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct UniversalLink(String);

impl UniversalLink {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into();
        if url::Url::parse(&url).is_err() {
            return Err(LiffError::InvalidValue(format!("invalid universal link: {url}")));
        }
        Ok(Self(url))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A permanent link produced by `permanentLink.createUrlBy`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PermanentLink(pub String);

// ── Messages ───────────────────────────────────────────────────────────

/// Maximum number of messages the SDK accepts in one send / share call.
pub const MAX_MESSAGES_PER_CALL: usize = 5;

/// One to five message objects, each carrying a string `type`.
///
/// Message bodies are forwarded verbatim; only the envelope is checked.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MessageBatch(Vec<serde_json::Value>);

impl MessageBatch {
    pub fn new(messages: Vec<serde_json::Value>) -> Result<Self> {
        if messages.is_empty() || messages.len() > MAX_MESSAGES_PER_CALL {
            return Err(LiffError::InvalidValue(format!(
                "expected 1 to {MAX_MESSAGES_PER_CALL} messages, got {}",
                messages.len()
            )));
        }
        for (i, m) in messages.iter().enumerate() {
            if !m.get("type").is_some_and(|t| t.is_string()) {
                return Err(LiffError::InvalidValue(format!("message {i} has no type")));
            }
        }
        Ok(Self(messages))
    }

    /// Convenience for a single plain-text message.
    pub fn text(text: &str) -> Self {
        Self(vec![serde_json::json!({ "type": "text", "text": text })])
    }

    pub fn as_slice(&self) -> &[serde_json::Value] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// ── Tokens ─────────────────────────────────────────────────────────────

#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        if token.is_empty() {
            return Err(LiffError::InvalidValue("Access token cannot be empty".into()));
        }
        Ok(Self(token))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// First six and last four characters, for logs.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 10 {
            return "...".to_string();
        }
        let head: String = chars[..6].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AccessToken({})", self.masked())
    }
}

/// Raw (encoded) ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct IdToken(pub String);

/// Payload of the ID token as decoded by the SDK.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecodedIdToken {
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub aud: Option<String>,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub auth_time: Option<i64>,
    #[serde(default)]
    pub nonce: Option<String>,
    #[serde(default)]
    pub amr: Vec<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

impl DecodedIdToken {
    /// Parse the SDK's decoded payload; `exp` and `iat` are mandatory.
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value)
            .map_err(|e| LiffError::InvalidValue(format!("decoded ID token: {e}")))
    }

    pub fn is_expired(&self) -> bool {
        chrono::Utc::now().timestamp() >= self.exp
    }

    pub fn user_id(&self) -> Option<&str> {
        self.sub.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

// ── Context ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextType {
    #[serde(rename = "utou")]
    OneToOne,
    #[serde(rename = "room")]
    Room,
    #[serde(rename = "group")]
    Group,
    #[serde(rename = "square_chat")]
    SquareChat,
    #[serde(rename = "external")]
    External,
    #[serde(rename = "none")]
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    Compact,
    Tall,
    Full,
}

/// Where the LIFF app was launched from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiffContext {
    #[serde(rename = "type")]
    pub kind: ContextType,
    #[serde(default)]
    pub view_type: Option<ViewType>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub utou_id: Option<String>,
    #[serde(default)]
    pub room_id: Option<String>,
    #[serde(default)]
    pub group_id: Option<String>,
    #[serde(default)]
    pub square_chat_id: Option<String>,
}

impl LiffContext {
    pub fn is_one_to_one(&self) -> bool {
        self.kind == ContextType::OneToOne
    }

    pub fn is_room(&self) -> bool {
        self.kind == ContextType::Room
    }

    pub fn is_group(&self) -> bool {
        self.kind == ContextType::Group
    }

    pub fn is_square_chat(&self) -> bool {
        self.kind == ContextType::SquareChat
    }

    pub fn is_external(&self) -> bool {
        self.kind == ContextType::External
    }
}
