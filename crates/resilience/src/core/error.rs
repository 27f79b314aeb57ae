//! Classified error model

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::constants::REDACTED;

// =============================================================================
// KIND AND SEVERITY
// =============================================================================

/// Category a failure was sorted into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The remote end could not be reached.
    Network,
    /// The remote end answered with an error.
    RemoteApi,
    /// The request carried bad input.
    Validation,
    /// The user is not (or no longer) signed in.
    Authentication,
    /// The user is signed in but not allowed to do this.
    Permission,
    /// Saving or loading files failed.
    Storage,
    /// Nothing else matched.
    Unknown,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Network,
        Self::RemoteApi,
        Self::Validation,
        Self::Authentication,
        Self::Permission,
        Self::Storage,
        Self::Unknown,
    ];

    /// Stable snake_case name, as used in serialized reports.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::RemoteApi => "remote_api",
            Self::Validation => "validation",
            Self::Authentication => "authentication",
            Self::Permission => "permission",
            Self::Storage => "storage",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How bad a failure is. Ordered: `Low < Medium < High < Critical`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Cosmetic or easily corrected.
    Low,
    /// The operation failed but the session is fine.
    #[default]
    Medium,
    /// The service is misbehaving.
    High,
    /// The user cannot continue without intervention.
    Critical,
}

impl Severity {
    /// Every severity, lowest first.
    pub const ALL: [Self; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// High and critical failures get longer, prioritized notices.
    pub const fn is_elevated(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user can do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    /// Trying again right away is reasonable.
    Retry,
    /// Trying again after a while is reasonable.
    RetryLater,
    /// Connectivity should be checked first.
    CheckConnection,
    /// The user has to sign in.
    SignIn,
    /// Only support can help.
    ContactSupport,
    /// The input has to be corrected.
    FixInput,
}

impl SuggestedAction {
    /// Stable snake_case name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retry => "retry",
            Self::RetryLater => "retry_later",
            Self::CheckConnection => "check_connection",
            Self::SignIn => "sign_in",
            Self::ContactSupport => "contact_support",
            Self::FixInput => "fix_input",
        }
    }
}

impl fmt::Display for SuggestedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Free-form diagnostic context attached to a failure.
///
/// Keys are kept sorted so serialized reports are stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorContext(BTreeMap<String, Value>);

impl ErrorContext {
    /// Keys whose values never leave the process in clear text.
    pub const SENSITIVE_KEYS: [&'static str; 5] = ["password", "token", "api_key", "apiKey", "secret"];

    /// Empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert or overwrite a key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    /// Look a key up.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Look a key up as a string.
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// Whether the key is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Copy every entry of `other` over this context.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.0 {
            self.0.insert(key.clone(), value.clone());
        }
    }

    /// Replace the values of sensitive keys with a placeholder.
    pub fn redact(&mut self) {
        for (key, value) in &mut self.0 {
            if Self::is_sensitive(key) {
                *value = Value::String(REDACTED.to_owned());
            }
        }
    }

    /// Whether a key names a credential.
    pub fn is_sensitive(key: &str) -> bool {
        Self::SENSITIVE_KEYS
            .iter()
            .any(|sensitive| key.eq_ignore_ascii_case(sensitive))
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the context is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for ErrorContext
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

// =============================================================================
// CLASSIFIED ERROR
// =============================================================================

/// A failure after classification.
///
/// Immutable once built. The classifier is the usual producer; custom sinks
/// and tests may build their own through [`ClassifiedError::new`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind} error ({severity}): {raw_message}")]
pub struct ClassifiedError {
    id: Uuid,
    kind: ErrorKind,
    severity: Severity,
    raw_message: String,
    user_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "ErrorContext::is_empty")]
    context: ErrorContext,
}

impl ClassifiedError {
    /// Build a record stamped with a fresh id and the current time.
    pub fn new(
        kind: ErrorKind,
        severity: Severity,
        raw_message: impl Into<String>,
        user_message: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            severity,
            raw_message: raw_message.into(),
            user_message: user_message.into(),
            code: None,
            status: None,
            timestamp: Utc::now(),
            context: ErrorContext::new(),
        }
    }

    /// Attach an upstream error code.
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Attach the upstream HTTP status.
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Attach diagnostic context. Sensitive keys are redacted on the way in.
    pub fn with_context(mut self, mut context: ErrorContext) -> Self {
        context.redact();
        self.context = context;
        self
    }

    /// Unique id of this occurrence.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Category.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Severity.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// The failure's own description, for logs.
    pub fn raw_message(&self) -> &str {
        &self.raw_message
    }

    /// Text safe to show the user.
    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Upstream error code, or the HTTP status as text.
    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// Upstream HTTP status.
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    /// When the failure was classified.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Diagnostic context, already redacted.
    pub fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// The upstream reported a 5xx status.
    pub fn is_server_error(&self) -> bool {
        matches!(self.status, Some(500..=599))
    }

    /// What the user can do about it.
    pub fn suggested_action(&self) -> SuggestedAction {
        match self.kind {
            ErrorKind::Network => SuggestedAction::CheckConnection,
            ErrorKind::RemoteApi if self.is_server_error() => SuggestedAction::RetryLater,
            ErrorKind::RemoteApi if self.status == Some(429) => SuggestedAction::RetryLater,
            ErrorKind::RemoteApi => SuggestedAction::Retry,
            ErrorKind::Validation => SuggestedAction::FixInput,
            ErrorKind::Authentication => SuggestedAction::SignIn,
            ErrorKind::Permission => SuggestedAction::ContactSupport,
            ErrorKind::Storage => SuggestedAction::RetryLater,
            ErrorKind::Unknown if self.severity >= Severity::High => {
                SuggestedAction::ContactSupport
            }
            ErrorKind::Unknown => SuggestedAction::Retry,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert!(Severity::Critical.is_elevated());
        assert!(!Severity::Medium.is_elevated());
    }

    #[test]
    fn context_redacts_credentials() {
        let context = ErrorContext::new()
            .with("password", "hunter2")
            .with("apiKey", "abc")
            .with("API_KEY", "def")
            .with("component", "login");

        let error = ClassifiedError::new(ErrorKind::Authentication, Severity::Medium, "bad", "Bad")
            .with_context(context);

        assert_eq!(error.context().get_str("password"), Some(REDACTED));
        assert_eq!(error.context().get_str("apiKey"), Some(REDACTED));
        assert_eq!(error.context().get_str("API_KEY"), Some(REDACTED));
        assert_eq!(error.context().get_str("component"), Some("login"));
    }

    #[test]
    fn ids_are_unique() {
        let a = ClassifiedError::new(ErrorKind::Unknown, Severity::Medium, "x", "y");
        let b = ClassifiedError::new(ErrorKind::Unknown, Severity::Medium, "x", "y");
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn serializes_with_snake_case_kind() {
        let error = ClassifiedError::new(ErrorKind::RemoteApi, Severity::High, "boom", "Oops")
            .with_status(503)
            .with_code("503");

        let value = serde_json::to_value(&error).expect("serializes");
        assert_eq!(value["kind"], json!("remote_api"));
        assert_eq!(value["severity"], json!("high"));
        assert_eq!(value["status"], json!(503));
        assert!(value.get("context").is_none());

        let back: ClassifiedError = serde_json::from_value(value).expect("deserializes");
        assert_eq!(back, error);
    }

    #[test]
    fn suggested_action_follows_kind_and_status() {
        let server = ClassifiedError::new(ErrorKind::RemoteApi, Severity::High, "x", "y")
            .with_status(502);
        let client = ClassifiedError::new(ErrorKind::RemoteApi, Severity::Low, "x", "y")
            .with_status(404);
        let auth = ClassifiedError::new(ErrorKind::Authentication, Severity::Critical, "x", "y");

        assert_eq!(server.suggested_action(), SuggestedAction::RetryLater);
        assert_eq!(client.suggested_action(), SuggestedAction::Retry);
        assert_eq!(auth.suggested_action(), SuggestedAction::SignIn);
    }

    #[test]
    fn display_includes_kind_and_raw_message() {
        let error = ClassifiedError::new(ErrorKind::Network, Severity::Medium, "Failed to fetch", "u");
        assert_eq!(error.to_string(), "network error (medium): Failed to fetch");
    }
}
