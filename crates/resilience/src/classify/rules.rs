//! Ordered classification rules
//!
//! Message rules run against the lowercased raw message and the first match
//! wins. Status bucketing, shape and keyword fallbacks follow in that order.

use std::borrow::Cow;
use std::fmt;

use crate::core::{ErrorKind, FailureShape, Severity};

/// Classification result produced by a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Assigned kind.
    pub kind: ErrorKind,
    /// Assigned severity.
    pub severity: Severity,
    /// Text shown to the user.
    pub user_message: Cow<'static, str>,
}

impl Verdict {
    /// Verdict with a static user message.
    pub const fn new(kind: ErrorKind, severity: Severity, user_message: &'static str) -> Self {
        Self {
            kind,
            severity,
            user_message: Cow::Borrowed(user_message),
        }
    }

    /// Verdict with an owned user message.
    pub fn owned(kind: ErrorKind, severity: Severity, user_message: impl Into<String>) -> Self {
        Self {
            kind,
            severity,
            user_message: Cow::Owned(user_message.into()),
        }
    }
}

/// A named predicate over the lowercased raw message.
#[derive(Clone)]
pub struct PatternRule {
    name: &'static str,
    matches: fn(&str) -> bool,
    verdict: Verdict,
}

impl PatternRule {
    /// Build a rule. `matches` receives the message already lowercased.
    pub const fn new(name: &'static str, matches: fn(&str) -> bool, verdict: Verdict) -> Self {
        Self {
            name,
            matches,
            verdict,
        }
    }

    /// Rule name, for logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the rule fires for this (lowercased) message.
    pub fn is_match(&self, lowered: &str) -> bool {
        (self.matches)(lowered)
    }

    /// What the rule assigns.
    pub fn verdict(&self) -> &Verdict {
        &self.verdict
    }
}

impl fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRule")
            .field("name", &self.name)
            .field("verdict", &self.verdict)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// USER MESSAGES
// =============================================================================

pub(crate) const MSG_SESSION_EXPIRED: &str = "Your session has expired. Please sign in again.";
pub(crate) const MSG_CANNOT_CONNECT: &str =
    "Unable to connect to the server. Please check your internet connection and try again.";
pub(crate) const MSG_INVALID_CREDENTIALS: &str = "Invalid email or password. Please try again.";
pub(crate) const MSG_EMAIL_UNCONFIRMED: &str = "Please verify your email address before signing in.";
pub(crate) const MSG_RATE_LIMITED: &str = "Too many requests. Please wait a moment and try again.";
pub(crate) const MSG_NO_PERMISSION: &str = "You don't have permission to perform this action.";
pub(crate) const MSG_TIMED_OUT: &str = "The request took too long. Please try again.";
pub(crate) const MSG_DUPLICATE: &str = "This information already exists.";
pub(crate) const MSG_STORAGE: &str =
    "There was a problem saving your file. Please try a smaller file or try again later.";
pub(crate) const MSG_MAINTENANCE: &str =
    "The service is undergoing maintenance. Please try again shortly.";
pub(crate) const MSG_SIGN_IN: &str = "Please sign in to continue.";
pub(crate) const MSG_BAD_REQUEST: &str =
    "Something was wrong with the request. Please check your input and try again.";
pub(crate) const MSG_SERVER: &str = "The server encountered a problem. Please try again later.";
pub(crate) const MSG_INVALID_EMAIL: &str = "Please enter a valid email address.";
pub(crate) const MSG_INVALID_PASSWORD: &str = "Please check your password and try again.";
pub(crate) const MSG_REQUIRED: &str = "Please fill in all required fields.";
pub(crate) const MSG_CHECK_INPUT: &str = "Please check your input and try again.";
pub(crate) const MSG_UNEXPECTED: &str = "An unexpected error occurred. Please try again.";

// =============================================================================
// MESSAGE RULES
// =============================================================================

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

fn session_missing(m: &str) -> bool {
    contains_any(
        m,
        &["session missing", "session expired", "session not found", "jwt expired"],
    )
}

fn fetch_failed(m: &str) -> bool {
    contains_any(
        m,
        &[
            "failed to fetch",
            "fetch failed",
            "network request failed",
            "networkerror",
            "network error",
            "load failed",
        ],
    )
}

fn invalid_credentials(m: &str) -> bool {
    contains_any(
        m,
        &["invalid login credentials", "invalid credentials", "invalid email or password"],
    )
}

fn email_not_confirmed(m: &str) -> bool {
    m.contains("email not confirmed")
}

fn rate_limited(m: &str) -> bool {
    contains_any(m, &["rate limit", "too many requests"])
}

fn access_denied(m: &str) -> bool {
    contains_any(m, &["permission denied", "access denied", "forbidden"])
}

pub(crate) fn indicates_timeout(m: &str) -> bool {
    contains_any(m, &["timed out", "timeout"])
}

fn duplicate_entry(m: &str) -> bool {
    contains_any(m, &["duplicate", "unique constraint", "already exists"])
}

fn storage_failure(m: &str) -> bool {
    contains_any(
        m,
        &["quota exceeded", "storage full", "file too large", "payload too large"],
    )
}

fn maintenance(m: &str) -> bool {
    m.contains("maintenance")
}

/// The built-in message table, in evaluation order.
pub fn default_rules() -> Vec<PatternRule> {
    vec![
        PatternRule::new(
            "session_missing",
            session_missing,
            Verdict::new(ErrorKind::Authentication, Severity::Critical, MSG_SESSION_EXPIRED),
        ),
        PatternRule::new(
            "fetch_failed",
            fetch_failed,
            Verdict::new(ErrorKind::Network, Severity::Medium, MSG_CANNOT_CONNECT),
        ),
        PatternRule::new(
            "invalid_credentials",
            invalid_credentials,
            Verdict::new(ErrorKind::Authentication, Severity::Medium, MSG_INVALID_CREDENTIALS),
        ),
        PatternRule::new(
            "email_not_confirmed",
            email_not_confirmed,
            Verdict::new(ErrorKind::Authentication, Severity::Low, MSG_EMAIL_UNCONFIRMED),
        ),
        PatternRule::new(
            "rate_limited",
            rate_limited,
            Verdict::new(ErrorKind::RemoteApi, Severity::Medium, MSG_RATE_LIMITED),
        ),
        PatternRule::new(
            "access_denied",
            access_denied,
            Verdict::new(ErrorKind::Permission, Severity::High, MSG_NO_PERMISSION),
        ),
        PatternRule::new(
            "timed_out",
            indicates_timeout,
            Verdict::new(ErrorKind::Network, Severity::Medium, MSG_TIMED_OUT),
        ),
        PatternRule::new(
            "duplicate_entry",
            duplicate_entry,
            Verdict::new(ErrorKind::Validation, Severity::Low, MSG_DUPLICATE),
        ),
        PatternRule::new(
            "storage_failure",
            storage_failure,
            Verdict::new(ErrorKind::Storage, Severity::Medium, MSG_STORAGE),
        ),
        PatternRule::new(
            "maintenance",
            maintenance,
            Verdict::new(ErrorKind::RemoteApi, Severity::High, MSG_MAINTENANCE),
        ),
    ]
}

// =============================================================================
// FALLBACKS
// =============================================================================

/// Bucket an HTTP status. Statuses outside 400..=599 carry no signal.
pub(crate) fn by_status(status: u16) -> Option<Verdict> {
    let verdict = match status {
        401 => Verdict::new(ErrorKind::Authentication, Severity::Medium, MSG_SIGN_IN),
        403 => Verdict::new(ErrorKind::Permission, Severity::Medium, MSG_NO_PERMISSION),
        429 => Verdict::new(ErrorKind::RemoteApi, Severity::Medium, MSG_RATE_LIMITED),
        400..=499 => Verdict::new(ErrorKind::RemoteApi, Severity::Low, MSG_BAD_REQUEST),
        500..=599 => Verdict::new(ErrorKind::RemoteApi, Severity::High, MSG_SERVER),
        _ => return None,
    };
    Some(verdict)
}

pub(crate) fn by_shape(shape: FailureShape) -> Option<Verdict> {
    match shape {
        FailureShape::Timeout => Some(Verdict::new(
            ErrorKind::Network,
            Severity::Medium,
            MSG_TIMED_OUT,
        )),
        FailureShape::Transport => Some(Verdict::new(
            ErrorKind::Network,
            Severity::Medium,
            MSG_CANNOT_CONNECT,
        )),
        FailureShape::Unspecified => None,
    }
}

pub(crate) fn by_keyword(m: &str) -> Option<Verdict> {
    if contains_any(m, &["validation", "invalid", "required"]) {
        let user_message = if m.contains("email") {
            MSG_INVALID_EMAIL
        } else if m.contains("password") {
            MSG_INVALID_PASSWORD
        } else if m.contains("required") {
            MSG_REQUIRED
        } else {
            MSG_CHECK_INPUT
        };
        return Some(Verdict::new(ErrorKind::Validation, Severity::Low, user_message));
    }

    if contains_any(m, &["auth", "login", "credential"]) {
        return Some(Verdict::new(
            ErrorKind::Authentication,
            Severity::Medium,
            MSG_SIGN_IN,
        ));
    }

    None
}

pub(crate) const fn fallback() -> Verdict {
    Verdict::new(ErrorKind::Unknown, Severity::Medium, MSG_UNEXPECTED)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_names_are_unique() {
        let rules = default_rules();
        let mut names: Vec<_> = rules.iter().map(PatternRule::name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), rules.len());
    }

    #[test]
    fn status_buckets() {
        assert_eq!(by_status(401).map(|v| v.kind), Some(ErrorKind::Authentication));
        assert_eq!(by_status(403).map(|v| v.kind), Some(ErrorKind::Permission));
        assert_eq!(by_status(404).map(|v| v.severity), Some(Severity::Low));
        assert_eq!(by_status(503).map(|v| v.severity), Some(Severity::High));
        assert!(by_status(200).is_none());
        assert!(by_status(0).is_none());
    }

    #[test]
    fn keyword_fallback_refines_validation_message() {
        let verdict = by_keyword("invalid email format").expect("validation keyword");
        assert_eq!(verdict.kind, ErrorKind::Validation);
        assert_eq!(verdict.user_message, MSG_INVALID_EMAIL);

        let verdict = by_keyword("name is required").expect("validation keyword");
        assert_eq!(verdict.user_message, MSG_REQUIRED);

        assert!(by_keyword("disk on fire").is_none());
    }
}
