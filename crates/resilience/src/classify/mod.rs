//! Failure classification
//!
//! Turns any [`RawFailure`] into a [`ClassifiedError`]. Classification is
//! total: input that matches nothing ends up as `unknown`/`medium` with a
//! generic user message.
//!
//! Evaluation order:
//!
//! 1. message rules (first match wins)
//! 2. HTTP status bucketing
//! 3. failure shape (timeout, transport)
//! 4. keyword fallback
//! 5. generic fallback
//!
//! # Example
//!
//! ```rust
//! use tether_resilience::{ErrorKind, RawFailure, Severity, classify, should_retry};
//!
//! let error = classify(RawFailure::from_status(503), None);
//! assert_eq!(error.kind(), ErrorKind::RemoteApi);
//! assert_eq!(error.severity(), Severity::High);
//! assert!(should_retry(&error));
//! ```

mod backoff;
mod rules;

use std::sync::{Arc, LazyLock};

use parking_lot::RwLock;
use tracing::trace;

use crate::core::{ClassifiedError, ErrorContext, ErrorKind, RawFailure};

pub use backoff::{BackoffSchedule, retry_delay};
pub use rules::{PatternRule, Verdict, default_rules};

// =============================================================================
// AMBIENT CONTEXT
// =============================================================================

/// Supplies the ambient tags stamped into every error context.
///
/// Ambient tags win over caller-supplied keys of the same name.
pub trait ContextProvider: Send + Sync {
    /// Where in the application the user currently is, if known.
    fn location(&self) -> Option<String>;

    /// Identifier of this client.
    fn client_id(&self) -> String;
}

/// Mutable ambient context: a fixed client id plus a location the
/// application updates as the user navigates.
#[derive(Debug)]
pub struct AmbientContext {
    client_id: String,
    location: RwLock<Option<String>>,
}

impl AmbientContext {
    /// Context for the given client id and no location.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            location: RwLock::new(None),
        }
    }

    /// Record the current location.
    pub fn set_location(&self, location: impl Into<String>) {
        *self.location.write() = Some(location.into());
    }

    /// Forget the current location.
    pub fn clear_location(&self) {
        *self.location.write() = None;
    }
}

impl Default for AmbientContext {
    fn default() -> Self {
        Self::new(crate::core::ClientConfig::default().client_id)
    }
}

impl ContextProvider for AmbientContext {
    fn location(&self) -> Option<String> {
        self.location.read().clone()
    }

    fn client_id(&self) -> String {
        self.client_id.clone()
    }
}

// =============================================================================
// CLASSIFIER
// =============================================================================

/// Stateless classifier over an ordered rule table.
#[derive(Clone)]
pub struct Classifier {
    rules: Arc<[PatternRule]>,
    ambient: Arc<dyn ContextProvider>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("rules", &self.rules.len())
            .field("client_id", &self.ambient.client_id())
            .finish()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Classifier {
    /// Classifier with the built-in rules and default ambient context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start building a customised classifier.
    pub fn builder() -> ClassifierBuilder {
        ClassifierBuilder::default()
    }

    /// The rules in evaluation order.
    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// Classify a failure. Never fails.
    pub fn classify(
        &self,
        failure: impl Into<RawFailure>,
        context: Option<&ErrorContext>,
    ) -> ClassifiedError {
        let failure = failure.into();
        let raw_message = failure.message_or_default().to_owned();
        let lowered = raw_message.to_lowercase();

        let verdict = self
            .rules
            .iter()
            .find(|rule| rule.is_match(&lowered))
            .map(|rule| {
                trace!(rule = rule.name(), "message rule matched");
                rule.verdict().clone()
            })
            .or_else(|| failure.status().and_then(rules::by_status))
            .or_else(|| rules::by_shape(failure.shape()))
            .or_else(|| rules::by_keyword(&lowered))
            .unwrap_or_else(rules::fallback);

        let mut error = ClassifiedError::new(
            verdict.kind,
            verdict.severity,
            raw_message,
            verdict.user_message,
        )
        .with_context(self.merged_context(context));

        if let Some(status) = failure.status() {
            error = error.with_status(status);
        }
        match (failure.code(), failure.status()) {
            (Some(code), _) => error.with_code(code),
            (None, Some(status)) => error.with_code(status.to_string()),
            (None, None) => error,
        }
    }

    fn merged_context(&self, context: Option<&ErrorContext>) -> ErrorContext {
        let mut merged = context.cloned().unwrap_or_default();
        if let Some(location) = self.ambient.location() {
            merged.insert("location", location);
        }
        merged.insert("client_id", self.ambient.client_id());
        merged
    }
}

/// Builder for [`Classifier`].
pub struct ClassifierBuilder {
    rules: Vec<PatternRule>,
    ambient: Arc<dyn ContextProvider>,
}

impl Default for ClassifierBuilder {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            ambient: Arc::new(AmbientContext::default()),
        }
    }
}

impl ClassifierBuilder {
    /// Evaluate `rule` before every rule added so far.
    pub fn prepend_rule(mut self, rule: PatternRule) -> Self {
        self.rules.insert(0, rule);
        self
    }

    /// Evaluate `rule` after every rule added so far.
    pub fn append_rule(mut self, rule: PatternRule) -> Self {
        self.rules.push(rule);
        self
    }

    /// Replace the whole rule table.
    pub fn rules(mut self, rules: Vec<PatternRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Source of ambient tags.
    pub fn ambient(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.ambient = provider;
        self
    }

    /// Shorthand for a fixed client id with no location.
    pub fn client_id(self, client_id: impl Into<String>) -> Self {
        self.ambient(Arc::new(AmbientContext::new(client_id)))
    }

    /// Finish.
    pub fn build(self) -> Classifier {
        Classifier {
            rules: self.rules.into(),
            ambient: self.ambient,
        }
    }
}

static DEFAULT_CLASSIFIER: LazyLock<Classifier> = LazyLock::new(Classifier::default);

/// Classify with the built-in rules and default ambient context.
pub fn classify(failure: impl Into<RawFailure>, context: Option<&ErrorContext>) -> ClassifiedError {
    DEFAULT_CLASSIFIER.classify(failure, context)
}

/// Whether a classified failure is worth retrying.
///
/// Network failures always are. Remote API failures are when the upstream
/// answered 5xx or the message says the call timed out. Every other kind is
/// final.
pub fn should_retry(error: &ClassifiedError) -> bool {
    match error.kind() {
        ErrorKind::Network => true,
        ErrorKind::RemoteApi => {
            error.is_server_error() || rules::indicates_timeout(&error.raw_message().to_lowercase())
        }
        ErrorKind::Validation
        | ErrorKind::Authentication
        | ErrorKind::Permission
        | ErrorKind::Storage
        | ErrorKind::Unknown => false,
    }
}
