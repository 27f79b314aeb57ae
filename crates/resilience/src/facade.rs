//! Caller-facing composition of classifier, retry, reporting and notices

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::classify::{AmbientContext, Classifier, ContextProvider};
use crate::connectivity::ConnectivityMonitor;
use crate::core::{ClassifiedError, ConfigResult, ErrorContext, RawFailure, ResilienceConfig, Severity};
use crate::notify::{ConnectivityNotices, Lifetime, NotificationKind, NotificationQueue, Priority};
use crate::offline::{
    CacheOptions, OfflineCache, PendingOperation, PendingOperations, SyncHandler, SyncOnReconnect,
};
use crate::report::{HistorySink, ReportSink, Reporters, TracingSink, tags};
use crate::retry::RetryExecutor;

/// Result of a safe execution: data on success, a classified error on failure.
///
/// Both are set when a fallback value stood in for a failed operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    /// The operation's value, or the fallback.
    pub data: Option<T>,
    /// Why the operation failed.
    pub error: Option<ClassifiedError>,
}

impl<T> Outcome<T> {
    /// A successful outcome.
    pub fn success(data: T) -> Self {
        Self {
            data: Some(data),
            error: None,
        }
    }

    /// A failed outcome without data.
    pub fn failure(error: ClassifiedError) -> Self {
        Self {
            data: None,
            error: Some(error),
        }
    }

    /// Whether the operation succeeded.
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// The error, if any, wins over data.
    pub fn into_result(self) -> Result<Option<T>, ClassifiedError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.data),
        }
    }
}

impl<T> From<Result<T, ClassifiedError>> for Outcome<T> {
    fn from(result: Result<T, ClassifiedError>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(error) => Self::failure(error),
        }
    }
}

/// Entry point for application code.
///
/// ```rust
/// # async fn demo() {
/// use tether_resilience::{RawFailure, Resilience};
///
/// let resilience = Resilience::builder().build().expect("valid config");
/// let outcome = resilience
///     .safe_execute(|| async { Err::<(), _>(RawFailure::from_status(404)) }, None)
///     .await;
///
/// assert!(outcome.data.is_none());
/// assert_eq!(resilience.notifications().len(), 1);
/// # }
/// ```
pub struct Resilience {
    config: ResilienceConfig,
    executor: RetryExecutor,
    sink: Arc<dyn ReportSink>,
    history: Arc<HistorySink>,
    queue: NotificationQueue,
    monitor: Option<ConnectivityMonitor>,
    cache: OfflineCache,
    pending: PendingOperations,
    _connectivity_notices: Option<ConnectivityNotices>,
    _sync: Option<SyncOnReconnect>,
}

impl std::fmt::Debug for Resilience {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resilience")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .field("queue", &self.queue)
            .field("monitor", &self.monitor)
            .field("cache", &self.cache)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

impl Resilience {
    /// Start building.
    pub fn builder() -> ResilienceBuilder {
        ResilienceBuilder::default()
    }

    /// The active configuration.
    pub fn config(&self) -> &ResilienceConfig {
        &self.config
    }

    /// The notification queue renderers read from.
    pub fn notifications(&self) -> &NotificationQueue {
        &self.queue
    }

    /// In-memory history of every reported failure.
    pub fn history(&self) -> &HistorySink {
        &self.history
    }

    /// The connectivity monitor, when one is attached.
    pub fn monitor(&self) -> Option<&ConnectivityMonitor> {
        self.monitor.as_ref()
    }

    /// Last good results stored by the cached entry points.
    pub fn cache(&self) -> &OfflineCache {
        &self.cache
    }

    /// Operations queued with [`save_for_sync`](Self::save_for_sync).
    pub fn pending_operations(&self) -> &PendingOperations {
        &self.pending
    }

    /// Whether the attached monitor reports online. Without a monitor the
    /// network is assumed reachable.
    pub fn is_online(&self) -> bool {
        self.monitor.as_ref().is_none_or(ConnectivityMonitor::online)
    }

    /// The retry executor, for callers that want the raw `Result`.
    pub fn executor(&self) -> &RetryExecutor {
        &self.executor
    }

    /// Run with the safe retry bound; failures become a notified [`Outcome`].
    pub async fn safe_execute<T, E, F, Fut>(
        &self,
        operation: F,
        context: Option<&ErrorContext>,
    ) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawFailure>,
    {
        let context = self.enrich(context);
        match self
            .executor
            .run(operation, self.config.retry.safe_max_retries, Some(&context))
            .await
        {
            Ok(data) => Outcome::success(data),
            Err(error) => {
                self.notify(&error);
                Outcome::failure(error)
            }
        }
    }

    /// Like [`safe_execute`](Self::safe_execute), but a failure yields
    /// `fallback` as data next to the error.
    pub async fn safe_execute_or<T, E, F, Fut>(
        &self,
        operation: F,
        fallback: T,
        context: Option<&ErrorContext>,
    ) -> Outcome<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawFailure>,
    {
        let mut outcome = self.safe_execute(operation, context).await;
        if outcome.error.is_some() {
            outcome.data = Some(fallback);
        }
        outcome
    }

    /// Like [`safe_execute`](Self::safe_execute), remembering each success
    /// under `key`. A failure yields the cached value, if still fresh, as data
    /// next to the error.
    pub async fn safe_execute_cached<T, E, F, Fut>(
        &self,
        key: &str,
        operation: F,
        context: Option<&ErrorContext>,
    ) -> Outcome<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawFailure>,
    {
        match self.safe_execute(operation, context).await {
            Outcome {
                data: Some(data),
                error: None,
            } => {
                self.cache.put(key, &data);
                Outcome::success(data)
            }
            Outcome {
                error: Some(error), ..
            } => {
                let data = self.cache.get(key);
                debug!(key, cached = data.is_some(), "operation failed, checked cache");
                Outcome {
                    data,
                    error: Some(error),
                }
            }
            outcome => outcome,
        }
    }

    /// Fetch fresh data when online and cache it; otherwise, or when the
    /// single fetch attempt fails, serve the cached value for `key`.
    ///
    /// Failures are logged but neither reported nor notified.
    pub async fn fetch_or_cached<T, E, F, Fut>(
        &self,
        key: &str,
        fetch: F,
        options: CacheOptions,
    ) -> Option<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawFailure>,
    {
        if self.is_online() {
            match fetch().await {
                Ok(data) => {
                    self.cache.put(key, &data);
                    return Some(data);
                }
                Err(error) => {
                    let failure: RawFailure = error.into();
                    warn!(key, error = failure.message_or_default(), "fetch failed");
                }
            }
        } else {
            debug!(key, "offline, skipping fetch");
        }

        if !options.fallback_to_cache {
            return None;
        }
        let max_age = options.max_age.unwrap_or_else(|| self.cache.max_age());
        self.cache.get_within(key, max_age)
    }

    /// Queue a write to replay once connectivity returns.
    pub fn save_for_sync<T>(
        &self,
        operation: impl Into<String>,
        data: &T,
    ) -> Result<(), serde_json::Error>
    where
        T: Serialize + ?Sized,
    {
        self.pending.save_for_sync(operation, data)
    }

    /// Run with retry and hand the classified error back to the caller.
    ///
    /// A terminal failure is notified once before it is returned.
    /// `max_retries` of `None` uses the configured default.
    pub async fn execute_with_retry<T, E, F, Fut>(
        &self,
        operation: F,
        max_retries: Option<u32>,
        context: Option<&ErrorContext>,
    ) -> Result<T, ClassifiedError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<RawFailure>,
    {
        let context = self.enrich(context);
        let max_retries = max_retries.unwrap_or(self.config.retry.max_retries);
        let result = self.executor.run(operation, max_retries, Some(&context)).await;
        if let Err(error) = &result {
            self.notify(error);
        }
        result
    }

    /// Classify, report and notify a failure that happened outside an
    /// executed operation.
    pub fn handle_error(
        &self,
        failure: impl Into<RawFailure>,
        context: Option<&ErrorContext>,
    ) -> ClassifiedError {
        let context = self.enrich(context);
        let error = self.executor.classifier().classify(failure, Some(&context));
        self.sink
            .report(&error, &ErrorContext::new().with(tags::STAGE, "handled"));
        self.notify(&error);
        error
    }

    fn enrich(&self, context: Option<&ErrorContext>) -> ErrorContext {
        let mut enriched = context.cloned().unwrap_or_default();
        if let Some(monitor) = &self.monitor {
            enriched.insert("online", monitor.online());
        }
        enriched
    }

    fn notify(&self, error: &ClassifiedError) {
        let settings = &self.config.notifications;
        if !settings.enabled {
            debug!(error_id = %error.id(), "notifications disabled, not shown");
            return;
        }

        let (lifetime, priority) = if error.severity().is_elevated() {
            (Lifetime::Expires(settings.elevated_ttl), Priority::Elevated)
        } else {
            (Lifetime::Expires(settings.default_ttl), Priority::Normal)
        };
        let kind = if error.severity() == Severity::Low {
            NotificationKind::Warning
        } else {
            NotificationKind::Error
        };
        self.queue
            .push(error.user_message(), kind, lifetime, priority);
    }
}

/// Builder for [`Resilience`].
#[derive(Default)]
pub struct ResilienceBuilder {
    config: Option<ResilienceConfig>,
    sinks: Vec<Arc<dyn ReportSink>>,
    ambient: Option<Arc<dyn ContextProvider>>,
    classifier: Option<Classifier>,
    queue: Option<NotificationQueue>,
    monitor: Option<ConnectivityMonitor>,
    on_sync: Option<SyncHandler>,
}

impl ResilienceBuilder {
    /// Use this configuration instead of the defaults.
    pub fn config(mut self, config: ResilienceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Report to `sink` in addition to tracing and the history.
    pub fn sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Source of ambient context tags. Defaults to the configured client id.
    pub fn ambient(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.ambient = Some(provider);
        self
    }

    /// Use a customised classifier. Overrides [`ambient`](Self::ambient).
    pub fn classifier(mut self, classifier: Classifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Post into an existing queue.
    pub fn queue(mut self, queue: NotificationQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Attach a connectivity monitor. It is initialized if it was not already.
    pub fn monitor(mut self, monitor: ConnectivityMonitor) -> Self {
        self.monitor = Some(monitor);
        self
    }

    /// Receive queued operations each time the attached monitor reconnects.
    /// Without a handler they stay queued until drained by hand.
    pub fn on_sync<F>(mut self, handler: F) -> Self
    where
        F: Fn(Vec<PendingOperation>) + Send + Sync + 'static,
    {
        self.on_sync = Some(Arc::new(handler));
        self
    }

    /// Validate the configuration and assemble.
    pub fn build(self) -> ConfigResult<Resilience> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let classifier = match self.classifier {
            Some(classifier) => classifier,
            None => {
                let ambient = self.ambient.unwrap_or_else(|| {
                    Arc::new(AmbientContext::new(config.client.client_id.clone()))
                });
                Classifier::builder().ambient(ambient).build()
            }
        };

        let history = Arc::new(HistorySink::new(config.history.capacity));
        let mut reporters = Reporters::new()
            .with_sink(Arc::new(TracingSink))
            .with_sink(history.clone());
        for sink in self.sinks {
            reporters = reporters.with_sink(sink);
        }
        let sink: Arc<dyn ReportSink> = Arc::new(reporters);

        let executor = RetryExecutor::from_config(&config.retry, Arc::new(classifier), sink.clone());
        let queue = self
            .queue
            .unwrap_or_else(|| NotificationQueue::new(config.notifications.default_ttl));

        let cache = OfflineCache::from_config(&config.cache);
        let pending = PendingOperations::new();

        let connectivity_notices = self.monitor.as_ref().and_then(|monitor| {
            monitor.init();
            let settings = &config.notifications;
            (settings.enabled && settings.offline_notices).then(|| {
                ConnectivityNotices::attach(monitor, &queue, settings.reconnected_ttl)
            })
        });

        let sync = match (&self.monitor, self.on_sync) {
            (Some(monitor), Some(handler)) => {
                Some(SyncOnReconnect::attach(monitor, &pending, handler))
            }
            _ => None,
        };

        Ok(Resilience {
            config,
            executor,
            sink,
            history,
            queue,
            monitor: self.monitor,
            cache,
            pending,
            _connectivity_notices: connectivity_notices,
            _sync: sync,
        })
    }
}
