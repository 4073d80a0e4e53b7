//! The error handler: one terminal sink for every failure in the services.
//!
//! # Contract
//!
//! [`ErrorHandler::handle_error`] always returns normally. Whatever a
//! collaborator does (a sink that panics, an environment probe that panics,
//! a reporter that fails) is contained here and never reaches the caller.
//!
//! # Per-call Steps
//!
//! 1. Complete the context from the error and stamp it (timestamp, user agent, location)
//! 2. Log `"<Name>: <message>"` at the level the severity maps to
//! 3. Append to the bounded queue, evicting the oldest entry when full
//! 4. For `Critical` only: report (production) and surface (interactive)
//!
//! # Instances
//!
//! Handlers are cheap to clone and clones share their queue. Library code
//! should take a handler (or a `&ErrorHandler`) from its caller;
//! [`ErrorHandler::global`] exists for call sites that have no way to
//! receive one.

use crate::environment::{Environment, ProcessEnvironment};
use crate::logging::{LogLevel, LogRecord, LogSink, TracingSink};
use crate::reporting::{self, ErrorReport, ErrorReporter, LogReporter, ReportDispatch};
use crate::ring_buffer::{ErrorQueue, QueueEntry};
use crate::transport::{RawTransportError, TransportFailure};
use crate::{AppError, ErrorCode, ErrorContext, HandledError, Severity, ValidationErrors};
use chrono::Utc;
use serde::Serialize;
use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock};

/// Default number of queued errors.
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 100;

/// Default label on every handler log line.
pub const DEFAULT_LOG_LABEL: &str = "error-handler";

/// Environment variable overriding the queue size of the global handler.
pub const ENV_QUEUE_SIZE_VAR: &str = "QUOTEFAST_ERROR_QUEUE_SIZE";

static GLOBAL: OnceLock<ErrorHandler> = OnceLock::new();

/// Run `f`, turning a panic into `None`.
pub(crate) fn guarded<R>(f: impl FnOnce() -> R) -> Option<R> {
    catch_unwind(AssertUnwindSafe(f)).ok()
}

// ============================================================================
// Configuration
// ============================================================================

/// Handler tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerConfig {
    /// Queue capacity. Values below one are treated as one.
    pub max_queue_size: usize,
    /// Label attached to every log record.
    pub log_label: String,
    /// How critical reports are delivered.
    pub report_dispatch: ReportDispatch,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            log_label: DEFAULT_LOG_LABEL.to_owned(),
            report_dispatch: ReportDispatch::Detached,
        }
    }
}

impl HandlerConfig {
    /// Defaults, with the queue size read from [`ENV_QUEUE_SIZE_VAR`].
    ///
    /// An unparsable or zero value is logged and ignored.
    pub fn from_env() -> Self {
        let raw = std::env::var(ENV_QUEUE_SIZE_VAR).ok();
        Self {
            max_queue_size: parse_queue_size(raw.as_deref()),
            ..Self::default()
        }
    }
}

fn parse_queue_size(raw: Option<&str>) -> usize {
    let Some(raw) = raw else {
        return DEFAULT_MAX_QUEUE_SIZE;
    };
    match raw.trim().parse::<usize>() {
        Ok(size) if size > 0 => size,
        _ => {
            tracing::warn!(
                target: "quotefast_errors",
                value = raw,
                default = DEFAULT_MAX_QUEUE_SIZE,
                "ignoring invalid {}",
                ENV_QUEUE_SIZE_VAR
            );
            DEFAULT_MAX_QUEUE_SIZE
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Aggregate view of the queue at one instant.
///
/// `by_severity` always carries all four levels. `by_code` counts
/// classified errors only; native errors show up in `total` and
/// `by_severity` but have no code to be counted under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStats {
    /// Number of queued errors.
    pub total: usize,
    /// Count per severity.
    pub by_severity: BTreeMap<Severity, usize>,
    /// Count per registry code.
    pub by_code: BTreeMap<ErrorCode, usize>,
}

impl ErrorStats {
    /// Tally `entries`.
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a QueueEntry>) -> Self {
        let mut stats = Self {
            total: 0,
            by_severity: Severity::ALL.iter().map(|s| (*s, 0)).collect(),
            by_code: BTreeMap::new(),
        };
        for entry in entries {
            stats.total += 1;
            *stats.by_severity.entry(entry.severity).or_default() += 1;
            if let Some(code) = entry.error.code() {
                *stats.by_code.entry(code).or_default() += 1;
            }
        }
        stats
    }

    /// Count for one severity.
    pub fn severity(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }

    /// Count for one code.
    pub fn code(&self, code: ErrorCode) -> usize {
        self.by_code.get(&code).copied().unwrap_or(0)
    }
}

// ============================================================================
// Handler
// ============================================================================

/// Centralized error handler.
///
/// Built with [`ErrorHandler::builder`]; every collaborator has a default.
///
/// ```rust
/// use quotefast_errors::{ErrorCode, ErrorContext, ErrorHandler, Severity, ValidationErrors};
///
/// let handler = ErrorHandler::builder().max_queue_size(10).build();
///
/// let errors = ValidationErrors::new()
///     .with("email", "is required")
///     .with("postcode", "is invalid");
/// let err = handler.handle_validation_error(errors, ErrorContext::new().component("SignupForm"));
/// assert_eq!(err.message(), "Validation failed: is required, is invalid");
///
/// handler.handle_error(err, ErrorContext::new(), Severity::Low);
/// let stats = handler.error_stats();
/// assert_eq!(stats.total, 1);
/// assert_eq!(stats.code(ErrorCode::ValidationError), 1);
/// ```
#[derive(Clone)]
pub struct ErrorHandler {
    queue: ErrorQueue,
    sink: Arc<dyn LogSink>,
    reporter: Arc<dyn ErrorReporter>,
    env: Arc<dyn Environment>,
    config: Arc<HandlerConfig>,
}

impl ErrorHandler {
    /// Start configuring a handler.
    pub fn builder() -> ErrorHandlerBuilder {
        ErrorHandlerBuilder::default()
    }

    /// The process-wide handler, created with defaults on first use unless
    /// one was [`install`](Self::install)ed before.
    pub fn global() -> &'static ErrorHandler {
        GLOBAL.get_or_init(|| Self::builder().config(HandlerConfig::from_env()).build())
    }

    /// Make `handler` the process-wide handler.
    ///
    /// Fails, handing the handler back, once the global one exists.
    pub fn install(handler: ErrorHandler) -> Result<(), ErrorHandler> {
        GLOBAL.set(handler)
    }

    /// Log, record and, when critical, report an error. Never fails.
    ///
    /// Fields the call site leaves empty are filled from a classified
    /// error's own context, so a transport error keeps its endpoint in the
    /// queue. The context is then stamped; caller values for timestamp, user
    /// agent and location are replaced.
    pub fn handle_error(&self, error: impl Into<HandledError>, context: ErrorContext, severity: Severity) {
        let error = error.into();
        let mut context = context;
        if let Some(origin) = error.context() {
            context.inherit(origin);
        }
        self.stamp(&mut context);

        let line = error.log_line();
        self.log(
            LogRecord::new(severity.log_level(), &line, &self.config.log_label)
                .with_error(&error)
                .with_context(&context)
                .with_severity(severity),
        );

        let critical = (severity == Severity::Critical).then(|| (error.clone(), context.clone()));
        self.queue.push(QueueEntry {
            error,
            context,
            severity,
        });

        if let Some((error, context)) = critical {
            self.handle_critical_error(error, context);
        }
    }

    fn handle_critical_error(&self, error: HandledError, context: ErrorContext) {
        let label = &self.config.log_label;

        if guarded(|| self.env.is_production()).unwrap_or(false) {
            let job = reporting::delivery_job(
                Arc::clone(&self.reporter),
                Arc::clone(&self.sink),
                label.clone(),
                ErrorReport::new(error.clone(), context),
            );
            let mode = self.config.report_dispatch;
            guarded(|| reporting::dispatch(mode, job));
        } else {
            self.log(
                LogRecord::new(LogLevel::Debug, "Skipping error report outside production", label)
                    .with_error(&error),
            );
        }

        if guarded(|| self.env.is_interactive()).unwrap_or(false) {
            let message = format!("Critical error occurred: {}", error.log_line());
            guarded(|| self.env.surface_error(&message, &error));
        }
    }

    /// Build a classified error with every field explicit.
    pub fn create_error(
        &self,
        message: impl Into<String>,
        code: ErrorCode,
        status_code: u16,
        context: ErrorContext,
        is_operational: bool,
    ) -> AppError {
        let mut context = context;
        self.stamp(&mut context);
        AppError::builder(message)
            .code(code)
            .status(status_code)
            .context(context)
            .operational(is_operational)
            .finish()
    }

    /// Classify a transport failure into an operational error.
    ///
    /// `method` defaults to `GET`. The endpoint, method and the raw client
    /// message are recorded on the context.
    ///
    /// ```rust
    /// use quotefast_errors::{ErrorCode, ErrorContext, ErrorHandler, RawTransportError};
    ///
    /// let handler = ErrorHandler::builder().build();
    /// let raw = RawTransportError::with_response(404, None).message("Not Found");
    /// let err = handler.handle_api_error(&raw, "/api/customers/7", None, ErrorContext::new());
    ///
    /// assert_eq!(err.code(), ErrorCode::CustomerNotFound);
    /// assert_eq!(err.status_code(), 404);
    /// assert_eq!(err.context().method.as_deref(), Some("GET"));
    /// ```
    pub fn handle_api_error(
        &self,
        error: &RawTransportError,
        endpoint: &str,
        method: Option<&str>,
        context: ErrorContext,
    ) -> AppError {
        let failure = TransportFailure::classify(error);
        let context = ErrorContext {
            endpoint: Some(endpoint.to_owned()),
            method: Some(method.unwrap_or("GET").to_owned()),
            original_error: error.message.clone(),
            ..context
        };
        self.create_error(failure.message(), failure.error_code(), failure.status_code(), context, true)
    }

    /// Turn field validation messages into one operational 400 error.
    pub fn handle_validation_error(&self, errors: ValidationErrors, context: ErrorContext) -> AppError {
        let message = format!(
            "Validation failed: {}",
            errors.messages().collect::<Vec<_>>().join(", ")
        );
        let context = ErrorContext {
            validation_errors: Some(errors),
            ..context
        };
        self.create_error(message, ErrorCode::ValidationError, 400, context, true)
    }

    /// Owned copy of the queue, oldest first.
    pub fn error_queue(&self) -> Vec<QueueEntry> {
        self.queue.snapshot()
    }

    /// Empty the queue.
    pub fn clear_error_queue(&self) {
        self.queue.clear();
    }

    /// Totals over the queue, taken under one lock.
    pub fn error_stats(&self) -> ErrorStats {
        self.queue.with_entries(|entries| ErrorStats::from_entries(entries))
    }

    /// The queue itself, for callers that want more than a snapshot.
    pub fn queue(&self) -> &ErrorQueue {
        &self.queue
    }

    /// The injected host environment.
    pub fn environment(&self) -> &dyn Environment {
        self.env.as_ref()
    }

    /// Active configuration.
    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    fn stamp(&self, context: &mut ErrorContext) {
        let env = self.env.as_ref();
        if guarded(|| context.enrich(env)).is_none() {
            context.timestamp = Some(Utc::now());
        }
    }

    fn log(&self, record: LogRecord<'_>) {
        guarded(|| self.sink.log(&record));
    }
}

impl std::fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErrorHandler")
            .field("queue", &self.queue)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::builder().build()
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`ErrorHandler`].
///
/// Defaults: [`TracingSink`], a [`LogReporter`] on the same sink, the
/// process environment and [`HandlerConfig::default`].
#[derive(Default)]
#[must_use = "call build() to obtain the handler"]
pub struct ErrorHandlerBuilder {
    sink: Option<Arc<dyn LogSink>>,
    reporter: Option<Arc<dyn ErrorReporter>>,
    env: Option<Arc<dyn Environment>>,
    config: HandlerConfig,
}

impl ErrorHandlerBuilder {
    /// Log through `sink`.
    pub fn sink(self, sink: impl LogSink + 'static) -> Self {
        self.shared_sink(Arc::new(sink))
    }

    /// Log through a sink the caller keeps a handle on.
    pub fn shared_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Report critical errors through `reporter`.
    pub fn reporter(self, reporter: impl ErrorReporter + 'static) -> Self {
        self.shared_reporter(Arc::new(reporter))
    }

    /// Report through a reporter the caller keeps a handle on.
    pub fn shared_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Probe `env` for mode and context.
    pub fn environment(self, env: impl Environment + 'static) -> Self {
        self.shared_environment(Arc::new(env))
    }

    /// Probe an environment the caller keeps a handle on.
    pub fn shared_environment(mut self, env: Arc<dyn Environment>) -> Self {
        self.env = Some(env);
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: HandlerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the queue capacity.
    pub fn max_queue_size(mut self, size: usize) -> Self {
        self.config.max_queue_size = size;
        self
    }

    /// Set the log label.
    pub fn log_label(mut self, label: impl Into<String>) -> Self {
        self.config.log_label = label.into();
        self
    }

    /// Set how critical reports are delivered.
    pub fn report_dispatch(mut self, dispatch: ReportDispatch) -> Self {
        self.config.report_dispatch = dispatch;
        self
    }

    /// Assemble the handler.
    pub fn build(self) -> ErrorHandler {
        let sink = self.sink.unwrap_or_else(|| Arc::new(TracingSink));
        let reporter = self.reporter.unwrap_or_else(|| {
            Arc::new(LogReporter::new(Arc::clone(&sink), self.config.log_label.clone()))
        });
        let env = self
            .env
            .unwrap_or_else(|| Arc::new(ProcessEnvironment::shared().clone()));

        ErrorHandler {
            queue: ErrorQueue::new(self.config.max_queue_size),
            sink,
            reporter,
            env,
            config: Arc::new(self.config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixedEnvironment;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Captured {
        records: Mutex<Vec<(LogLevel, String)>>,
    }

    impl LogSink for Captured {
        fn log(&self, record: &LogRecord<'_>) {
            self.records
                .lock()
                .unwrap()
                .push((record.level, record.message.to_owned()));
        }
    }

    fn handler_with(sink: Arc<Captured>) -> ErrorHandler {
        ErrorHandler::builder()
            .shared_sink(sink)
            .environment(FixedEnvironment::new())
            .build()
    }

    #[test]
    fn queue_size_parsing() {
        assert_eq!(parse_queue_size(None), DEFAULT_MAX_QUEUE_SIZE);
        assert_eq!(parse_queue_size(Some(" 250 ")), 250);
        assert_eq!(parse_queue_size(Some("0")), DEFAULT_MAX_QUEUE_SIZE);
        assert_eq!(parse_queue_size(Some("lots")), DEFAULT_MAX_QUEUE_SIZE);
    }

    #[test]
    fn severity_routes_to_log_level() {
        let sink = Arc::new(Captured::default());
        let handler = handler_with(sink.clone());
        let err = || AppError::builder("boom").build_with(&FixedEnvironment::new());

        for severity in Severity::ALL {
            handler.handle_error(err(), ErrorContext::new(), severity);
        }

        let levels: Vec<_> = sink.records.lock().unwrap().iter().map(|(l, _)| *l).collect();
        assert_eq!(
            levels,
            [
                LogLevel::Info,
                LogLevel::Warn,
                LogLevel::Error,
                LogLevel::Error,
                // critical outside production
                LogLevel::Debug,
            ]
        );
    }

    #[test]
    fn logs_name_and_message() {
        let sink = Arc::new(Captured::default());
        let handler = handler_with(sink.clone());
        handler.handle_error(
            crate::NativeError::new("TypeError", "x is undefined"),
            ErrorContext::new(),
            Severity::Medium,
        );
        assert_eq!(sink.records.lock().unwrap()[0].1, "TypeError: x is undefined");
    }

    #[test]
    fn handle_error_stamps_context() {
        let handler = ErrorHandler::builder()
            .environment(FixedEnvironment::new().interactive("agent", "https://app.test/"))
            .build();
        let stale = ErrorContext {
            url: Some("stale".into()),
            ..ErrorContext::new().component("Dashboard")
        };
        handler.handle_error(AppError::builder("boom").build(), stale, Severity::Low);

        let entry = &handler.error_queue()[0];
        assert_eq!(entry.context.component.as_deref(), Some("Dashboard"));
        assert_eq!(entry.context.url.as_deref(), Some("https://app.test/"));
        assert!(entry.context.timestamp.is_some());
    }

    #[test]
    fn stats_count_natives_without_code() {
        let handler = handler_with(Arc::new(Captured::default()));
        handler.handle_error(AppError::builder("a").build(), ErrorContext::new(), Severity::High);
        handler.handle_error(
            crate::NativeError::new("Error", "b"),
            ErrorContext::new(),
            Severity::High,
        );

        let stats = handler.error_stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.severity(Severity::High), 2);
        assert_eq!(stats.severity(Severity::Low), 0);
        assert_eq!(stats.by_severity.len(), 4);
        assert_eq!(stats.by_code.values().sum::<usize>(), 1);
    }

    #[test]
    fn stats_serialize_with_registry_keys() {
        let handler = handler_with(Arc::new(Captured::default()));
        handler.handle_error(
            AppError::builder("a").code(ErrorCode::ApiTimeout).build(),
            ErrorContext::new(),
            Severity::Medium,
        );
        let json = serde_json::to_value(handler.error_stats()).unwrap();
        assert_eq!(json["bySeverity"]["medium"], 1);
        assert_eq!(json["byCode"]["API_TIMEOUT"], 1);
    }

    #[test]
    fn clones_share_the_queue() {
        let handler = handler_with(Arc::new(Captured::default()));
        let clone = handler.clone();
        clone.handle_error(AppError::builder("a").build(), ErrorContext::new(), Severity::Low);
        assert_eq!(handler.error_queue().len(), 1);
        handler.clear_error_queue();
        assert!(clone.error_queue().is_empty());
    }

    #[test]
    fn api_error_records_request_details() {
        let handler = handler_with(Arc::new(Captured::default()));
        let raw = RawTransportError::with_response(401, Some("Session expired"));
        let err = handler.handle_api_error(
            &raw,
            "/api/quotes",
            Some("POST"),
            ErrorContext::new().component("QuoteList"),
        );

        assert_eq!(err.code(), ErrorCode::AuthRequired);
        assert_eq!(err.message(), "Session expired");
        assert!(err.is_operational());
        let ctx = err.context();
        assert_eq!(ctx.component.as_deref(), Some("QuoteList"));
        assert_eq!(ctx.endpoint.as_deref(), Some("/api/quotes"));
        assert_eq!(ctx.method.as_deref(), Some("POST"));
        assert!(ctx.original_error.is_none());
    }

    #[test]
    fn create_error_keeps_every_parameter() {
        let handler = handler_with(Arc::new(Captured::default()));
        let err = handler.create_error(
            "Quote total overflowed",
            ErrorCode::QuoteGenerationFailed,
            422,
            ErrorContext::new().action("total"),
            false,
        );
        assert_eq!(err.code(), ErrorCode::QuoteGenerationFailed);
        assert_eq!(err.status_code(), 422);
        assert!(!err.is_operational());
        assert_eq!(err.context().action.as_deref(), Some("total"));
        assert!(err.context().timestamp.is_some());
        assert!(handler.error_queue().is_empty());
    }
}
