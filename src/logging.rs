//! Logging sink seam and the structured record handed to it.
//!
//! # Record Lifetime
//!
//! [`LogRecord`] borrows the error and context it describes and cannot
//! outlive the logging call. Sinks that want to keep anything must copy it
//! out explicitly; the record itself is gone when `log` returns.
//!
//! # Data Is Never Interpolated
//!
//! The record message is `"<ErrorName>: <message>"` and nothing else. Error
//! codes, severity, status and the full context travel as separate fields so
//! a sink can index them instead of parsing prose.
//!
//! # Default Sink
//!
//! [`TracingSink`] forwards to the `tracing` macros of the matching level,
//! so whatever subscriber the host installs decides formatting and output.

use crate::{ErrorCode, ErrorContext, HandledError, Severity};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// Maximum length for any individual field in formatted output.
const MAX_FIELD_OUTPUT_LEN: usize = 1024;

/// Appended to truncated fields.
const TRUNCATION_INDICATOR: &str = "...[TRUNCATED]";

/// Level a record is emitted at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Diagnostics about the handler itself.
    Debug,
    /// Low-severity errors and reporting notices.
    Info,
    /// Medium-severity errors.
    Warn,
    /// High and critical errors, reporting failures.
    Error,
}

impl LogLevel {
    /// Uppercase label used in line output.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One log call, borrowed from the error being handled.
///
/// ```rust
/// use quotefast_errors::{LogLevel, LogRecord};
///
/// let record = LogRecord::new(LogLevel::Warn, "AppError: boom", "error-handler");
/// let mut line = String::new();
/// record.write_to(&mut line).unwrap();
/// assert_eq!(line, "[WARN] [error-handler] AppError: boom");
/// ```
#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    /// Emission level.
    pub level: LogLevel,
    /// Human-readable line, never carrying structured data.
    pub message: &'a str,
    /// Source label, `"error-handler"` by default.
    pub label: &'a str,
    /// Error being logged, if any.
    pub error: Option<&'a HandledError>,
    /// Context of the error being logged, if any.
    pub context: Option<&'a ErrorContext>,
    /// Caller-asserted severity, if the record describes a handled error.
    pub severity: Option<Severity>,
    /// Free text detail, for example a reporter failure.
    pub detail: Option<&'a str>,
}

impl<'a> LogRecord<'a> {
    /// Record with message and label only.
    #[inline]
    pub const fn new(level: LogLevel, message: &'a str, label: &'a str) -> Self {
        Self {
            level,
            message,
            label,
            error: None,
            context: None,
            severity: None,
            detail: None,
        }
    }

    /// Attach the error.
    #[inline]
    pub const fn with_error(mut self, error: &'a HandledError) -> Self {
        self.error = Some(error);
        self
    }

    /// Attach the context.
    #[inline]
    pub const fn with_context(mut self, context: &'a ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Attach the severity.
    #[inline]
    pub const fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Attach free text detail.
    #[inline]
    pub const fn with_detail(mut self, detail: &'a str) -> Self {
        self.detail = Some(detail);
        self
    }

    /// Code of the attached error, when it is classified.
    #[inline]
    pub fn code(&self) -> Option<ErrorCode> {
        self.error.and_then(HandledError::code)
    }

    /// Status of the attached error, when it is classified.
    #[inline]
    pub fn status_code(&self) -> Option<u16> {
        self.error.and_then(HandledError::status_code)
    }

    /// Context rendered as compact JSON, empty when absent.
    pub fn context_json(&self) -> String {
        self.context
            .and_then(|ctx| serde_json::to_string(ctx).ok())
            .unwrap_or_default()
    }

    /// Write the record as one line, truncating every field.
    ///
    /// Never allocates for fields under the limit.
    pub fn write_to(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(
            f,
            "[{}] [{}] {}",
            self.level,
            truncate_with_indicator(self.label),
            truncate_with_indicator(self.message)
        )?;

        if let Some(code) = self.code() {
            write!(f, " code={code}")?;
        }
        if let Some(severity) = self.severity {
            write!(f, " severity={severity}")?;
        }
        if let Some(status) = self.status_code() {
            write!(f, " status={status}")?;
        }
        if self.context.is_some() {
            write!(f, " context={}", truncate_with_indicator(&self.context_json()))?;
        }
        if let Some(detail) = self.detail {
            write!(f, " detail='{}'", truncate_with_indicator(detail))?;
        }

        Ok(())
    }
}

/// Destination for handler log output.
///
/// Implementations must not block for long; the handler calls them inline.
/// A panicking sink is contained by the handler, but a sink should still
/// swallow its own I/O failures.
pub trait LogSink: Send + Sync {
    /// Consume one record.
    fn log(&self, record: &LogRecord<'_>);

    /// Plain debug line.
    fn debug(&self, message: &str, label: &str) {
        self.log(&LogRecord::new(LogLevel::Debug, message, label));
    }

    /// Plain info line.
    fn info(&self, message: &str, label: &str) {
        self.log(&LogRecord::new(LogLevel::Info, message, label));
    }

    /// Plain warn line.
    fn warn(&self, message: &str, label: &str) {
        self.log(&LogRecord::new(LogLevel::Warn, message, label));
    }

    /// Plain error line.
    fn error(&self, message: &str, label: &str) {
        self.log(&LogRecord::new(LogLevel::Error, message, label));
    }
}

/// Sink that forwards to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

macro_rules! emit {
    ($level:ident, $record:expr) => {{
        let record = $record;
        tracing::$level!(
            target: "quotefast_errors",
            label = record.label,
            code = record.code().map(ErrorCode::as_str),
            severity = record.severity.map(Severity::as_str),
            status = record.status_code(),
            context = %record.context_json(),
            detail = record.detail,
            "{}",
            truncate_with_indicator(record.message)
        )
    }};
}

impl LogSink for TracingSink {
    fn log(&self, record: &LogRecord<'_>) {
        match record.level {
            LogLevel::Debug => emit!(debug, record),
            LogLevel::Info => emit!(info, record),
            LogLevel::Warn => emit!(warn, record),
            LogLevel::Error => emit!(error, record),
        }
    }
}

/// Truncate a string for display.
///
/// Cuts on a UTF-8 boundary at [`MAX_FIELD_OUTPUT_LEN`] and marks the cut.
/// Borrows when no truncation is needed.
pub(crate) fn truncate_with_indicator(s: &str) -> Cow<'_, str> {
    if s.len() <= MAX_FIELD_OUTPUT_LEN {
        return Cow::Borrowed(s);
    }

    let max_content_len = MAX_FIELD_OUTPUT_LEN.saturating_sub(TRUNCATION_INDICATOR.len());

    let mut idx = max_content_len;
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }

    if idx == 0 {
        return Cow::Borrowed(TRUNCATION_INDICATOR);
    }

    let mut result = String::with_capacity(idx + TRUNCATION_INDICATOR.len());
    result.push_str(&s[..idx]);
    result.push_str(TRUNCATION_INDICATOR);
    Cow::Owned(result)
}
