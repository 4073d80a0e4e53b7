//! # QuoteFast Errors
//!
//! Centralized error classification, routing and diagnostics for the
//! QuoteFast dashboard services.
//!
//! ## Design Philosophy
//!
//! 1. **Every error speaks one vocabulary**: a closed [`ErrorCode`] registry
//! 2. **Severity is the caller's call**, never inferred from the code
//! 3. **The handler is a terminal sink**: it logs, records, reports, and never fails
//! 4. **Recent history stays inspectable** through a bounded queue and statistics
//! 5. **Collaborators are injected**: log sink, reporter and host environment are traits
//!
//! ## Flow
//!
//! Any call site that can fail builds or receives an error and passes it to
//! [`ErrorHandler::handle_error`] with a context and a [`Severity`]. The
//! handler stamps the context, logs at the severity's level, appends to the
//! bounded queue, and, for `Critical` only, kicks off a detached report.
//!
//! ## Quick Start
//!
//! ```rust
//! use quotefast_errors::{
//!     ErrorContext, ErrorHandler, FixedEnvironment, NoopReporter, RawTransportError, Severity,
//!     TracingSink,
//! };
//!
//! let handler = ErrorHandler::builder()
//!     .sink(TracingSink)
//!     .reporter(NoopReporter)
//!     .environment(FixedEnvironment::new())
//!     .build();
//!
//! let raw = RawTransportError::no_response("ECONNREFUSED");
//! let err = handler.handle_api_error(&raw, "/api/invoices", None, ErrorContext::new());
//! handler.handle_error(err, ErrorContext::new(), Severity::Medium);
//!
//! let queue = handler.error_queue();
//! assert_eq!(queue.len(), 1);
//! assert_eq!(queue[0].context.endpoint.as_deref(), Some("/api/invoices"));
//! ```
//!
//! ## Wrapping Fallible Calls
//!
//! ```rust
//! use quotefast_errors::{ErrorContext, ErrorHandler};
//!
//! let handler = ErrorHandler::builder().build();
//! let parse = handler.wrap_sync(|s: &str| s.parse::<u32>(), ErrorContext::new().action("parse"));
//!
//! assert_eq!(parse("42"), Some(42));
//! assert_eq!(parse("forty-two"), None); // logged and queued instead
//! assert_eq!(handler.error_queue().len(), 1);
//! ```
//!
//! ## Features
//!
//! - `tokio`: detached critical reports run on the ambient tokio runtime
//! - `async_std`: detached critical reports run on the async-std executor

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::Serialize;
use std::any::Any;
use std::error::Error;
use std::fmt;

pub mod codes;
pub mod context;
pub mod convenience;
pub mod environment;
pub mod handler;
pub mod logging;
pub mod reporting;
pub mod ring_buffer;
pub mod transport;

pub use codes::*;
pub use context::*;
pub use convenience::*;
pub use environment::*;
pub use handler::*;
pub use logging::*;
pub use reporting::*;
pub use ring_buffer::*;
pub use transport::*;

// ============================================================================
// AppError
// ============================================================================

/// Classified application error.
///
/// Immutable once built: every field is read through an accessor and nothing
/// mutates it afterwards. The context is enriched at construction time.
///
/// # Construction
///
/// - [`ErrorHandler::create_error`] with every parameter explicit
/// - [`AppError::builder`] with the usual defaults (`UnknownError`, 500, operational)
/// - [`app_error!`] for a formatted message and the code's conventional status
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[must_use = "errors should be handled or logged"]
pub struct AppError {
    message: String,
    code: ErrorCode,
    status_code: u16,
    context: ErrorContext,
    is_operational: bool,
}

impl AppError {
    /// Name used in log lines.
    pub const NAME: &'static str = "AppError";

    /// Start building an error with the given message.
    #[inline]
    pub fn builder(message: impl Into<String>) -> AppErrorBuilder {
        AppErrorBuilder::new(message)
    }

    /// Human-readable description.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Registry code.
    #[inline]
    pub const fn code(&self) -> ErrorCode {
        self.code
    }

    /// HTTP-style status.
    #[inline]
    pub const fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Context as enriched at construction.
    #[inline]
    pub const fn context(&self) -> &ErrorContext {
        &self.context
    }

    /// True for expected failures (bad input, network blips), false for bugs.
    #[inline]
    pub const fn is_operational(&self) -> bool {
        self.is_operational
    }

    /// Always [`AppError::NAME`].
    #[inline]
    pub const fn name(&self) -> &'static str {
        Self::NAME
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for AppError {}

/// Builder for [`AppError`] with the conventional defaults.
///
/// ```rust
/// use quotefast_errors::{AppError, ErrorCode, ErrorContext, FixedEnvironment};
///
/// let env = FixedEnvironment::new();
/// let err = AppError::builder("Quote could not be generated")
///     .code(ErrorCode::QuoteGenerationFailed)
///     .context(ErrorContext::new().component("QuoteWizard"))
///     .build_with(&env);
///
/// assert_eq!(err.status_code(), 500);
/// assert!(err.is_operational());
/// assert!(err.context().timestamp.is_some());
/// ```
#[derive(Debug, Clone)]
#[must_use = "call build() or build_with() to obtain the error"]
pub struct AppErrorBuilder {
    message: String,
    code: ErrorCode,
    status_code: u16,
    context: ErrorContext,
    is_operational: bool,
}

impl AppErrorBuilder {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: ErrorCode::UnknownError,
            status_code: 500,
            context: ErrorContext::default(),
            is_operational: true,
        }
    }

    /// Set the registry code.
    #[inline]
    pub fn code(mut self, code: ErrorCode) -> Self {
        self.code = code;
        self
    }

    /// Set the status.
    #[inline]
    pub fn status(mut self, status_code: u16) -> Self {
        self.status_code = status_code;
        self
    }

    /// Set the caller context.
    #[inline]
    pub fn context(mut self, context: ErrorContext) -> Self {
        self.context = context;
        self
    }

    /// Set whether this is an expected failure.
    #[inline]
    pub fn operational(mut self, is_operational: bool) -> Self {
        self.is_operational = is_operational;
        self
    }

    /// Finish, stamping the context from `env`.
    pub fn build_with(mut self, env: &dyn Environment) -> AppError {
        self.context.enrich(env);
        self.finish()
    }

    /// Finish with the context exactly as given.
    pub(crate) fn finish(self) -> AppError {
        AppError {
            message: self.message,
            code: self.code,
            status_code: self.status_code,
            context: self.context,
            is_operational: self.is_operational,
        }
    }

    /// Finish, stamping the context from the current process.
    pub fn build(self) -> AppError {
        self.build_with(ProcessEnvironment::shared())
    }
}

// ============================================================================
// Native Errors
// ============================================================================

/// Unclassified error captured from outside the registry.
///
/// Keeps the short type name and the display message of the original error.
/// Native errors are logged and queued like any other, but carry no code and
/// are left out of the per-code statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NativeError {
    name: String,
    message: String,
}

impl NativeError {
    /// Name used for recovered panics.
    pub const PANIC: &'static str = "Panic";

    /// Native error with an explicit name.
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Capture any error by its type name and display message.
    pub fn from_error<E: Error>(error: &E) -> Self {
        Self::new(short_type_name::<E>(), error.to_string())
    }

    /// Capture a panic payload.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_owned()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "panic with a non-string payload".to_owned()
        };
        Self::new(Self::PANIC, message)
    }

    /// Type name of the original error.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Display message of the original error.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for NativeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl Error for NativeError {}

/// Name given to native errors whose type was erased behind a box.
const BOXED_ERROR_NAME: &str = "BoxedError";

/// Last path segment of a type name, without generic arguments.
fn short_type_name<T: ?Sized>() -> String {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base).to_owned()
}

// ============================================================================
// Handled Error
// ============================================================================

/// Anything that can flow through [`ErrorHandler::handle_error`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum HandledError {
    /// Already classified.
    App(AppError),
    /// Unclassified.
    Native(NativeError),
}

impl HandledError {
    /// Wrap any error, keeping an [`AppError`] classified.
    ///
    /// ```rust
    /// use quotefast_errors::{AppError, ErrorCode, HandledError};
    ///
    /// let app = AppError::builder("nope").code(ErrorCode::AuthRequired).build();
    /// assert_eq!(HandledError::from_error(app).code(), Some(ErrorCode::AuthRequired));
    ///
    /// let parse = "x".parse::<u8>().unwrap_err();
    /// let native = HandledError::from_error(parse);
    /// assert_eq!(native.name(), "ParseIntError");
    /// assert_eq!(native.code(), None);
    /// ```
    pub fn from_error<E>(error: E) -> Self
    where
        E: Error + Send + Sync + 'static,
    {
        let name = short_type_name::<E>();
        let boxed: Box<dyn Error + Send + Sync> = Box::new(error);
        match boxed.downcast::<AppError>() {
            Ok(app) => Self::App(*app),
            Err(other) => Self::Native(NativeError::new(name, other.to_string())),
        }
    }

    /// Wrap a boxed error, keeping an [`AppError`] classified.
    ///
    /// The concrete type is erased by the box, so other errors are named
    /// `"BoxedError"`. Prefer [`from_error`](Self::from_error) when the type
    /// is known.
    pub fn from_boxed(error: Box<dyn Error + Send + Sync>) -> Self {
        match error.downcast::<AppError>() {
            Ok(app) => Self::App(*app),
            Err(other) => Self::Native(NativeError::new(BOXED_ERROR_NAME, other.to_string())),
        }
    }

    /// Wrap a panic payload.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        Self::Native(NativeError::from_panic(payload))
    }

    /// `"AppError"` or the native type name.
    pub fn name(&self) -> &str {
        match self {
            Self::App(app) => app.name(),
            Self::Native(native) => native.name(),
        }
    }

    /// Error message.
    pub fn message(&self) -> &str {
        match self {
            Self::App(app) => app.message(),
            Self::Native(native) => native.message(),
        }
    }

    /// Registry code, `None` for native errors.
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::App(app) => Some(app.code()),
            Self::Native(_) => None,
        }
    }

    /// Status, `None` for native errors.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::App(app) => Some(app.status_code()),
            Self::Native(_) => None,
        }
    }

    /// Construction-time context, `None` for native errors.
    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::App(app) => Some(app.context()),
            Self::Native(_) => None,
        }
    }

    /// Borrow the classified error, if this is one.
    pub fn as_app(&self) -> Option<&AppError> {
        match self {
            Self::App(app) => Some(app),
            Self::Native(_) => None,
        }
    }

    /// Sentence suitable for showing to an end user.
    ///
    /// Classified errors use their own message. Native errors get a generic
    /// sentence picked from hints in their message.
    pub fn user_message(&self) -> &str {
        match self {
            Self::App(app) => app.message(),
            Self::Native(native) => {
                let message = native.message().to_ascii_lowercase();
                if ["fetch", "network", "connection"].iter().any(|hint| message.contains(hint)) {
                    ErrorCode::ApiNetworkError.user_message()
                } else if message.contains("timeout") || message.contains("timed out") {
                    ErrorCode::ApiTimeout.user_message()
                } else {
                    ErrorCode::UnknownError.user_message()
                }
            }
        }
    }

    /// `"<name>: <message>"`, the line logged for this error.
    pub fn log_line(&self) -> String {
        format!("{}: {}", self.name(), self.message())
    }
}

impl fmt::Display for HandledError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name(), self.message())
    }
}

impl From<AppError> for HandledError {
    fn from(error: AppError) -> Self {
        Self::App(error)
    }
}

impl From<NativeError> for HandledError {
    fn from(error: NativeError) -> Self {
        Self::Native(error)
    }
}

impl From<std::io::Error> for HandledError {
    fn from(error: std::io::Error) -> Self {
        Self::from_error(error)
    }
}
