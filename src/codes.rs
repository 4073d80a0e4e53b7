//! Error code registry - the closed vocabulary every classified error speaks.
//!
//! Downstream consumers (UI copy tables, dashboards, alert routing) switch on
//! these identifiers exhaustively, so the set is a plain Rust `enum` rather
//! than free-form strings. A new failure kind means a new variant here.
//!
//! # Domains
//!
//! - **Auth**: authentication and authorization
//! - **Api**: transport-level failures talking to a backend
//! - **Business**: quote, customer, invoice and payment workflows
//! - **System**: infrastructure (database, uploads, mail)
//! - **Client**: input and form handling
//! - **Unknown**: the fallback
//!
//! # Severity
//!
//! [`Severity`] lives next to the codes but is deliberately independent of
//! them: the same `ApiTimeout` may be `Low` on a background poll and
//! `Critical` on a payment submission. Callers pick it.
//!
//! # Example
//!
//! ```rust
//! use quotefast_errors::{ErrorCode, ErrorDomain};
//!
//! let code: ErrorCode = "API_TIMEOUT".parse().unwrap();
//! assert_eq!(code, ErrorCode::ApiTimeout);
//! assert_eq!(code.domain(), ErrorDomain::Api);
//! assert_eq!(code.to_string(), "API_TIMEOUT");
//! ```

use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Error Domain
// ============================================================================

/// Coarse grouping of error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorDomain {
    /// Authentication and authorization.
    Auth,
    /// Transport and backend API failures.
    Api,
    /// Quote, customer, invoice and payment workflows.
    Business,
    /// Infrastructure: database, file storage, mail delivery.
    System,
    /// Client-side input handling.
    Client,
    /// Fallback for anything unclassified.
    Unknown,
}

impl ErrorDomain {
    /// Human-readable domain name for dashboards.
    #[inline]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Auth => "Authentication",
            Self::Api => "API",
            Self::Business => "Business",
            Self::System => "System",
            Self::Client => "Client",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for ErrorDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

// ============================================================================
// Error Code
// ============================================================================

/// Symbolic classification carried by every [`AppError`](crate::AppError).
///
/// Serializes as the SCREAMING_SNAKE identifier (`"AUTH_REQUIRED"`), which is
/// also what `Display` writes and `FromStr` accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Auth
    /// The caller is not signed in.
    AuthRequired,
    /// Username or password did not match.
    AuthInvalidCredentials,
    /// The session token is no longer valid.
    AuthTokenExpired,
    /// Signed in, but not allowed to do this.
    AuthInsufficientPermissions,

    // Transport / API
    /// A request was sent but no response arrived.
    ApiNetworkError,
    /// The client gave up waiting.
    ApiTimeout,
    /// The backend throttled the caller.
    ApiRateLimited,
    /// The backend failed or the failure could not be classified further.
    ApiServerError,
    /// The backend rejected the request payload.
    ApiValidationError,

    // Business
    /// Quote generation did not complete.
    QuoteGenerationFailed,
    /// The referenced customer (or resource) does not exist.
    CustomerNotFound,
    /// Invoice creation did not complete.
    InvoiceCreationFailed,
    /// The payment provider refused or failed the charge.
    PaymentProcessingFailed,

    // System
    /// The database could not be reached.
    DatabaseConnectionError,
    /// A file could not be stored.
    FileUploadFailed,
    /// An email could not be delivered.
    EmailSendingFailed,

    // Client
    /// Local input validation failed.
    ValidationError,
    /// A form could not be submitted.
    FormSubmissionError,
    /// The selected file exceeds the size limit.
    FileSizeTooLarge,
    /// The selected file type is not accepted.
    InvalidFileType,

    // Fallback
    /// Nothing more specific applies.
    UnknownError,
}

impl ErrorCode {
    /// Every code in registry order.
    pub const ALL: [ErrorCode; 21] = [
        Self::AuthRequired,
        Self::AuthInvalidCredentials,
        Self::AuthTokenExpired,
        Self::AuthInsufficientPermissions,
        Self::ApiNetworkError,
        Self::ApiTimeout,
        Self::ApiRateLimited,
        Self::ApiServerError,
        Self::ApiValidationError,
        Self::QuoteGenerationFailed,
        Self::CustomerNotFound,
        Self::InvoiceCreationFailed,
        Self::PaymentProcessingFailed,
        Self::DatabaseConnectionError,
        Self::FileUploadFailed,
        Self::EmailSendingFailed,
        Self::ValidationError,
        Self::FormSubmissionError,
        Self::FileSizeTooLarge,
        Self::InvalidFileType,
        Self::UnknownError,
    ];

    /// The SCREAMING_SNAKE identifier. Zero allocation.
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AuthRequired => "AUTH_REQUIRED",
            Self::AuthInvalidCredentials => "AUTH_INVALID_CREDENTIALS",
            Self::AuthTokenExpired => "AUTH_TOKEN_EXPIRED",
            Self::AuthInsufficientPermissions => "AUTH_INSUFFICIENT_PERMISSIONS",
            Self::ApiNetworkError => "API_NETWORK_ERROR",
            Self::ApiTimeout => "API_TIMEOUT",
            Self::ApiRateLimited => "API_RATE_LIMITED",
            Self::ApiServerError => "API_SERVER_ERROR",
            Self::ApiValidationError => "API_VALIDATION_ERROR",
            Self::QuoteGenerationFailed => "QUOTE_GENERATION_FAILED",
            Self::CustomerNotFound => "CUSTOMER_NOT_FOUND",
            Self::InvoiceCreationFailed => "INVOICE_CREATION_FAILED",
            Self::PaymentProcessingFailed => "PAYMENT_PROCESSING_FAILED",
            Self::DatabaseConnectionError => "DATABASE_CONNECTION_ERROR",
            Self::FileUploadFailed => "FILE_UPLOAD_FAILED",
            Self::EmailSendingFailed => "EMAIL_SENDING_FAILED",
            Self::ValidationError => "VALIDATION_ERROR",
            Self::FormSubmissionError => "FORM_SUBMISSION_ERROR",
            Self::FileSizeTooLarge => "FILE_SIZE_TOO_LARGE",
            Self::InvalidFileType => "INVALID_FILE_TYPE",
            Self::UnknownError => "UNKNOWN_ERROR",
        }
    }

    /// Domain this code belongs to.
    #[inline]
    pub const fn domain(self) -> ErrorDomain {
        use ErrorCode::*;
        match self {
            AuthRequired | AuthInvalidCredentials | AuthTokenExpired
            | AuthInsufficientPermissions => ErrorDomain::Auth,
            ApiNetworkError | ApiTimeout | ApiRateLimited | ApiServerError
            | ApiValidationError => ErrorDomain::Api,
            QuoteGenerationFailed | CustomerNotFound | InvoiceCreationFailed
            | PaymentProcessingFailed => ErrorDomain::Business,
            DatabaseConnectionError | FileUploadFailed | EmailSendingFailed => ErrorDomain::System,
            ValidationError | FormSubmissionError | FileSizeTooLarge | InvalidFileType => {
                ErrorDomain::Client
            }
            UnknownError => ErrorDomain::Unknown,
        }
    }

    /// Conventional HTTP status for this code.
    ///
    /// Only used by the [`app_error!`](crate::app_error) shorthand; the
    /// handler's `create_error` keeps its explicit 500 default.
    #[inline]
    pub const fn default_status(self) -> u16 {
        use ErrorCode::*;
        match self {
            AuthRequired | AuthInvalidCredentials | AuthTokenExpired => 401,
            AuthInsufficientPermissions => 403,
            ApiValidationError | ValidationError | FormSubmissionError | InvalidFileType => 400,
            CustomerNotFound => 404,
            FileSizeTooLarge => 413,
            ApiRateLimited => 429,
            ApiTimeout => 504,
            ApiNetworkError | ApiServerError | QuoteGenerationFailed | InvoiceCreationFailed
            | PaymentProcessingFailed | DatabaseConnectionError | FileUploadFailed
            | EmailSendingFailed | UnknownError => 500,
        }
    }

    /// Short sentence suitable for a toast when nothing better is known.
    pub const fn user_message(self) -> &'static str {
        use ErrorCode::*;
        match self {
            AuthRequired | AuthTokenExpired => "Please sign in again to continue.",
            AuthInvalidCredentials => "The email address or password is incorrect.",
            AuthInsufficientPermissions => "You do not have permission to do this.",
            ApiNetworkError => "There is a connection problem. Check your internet connection.",
            ApiTimeout => "The request took too long. Please try again.",
            ApiRateLimited => "Too many requests. Please wait a moment and try again.",
            ApiValidationError | ValidationError => "Some fields need your attention.",
            CustomerNotFound => "The requested item could not be found.",
            QuoteGenerationFailed => "The quote could not be generated.",
            InvoiceCreationFailed => "The invoice could not be created.",
            PaymentProcessingFailed => "The payment could not be processed.",
            FileUploadFailed => "The file could not be uploaded.",
            FileSizeTooLarge => "The file is too large.",
            InvalidFileType => "This file type is not supported.",
            EmailSendingFailed => "The email could not be sent.",
            FormSubmissionError => "The form could not be submitted.",
            ApiServerError | DatabaseConnectionError | UnknownError => {
                "An unexpected error occurred. Please try again later."
            }
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when parsing an identifier outside the registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown error code: {0}")]
pub struct UnknownErrorCode(pub String);

impl FromStr for ErrorCode {
    type Err = UnknownErrorCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| UnknownErrorCode(s.to_owned()))
    }
}

// ============================================================================
// Severity
// ============================================================================

/// Caller-asserted urgency of a handled error.
///
/// Ordered `Low < Medium < High < Critical`. Only `Critical` triggers the
/// reporting path; the rest differ in log level alone.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Logged at info level.
    Low,
    /// Logged at warn level. The conventional default.
    #[default]
    Medium,
    /// Logged at error level.
    High,
    /// Logged at error level and reported.
    Critical,
}

impl Severity {
    /// All severities, ascending.
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    /// Log level used when routing an error of this severity.
    ///
    /// `High` and `Critical` share the error level; the distinction lives in
    /// the reporting path, not in the log.
    #[inline]
    pub const fn log_level(self) -> LogLevel {
        match self {
            Self::Critical | Self::High => LogLevel::Error,
            Self::Medium => LogLevel::Warn,
            Self::Low => LogLevel::Info,
        }
    }

    /// Lowercase label, matching the serialized form.
    #[inline]
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

// ============================================================================
// Tests
// ============================================================================
