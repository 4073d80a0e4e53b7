//! Transport failure classification.
//!
//! The data-access layer hands over HTTP-client style failures:
//! `{ response?: {status, data?: {message}}, request?, code?, message }`.
//! Rather than probing optional fields at every call site, the raw shape is
//! classified once into [`TransportFailure`] and the error code, status and
//! message all derive from that variant.
//!
//! # Precedence
//!
//! 1. A response with a status: [`TransportFailure::HasResponse`]
//! 2. A request that got no response: [`TransportFailure::RequestNoResponse`]
//! 3. An abort/timeout code (`ECONNABORTED`, `ETIMEDOUT`): [`TransportFailure::TimeoutLike`]
//! 4. Anything else: [`TransportFailure::Opaque`]
//!
//! # Example
//!
//! ```rust
//! use quotefast_errors::{ErrorCode, RawTransportError, TransportFailure};
//!
//! let raw: RawTransportError =
//!     serde_json::from_str(r#"{"response":{"status":404},"message":"Not Found"}"#).unwrap();
//! let failure = TransportFailure::classify(&raw);
//!
//! assert_eq!(failure.error_code(), ErrorCode::CustomerNotFound);
//! assert_eq!(failure.status_code(), 404);
//! ```

use crate::ErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;

/// Fallback message when nothing better is available.
pub const GENERIC_API_MESSAGE: &str = "An API error occurred";

/// Message for requests that never got a response.
pub const NETWORK_MESSAGE: &str = "Network error - please check your connection";

/// Message for aborted or timed-out requests.
pub const TIMEOUT_MESSAGE: &str = "Request timeout - please try again";

/// Client codes that mean the request was aborted or timed out.
const TIMEOUT_CODES: [&str; 2] = ["ECONNABORTED", "ETIMEDOUT"];

// ============================================================================
// Raw Shape
// ============================================================================

/// Body of an error response, as far as classification cares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseBody {
    /// Server-provided message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Response half of a raw transport failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawResponse {
    /// HTTP status.
    pub status: u16,
    /// Parsed body, if any.
    #[serde(default)]
    pub data: Option<ResponseBody>,
}

/// Transport failure as produced by the data-access layer.
///
/// Every field is optional; `RawTransportError::default()` stands in for
/// null or malformed inputs and classifies as opaque.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTransportError {
    /// Present when the server answered.
    #[serde(default)]
    pub response: Option<RawResponse>,
    /// Present when a request was sent.
    #[serde(default)]
    pub request: Option<Value>,
    /// Client error code such as `ECONNABORTED`.
    #[serde(default)]
    pub code: Option<String>,
    /// Client error message.
    #[serde(default)]
    pub message: Option<String>,
}

impl RawTransportError {
    /// Failure with a server response.
    pub fn with_response(status: u16, body_message: Option<&str>) -> Self {
        Self {
            response: Some(RawResponse {
                status,
                data: body_message.map(|m| ResponseBody {
                    message: Some(m.to_owned()),
                }),
            }),
            ..Default::default()
        }
    }

    /// Failure where the request went out but nothing came back.
    pub fn no_response(message: impl Into<String>) -> Self {
        Self {
            request: Some(Value::Object(Default::default())),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Set the client message.
    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Set the client error code.
    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Describe a socket-level I/O failure in the same shape.
    ///
    /// Timeouts carry `ETIMEDOUT`; connection failures count as "request
    /// sent, no response"; everything else stays opaque. The I/O message is
    /// always kept.
    pub fn from_io(error: &io::Error) -> Self {
        let raw = Self {
            code: Some(io_error_code(error.kind()).to_owned()),
            message: Some(error.to_string()),
            ..Default::default()
        };
        match error.kind() {
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::HostUnreachable
            | io::ErrorKind::NetworkUnreachable
            | io::ErrorKind::UnexpectedEof => Self {
                request: Some(Value::Object(Default::default())),
                ..raw
            },
            _ => raw,
        }
    }
}

impl From<&io::Error> for RawTransportError {
    fn from(error: &io::Error) -> Self {
        Self::from_io(error)
    }
}

#[inline]
const fn io_error_code(kind: io::ErrorKind) -> &'static str {
    match kind {
        io::ErrorKind::TimedOut => "ETIMEDOUT",
        io::ErrorKind::ConnectionRefused => "ECONNREFUSED",
        io::ErrorKind::ConnectionReset => "ECONNRESET",
        io::ErrorKind::ConnectionAborted => "ECONNABORTED_BY_PEER",
        io::ErrorKind::NotConnected => "ENOTCONN",
        io::ErrorKind::BrokenPipe => "EPIPE",
        io::ErrorKind::HostUnreachable => "EHOSTUNREACH",
        io::ErrorKind::NetworkUnreachable => "ENETUNREACH",
        io::ErrorKind::UnexpectedEof => "EOF",
        _ => "EIO",
    }
}

// ============================================================================
// Classification
// ============================================================================

/// Classified transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure<'a> {
    /// The server answered with `status`.
    HasResponse {
        /// HTTP status of the response.
        status: u16,
        /// Body message, else client message.
        message: Option<&'a str>,
    },
    /// The request went out, nothing came back.
    RequestNoResponse,
    /// The client aborted or timed out.
    TimeoutLike,
    /// Nothing recognizable.
    Opaque,
}

impl<'a> TransportFailure<'a> {
    /// Classify a raw failure. Total: every input yields a variant.
    pub fn classify(raw: &'a RawTransportError) -> Self {
        if let Some(response) = &raw.response {
            let body_message = response
                .data
                .as_ref()
                .and_then(|body| body.message.as_deref())
                .filter(|m| !m.is_empty());
            let client_message = raw.message.as_deref().filter(|m| !m.is_empty());
            return Self::HasResponse {
                status: response.status,
                message: body_message.or(client_message),
            };
        }

        if raw.request.is_some() {
            return Self::RequestNoResponse;
        }

        match raw.code.as_deref() {
            Some(code) if TIMEOUT_CODES.contains(&code) => Self::TimeoutLike,
            _ => Self::Opaque,
        }
    }

    /// Registry code for this failure.
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::HasResponse { status, .. } => status_error_code(*status),
            Self::RequestNoResponse => ErrorCode::ApiNetworkError,
            Self::TimeoutLike => ErrorCode::ApiTimeout,
            Self::Opaque => ErrorCode::ApiServerError,
        }
    }

    /// HTTP-style status: the response status, else 500.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::HasResponse { status, .. } => *status,
            _ => 500,
        }
    }

    /// Message for the resulting error.
    pub fn message(&self) -> &'a str {
        match self {
            Self::HasResponse { message, .. } => message.unwrap_or(GENERIC_API_MESSAGE),
            Self::RequestNoResponse => NETWORK_MESSAGE,
            Self::TimeoutLike => TIMEOUT_MESSAGE,
            Self::Opaque => GENERIC_API_MESSAGE,
        }
    }
}

/// Map a response status to a registry code.
///
/// Statuses outside the table keep the server-error default.
pub const fn status_error_code(status: u16) -> ErrorCode {
    match status {
        400 => ErrorCode::ApiValidationError,
        401 => ErrorCode::AuthRequired,
        403 => ErrorCode::AuthInsufficientPermissions,
        404 => ErrorCode::CustomerNotFound,
        429 => ErrorCode::ApiRateLimited,
        _ => ErrorCode::ApiServerError,
    }
}
