//! Wrappers that turn fallible calls into `Option`-returning ones.
//!
//! A wrapped call that fails (returns `Err` or panics) is handled at
//! [`Severity::Medium`] with the context given at wrap time, and the wrapper
//! yields `None`. Success passes the value through untouched.
//!
//! Wrapped functions take one argument; use a tuple for several.
//!
//! The `ErrorHandler` methods bind to a specific handler. The free functions
//! ([`handle_sync_error`], [`handle_async_error`],
//! [`create_error_boundary_handler`]) bind to [`ErrorHandler::global`] and
//! exist for call sites that cannot be handed a handler.
//!
//! # Example
//!
//! ```rust
//! use quotefast_errors::{ErrorContext, ErrorHandler};
//!
//! let handler = ErrorHandler::builder().build();
//! let load = handler.wrap_async(
//!     |id: u32| async move {
//!         if id == 0 {
//!             Err(std::io::Error::other("no such quote"))
//!         } else {
//!             Ok(format!("quote-{id}"))
//!         }
//!     },
//!     ErrorContext::new().component("QuoteLoader"),
//! );
//!
//! let found = futures::executor::block_on(load(7));
//! let missing = futures::executor::block_on(load(0));
//! assert_eq!(found.as_deref(), Some("quote-7"));
//! assert_eq!(missing, None);
//! ```

use crate::handler::ErrorHandler;
use crate::{ErrorContext, HandledError, Severity};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::{Map, Value};
use std::error::Error;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Action recorded for errors caught at a render boundary.
pub const BOUNDARY_ACTION: &str = "render";

impl ErrorHandler {
    /// Wrap a fallible function so that failures are handled and become `None`.
    pub fn wrap_sync<A, T, E, F>(&self, f: F, context: ErrorContext) -> impl Fn(A) -> Option<T> + use<A, T, E, F>
    where
        F: Fn(A) -> Result<T, E>,
        E: Error + Send + Sync + 'static,
    {
        let handler = self.clone();
        move |args| match catch_unwind(AssertUnwindSafe(|| f(args))) {
            Ok(Ok(value)) => Some(value),
            Ok(Err(error)) => {
                handler.handle_error(HandledError::from_error(error), context.clone(), Severity::Medium);
                None
            }
            Err(payload) => {
                handler.handle_error(HandledError::from_panic(&*payload), context.clone(), Severity::Medium);
                None
            }
        }
    }

    /// Wrap an async fallible function so that failures are handled and
    /// become `None`.
    ///
    /// The returned futures are `Send + 'static` and run on any executor.
    /// A panic while polling the wrapped future is caught like an `Err`.
    pub fn wrap_async<A, T, E, F, Fut>(
        &self,
        f: F,
        context: ErrorContext,
    ) -> impl Fn(A) -> BoxFuture<'static, Option<T>> + Send + Sync + use<A, T, E, F, Fut>
    where
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        A: Send + 'static,
        T: Send + 'static,
        E: Error + Send + Sync + 'static,
    {
        let handler = self.clone();
        let f = Arc::new(f);
        move |args| {
            let handler = handler.clone();
            let f = Arc::clone(&f);
            let context = context.clone();
            async move {
                let outcome = AssertUnwindSafe(async move { (*f)(args).await })
                    .catch_unwind()
                    .await;
                let error = match outcome {
                    Ok(Ok(value)) => return Some(value),
                    Ok(Err(error)) => HandledError::from_error(error),
                    Err(payload) => HandledError::from_panic(&*payload),
                };
                handler.handle_error(error, context, Severity::Medium);
                None
            }
            .boxed()
        }
    }

    /// Callback for a UI render boundary.
    ///
    /// Errors are handled at [`Severity::High`] with the component name,
    /// action `"render"` and the boundary's info map as additional data.
    ///
    /// ```rust
    /// use quotefast_errors::{ErrorHandler, HandledError, NativeError, Severity};
    /// use serde_json::{Map, json};
    ///
    /// let handler = ErrorHandler::builder().build();
    /// let on_error = handler.boundary_handler("InvoiceTable");
    ///
    /// let mut info = Map::new();
    /// info.insert("componentStack".into(), json!("at InvoiceTable"));
    /// on_error(NativeError::new("TypeError", "rows is undefined").into(), info);
    ///
    /// let entry = &handler.error_queue()[0];
    /// assert_eq!(entry.severity, Severity::High);
    /// assert_eq!(entry.context.action.as_deref(), Some("render"));
    /// ```
    pub fn boundary_handler(
        &self,
        component_name: &str,
    ) -> impl Fn(HandledError, Map<String, Value>) + Send + Sync + 'static + use<> {
        let handler = self.clone();
        let component = component_name.to_owned();
        move |error, error_info| {
            let context = ErrorContext {
                additional_data: Some(error_info),
                ..ErrorContext::new().component(component.as_str()).action(BOUNDARY_ACTION)
            };
            handler.handle_error(error, context, Severity::High);
        }
    }
}

/// [`ErrorHandler::wrap_async`] on the global handler.
pub fn handle_async_error<A, T, E, F, Fut>(
    f: F,
    context: ErrorContext,
) -> impl Fn(A) -> BoxFuture<'static, Option<T>> + Send + Sync + use<A, T, E, F, Fut>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    A: Send + 'static,
    T: Send + 'static,
    E: Error + Send + Sync + 'static,
{
    ErrorHandler::global().wrap_async(f, context)
}

/// [`ErrorHandler::wrap_sync`] on the global handler.
pub fn handle_sync_error<A, T, E, F>(f: F, context: ErrorContext) -> impl Fn(A) -> Option<T> + use<A, T, E, F>
where
    F: Fn(A) -> Result<T, E>,
    E: Error + Send + Sync + 'static,
{
    ErrorHandler::global().wrap_sync(f, context)
}

/// [`ErrorHandler::boundary_handler`] on the global handler.
pub fn create_error_boundary_handler(
    component_name: &str,
) -> impl Fn(HandledError, Map<String, Value>) + Send + Sync + 'static + use<> {
    ErrorHandler::global().boundary_handler(component_name)
}

/// Build an [`AppError`](crate::AppError) with a formatted message and the
/// code's conventional status.
///
/// ```rust
/// use quotefast_errors::{ErrorCode, app_error};
///
/// let id = 42;
/// let err = app_error!(ErrorCode::CustomerNotFound, "customer {id} does not exist");
/// assert_eq!(err.message(), "customer 42 does not exist");
/// assert_eq!(err.status_code(), 404);
/// ```
#[macro_export]
macro_rules! app_error {
    ($code:expr, $($arg:tt)+) => {{
        let code: $crate::ErrorCode = $code;
        $crate::AppError::builder(::std::format!($($arg)+))
            .code(code)
            .status(code.default_status())
            .build()
    }};
}
