//! The process-wide handler and the free functions bound to it.
//!
//! Lives in its own test binary: the global is set once per process, so
//! everything that touches it runs in a single test.

use quotefast_errors::{
    AppError, ErrorCode, ErrorContext, ErrorHandler, FixedEnvironment, HandledError, LogLevel,
    LogRecord, LogSink, NoopReporter, ReportDispatch, Severity, create_error_boundary_handler,
    handle_async_error, handle_sync_error,
};
use serde_json::{Map, json};
use std::io;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<(LogLevel, String)>>,
}

impl LogSink for RecordingSink {
    fn log(&self, record: &LogRecord<'_>) {
        self.lines
            .lock()
            .unwrap()
            .push((record.level, record.message.to_owned()));
    }
}

#[test]
fn installed_handler_backs_the_free_functions() {
    let sink = Arc::new(RecordingSink::default());
    let handler = ErrorHandler::builder()
        .shared_sink(sink.clone())
        .reporter(NoopReporter)
        .environment(FixedEnvironment::new())
        .report_dispatch(ReportDispatch::Inline)
        .log_label("global-test")
        .build();

    assert!(ErrorHandler::install(handler).is_ok());
    assert_eq!(ErrorHandler::global().config().log_label, "global-test");

    let second = ErrorHandler::builder().log_label("late").build();
    let rejected = ErrorHandler::install(second).unwrap_err();
    assert_eq!(rejected.config().log_label, "late");
    assert_eq!(ErrorHandler::global().config().log_label, "global-test");

    // sync
    let parse = handle_sync_error(
        |s: &str| s.parse::<u8>(),
        ErrorContext::new().component("QtyInput"),
    );
    assert_eq!(parse("7"), Some(7));
    assert_eq!(parse("x"), None);

    // async
    let load = handle_async_error(
        |id: u32| async move {
            if id == 0 {
                Err(io::Error::new(io::ErrorKind::NotFound, "no quote"))
            } else {
                Ok(format!("quote-{id}"))
            }
        },
        ErrorContext::new().component("QuoteLoader"),
    );
    assert_eq!(futures::executor::block_on(load(3)).as_deref(), Some("quote-3"));
    assert_eq!(futures::executor::block_on(load(0)), None);

    // boundary
    let boundary = create_error_boundary_handler("InvoiceTable");
    let mut info = Map::new();
    info.insert("componentStack".into(), json!("at InvoiceTable"));
    let err = AppError::builder("render failed")
        .code(ErrorCode::UnknownError)
        .build_with(&FixedEnvironment::new());
    boundary(HandledError::from(err), info);

    let queue = ErrorHandler::global().error_queue();
    assert_eq!(queue.len(), 3);

    assert_eq!(queue[0].context.component.as_deref(), Some("QtyInput"));
    assert_eq!(queue[0].severity, Severity::Medium);

    assert_eq!(queue[1].context.component.as_deref(), Some("QuoteLoader"));
    assert_eq!(queue[1].error.message(), "no quote");
    assert_eq!(queue[1].severity, Severity::Medium);

    assert_eq!(queue[2].context.component.as_deref(), Some("InvoiceTable"));
    assert_eq!(queue[2].context.action.as_deref(), Some("render"));
    assert_eq!(queue[2].severity, Severity::High);
    assert_eq!(
        queue[2].context.additional_data.as_ref().unwrap()["componentStack"],
        json!("at InvoiceTable")
    );

    assert_eq!(sink.lines.lock().unwrap().len(), 3);
}
