//! Critical-error reporting.
//!
//! When a `Critical` error is handled in production, the handler hands an
//! owned [`ErrorReport`] to an [`ErrorReporter`]. Delivery is fire-and-forget:
//! the handler never waits for it, and a failing or panicking reporter is
//! logged as `"Failed to report error"` and otherwise ignored.
//!
//! # Dispatch
//!
//! [`ReportDispatch::Detached`] (the default) spawns the delivery and never
//! joins it:
//!
//! - with the `tokio` feature and a runtime present, on `spawn_blocking`
//! - else with the `async_std` feature, on the async-std executor
//! - else on one lazily started reporter thread, fed over a channel; if that
//!   thread cannot be spawned, inline
//!
//! [`ReportDispatch::Inline`] delivers before `handle_error` returns, which
//! makes tests deterministic.

use crate::handler::guarded;
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::{ErrorContext, HandledError, NativeError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::io::{self, Write};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard};
#[cfg(not(feature = "async_std"))]
use std::sync::{OnceLock, mpsc};

/// Owned snapshot of a critical error, handed to the reporter.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReport {
    /// The error as handled.
    pub error: HandledError,
    /// Context after enrichment.
    pub context: ErrorContext,
    /// When the report was created.
    pub reported_at: DateTime<Utc>,
}

impl ErrorReport {
    /// Snapshot `error` and `context` now.
    pub fn new(error: HandledError, context: ErrorContext) -> Self {
        Self {
            error,
            context,
            reported_at: Utc::now(),
        }
    }
}

/// Why a report could not be delivered.
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    /// Writing to the destination failed.
    #[error("report delivery failed: {0}")]
    Io(#[from] io::Error),
    /// The report could not be encoded.
    #[error("report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    /// The destination refused or is not reachable.
    #[error("reporting service unavailable: {0}")]
    Unavailable(String),
}

/// External error-reporting collaborator.
pub trait ErrorReporter: Send + Sync {
    /// Deliver one report. May block; always called off the caller's path
    /// unless dispatch is inline.
    fn report(&self, report: &ErrorReport) -> Result<(), ReportError>;
}

/// How delivery is scheduled relative to `handle_error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReportDispatch {
    /// Spawn and detach.
    #[default]
    Detached,
    /// Deliver before returning.
    Inline,
}

// ============================================================================
// Reporters
// ============================================================================

/// Reporter that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ErrorReporter for NoopReporter {
    fn report(&self, _report: &ErrorReport) -> Result<(), ReportError> {
        Ok(())
    }
}

/// Reporter that forwards reports to a log sink at info level.
///
/// The default reporter, for deployments without an external service.
pub struct LogReporter {
    sink: Arc<dyn LogSink>,
    label: String,
}

impl LogReporter {
    /// Forward reports to `sink` under `label`.
    pub fn new(sink: Arc<dyn LogSink>, label: impl Into<String>) -> Self {
        Self {
            sink,
            label: label.into(),
        }
    }
}

impl ErrorReporter for LogReporter {
    fn report(&self, report: &ErrorReport) -> Result<(), ReportError> {
        self.sink.log(
            &LogRecord::new(LogLevel::Info, "Forwarding error to reporting service", &self.label)
                .with_error(&report.error)
                .with_context(&report.context),
        );
        Ok(())
    }
}

/// Reporter writing one JSON object per report, one per line.
///
/// ```rust
/// use quotefast_errors::{
///     AppError, ErrorContext, ErrorReport, ErrorReporter, JsonLinesReporter,
/// };
///
/// let reporter = JsonLinesReporter::new(Vec::new());
/// let err = AppError::builder("charge failed").build();
/// reporter.report(&ErrorReport::new(err.into(), ErrorContext::new())).unwrap();
///
/// let out = String::from_utf8(reporter.into_inner()).unwrap();
/// assert!(out.ends_with('\n'));
/// assert!(out.contains("\"charge failed\""));
/// ```
pub struct JsonLinesReporter<W> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesReporter<W> {
    /// Write reports to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Recover the writer.
    pub fn into_inner(self) -> W {
        match self.writer.into_inner() {
            Ok(writer) => writer,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, W> {
        match self.writer.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<W: Write + Send> ErrorReporter for JsonLinesReporter<W> {
    fn report(&self, report: &ErrorReport) -> Result<(), ReportError> {
        let line = serde_json::to_vec(report)?;
        let mut writer = self.lock();
        writer.write_all(&line)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }
}

// ============================================================================
// Delivery
// ============================================================================

type ReportJob = Box<dyn FnOnce() + Send + 'static>;

/// Build the delivery job for one report.
///
/// The job never panics out: reporter errors and panics are logged to
/// `sink` at error level.
pub(crate) fn delivery_job(
    reporter: Arc<dyn ErrorReporter>,
    sink: Arc<dyn LogSink>,
    label: String,
    report: ErrorReport,
) -> ReportJob {
    Box::new(move || {
        let failure = match catch_unwind(AssertUnwindSafe(|| reporter.report(&report))) {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err.to_string()),
            Err(payload) => Some(NativeError::from_panic(&*payload).message().to_owned()),
        };

        if let Some(detail) = failure {
            guarded(|| {
                sink.log(
                    &LogRecord::new(LogLevel::Error, "Failed to report error", &label)
                        .with_error(&report.error)
                        .with_context(&report.context)
                        .with_detail(&detail),
                )
            });
        }
    })
}

/// Run `job` according to `mode`.
pub(crate) fn dispatch(mode: ReportDispatch, job: ReportJob) {
    match mode {
        ReportDispatch::Inline => job(),
        ReportDispatch::Detached => spawn_detached(job),
    }
}

fn spawn_detached(job: ReportJob) {
    #[cfg(feature = "tokio")]
    let job = match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            drop(handle.spawn_blocking(job));
            return;
        }
        Err(_) => job,
    };

    #[cfg(feature = "async_std")]
    {
        drop(async_std::task::spawn(async move { job() }));
    }

    #[cfg(not(feature = "async_std"))]
    spawn_thread(job);
}

/// Lazily started worker that drains detached jobs in submission order.
///
/// `None` records that the thread could not be spawned; jobs then run inline.
#[cfg(not(feature = "async_std"))]
static REPORT_WORKER: OnceLock<Option<mpsc::Sender<ReportJob>>> = OnceLock::new();

#[cfg(not(feature = "async_std"))]
fn spawn_thread(job: ReportJob) {
    let worker = REPORT_WORKER.get_or_init(|| {
        let (tx, rx) = mpsc::channel::<ReportJob>();
        std::thread::Builder::new()
            .name("quotefast-report".to_owned())
            .spawn(move || {
                for job in rx {
                    guarded(job);
                }
            })
            .ok()
            .map(|_| tx)
    });

    let job = match worker {
        Some(tx) => match tx.send(job) {
            Ok(()) => return,
            Err(mpsc::SendError(job)) => job,
        },
        None => job,
    };
    job();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AppError;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct CapturingSink {
        lines: Mutex<Vec<String>>,
    }

    impl LogSink for CapturingSink {
        fn log(&self, record: &LogRecord<'_>) {
            let mut line = String::new();
            let _ = record.write_to(&mut line);
            self.lines.lock().unwrap().push(line);
        }
    }

    struct FailingReporter;

    impl ErrorReporter for FailingReporter {
        fn report(&self, _report: &ErrorReport) -> Result<(), ReportError> {
            Err(ReportError::Unavailable("503 from collector".into()))
        }
    }

    struct PanickingReporter;

    impl ErrorReporter for PanickingReporter {
        fn report(&self, _report: &ErrorReport) -> Result<(), ReportError> {
            panic!("collector client bug");
        }
    }

    fn report() -> ErrorReport {
        ErrorReport::new(AppError::builder("charge failed").build().into(), ErrorContext::new())
    }

    #[test]
    fn reporter_errors_are_logged_not_raised() {
        let sink = Arc::new(CapturingSink::default());
        let job = delivery_job(Arc::new(FailingReporter), sink.clone(), "error-handler".into(), report());
        dispatch(ReportDispatch::Inline, job);

        let lines = sink.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("[ERROR] [error-handler] Failed to report error"));
        assert!(lines[0].contains("503 from collector"));
    }

    #[test]
    fn reporter_panics_are_contained() {
        let sink = Arc::new(CapturingSink::default());
        let job = delivery_job(Arc::new(PanickingReporter), sink.clone(), "h".into(), report());
        dispatch(ReportDispatch::Inline, job);

        let lines = sink.lines.lock().unwrap();
        assert!(lines[0].contains("collector client bug"));
    }

    #[test]
    fn successful_delivery_logs_nothing() {
        let sink = Arc::new(CapturingSink::default());
        let job = delivery_job(Arc::new(NoopReporter), sink.clone(), "h".into(), report());
        dispatch(ReportDispatch::Inline, job);
        assert!(sink.lines.lock().unwrap().is_empty());
    }

    #[test]
    fn detached_dispatch_runs_off_thread() {
        let (tx, rx) = mpsc::channel();
        let caller = thread::current().id();
        dispatch(
            ReportDispatch::Detached,
            Box::new(move || {
                let _ = tx.send(thread::current().id());
            }),
        );
        let worker = rx.recv_timeout(Duration::from_secs(5)).expect("job never ran");
        assert_ne!(worker, caller);
    }

    #[cfg(not(feature = "async_std"))]
    #[test]
    fn detached_bursts_share_one_reporter_thread() {
        let (tx, rx) = mpsc::channel();
        for n in 0..32 {
            let tx = tx.clone();
            dispatch(
                ReportDispatch::Detached,
                Box::new(move || {
                    let _ = tx.send((n, thread::current().id()));
                }),
            );
        }

        let seen: Vec<_> = (0..32)
            .map(|_| rx.recv_timeout(Duration::from_secs(5)).expect("job never ran"))
            .collect();
        let order: Vec<_> = seen.iter().map(|(n, _)| *n).collect();
        assert_eq!(order, (0..32).collect::<Vec<_>>());
        assert!(seen.iter().all(|(_, id)| *id == seen[0].1));
        assert_ne!(seen[0].1, thread::current().id());
    }

    #[test]
    fn log_reporter_forwards_at_info() {
        let sink = Arc::new(CapturingSink::default());
        let reporter = LogReporter::new(sink.clone(), "error-handler");
        reporter.report(&report()).unwrap();
        let lines = sink.lines.lock().unwrap();
        assert!(lines[0].starts_with("[INFO] [error-handler] Forwarding error to reporting service"));
    }

    #[test]
    fn json_lines_reporter_writes_one_object_per_line() {
        let reporter = JsonLinesReporter::new(Vec::new());
        reporter.report(&report()).unwrap();
        reporter.report(&report()).unwrap();

        let out = String::from_utf8(reporter.into_inner()).unwrap();
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["error"]["kind"], "app");
        assert_eq!(first["error"]["message"], "charge failed");
        assert!(first["reportedAt"].is_string());
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::from(io::ErrorKind::BrokenPipe))
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn json_lines_reporter_surfaces_io_errors() {
        let reporter = JsonLinesReporter::new(BrokenWriter);
        assert!(matches!(reporter.report(&report()), Err(ReportError::Io(_))));
    }
}
