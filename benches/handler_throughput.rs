// benches/handler_throughput.rs
//! Throughput of the hot paths: handling, classification, statistics.
//!
//! Every handler here logs to a discarding sink so the numbers measure the
//! handler, not a subscriber.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use quotefast_errors::{
    AppError, ErrorCode, ErrorContext, ErrorHandler, FixedEnvironment, LogRecord, LogSink,
    NativeError, NoopReporter, RawTransportError, ReportDispatch, Severity, TransportFailure,
    ValidationErrors,
};

struct DiscardSink;

impl LogSink for DiscardSink {
    fn log(&self, record: &LogRecord<'_>) {
        black_box(record.message);
    }
}

fn handler(capacity: usize) -> ErrorHandler {
    ErrorHandler::builder()
        .sink(DiscardSink)
        .reporter(NoopReporter)
        .environment(FixedEnvironment::new().production(true))
        .report_dispatch(ReportDispatch::Inline)
        .max_queue_size(capacity)
        .build()
}

fn app_error() -> AppError {
    AppError::builder("Quote could not be generated")
        .code(ErrorCode::QuoteGenerationFailed)
        .build_with(&FixedEnvironment::new())
}

// ============================================================================
// Handling
// ============================================================================

fn bench_handle_error(c: &mut Criterion) {
    let mut group = c.benchmark_group("handle_error");

    for severity in Severity::ALL {
        let handler = handler(100);
        group.bench_with_input(BenchmarkId::new("severity", severity), &severity, |b, &severity| {
            b.iter(|| {
                handler.handle_error(
                    app_error(),
                    ErrorContext::new().component("QuoteWizard"),
                    black_box(severity),
                )
            })
        });
    }

    let handler = handler(100);
    group.bench_function("native", |b| {
        b.iter(|| {
            handler.handle_error(
                NativeError::new("TypeError", "x is undefined"),
                ErrorContext::new(),
                Severity::Medium,
            )
        })
    });

    group.finish();
}

fn bench_queue_capacity(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_at_capacity");

    for capacity in [10usize, 100, 1_000] {
        let handler = handler(capacity);
        for _ in 0..capacity {
            handler.handle_error(app_error(), ErrorContext::new(), Severity::Low);
        }
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, _| {
            b.iter(|| handler.handle_error(app_error(), ErrorContext::new(), Severity::Low))
        });
    }

    group.finish();
}

// ============================================================================
// Classification
// ============================================================================

fn bench_classification(c: &mut Criterion) {
    let mut group = c.benchmark_group("classification");
    let handler = handler(100);

    let cases = [
        ("response", RawTransportError::with_response(404, Some("Customer not found"))),
        ("no_response", RawTransportError::no_response("ECONNREFUSED")),
        ("timeout", RawTransportError::default().code("ECONNABORTED")),
        ("opaque", RawTransportError::default()),
    ];

    for (name, raw) in &cases {
        group.bench_with_input(BenchmarkId::new("classify", name), raw, |b, raw| {
            b.iter(|| TransportFailure::classify(black_box(raw)).error_code())
        });
        group.bench_with_input(BenchmarkId::new("handle_api_error", name), raw, |b, raw| {
            b.iter(|| handler.handle_api_error(black_box(raw), "/api/customers/7", None, ErrorContext::new()))
        });
    }

    let errors = ValidationErrors::new()
        .with("firstName", "too short")
        .with("email", "invalid")
        .with("email", "already registered");
    group.bench_function("handle_validation_error", |b| {
        b.iter(|| handler.handle_validation_error(black_box(errors.clone()), ErrorContext::new()))
    });

    group.finish();
}

// ============================================================================
// Diagnostics
// ============================================================================

fn bench_stats(c: &mut Criterion) {
    let handler = handler(100);
    for (n, code) in ErrorCode::ALL.iter().cycle().take(100).enumerate() {
        let err = AppError::builder("queued").code(*code).build_with(&FixedEnvironment::new());
        handler.handle_error(err, ErrorContext::new(), Severity::ALL[n % 4]);
    }

    c.bench_function("error_stats_full_queue", |b| b.iter(|| black_box(handler.error_stats())));
    c.bench_function("error_queue_snapshot", |b| b.iter(|| black_box(handler.error_queue())));
}

criterion_group!(handling_benches, bench_handle_error, bench_queue_capacity);
criterion_group!(classification_benches, bench_classification);
criterion_group!(diagnostic_benches, bench_stats);

criterion_main!(handling_benches, classification_benches, diagnostic_benches);
