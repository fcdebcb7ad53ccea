use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter},
};
use std::sync::LazyLock;

pub static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("risk-report-service"));

// --- Report lifecycle ---

pub static REPORTS_CREATED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("reports.created")
        .with_description("Reports accepted for generation")
        .with_unit("{report}")
        .build()
});

pub static REPORTS_COMPLETED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("reports.completed")
        .with_description("Reports that finished generating")
        .with_unit("{report}")
        .build()
});

pub static REPORTS_FAILED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("reports.failed")
        .with_description("Reports that ended in the failed status")
        .with_unit("{report}")
        .build()
});

pub static REPORTS_EXPIRED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("reports.expired")
        .with_description("Completed reports moved to expired by the retention sweep")
        .with_unit("{report}")
        .build()
});

pub static REPORT_GENERATION_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("report.generation.duration")
        .with_description("Time from pickup to stored file in seconds")
        .with_unit("s")
        .build()
});

pub static REPORT_OUTPUT_SIZE: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("report.output.size")
        .with_description("Size of the rendered report file")
        .with_unit("By")
        .build()
});

pub static REPORT_RECORDS: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("report.records")
        .with_description("Source records aggregated per report")
        .with_unit("{record}")
        .build()
});

pub static GENERATION_QUEUE_REJECTED: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("report.queue.rejected")
        .with_description("Generation jobs refused because the queue was full or closed")
        .with_unit("{job}")
        .build()
});

// --- Scheduler ---

pub static SCHEDULER_TICKS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("scheduler.ticks")
        .with_description("Scheduler evaluation passes")
        .with_unit("{tick}")
        .build()
});

pub static SCHEDULED_RUNS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("scheduler.runs")
        .with_description("Reports created from scheduled entries")
        .with_unit("{run}")
        .build()
});

pub static SCHEDULER_CONFLICTS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("scheduler.conflicts")
        .with_description("Scheduled entry writes that lost a version race")
        .with_unit("{conflict}")
        .build()
});

// --- Dashboard ---

pub static DASHBOARD_REQUESTS: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("dashboard.requests")
        .with_description("Dashboard views computed")
        .with_unit("{request}")
        .build()
});

// --- HTTP Metrics ---

pub static HTTP_REQUESTS_TOTAL: LazyLock<Counter<u64>> = LazyLock::new(|| {
    METER
        .u64_counter("http.requests.total")
        .with_description("Total number of HTTP requests")
        .with_unit("{request}")
        .build()
});

pub static HTTP_REQUEST_DURATION: LazyLock<Histogram<f64>> = LazyLock::new(|| {
    METER
        .f64_histogram("http.request.duration")
        .with_description("HTTP request duration in milliseconds")
        .with_unit("ms")
        .with_boundaries(vec![
            1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0,
        ])
        .build()
});
