use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::{HeaderName, Request, Response, StatusCode};
use opentelemetry::KeyValue;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::broadcast;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::{MakeSpan, OnResponse, TraceLayer},
};
use tracing::Span;

use risk_report_service::{
    AppState, Config,
    aggregator::{DataAggregator, InMemoryRiskDataSource, PgRiskDataSource, RiskDataSource},
    db,
    delivery::LoggingNotifier,
    jobs::{GenerationQueue, GenerationWorker, run_maintenance},
    render::ContentGenerator,
    repository::{
        InMemoryReportRepository, InMemoryScheduledReportRepository, InMemoryTemplateRepository,
        PgReportRepository, PgScheduledReportRepository, PgTemplateRepository, ReportRepository,
        ScheduledReportRepository, TemplateRepository,
    },
    routes,
    scheduler::{ReportScheduler, SystemClock},
    services::{DashboardService, ReportService, TemplateService},
    storage::LocalBlobStore,
    telemetry::{HTTP_REQUEST_DURATION, HTTP_REQUESTS_TOTAL, init_telemetry},
};

const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone)]
struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        let method = request.method().as_str();
        let uri = request.uri();
        let path = uri.path();

        let request_id = request
            .headers()
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        tracing::info_span!(
            "HTTP request",
            otel.name = %format!("{} {}", method, path),
            http.method = %method,
            http.route = %path,
            http.target = %uri,
            http.scheme = "http",
            http.flavor = ?request.version(),
            http.user_agent = request.headers()
                .get("user-agent")
                .and_then(|v| v.to_str().ok())
                .unwrap_or(""),
            http.request_id = %request_id,
            tenant_id = tracing::field::Empty,
            http.response.status_code = tracing::field::Empty,
            otel.status_code = tracing::field::Empty,
        )
    }
}

#[derive(Clone)]
struct HttpOnResponse;

impl<B> OnResponse<B> for HttpOnResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status().as_u16();

        span.record("http.response.status_code", status as i64);

        if status >= 500 {
            span.record("otel.status_code", "ERROR");
        } else {
            span.record("otel.status_code", "OK");
        }

        let latency_ms = latency.as_secs_f64() * 1000.0;
        let status_class = format!("{}xx", status / 100);

        HTTP_REQUESTS_TOTAL.add(
            1,
            &[
                KeyValue::new("http.status_code", status.to_string()),
                KeyValue::new("http.status_class", status_class.clone()),
            ],
        );

        HTTP_REQUEST_DURATION.record(
            latency_ms,
            &[
                KeyValue::new("http.status_code", status.to_string()),
                KeyValue::new("http.status_class", status_class),
            ],
        );

        tracing::info!(
            http.response.status_code = status,
            latency_ms = latency_ms,
            "finished processing request"
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let telemetry_guard = init_telemetry(&config)?;

    tracing::info!(
        port = config.port,
        environment = %config.environment,
        "Starting risk-report-service"
    );

    let (pool, reports, templates, schedules, source): (
        _,
        Arc<dyn ReportRepository>,
        Arc<dyn TemplateRepository>,
        Arc<dyn ScheduledReportRepository>,
        Arc<dyn RiskDataSource>,
    ) = match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::create_pool(url).await?;
            db::run_migrations(&pool).await?;
            (
                Some(pool.clone()),
                Arc::new(PgReportRepository::new(pool.clone())),
                Arc::new(PgTemplateRepository::new(pool.clone())),
                Arc::new(PgScheduledReportRepository::new(pool.clone())),
                Arc::new(PgRiskDataSource::new(pool)),
            )
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using in-memory storage");
            (
                None,
                Arc::new(InMemoryReportRepository::new()),
                Arc::new(InMemoryTemplateRepository::new()),
                Arc::new(InMemoryScheduledReportRepository::new()),
                Arc::new(InMemoryRiskDataSource::new()),
            )
        }
    };

    let blobs = Arc::new(LocalBlobStore::new(
        &config.report_storage_dir,
        &config.report_public_base_url,
    ));
    let aggregator = DataAggregator::new(source);
    let (queue, jobs) = GenerationQueue::bounded(config.generation_queue_capacity);

    let report_service = ReportService::new(
        reports.clone(),
        templates.clone(),
        blobs.clone(),
        queue,
        chrono::Duration::days(config.report_retention_days),
    );
    let template_service = TemplateService::new(templates.clone());
    let dashboard_service = DashboardService::new(aggregator.clone());
    let scheduler = ReportScheduler::new(
        schedules,
        templates.clone(),
        report_service.clone(),
        Arc::new(SystemClock),
    );
    scheduler.load_active().await?;

    let worker = GenerationWorker::new(
        reports,
        templates,
        aggregator,
        ContentGenerator::new()?,
        blobs,
        Arc::new(LoggingNotifier),
    );

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let background = [
        tokio::spawn(worker.run(
            jobs,
            config.max_concurrent_generations,
            shutdown_tx.subscribe(),
        )),
        tokio::spawn(scheduler.clone().run(
            Duration::from_secs(config.scheduler_tick_secs),
            shutdown_tx.subscribe(),
        )),
        tokio::spawn(run_maintenance(
            report_service.clone(),
            Duration::from_secs(config.maintenance_interval_secs),
            chrono::Duration::minutes(config.stale_generation_minutes),
            shutdown_tx.subscribe(),
        )),
    ];

    let state = AppState {
        pool,
        report_service,
        template_service,
        scheduler,
        dashboard_service,
    };

    let app = routes::create_router(state)
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(HttpMakeSpan)
                .on_response(HttpOnResponse),
        )
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(30),
        ))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(%addr, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(());
    for task in background {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Background task ended abnormally");
        }
    }

    tracing::info!("Server shutdown complete");
    telemetry_guard.shutdown();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
