pub mod aggregator;
pub mod config;
pub mod db;
pub mod delivery;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod middleware;
pub mod models;
pub mod render;
pub mod repository;
pub mod routes;
pub mod scheduler;
pub mod services;
pub mod storage;
pub mod telemetry;

pub use config::Config;

use scheduler::ReportScheduler;
use services::{DashboardService, ReportService, TemplateService};
use sqlx::PgPool;

#[derive(Clone)]
pub struct AppState {
    /// `None` when running on in-memory repositories.
    pub pool: Option<PgPool>,
    pub report_service: ReportService,
    pub template_service: TemplateService,
    pub scheduler: ReportScheduler,
    pub dashboard_service: DashboardService,
}
