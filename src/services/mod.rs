mod dashboard;
mod report;
mod template;

pub use dashboard::DashboardService;
pub use report::{GENERATION_ABANDONED, QUEUE_UNAVAILABLE, ReportService};
pub use template::TemplateService;
