mod dashboard;
mod health;
mod reports;
mod schedules;
mod templates;

pub use dashboard::{dashboard_overview, dashboard_predictions, dashboard_trends};
pub use health::health_check;
pub use reports::{create_report, delete_report, get_report, get_report_metrics, list_reports};
pub use schedules::{
    create_schedule, delete_schedule, get_schedule, list_schedules, run_schedule, update_schedule,
};
pub use templates::{
    create_template, delete_template, get_template, list_templates, update_template,
};
