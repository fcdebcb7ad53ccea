mod common;

use chrono::Utc;
use common::TestApp;
use tokio_test::{assert_err, assert_ok};

use risk_report_service::models::{
    CreateReportInput, CreateTemplateInput, ListReportsQuery, ReportFilters, ReportFormat,
    ReportStatus,
};

fn report_input(name: &str, format: &str) -> CreateReportInput {
    CreateReportInput {
        name: name.to_string(),
        report_type: "executive_summary".to_string(),
        format: format.to_string(),
        template_id: None,
        filters: ReportFilters::default(),
        recipients: vec![],
        metadata: None,
    }
}

#[tokio::test]
async fn test_report_goes_from_pending_to_completed() {
    let mut app = TestApp::new(Utc::now());
    app.seed_assessment("t1", "retail", 72.0).await;
    let reports = app.state.report_service.clone();

    let created = reports
        .create_report("t1", "u1", report_input("Q1 Summary", "text"))
        .await
        .unwrap();
    assert_eq!(created.status, ReportStatus::Pending);

    let pending = reports.get_report("t1", created.id).await.unwrap();
    assert_eq!(pending.status, ReportStatus::Pending);
    assert_eq!(pending.format, ReportFormat::Json);
    assert_eq!(pending.created_by, "u1");
    assert!(pending.download_url.is_empty());

    assert_eq!(app.drain().await, 1);

    let done = reports.get_report("t1", created.id).await.unwrap();
    assert_eq!(done.status, ReportStatus::Completed);
    assert!(done.file_size > 0);
    assert!(!done.download_url.is_empty());
    assert!(done.generated_at.is_some());
    assert_eq!(app.blobs.len().await, 1);
}

#[tokio::test]
async fn test_every_format_completes() {
    let mut app = TestApp::new(Utc::now());
    app.seed_assessment("t1", "banking", 35.0).await;
    let reports = app.state.report_service.clone();

    let mut ids = Vec::new();
    for format in ["docx", "csv", "json", "markdown", "html"] {
        let created = reports
            .create_report("t1", "u1", report_input(&format!("Report {format}"), format))
            .await
            .unwrap();
        ids.push(created.id);
    }
    assert_eq!(app.drain().await, 5);

    for id in ids {
        let report = reports.get_report("t1", id).await.unwrap();
        assert_eq!(report.status, ReportStatus::Completed, "{}", report.name);
        assert!(report.file_size > 0);
    }
}

#[tokio::test]
async fn test_deleting_template_leaves_completed_report_alone() {
    let mut app = TestApp::new(Utc::now());
    app.seed_assessment("t1", "retail", 55.0).await;
    let reports = app.state.report_service.clone();
    let templates = app.state.template_service.clone();

    let template = templates
        .create_template(
            "t1",
            "u1",
            CreateTemplateInput {
                name: "Board pack".to_string(),
                report_type: "executive_summary".to_string(),
                description: None,
                template: None,
                is_public: false,
                is_default: false,
                metadata: None,
            },
        )
        .await
        .unwrap();

    let mut input = report_input("Board Q1", "markdown");
    input.template_id = Some(template.id);
    let created = reports.create_report("t1", "u1", input).await.unwrap();
    app.drain().await;
    let before = reports.get_report("t1", created.id).await.unwrap();
    assert_eq!(before.status, ReportStatus::Completed);

    templates.delete_template("t1", template.id).await.unwrap();

    let after = reports.get_report("t1", created.id).await.unwrap();
    assert_eq!(after, before);
    assert_eq!(after.template_id, Some(template.id));
}

#[tokio::test]
async fn test_reports_are_invisible_to_other_tenants() {
    let mut app = TestApp::new(Utc::now());
    let reports = app.state.report_service.clone();

    let created = reports
        .create_report("t1", "u1", report_input("Private", "csv"))
        .await
        .unwrap();
    app.drain().await;

    assert_err!(reports.get_report("t2", created.id).await);
    assert_err!(reports.delete_report("t2", created.id).await);
    assert_ok!(reports.get_report("t1", created.id).await);

    let page = assert_ok!(
        reports
            .list_reports("t2", ListReportsQuery::default())
            .await
    );
    assert_eq!(page.total, 0);

    let metrics = reports.get_report_metrics("t1").await.unwrap();
    assert_eq!(metrics.total_reports, 1);
}

#[tokio::test]
async fn test_expired_reports_are_swept_after_retention() {
    let mut app = TestApp::new(Utc::now());
    let reports = app.state.report_service.clone();

    let created = reports
        .create_report("t1", "u1", report_input("Old news", "json"))
        .await
        .unwrap();
    app.drain().await;
    assert_eq!(app.blobs.len().await, 1);

    assert_eq!(reports.sweep_expired(Utc::now()).await.unwrap(), 0);

    let later = Utc::now() + chrono::Duration::days(31);
    assert_eq!(reports.sweep_expired(later).await.unwrap(), 1);

    let report = reports.get_report("t1", created.id).await.unwrap();
    assert_eq!(report.status, ReportStatus::Expired);
    assert_eq!(report.file_size, 0);
    assert!(report.download_url.is_empty());
    assert!(app.blobs.is_empty().await);

    assert_eq!(reports.sweep_expired(later).await.unwrap(), 0);
}

#[tokio::test]
async fn test_list_reports_applies_query_filters() {
    let mut app = TestApp::new(Utc::now());
    let reports = app.state.report_service.clone();

    let before = Utc::now();
    let csv = reports
        .create_report("t1", "u1", report_input("Table", "tabular"))
        .await
        .unwrap();
    let json = reports
        .create_report("t1", "u2", report_input("Dump", "json"))
        .await
        .unwrap();
    app.drain().await;

    let page = reports
        .list_reports(
            "t1",
            ListReportsQuery {
                format: Some("csv".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, csv.id);

    let page = reports
        .list_reports(
            "t1",
            ListReportsQuery {
                created_by: Some("u2".to_string()),
                status: Some("completed".to_string()),
                report_type: Some("executive_summary".to_string()),
                created_from: Some(before),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, json.id);

    let page = reports
        .list_reports(
            "t1",
            ListReportsQuery {
                created_to: Some(before - chrono::Duration::seconds(1)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(page.total, 0);

    let bad = reports
        .list_reports(
            "t1",
            ListReportsQuery {
                format: Some("pdf".to_string()),
                ..Default::default()
            },
        )
        .await;
    assert_err!(bad);
}
