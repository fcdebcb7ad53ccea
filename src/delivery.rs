use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{Recipient, ReportFormat, ReportStatus};

/// What a recipient is told about a finished report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportReference {
    pub report_id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub status: ReportStatus,
    pub format: ReportFormat,
    pub download_url: String,
    pub scheduled_report_id: Option<Uuid>,
}

/// Hands a finished report to the transport for one recipient. Only intent is
/// modelled here; a failing notifier never changes the report.
#[async_trait]
pub trait DeliveryNotifier: Send + Sync {
    async fn notify(&self, recipient: &Recipient, report: &ReportReference) -> anyhow::Result<()>;
}

/// Records delivery intent in the structured log.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl DeliveryNotifier for LoggingNotifier {
    #[tracing::instrument(
        name = "delivery.notify",
        skip(self, report),
        fields(report_id = %report.report_id, channel = recipient.channel.as_str())
    )]
    async fn notify(&self, recipient: &Recipient, report: &ReportReference) -> anyhow::Result<()> {
        tracing::info!(
            tenant_id = %report.tenant_id,
            address = %recipient.address,
            status = %report.status,
            download_url = %report.download_url,
            scheduled_report_id = ?report.scheduled_report_id,
            "Report delivery requested"
        );
        Ok(())
    }
}

/// Keeps every notification in memory; used by local runs and tests.
#[derive(Clone, Default)]
pub struct InMemoryNotifier {
    sent: Arc<Mutex<Vec<(Recipient, ReportReference)>>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn sent(&self) -> Vec<(Recipient, ReportReference)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl DeliveryNotifier for InMemoryNotifier {
    async fn notify(&self, recipient: &Recipient, report: &ReportReference) -> anyhow::Result<()> {
        self.sent
            .lock()
            .await
            .push((recipient.clone(), report.clone()));
        Ok(())
    }
}
