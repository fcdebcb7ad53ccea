use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::filters::ReportFilters;
use super::report::{ReportFormat, ReportType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Once,
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Once => "once",
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
            Frequency::Quarterly => "quarterly",
            Frequency::Yearly => "yearly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a monthly schedule does in months that lack a configured day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonthDayPolicy {
    #[default]
    Skip,
    Clamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schedule {
    pub frequency: Frequency,
    #[serde(default = "default_interval")]
    pub interval: u32,
    /// 0 = Sunday .. 6 = Saturday.
    #[serde(default)]
    pub days_of_week: Vec<u8>,
    #[serde(default)]
    pub days_of_month: Vec<u8>,
    #[serde(default = "default_time_of_day")]
    pub time_of_day: String,
    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub month_day_policy: MonthDayPolicy,
}

fn default_interval() -> u32 {
    1
}

fn default_time_of_day() -> String {
    "00:00".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

impl Schedule {
    pub fn new(frequency: Frequency, time_of_day: &str) -> Self {
        Self {
            frequency,
            interval: 1,
            days_of_week: Vec::new(),
            days_of_month: Vec::new(),
            time_of_day: time_of_day.to_string(),
            timezone: default_timezone(),
            start_date: None,
            end_date: None,
            month_day_policy: MonthDayPolicy::Skip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryChannel {
    Email,
    Webhook,
    Slack,
}

impl DeliveryChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryChannel::Email => "email",
            DeliveryChannel::Webhook => "webhook",
            DeliveryChannel::Slack => "slack",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub channel: DeliveryChannel,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledReport {
    pub id: Uuid,
    pub tenant_id: String,
    pub name: String,
    pub report_type: ReportType,
    pub format: ReportFormat,
    pub template_id: Option<Uuid>,
    pub schedule: Schedule,
    pub filters: ReportFilters,
    pub recipients: Vec<Recipient>,
    pub is_active: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
    /// Incremented on every write; writes are conditional on the version read.
    pub version: i64,
}

impl ScheduledReport {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.next_run_at.is_some_and(|next| next <= now)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateScheduledReportInput {
    pub name: String,
    pub report_type: String,
    pub format: String,
    #[serde(default)]
    pub template_id: Option<Uuid>,
    pub schedule: Schedule,
    #[serde(default)]
    pub filters: ReportFilters,
    #[serde(default)]
    pub recipients: Vec<Recipient>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

/// Wraps any value that is present in the body, `null` included, so it can be
/// told apart from a missing field.
fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateScheduledReportInput {
    pub name: Option<String>,
    pub report_type: Option<String>,
    pub format: Option<String>,
    /// Absent leaves the template alone; `null` clears it.
    #[serde(default, deserialize_with = "present")]
    pub template_id: Option<Option<Uuid>>,
    pub schedule: Option<Schedule>,
    pub filters: Option<ReportFilters>,
    pub recipients: Option<Vec<Recipient>>,
    pub is_active: Option<bool>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListScheduledReportsQuery {
    pub is_active: Option<bool>,
    pub report_type: Option<String>,
    pub created_by: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ScheduleListFilter {
    pub is_active: Option<bool>,
    pub report_type: Option<ReportType>,
    pub created_by: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl ScheduleListFilter {
    pub fn matches(&self, entry: &ScheduledReport) -> bool {
        self.is_active.is_none_or(|a| entry.is_active == a)
            && self.report_type.is_none_or(|t| entry.report_type == t)
            && self
                .created_by
                .as_deref()
                .is_none_or(|c| entry.created_by == c)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schedule_defaults() {
        let schedule: Schedule = serde_json::from_str(r#"{"frequency": "weekly"}"#).unwrap();
        assert_eq!(schedule.frequency, Frequency::Weekly);
        assert_eq!(schedule.interval, 1);
        assert_eq!(schedule.time_of_day, "00:00");
        assert_eq!(schedule.timezone, "UTC");
        assert_eq!(schedule.month_day_policy, MonthDayPolicy::Skip);
    }

    #[test]
    fn test_unknown_frequency_rejected() {
        let result = serde_json::from_str::<Schedule>(r#"{"frequency": "hourly"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_recipient_deserialize() {
        let recipient: Recipient =
            serde_json::from_str(r#"{"channel": "email", "address": "risk@example.com"}"#)
                .unwrap();
        assert_eq!(recipient.channel, DeliveryChannel::Email);
        assert_eq!(recipient.address, "risk@example.com");
    }

    #[test]
    fn test_update_tells_null_template_from_missing() {
        let missing: UpdateScheduledReportInput = serde_json::from_str(r#"{"name": "x"}"#).unwrap();
        assert_eq!(missing.template_id, None);

        let cleared: UpdateScheduledReportInput =
            serde_json::from_str(r#"{"template_id": null}"#).unwrap();
        assert_eq!(cleared.template_id, Some(None));

        let id = Uuid::new_v4();
        let set: UpdateScheduledReportInput =
            serde_json::from_str(&format!(r#"{{"template_id": "{id}"}}"#)).unwrap();
        assert_eq!(set.template_id, Some(Some(id)));
    }
}
