use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::records::RiskLevel;

/// Inclusive time window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at <= self.end
    }

    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

/// Record selection shared by reports, schedules and dashboards.
///
/// An empty list places no constraint on that dimension. String comparisons
/// are case-insensitive so `"US"` and `"us"` select the same records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportFilters {
    pub date_range: Option<DateRange>,
    pub industries: Vec<String>,
    pub countries: Vec<String>,
    pub risk_levels: Vec<RiskLevel>,
    pub business_ids: Vec<String>,
    pub custom: BTreeMap<String, String>,
}

impl ReportFilters {
    pub fn validate(&self) -> Result<(), String> {
        if let Some(range) = &self.date_range
            && !range.is_valid()
        {
            return Err("date_range.start must not be after date_range.end".to_string());
        }
        if self.custom.keys().any(|k| k.trim().is_empty()) {
            return Err("custom filter keys must not be empty".to_string());
        }
        Ok(())
    }

    pub fn matches_date(&self, at: DateTime<Utc>) -> bool {
        self.date_range.is_none_or(|range| range.contains(at))
    }

    pub fn matches_industry(&self, industry: &str) -> bool {
        matches_any(&self.industries, industry)
    }

    pub fn matches_country(&self, country: &str) -> bool {
        matches_any(&self.countries, country)
    }

    pub fn matches_business(&self, business_id: &str) -> bool {
        self.business_ids.is_empty() || self.business_ids.iter().any(|b| b == business_id)
    }

    pub fn matches_risk_level(&self, level: RiskLevel) -> bool {
        self.risk_levels.is_empty() || self.risk_levels.contains(&level)
    }

    pub fn matches_attributes(&self, attributes: &BTreeMap<String, String>) -> bool {
        self.custom.iter().all(|(key, expected)| {
            attributes
                .get(key)
                .is_some_and(|actual| actual.eq_ignore_ascii_case(expected))
        })
    }
}

fn matches_any(allowed: &[String], value: &str) -> bool {
    allowed.is_empty() || allowed.iter().any(|a| a.eq_ignore_ascii_case(value))
}
