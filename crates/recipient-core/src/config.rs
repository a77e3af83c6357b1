//! Configuration for the recipient dashboard core

use crate::error::DashboardError;
use crate::types::{DateRange, FilterState};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Longest default date window accepted, in days.
pub const MAX_WINDOW_DAYS: i64 = 3_660;

/// Dashboard configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DashboardConfig {
    pub default_page_size: u32,
    pub default_page: u32,
    pub default_window_days: i64,
    /// Page count reported when a full page suggests more rows exist.
    pub pagination_upper_bound: u32,
    pub balance_timeframe: String,
    pub export_api_version: String,
    pub export_file_prefix: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            default_page_size: 15,
            default_page: 1,
            default_window_days: 7,
            pagination_upper_bound: 100,
            balance_timeframe: "future".to_string(),
            export_api_version: "2018-09-10".to_string(),
            export_file_prefix: "PagarMe_Extrato".to_string(),
        }
    }
}

impl DashboardConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, DashboardError> {
        let config: Self = serde_json::from_str(raw)
            .map_err(|e| DashboardError::schema("dashboard config", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, DashboardError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DashboardError::schema(format!("dashboard config {}", path.display()), e.to_string())
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), DashboardError> {
        if self.default_page_size == 0 {
            return Err(DashboardError::InvalidQuery(
                "default_page_size must be positive".to_string(),
            ));
        }
        if !(0..=MAX_WINDOW_DAYS).contains(&self.default_window_days) {
            return Err(DashboardError::InvalidQuery(format!(
                "default_window_days must be between 0 and {MAX_WINDOW_DAYS}, got {}",
                self.default_window_days
            )));
        }
        if self.default_page == 0 {
            return Err(DashboardError::InvalidQuery(
                "default_page must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Filter state used when the location carries no query.
    pub fn initial_filter(&self, today: NaiveDate) -> FilterState {
        let mut state = FilterState::new(
            DateRange::last_days(today, self.default_window_days),
            self.default_page_size,
        );
        state.page = self.default_page;
        state
    }
}
