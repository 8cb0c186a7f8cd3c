//! Volume/quality analytics and threshold-based anomaly detection.
//!
//! Every public operation returns a [`ServiceResult`] instead of an error:
//! reporting endpoints degrade gracefully, and the HTTP layer can serve the
//! wrapper as-is without a try/catch per call.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::PipelineError;
use crate::store::{BucketCount, EventStore, Period, PeriodCount};

/// Days of history behind the dashboard's trailing trend.
const TREND_DAYS: i64 = 30;

/// Days of history behind the anomaly baseline.
const BASELINE_DAYS: i64 = 7;

/// Uniform result wrapper: `success` plus either `data` or `error`/`message`.
#[derive(Debug, Serialize)]
pub struct ServiceResult<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ServiceResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
        }
    }

    pub fn err(message: impl Into<String>, error: impl ToString) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.to_string()),
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatisticsQuery {
    pub group_by: Option<Period>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct Statistics {
    /// The effective grouping, echoing the default when none was requested.
    pub group_by: Period,
    pub buckets: Vec<PeriodCount>,
}

#[derive(Debug, Serialize)]
pub struct DashboardData {
    pub total_events: i64,
    pub success_rate: f64,
    pub by_category: Vec<BucketCount>,
    pub by_severity: Vec<BucketCount>,
    pub daily_trend: Vec<PeriodCount>,
}

#[derive(Debug, Serialize)]
pub struct AnomalyReport {
    pub observed: u64,
    pub expected: f64,
    pub anomalous: bool,
    pub window_hours: i64,
    pub threshold_multiplier: f64,
}

#[derive(Debug, Serialize)]
pub struct ComplianceReport {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub statistics: Statistics,
    pub dashboard: DashboardData,
    pub generated_at: DateTime<Utc>,
}

pub struct AnalyticsService {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn EventStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn get_statistics(&self, query: &StatisticsQuery) -> ServiceResult<Statistics> {
        match self.statistics(query).await {
            Ok(data) => ServiceResult::ok(data),
            Err(e) => {
                tracing::error!("statistics query failed: {e}");
                ServiceResult::err("Failed to compute statistics", e)
            }
        }
    }

    pub async fn get_dashboard_data(&self) -> ServiceResult<DashboardData> {
        match self.dashboard().await {
            Ok(data) => ServiceResult::ok(data),
            Err(e) => {
                tracing::error!("dashboard query failed: {e}");
                ServiceResult::err("Failed to compute dashboard data", e)
            }
        }
    }

    pub async fn detect_anomaly(
        &self,
        user_id: Option<Uuid>,
        window_hours: i64,
        threshold_multiplier: f64,
    ) -> ServiceResult<AnomalyReport> {
        match self
            .anomaly(user_id, window_hours, threshold_multiplier)
            .await
        {
            Ok(data) => ServiceResult::ok(data),
            Err(e) => {
                tracing::error!("anomaly detection failed: {e}");
                ServiceResult::err("Failed to run anomaly detection", e)
            }
        }
    }

    /// Both bounds are required; a missing one fails fast without touching
    /// the store.
    pub async fn generate_compliance_report(
        &self,
        start_date: Option<DateTime<Utc>>,
        end_date: Option<DateTime<Utc>>,
    ) -> ServiceResult<ComplianceReport> {
        let (Some(start), Some(end)) = (start_date, end_date) else {
            return ServiceResult::err(
                "Failed to generate compliance report",
                "start_date and end_date are required",
            );
        };

        match self.compliance(start, end).await {
            Ok(data) => ServiceResult::ok(data),
            Err(e) => {
                tracing::error!("compliance report failed: {e}");
                ServiceResult::err("Failed to generate compliance report", e)
            }
        }
    }

    async fn statistics(&self, query: &StatisticsQuery) -> Result<Statistics, PipelineError> {
        let group_by = query.group_by.unwrap_or(Period::Day);
        let buckets = self
            .store
            .grouped_counts(group_by, query.date_from, query.date_to)
            .await?;
        Ok(Statistics { group_by, buckets })
    }

    async fn dashboard(&self) -> Result<DashboardData, PipelineError> {
        let status = self.store.status_counts().await?;
        let success_rate = if status.total == 0 {
            0.0
        } else {
            status.successful as f64 / status.total as f64
        };

        Ok(DashboardData {
            total_events: status.total,
            success_rate,
            by_category: self.store.category_breakdown().await?,
            by_severity: self.store.severity_breakdown().await?,
            daily_trend: self.store.daily_counts(TREND_DAYS, self.clock.now()).await?,
        })
    }

    /// Observed volume in the trailing window against the per-window average
    /// of the seven days preceding it. A zero baseline never flags: sparse
    /// history produces no verdict rather than a false positive.
    async fn anomaly(
        &self,
        user_id: Option<Uuid>,
        window_hours: i64,
        threshold_multiplier: f64,
    ) -> Result<AnomalyReport, PipelineError> {
        if window_hours <= 0 {
            return Err(PipelineError::InvalidRequest(
                "window_hours must be positive".to_string(),
            ));
        }

        let now = self.clock.now();
        let window = chrono::Duration::hours(window_hours);

        let observed = self.store.count_in_range(user_id, now - window, now).await?;

        let baseline_to = now - window;
        let baseline_from = baseline_to - chrono::Duration::days(BASELINE_DAYS);
        let baseline = self
            .store
            .count_in_range(user_id, baseline_from, baseline_to)
            .await?;

        let windows_in_baseline = (BASELINE_DAYS * 24) as f64 / window_hours as f64;
        let expected = baseline as f64 / windows_in_baseline;
        let anomalous = expected > 0.0 && observed as f64 > expected * threshold_multiplier;

        Ok(AnomalyReport {
            observed,
            expected,
            anomalous,
            window_hours,
            threshold_multiplier,
        })
    }

    async fn compliance(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ComplianceReport, PipelineError> {
        let statistics = self
            .statistics(&StatisticsQuery {
                group_by: Some(Period::Day),
                date_from: Some(start),
                date_to: Some(end),
            })
            .await?;
        let dashboard = self.dashboard().await?;

        Ok(ComplianceReport {
            period_start: start,
            period_end: end,
            statistics,
            dashboard,
            generated_at: self.clock.now(),
        })
    }
}
