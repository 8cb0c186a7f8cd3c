use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderName};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::analytics::{AnomalyReport, ComplianceReport, DashboardData, ServiceResult, Statistics, StatisticsQuery};
use crate::error::AppError;
use crate::export::ExportFormat;
use crate::gateway::ClientGuard;
use crate::models::{redact_metadata, ActivityEvent, EventCategory, EventSeverity, EventStatus, NewActivityEvent};
use crate::state::SharedState;
use crate::store::EventFilter;

#[derive(Deserialize)]
pub struct RecordRequest {
    pub user_id: Option<Uuid>,
    pub action: String,
    pub category: EventCategory,
    #[serde(default = "default_severity")]
    pub severity: EventSeverity,
    #[serde(default = "default_status")]
    pub status: EventStatus,
    #[serde(default = "default_metadata")]
    pub metadata: serde_json::Value,
}

fn default_severity() -> EventSeverity {
    EventSeverity::Info
}

fn default_status() -> EventStatus {
    EventStatus::Success
}

fn default_metadata() -> serde_json::Value {
    json!({})
}

/// Persist one event, then feed it to the real-time monitor. The monitor
/// path is synchronous and infallible, so the producer only ever waits on
/// the store insert.
pub async fn record(
    State(state): State<SharedState>,
    Json(req): Json<RecordRequest>,
) -> Result<Json<ActivityEvent>, AppError> {
    let mut metadata = req.metadata;
    redact_metadata(&mut metadata);

    let event = state
        .store
        .insert(NewActivityEvent {
            user_id: req.user_id,
            action: req.action,
            category: req.category,
            severity: req.severity,
            status: req.status,
            metadata,
            created_at: None,
        })
        .await?;

    state.monitor.record(event.clone());
    state.monitor.detect_suspicious_activity(
        state.config.monitor.suspicious_window_secs,
        state.config.monitor.suspicious_threshold,
    );

    Ok(Json(event))
}

#[derive(Deserialize)]
pub struct RecentParams {
    pub limit: Option<usize>,
}

/// The monitor's buffered view — volatile, most recent events only.
pub async fn recent(
    State(state): State<SharedState>,
    Query(params): Query<RecentParams>,
) -> Json<serde_json::Value> {
    let limit = params.limit.unwrap_or(50).min(1000);
    let events = state.monitor.recent(limit);
    Json(json!({
        "events": events,
        "buffered": state.monitor.buffer_len(),
    }))
}

/// Long-lived SSE stream of live events and alerts.
pub async fn stream(
    State(state): State<SharedState>,
) -> impl IntoResponse {
    let (id, rx) = state.gateway.add_client();
    let guard = ClientGuard::new(state.gateway.clone(), id);

    let live = UnboundedReceiverStream::new(rx).map(move |msg| {
        // The guard rides along with the stream; dropping the response
        // deregisters the client.
        let _keep_registered = &guard;
        Ok::<Event, Infallible>(Event::default().event(msg.event).data(msg.data))
    });
    let opening = stream::once(async { Ok::<Event, Infallible>(Event::default().comment("connected")) });
    let events: std::pin::Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>> =
        Box::pin(opening.chain(live));

    (
        [(header::CACHE_CONTROL, "no-cache")],
        Sse::new(events).keep_alive(
            KeepAlive::new()
                .interval(Duration::from_secs(15))
                .text("keep-alive"),
        ),
    )
}

pub async fn statistics(
    State(state): State<SharedState>,
    Query(query): Query<StatisticsQuery>,
) -> Json<ServiceResult<Statistics>> {
    Json(state.analytics.get_statistics(&query).await)
}

pub async fn dashboard(State(state): State<SharedState>) -> Json<ServiceResult<DashboardData>> {
    Json(state.analytics.get_dashboard_data().await)
}

#[derive(Deserialize)]
pub struct AnomalyParams {
    pub user_id: Option<Uuid>,
    pub window_hours: Option<i64>,
    pub threshold_multiplier: Option<f64>,
}

pub async fn anomaly(
    State(state): State<SharedState>,
    Query(params): Query<AnomalyParams>,
) -> Json<ServiceResult<AnomalyReport>> {
    Json(
        state
            .analytics
            .detect_anomaly(
                params.user_id,
                params.window_hours.unwrap_or(24),
                params.threshold_multiplier.unwrap_or(3.0),
            )
            .await,
    )
}

#[derive(Deserialize)]
pub struct CompliancePeriod {
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

pub async fn compliance_report(
    State(state): State<SharedState>,
    Query(period): Query<CompliancePeriod>,
) -> Json<ServiceResult<ComplianceReport>> {
    Json(
        state
            .analytics
            .generate_compliance_report(period.start_date, period.end_date)
            .await,
    )
}

#[derive(Deserialize)]
pub struct ExportParams {
    pub format: Option<ExportFormat>,
    pub user_id: Option<Uuid>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub severity: Option<EventSeverity>,
    pub category: Option<EventCategory>,
}

pub async fn export(
    State(state): State<SharedState>,
    Query(params): Query<ExportParams>,
) -> Result<impl IntoResponse, AppError> {
    let filter = EventFilter {
        user_id: params.user_id,
        date_from: params.date_from,
        date_to: params.date_to,
        severity: params.severity,
        category: params.category,
    };
    let format = params.format.unwrap_or(ExportFormat::Csv);

    let result = state.exporter.export(format, &filter).await?;

    Ok((
        [
            (
                header::CONTENT_TYPE,
                result.format.content_type().to_string(),
            ),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"activity_export.{}\"",
                    result.format.file_extension()
                ),
            ),
            (
                HeaderName::from_static("x-total-rows"),
                result.total_rows.to_string(),
            ),
        ],
        result.buffer,
    ))
}

#[derive(Deserialize)]
pub struct IntegrityParams {
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
}

pub async fn integrity(
    State(state): State<SharedState>,
    Query(params): Query<IntegrityParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let valid = state
        .retention
        .validate_integrity(params.date_from, params.date_to)
        .await?;
    Ok(Json(json!({ "valid": valid })))
}

#[derive(Deserialize)]
pub struct AgeParams {
    pub age_days: Option<i64>,
}

pub async fn archive(
    State(state): State<SharedState>,
    Query(params): Query<AgeParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let age_days = params
        .age_days
        .unwrap_or(state.config.retention.archive_age_days);
    let paths = state.retention.archive_older_than(age_days).await?;
    Ok(Json(json!({
        "archived_chunks": paths.len(),
        "paths": paths
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<String>>(),
    })))
}

pub async fn purge(
    State(state): State<SharedState>,
    Query(params): Query<AgeParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let age_days = params
        .age_days
        .unwrap_or(state.config.retention.delete_age_days);
    let deleted = state.retention.delete_expired(age_days).await?;
    Ok(Json(json!({ "deleted": deleted })))
}

pub async fn compress(
    State(state): State<SharedState>,
    Query(params): Query<AgeParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    let age_days = params
        .age_days
        .unwrap_or(state.config.retention.compress_age_days);
    let compressed = state.retention.mark_compressed(age_days).await?;
    Ok(Json(json!({ "compressed": compressed })))
}
