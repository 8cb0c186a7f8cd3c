pub mod activity;

use axum::routing::{get, post};
use axum::Router;

use crate::state::SharedState;

pub fn api_routes() -> Router<SharedState> {
    Router::new()
        // Ingest + live view
        .route(
            "/api/v1/activity",
            post(activity::record).get(activity::recent),
        )
        .route("/api/v1/activity/stream", get(activity::stream))
        // Analytics
        .route("/api/v1/activity/statistics", get(activity::statistics))
        .route("/api/v1/activity/dashboard", get(activity::dashboard))
        .route("/api/v1/activity/anomaly", get(activity::anomaly))
        .route(
            "/api/v1/activity/compliance-report",
            get(activity::compliance_report),
        )
        // Bulk export
        .route("/api/v1/activity/export", get(activity::export))
        // Retention
        .route("/api/v1/activity/integrity", get(activity::integrity))
        .route(
            "/api/v1/activity/retention/archive",
            post(activity::archive),
        )
        .route("/api/v1/activity/retention/purge", post(activity::purge))
        .route(
            "/api/v1/activity/retention/compress",
            post(activity::compress),
        )
}
