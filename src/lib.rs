pub mod analytics;
pub mod clock;
pub mod config;
pub mod error;
pub mod export;
pub mod gateway;
pub mod models;
pub mod monitor;
pub mod retention;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod store;

use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::analytics::AnalyticsService;
use crate::clock::Clock;
use crate::config::Config;
use crate::export::ExportService;
use crate::gateway::BroadcastGateway;
use crate::monitor::ActivityMonitor;
use crate::retention::RetentionManager;
use crate::state::{AppState, SharedState};
use crate::store::EventStore;

pub fn build_app(
    store: Arc<dyn EventStore>,
    config: Config,
    clock: Arc<dyn Clock>,
) -> (Router, SharedState) {
    let monitor = Arc::new(ActivityMonitor::new(config.monitor.clone(), clock.clone()));
    let gateway = Arc::new(BroadcastGateway::new());

    // Live fan-out: everything the monitor sees goes to push subscribers.
    let gw = gateway.clone();
    monitor.on_event(move |event| gw.broadcast("activity", event));
    let gw = gateway.clone();
    monitor.on_alert(move |alert| gw.broadcast("alert", alert));

    let analytics = AnalyticsService::new(store.clone(), clock.clone());
    let retention = Arc::new(RetentionManager::new(
        store.clone(),
        config.retention.clone(),
        clock.clone(),
    ));
    let exporter = ExportService::new(store.clone(), config.export.clone());

    let state: SharedState = Arc::new(AppState {
        config,
        store,
        monitor,
        gateway,
        analytics,
        retention,
        exporter,
    });

    let app = Router::new()
        .merge(routes::api_routes())
        .route("/health", axum::routing::get(health))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-content-type-options"),
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("referrer-policy"),
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    (app, state)
}

async fn health() -> &'static str {
    "ok"
}
