use std::sync::Arc;

use crate::analytics::AnalyticsService;
use crate::config::Config;
use crate::export::ExportService;
use crate::gateway::BroadcastGateway;
use crate::monitor::ActivityMonitor;
use crate::retention::RetentionManager;
use crate::store::EventStore;

pub type SharedState = Arc<AppState>;

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn EventStore>,
    pub monitor: Arc<ActivityMonitor>,
    pub gateway: Arc<BroadcastGateway>,
    pub analytics: AnalyticsService,
    pub retention: Arc<RetentionManager>,
    pub exporter: ExportService,
}
