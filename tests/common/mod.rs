use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde_json::Value;

use talenthub::clock::{Clock, SystemClock};
use talenthub::config::{Config, ExportConfig, MonitorConfig, RetentionConfig};
use talenthub::state::SharedState;
use talenthub::store::{EventStore, MemoryEventStore};

/// A running test server backed by the in-memory event store — no database
/// required. The archive dir is a tempdir tied to the app's lifetime.
pub struct TestApp {
    pub addr: SocketAddr,
    pub client: Client,
    pub state: SharedState,
    pub archive_dir: tempfile::TempDir,
}

impl TestApp {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Record one activity event, return (body, status).
    pub async fn record(&self, body: &Value) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url("/api/v1/activity"))
            .json(body)
            .send()
            .await
            .expect("record request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        (body, status)
    }

    pub async fn get(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .expect("get request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        (body, status)
    }

    pub async fn post(&self, path: &str) -> (Value, StatusCode) {
        let resp = self
            .client
            .post(self.url(path))
            .send()
            .await
            .expect("post request failed");
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        (body, status)
    }
}

/// Spawn a test app on a random port with an in-memory store.
pub async fn spawn_app() -> TestApp {
    let archive_dir = tempfile::tempdir().expect("failed to create archive tempdir");

    let config = Config {
        database_url: String::new(),
        host: "127.0.0.1".parse().unwrap(),
        port: 0, // unused, we bind to a random port
        log_level: "warn".to_string(),
        monitor: MonitorConfig::default(),
        retention: RetentionConfig {
            archive_dir: archive_dir.path().to_path_buf(),
            ..Default::default()
        },
        export: ExportConfig {
            batch_size: 5000,
            in_memory: true,
        },
        retention_interval_secs: 3600,
    };

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store: Arc<dyn EventStore> = Arc::new(MemoryEventStore::new(clock.clone()));
    let (app, state) = talenthub::build_app(store, config, clock);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Server failed");
    });

    let client = Client::new();

    TestApp {
        addr,
        client,
        state,
        archive_dir,
    }
}
