mod common;

use std::io::Read;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::StatusCode;
use serde_json::json;

// ── Health ──────────────────────────────────────────────────────

#[tokio::test]
async fn health_returns_ok() {
    let app = common::spawn_app().await;

    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

// ── Recording ───────────────────────────────────────────────────

#[tokio::test]
async fn record_persists_and_buffers_the_event() {
    let app = common::spawn_app().await;

    let (body, status) = app
        .record(&json!({ "action": "login", "category": "auth" }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 1);
    assert_eq!(body["severity"], "info");
    assert!(body["created_at"].is_string());

    let (recent, status) = app.get("/api/v1/activity").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recent["buffered"], 1);
    assert_eq!(recent["events"][0]["action"], "login");
}

#[tokio::test]
async fn record_redacts_sensitive_metadata_before_storage() {
    let app = common::spawn_app().await;

    let (body, status) = app
        .record(&json!({
            "action": "password_change",
            "category": "profile",
            "metadata": { "password": "hunter2", "ip": "10.1.2.3" }
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["password"], "[REDACTED]");
    assert_eq!(body["metadata"]["ip"], "10.1.2.3");
}

#[tokio::test]
async fn record_rejects_unknown_enum_values() {
    let app = common::spawn_app().await;

    let resp = app
        .client
        .post(app.url("/api/v1/activity"))
        .json(&json!({ "action": "x", "category": "bogus" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

// ── Live stream ─────────────────────────────────────────────────

#[tokio::test]
async fn sse_stream_delivers_recorded_events() {
    let app = common::spawn_app().await;

    let resp = app
        .client
        .get(app.url("/api/v1/activity/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/event-stream"));

    // The handler has run by the time headers arrive, so the client is
    // registered before we record.
    assert_eq!(app.state.gateway.client_count(), 1);
    app.record(&json!({ "action": "job_published", "category": "job" }))
        .await;

    let mut stream = resp.bytes_stream();
    let mut received = String::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = stream.next().await {
            received.push_str(std::str::from_utf8(&chunk.unwrap()).unwrap());
            if received.contains("event: activity") && received.contains("job_published") {
                break;
            }
        }
    })
    .await
    .expect("timed out waiting for SSE event");

    assert!(received.contains("event: activity"));
    assert!(received.contains("job_published"));
}

#[tokio::test]
async fn sse_stream_delivers_failure_alerts() {
    let app = common::spawn_app().await;

    let resp = app
        .client
        .get(app.url("/api/v1/activity/stream"))
        .send()
        .await
        .unwrap();
    assert_eq!(app.state.gateway.client_count(), 1);

    // Five failures for one action inside the window trip the counter.
    for _ in 0..5 {
        app.record(&json!({
            "action": "login",
            "category": "auth",
            "status": "failure",
            "severity": "warning"
        }))
        .await;
    }

    let mut stream = resp.bytes_stream();
    let mut received = String::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(chunk) = stream.next().await {
            received.push_str(std::str::from_utf8(&chunk.unwrap()).unwrap());
            if received.contains("event: alert") {
                break;
            }
        }
    })
    .await
    .expect("timed out waiting for SSE alert");

    assert!(received.contains("event: alert"));
    assert!(received.contains("login"));
}

// ── Analytics ───────────────────────────────────────────────────

#[tokio::test]
async fn statistics_returns_a_success_wrapper() {
    let app = common::spawn_app().await;
    app.record(&json!({ "action": "login", "category": "auth" }))
        .await;
    app.record(&json!({ "action": "login", "category": "auth" }))
        .await;

    let (body, status) = app.get("/api/v1/activity/statistics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["group_by"], "day");
    assert_eq!(body["data"]["buckets"][0]["count"], 2);
}

#[tokio::test]
async fn dashboard_reports_totals_and_success_rate() {
    let app = common::spawn_app().await;
    app.record(&json!({ "action": "login", "category": "auth" }))
        .await;
    app.record(&json!({
        "action": "login",
        "category": "auth",
        "status": "failure"
    }))
    .await;

    let (body, _) = app.get("/api/v1/activity/dashboard").await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["total_events"], 2);
    assert_eq!(body["data"]["success_rate"], 0.5);
}

#[tokio::test]
async fn anomaly_with_no_history_is_never_flagged() {
    let app = common::spawn_app().await;
    for _ in 0..20 {
        app.record(&json!({ "action": "search", "category": "job" }))
            .await;
    }

    let (body, status) = app.get("/api/v1/activity/anomaly?window_hours=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["anomalous"], false);
    assert_eq!(body["data"]["expected"], 0.0);
}

#[tokio::test]
async fn compliance_report_fails_gracefully_without_bounds() {
    let app = common::spawn_app().await;

    let (body, status) = app.get("/api/v1/activity/compliance-report").await;
    // Analytics failures come back as a normal-shaped response, not a 500.
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert!(body["error"].as_str().unwrap().contains("required"));

    let (body, _) = app
        .get(
            "/api/v1/activity/compliance-report?start_date=2026-01-01T00:00:00Z&end_date=2026-12-31T00:00:00Z",
        )
        .await;
    assert_eq!(body["success"], true);
    assert!(body["data"]["generated_at"].is_string());
}

// ── Export ──────────────────────────────────────────────────────

#[tokio::test]
async fn csv_export_neutralizes_formulas_and_counts_rows() {
    let app = common::spawn_app().await;
    app.record(&json!({ "action": "=2+2", "category": "admin" }))
        .await;

    let resp = app
        .client
        .get(app.url("/api/v1/activity/export?format=csv"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-total-rows"], "1");
    assert!(resp.headers()["content-type"]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));

    let text = resp.text().await.unwrap();
    assert!(text.starts_with("id,user_id,action"));
    assert!(text.contains("'=2+2"));
}

#[tokio::test]
async fn ndjson_export_emits_one_object_per_line() {
    let app = common::spawn_app().await;
    for i in 0..5 {
        app.record(&json!({ "action": format!("step_{i}"), "category": "application" }))
            .await;
    }

    let resp = app
        .client
        .get(app.url("/api/v1/activity/export?format=json"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.headers()["x-total-rows"], "5");

    let text = resp.text().await.unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    for line in lines {
        let row: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(row["id"].is_i64());
    }
}

#[tokio::test]
async fn xlsx_export_returns_a_workbook() {
    let app = common::spawn_app().await;
    app.record(&json!({ "action": "login", "category": "auth" }))
        .await;

    let resp = app
        .client
        .get(app.url("/api/v1/activity/export?format=xlsx"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = resp.bytes().await.unwrap();
    assert_eq!(&bytes[..2], b"PK");
}

// ── Retention ───────────────────────────────────────────────────

#[tokio::test]
async fn archive_writes_gzipped_chunks_to_disk() {
    let app = common::spawn_app().await;
    app.record(&json!({ "action": "login", "category": "auth" }))
        .await;
    app.record(&json!({ "action": "logout", "category": "auth" }))
        .await;

    // age_days=0 makes everything already recorded eligible.
    let (body, status) = app
        .post("/api/v1/activity/retention/archive?age_days=0")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["archived_chunks"], 1);

    let path = body["paths"][0].as_str().unwrap();
    assert!(path.ends_with("activity_logs_1_2.json.gz"));

    let mut decoder = flate2::read::GzDecoder::new(std::fs::File::open(path).unwrap());
    let mut text = String::new();
    decoder.read_to_string(&mut text).unwrap();
    let rows: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(rows.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn purge_deletes_expired_rows_and_reports_the_count() {
    let app = common::spawn_app().await;
    for _ in 0..3 {
        app.record(&json!({ "action": "login", "category": "auth" }))
            .await;
    }

    let (body, status) = app.post("/api/v1/activity/retention/purge?age_days=0").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["deleted"], 3);

    let (body, _) = app.post("/api/v1/activity/retention/purge?age_days=0").await;
    assert_eq!(body["deleted"], 0);
}

#[tokio::test]
async fn compress_flags_rows_idempotently() {
    let app = common::spawn_app().await;
    app.record(&json!({ "action": "login", "category": "auth" }))
        .await;

    let (body, _) = app
        .post("/api/v1/activity/retention/compress?age_days=0")
        .await;
    assert_eq!(body["compressed"], 1);

    let (body, _) = app
        .post("/api/v1/activity/retention/compress?age_days=0")
        .await;
    assert_eq!(body["compressed"], 0);
}

#[tokio::test]
async fn integrity_check_passes_on_a_healthy_store() {
    let app = common::spawn_app().await;
    let (body, status) = app.get("/api/v1/activity/integrity").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);

    app.record(&json!({ "action": "login", "category": "auth" }))
        .await;
    let (body, _) = app.get("/api/v1/activity/integrity").await;
    assert_eq!(body["valid"], true);
}
