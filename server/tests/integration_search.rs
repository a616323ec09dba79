use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;
use timeslice_core::config::{RetrievalConfig, StatsMode};
use timeslice_core::persist::{ClusterPaths, StatsPaths};
use timeslice_core::WindowId;
use timeslice_server::{build_app, ServerOptions};
use tower::ServiceExt;

fn write(path: PathBuf, body: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, body).unwrap();
}

/// Four tweets about the same protest: day 1 holds 11 and 12, the cutoff
/// hour 25 holds 13 and 14.
fn build_tiny_collection(dir: &Path) -> ServerOptions {
    let stats = StatsPaths::new(dir.join("stats"));
    write(stats.doc_ids(), "11\n12\n13\n14\n");
    write(stats.doc_lengths(), "1\n1\n1\n1\n");
    write(stats.doc_lengths_encoded(), "1.0\n1.0\n1.0\n1.0\n");
    write(stats.posting_terms(), "1\n2\n1\n1\n");
    write(stats.posting_tfs(), "1\n1\n2\n1\n");
    let terms = dir.join("terms.tsv");
    write(terms.clone(), "protest\t3\t4\nmuseum\t1\t1\n");

    let clusters = ClusterPaths {
        day_root: dir.join("days"),
        hour_root: dir.join("hours"),
        dimension: 2,
        trial: 1,
        vectors_root: None,
    };
    write(clusters.centers(WindowId::day(1)).join("part-00000"), "(1.0,0.0)\n(0.0,1.0)\n");
    write(clusters.assignments(WindowId::day(1)).join("part-00000"), "(0,1)\n(1,0)\n");
    write(clusters.centers(WindowId::hour(25)).join("part-00000"), "(1.0,0.0)\n");
    write(clusters.assignments(WindowId::hour(25)).join("part-00000"), "(2,0)\n(3,0)\n");

    ServerOptions {
        stats: dir.join("stats"),
        terms: Some(terms),
        clusters,
        config: RetrievalConfig { days_total: 2, ..RetrievalConfig::default() },
    }
}

async fn post(app: Router, uri: &str, body: Value) -> (StatusCode, Vec<u8>) {
    let req = Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, body.to_vec())
}

#[tokio::test]
async fn health_is_ok() {
    let dir = tempdir().unwrap();
    let app = build_app(build_tiny_collection(dir.path())).unwrap();
    let resp = app.oneshot(Request::get("/health").body(Body::empty()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn pruned_search_skips_distant_partition() {
    let dir = tempdir().unwrap();
    let app = build_app(build_tiny_collection(dir.path())).unwrap();

    let (status, body) = post(
        app,
        "/search",
        json!({"text": "protests", "embedding": [1.0, 0.0], "cutoff": 14, "days": 1, "hours": 1, "top_k": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["top_k"], 1);
    assert_eq!(json["scanned"], 3);
    assert_eq!(json["eligible"], 4);
    let ids: Vec<u64> = json["results"].as_array().unwrap().iter().map(|r| r["external_id"].as_u64().unwrap()).collect();
    // 11 sits in the partition facing away from the query
    assert_eq!(ids, vec![13, 14]);
}

#[tokio::test]
async fn full_search_reports_complete_scan() {
    let dir = tempdir().unwrap();
    let app = build_app(build_tiny_collection(dir.path())).unwrap();

    let (status, body) = post(
        app,
        "/search",
        json!({"text": "protests", "embedding": [1.0, 0.0], "cutoff": 14, "days": 1, "hours": 1, "limit": 2}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["top_k"], 2);
    assert_eq!(json["fraction"], 1.0);
    assert_eq!(json["results"].as_array().unwrap().len(), 2);
    assert!(json["warnings"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn wrong_embedding_dimension_is_rejected() {
    let dir = tempdir().unwrap();
    let app = build_app(build_tiny_collection(dir.path())).unwrap();
    let (status, _) = post(
        app,
        "/search",
        json!({"text": "protests", "embedding": [1.0, 0.0, 0.0], "cutoff": 14, "days": 1, "hours": 1}),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_windows_surface_as_warnings() {
    let dir = tempdir().unwrap();
    let app = build_app(build_tiny_collection(dir.path())).unwrap();
    let (status, body) = post(
        app,
        "/search",
        json!({"text": "protests", "embedding": [1.0, 0.0], "cutoff": 14, "days": 1, "hours": 3}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    let warnings = json["warnings"].as_array().unwrap();
    // hour 25 exists, hours 26 and 27 were never exported
    assert_eq!(warnings.len(), 2);
    assert!(warnings[0].as_str().unwrap().contains("hour26"));
    assert!(warnings[1].as_str().unwrap().contains("hour27"));
    assert!(!json["results"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn cutoff_mode_answers_from_window_statistics() {
    let dir = tempdir().unwrap();
    let mut opts = build_tiny_collection(dir.path());
    opts.config.stats_mode = StatsMode::Cutoff;
    let app = build_app(opts).unwrap();
    let (status, body) = post(
        app,
        "/search",
        json!({"text": "protests", "embedding": [1.0, 0.0], "cutoff": 13, "days": 1, "hours": 1, "limit": 5}),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["eligible"], 3);
    let ids: Vec<u64> = json["results"].as_array().unwrap().iter().map(|r| r["external_id"].as_u64().unwrap()).collect();
    assert!(ids.contains(&13));
    assert!(!ids.contains(&14));
}
