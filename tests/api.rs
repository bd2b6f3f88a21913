//! End-to-end tests driving the full HTTP surface against an in-memory log

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use tally::db::Database;
use tally::geoip::GeoIp;
use tally::web::{app, AccessGuard, AppState};

const SECRET: &str = "dashboard-secret";

async fn test_app() -> Router {
    test_app_with(Some(SECRET.to_string()), &["broadcast"]).await
}

async fn test_app_with(secret: Option<String>, blocklist: &[&str]) -> Router {
    let db = Database::new_in_memory().await.unwrap();
    db.run_migrations().await.unwrap();

    let state = Arc::new(AppState {
        db,
        geoip: Arc::new(GeoIp::new("")),
        guard: AccessGuard::new(secret),
        blocklist: blocklist.iter().map(|s| s.to_string()).collect(),
    });
    app(state)
}

fn collect_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/collect")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn collect_request_from(body: Value, ip: &str, country: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/collect")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-forwarded-for", ip);
    if let Some(code) = country {
        builder = builder.header("cf-ipcountry", code);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn stats_request(site_id: Option<&str>, token: Option<&str>) -> Request<Body> {
    let uri = match site_id {
        Some(site) => format!("/api/stats?site_id={site}"),
        None => "/api/stats".to_string(),
    };
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn healthz_is_open() {
    let app = test_app().await;
    let response = app
        .oneshot(
            Request::builder()
                .uri("/healthz")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn collect_then_stats_round_trip() {
    let app = test_app().await;

    // Three views of the same page from the same address
    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(collect_request_from(
                json!({"site_id": "blog", "path": "/post/1"}),
                "203.0.113.7",
                Some("DE"),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    let response = app
        .oneshot(stats_request(Some("blog"), Some(SECRET)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stats = body_json(response).await;
    assert_eq!(stats["total"], 3);
    assert_eq!(stats["unique_visitors"], 1);
    assert_eq!(stats["recent"][0]["path"], "/post/1");
    assert_eq!(stats["recent"][0]["ip"], "203.0.113.7");
    assert_eq!(stats["recent"][0]["country"], "DE");
    assert_eq!(stats["countries"][0]["country"], "DE");
    assert_eq!(stats["countries"][0]["count"], 3);
}

#[tokio::test]
async fn missing_fields_fall_back_to_defaults() {
    let app = test_app().await;

    app.clone()
        .oneshot(collect_request(json!({})))
        .await
        .unwrap();
    app.clone()
        .oneshot(collect_request(json!({"site_id": "  "})))
        .await
        .unwrap();

    let stats = body_json(
        app.oneshot(stats_request(None, Some(SECRET))).await.unwrap(),
    )
    .await;

    assert_eq!(stats["total"], 2);
    assert_eq!(stats["sites"], json!(["default"]));
    assert_eq!(stats["recent"][0]["site_id"], "default");
    assert_eq!(stats["recent"][0]["path"], "/");
    // No proxy headers and no socket info in oneshot mode
    assert_eq!(stats["recent"][0]["ip"], "0.0.0.0");
    assert_eq!(stats["recent"][0]["country"], "Unknown");
}

#[tokio::test]
async fn blocklisted_site_is_acknowledged_but_never_stored() {
    let app = test_app().await;

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(collect_request(json!({"site_id": "broadcast"})))
            .await
            .unwrap();
        // Same HTTP success as a recorded visit
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ignored");
    }

    let stats = body_json(
        app.oneshot(stats_request(Some("all"), Some(SECRET)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(stats["total"], 0);
    assert_eq!(stats["sites"], json!([]));
}

#[tokio::test]
async fn site_views_ignore_the_active_filter() {
    let app = test_app().await;

    app.clone()
        .oneshot(collect_request(json!({"site_id": "blog"})))
        .await
        .unwrap();
    app.clone()
        .oneshot(collect_request(json!({"site_id": "shop"})))
        .await
        .unwrap();
    app.clone()
        .oneshot(collect_request(json!({"site_id": "shop"})))
        .await
        .unwrap();

    let filtered = body_json(
        app.clone()
            .oneshot(stats_request(Some("blog"), Some(SECRET)))
            .await
            .unwrap(),
    )
    .await;
    let unfiltered = body_json(
        app.oneshot(stats_request(Some("all"), Some(SECRET)))
            .await
            .unwrap(),
    )
    .await;

    // The filter narrows the counts...
    assert_eq!(filtered["total"], 1);
    assert_eq!(unfiltered["total"], 3);
    // ...but the site universe stays identical
    assert_eq!(filtered["sites"], unfiltered["sites"]);
    assert_eq!(filtered["sites"], json!(["blog", "shop"]));
    assert_eq!(filtered["top_sites"], unfiltered["top_sites"]);
    assert_eq!(filtered["top_sites"][0]["site_id"], "shop");
    assert_eq!(filtered["top_sites"][0]["count"], 2);
}

#[tokio::test]
async fn stats_requires_the_shared_secret() {
    let app = test_app().await;

    let missing = app
        .clone()
        .oneshot(stats_request(Some("blog"), None))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(missing).await["code"], "unauthorized");

    let wrong = app
        .oneshot(stats_request(Some("all"), Some("not-the-secret")))
        .await
        .unwrap();
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(wrong).await["code"], "unauthorized");
}

#[tokio::test]
async fn unconfigured_secret_is_a_server_error_not_unauthorized() {
    let app = test_app_with(None, &[]).await;

    let response = app
        .oneshot(stats_request(None, Some("anything")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["code"], "server_misconfigured");
}

#[tokio::test]
async fn malformed_collect_body_is_a_server_error() {
    let app = test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/collect")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    // Unparseable reports are grouped with storage failures as server errors
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_json(response).await["code"], "invalid_payload");
}

#[tokio::test]
async fn caller_cannot_spoof_ip_or_country_via_body() {
    let app = test_app().await;

    // Extra body fields are ignored rather than trusted
    app.clone()
        .oneshot(collect_request_from(
            json!({"site_id": "blog", "ip": "1.2.3.4", "country": "US"}),
            "198.51.100.9",
            None,
        ))
        .await
        .unwrap();

    let stats = body_json(
        app.oneshot(stats_request(Some("blog"), Some(SECRET)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(stats["recent"][0]["ip"], "198.51.100.9");
    assert_eq!(stats["recent"][0]["country"], "Unknown");
}
