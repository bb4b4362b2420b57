use std::time::Duration;

use api::state::AppState;
use axum::body::{to_bytes, Body};
use axum::Router;
use http::{Method, Request, StatusCode};
use serde_json::{json, Value};
use test_support::{quick_config, slot, InputBuilder};
use tower::ServiceExt;

fn app() -> Router {
    api::app(AppState::new_default(), 1 << 20)
}

async fn call(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let req = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(v) => Body::from(v.to_string()),
            None => Body::empty(),
        })
        .unwrap();
    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

#[tokio::test]
async fn health_reports_ok() {
    let (code, body) = call(&app(), Method::GET, "/v1/health", None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn validate_lists_each_problem() {
    let mut input = InputBuilder::new(5, 6)
        .koma("m", "math", &["t1"], &["1A"], 1)
        .build();
    input.komas[0].count = 0;
    input.komas[0].subject_id = "ghost".into();
    let (code, body) = call(&app(), Method::POST, "/v1/validate", Some(json!({ "input": input }))).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["ok"], false);
    assert!(body["errors"].as_array().unwrap().len() >= 2, "{body}");
}

#[tokio::test]
async fn evaluate_counts_conflicts() {
    let input = InputBuilder::new(5, 6)
        .koma("a", "math", &["t1"], &["1A"], 1)
        .koma("b", "eng", &["t1"], &["1B"], 1)
        .build();
    let slots = vec![slot("x", "a", 0, 1), slot("y", "b", 0, 1)];
    let (code, body) = call(
        &app(),
        Method::POST,
        "/v1/evaluate",
        Some(json!({ "input": input, "slots": slots })),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["counts"]["teacherConflict"], 1);
    assert!(body["errors"].as_u64().unwrap() >= 1);
    assert!(body["score"].as_i64().unwrap() > 0);
}

#[tokio::test]
async fn evaluate_rejects_unknown_koma() {
    let input = InputBuilder::new(5, 6)
        .koma("a", "math", &["t1"], &["1A"], 1)
        .build();
    let slots = vec![slot("x", "nope", 0, 1)];
    let (code, body) = call(
        &app(),
        Method::POST,
        "/v1/evaluate",
        Some(json!({ "input": input, "slots": slots })),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn solve_then_fetch_result() {
    let app = app();
    let input = InputBuilder::new(5, 6)
        .koma("m", "math", &["t1"], &["1A"], 3)
        .koma("e", "eng", &["t2"], &["1A"], 2)
        .build();
    let (code, body) = call(
        &app,
        Method::POST,
        "/v1/solve",
        Some(json!({ "input": input, "config": quick_config(1) })),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    let id = body["jobId"].as_str().unwrap().to_string();

    let mut status = Value::Null;
    for _ in 0..200 {
        let (_, s) = call(&app, Method::GET, &format!("/v1/jobs/{id}"), None).await;
        status = s;
        if status["status"] != "running" && status["status"] != "queued" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(status["status"], "solved", "{status}");

    let (code, patterns) = call(&app, Method::GET, &format!("/v1/jobs/{id}/result"), None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(patterns[0]["isComplete"], true);
    assert_eq!(patterns[0]["assignments"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn solve_rejects_out_of_range_config() {
    let input = InputBuilder::new(5, 6)
        .koma("m", "math", &["t1"], &["1A"], 1)
        .build();
    let mut config = quick_config(1);
    config.ils_restarts = 0;
    let (code, _) = call(
        &app(),
        Method::POST,
        "/v1/solve",
        Some(json!({ "input": input, "config": config })),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_job_is_not_found() {
    let app = app();
    let (code, _) = call(&app, Method::GET, "/v1/jobs/missing", None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    let (code, _) = call(&app, Method::POST, "/v1/jobs/missing/abort", None).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn fixes_target_error_violations() {
    let input = InputBuilder::new(5, 6)
        .koma("m", "math", &["t1"], &["1A"], 1)
        .only_available("t1", &[(2, 3)])
        .build();
    let slots = vec![slot("a", "m", 0, 1)];
    let (code, body) = call(
        &app(),
        Method::POST,
        "/v1/proposals/fixes",
        Some(json!({ "input": input, "slots": slots })),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    let fixes = body.as_array().unwrap();
    assert_eq!(fixes.len(), 1);
    assert_eq!(fixes[0]["move"]["to"], json!({ "dayOfWeek": 2, "period": 3 }));

    let (code, applied) = call(
        &app(),
        Method::POST,
        "/v1/proposals/fixes/apply",
        Some(json!({ "input": input, "slots": slots, "suggestions": [fixes[0], fixes[0]] })),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(applied["applied"], json!([0]));
    assert_eq!(applied["skipped"], json!([1]));
    assert_eq!(applied["slots"][0]["dayOfWeek"], 2);
}

#[tokio::test]
async fn swaps_honour_focus() {
    let input = InputBuilder::new(5, 6)
        .koma("m", "math", &["t1"], &["1A"], 1)
        .build();
    let slots = vec![slot("a", "m", 0, 1)];
    let (code, body) = call(
        &app(),
        Method::POST,
        "/v1/proposals/swaps",
        Some(json!({ "input": input, "slots": slots, "focusKomaId": "m" })),
    )
    .await;
    assert_eq!(code, StatusCode::OK);
    assert!(!body.as_array().unwrap().is_empty());

    let (code, _) = call(
        &app(),
        Method::POST,
        "/v1/proposals/swaps",
        Some(json!({ "input": input, "slots": slots, "focusKomaId": "ghost" })),
    )
    .await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (code, doc) = call(&app(), Method::GET, "/openapi.json", None).await;
    assert_eq!(code, StatusCode::OK);
    assert!(doc["paths"]["/v1/proposals/swaps"].is_object());
}
