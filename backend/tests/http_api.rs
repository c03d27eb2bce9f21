//! HTTP API tests driving the router in-process.
#![cfg(feature = "http-server")]

use std::sync::Arc;
use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use hmpi_backend::config::AppConfig;
use hmpi_backend::db::{FullRepository, LocalRepository};
use hmpi_backend::http::{create_router, AppState, OWNER_HEADER};
use hmpi_backend::scoring::IndexCalculator;

const BOUNDARY: &str = "hmpi-test-boundary";

fn app() -> (Arc<LocalRepository>, Router) {
    let repo = Arc::new(LocalRepository::new());
    let state = AppState::new(
        repo.clone() as Arc<dyn FullRepository>,
        IndexCalculator::mock(),
        AppConfig::default(),
    );
    (repo, create_router(state))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(OWNER_HEADER, "alice")
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(OWNER_HEADER, "alice")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Multipart upload of `(name, filename, content)` parts, in order.
fn multipart_form(parts: &[(&str, Option<&str>, &str)]) -> Request<Body> {
    let mut body = String::new();
    for (name, file_name, content) in parts {
        match file_name {
            Some(file_name) => body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: text/csv\r\n\r\n{content}\r\n"
            )),
            None => body.push_str(&format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{content}\r\n"
            )),
        }
    }
    body.push_str(&format!("--{BOUNDARY}--\r\n"));
    Request::builder()
        .method("POST")
        .uri("/v1/upload")
        .header(OWNER_HEADER, "alice")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

fn multipart(csv: Option<&str>, parameters: Value) -> Request<Body> {
    let parameters = parameters.to_string();
    let mut parts = vec![("parameters", None, parameters.as_str())];
    if let Some(csv) = csv {
        parts.push(("file", Some("samples.csv"), csv));
    }
    multipart_form(&parts)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| json!(String::from_utf8_lossy(&bytes)))
    };
    (status, body)
}

fn parameters() -> Value {
    json!({
        "metals": ["lead", "cadmium"],
        "standards": { "lead": 10, "cadmium": 3 },
        "backgrounds": {},
        "presenceLimits": {}
    })
}

#[tokio::test]
async fn test_health_reports_ok() {
    let (_, app) = app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["database"], "connected");
    assert_eq!(body["scoring"]["service"], "mock");
}

#[tokio::test]
async fn test_health_degrades_with_repository() {
    let (repo, app) = app();
    repo.set_healthy(false);
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn test_missing_identity_is_unauthorized() {
    let (_, app) = app();
    let request = Request::builder()
        .uri("/v1/predict/results")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], "UNAUTHORIZED");
    assert_eq!(body["message"], "Authentication required");
}

#[tokio::test]
async fn test_upload_then_query_results() {
    let (_, app) = app();
    let csv = "latitude,longitude,date,lead,cadmium\n10.5,20.1,2024-01-05,30,10\n11,21,2024-01-06,200,100\n,22,2024-01-07,1,1";

    let (status, body) = send(&app, multipart(Some(csv), parameters())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["samplesCount"], 3);
    assert_eq!(body["validSamples"], 2);
    assert_eq!(body["invalidSamples"], 1);
    assert!(body["errors"][0].as_str().unwrap().contains("latitude"));
    let upload_id = body["uploadId"].as_str().unwrap().to_string();

    let (status, body) = send(&app, get("/v1/data")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);

    let (status, body) = send(&app, get(&format!("/v1/predict/batch/{}", upload_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"].as_array().unwrap().len(), 2);

    let (status, body) = send(&app, get("/v1/predict/statistics")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalPredictions"], 2);

    let (status, body) = send(&app, get("/v1/predict/results?page=1&limit=1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["predictions"].as_array().unwrap().len(), 1);
    assert_eq!(body["totalPages"], 2);
}

#[tokio::test]
async fn test_upload_without_file_is_rejected() {
    let (_, app) = app();
    let (status, body) = send(&app, multipart(None, parameters())).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "No file uploaded");
}

#[tokio::test]
async fn test_upload_with_partial_parameters_is_configuration_error() {
    let (_, app) = app();
    let (status, body) = send(
        &app,
        multipart(Some("latitude,longitude,lead\n1,2,3"), json!({ "metals": ["lead"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CONFIGURATION_ERROR");
}

#[tokio::test]
async fn test_upload_accepts_separate_parameter_parts() {
    let (_, app) = app();
    let request = multipart_form(&[
        ("metals", None, r#"["lead"]"#),
        ("standards", None, r#"{"lead": 10}"#),
        ("backgrounds", None, "{}"),
        ("presenceLimits", None, "{}"),
        ("csvfile", Some("legacy.csv"), "latitude,longitude,lead\n1,2,40\n3,4,60"),
    ]);
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["validSamples"], 2);

    let (_, runs) = send(&app, get("/v1/data")).await;
    assert_eq!(runs["analyses"][0]["fileName"], "legacy.csv");
}

#[tokio::test]
async fn test_upload_parameters_after_file_are_not_applied() {
    let (repo, app) = app();
    let parameters = parameters().to_string();
    let request = multipart_form(&[
        ("file", Some("samples.csv"), "latitude,longitude,lead\n1,2,3"),
        ("parameters", None, parameters.as_str()),
    ]);
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "CONFIGURATION_ERROR");
    assert_eq!(repo.prediction_count(), 0);
}

#[tokio::test]
async fn test_extractor_failures_use_error_body() {
    let (_, app) = app();

    let (status, body) = send(&app, get("/v1/reports/not-a-uuid/status")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(!body["message"].as_str().unwrap().is_empty());

    let (status, body) = send(
        &app,
        get("/v1/predict/location?latitude=abc&longitude=1&radius=5"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(!body["message"].as_str().unwrap().is_empty());

    let malformed = Request::builder()
        .method("POST")
        .uri("/v1/reports/generate")
        .header(OWNER_HEADER, "alice")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let (status, body) = send(&app, malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");

    let not_multipart = post_json("/v1/upload", json!({}));
    let (status, body) = send(&app, not_multipart).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
}

#[tokio::test]
async fn test_predict_single_scores_and_stores() {
    let (_, app) = app();
    let (status, body) = send(
        &app,
        post_json(
            "/v1/predict/single",
            json!({ "latitude": 10.0, "longitude": 20.0, "date": "2024-01-15", "lead": 120, "arsenic": 900 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["hmpiScore"], 102.0);
    assert_eq!(body["riskCategory"], "unsafe");

    let id = body["id"].as_str().unwrap();
    let (status, fetched) = send(&app, get(&format!("/v1/predict/results/{}", id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], body["id"]);

    let other = Request::builder()
        .uri(format!("/v1/predict/results/{}", id))
        .header(OWNER_HEADER, "mallory")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, other).await;
    assert!(status == StatusCode::NOT_FOUND || status == StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_predict_single_rejects_missing_coordinates() {
    let (_, app) = app();
    let (status, body) = send(&app, post_json("/v1/predict/single", json!({ "lead": 1 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "BAD_REQUEST");
    assert!(!body["message"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_report_generation_and_download() {
    let (_, app) = app();
    let (status, _) = send(
        &app,
        post_json(
            "/v1/predict/single",
            json!({ "latitude": 1.0, "longitude": 1.0, "date": "2024-01-15", "lead": 40 }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        &app,
        post_json(
            "/v1/reports/generate",
            json!({
                "title": "January",
                "dateRange": { "startDate": "2024-01-01", "endDate": "2024-01-31" },
                "format": "pdf"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
    let report_id = body["reportId"].as_str().unwrap().to_string();

    let mut finished = false;
    for _ in 0..200 {
        let (_, view) = send(&app, get(&format!("/v1/reports/{}/status", report_id))).await;
        if view["status"] == "completed" {
            finished = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(finished, "report never completed");

    let response = app
        .clone()
        .oneshot(get(&format!("/v1/reports/{}/download", report_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers()[header::CONTENT_DISPOSITION],
        format!("attachment; filename=\"report-{}.pdf\"", report_id).as_str()
    );
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(b"%PDF-"));

    let response = app
        .clone()
        .oneshot(get(&format!("/v1/reports/{}/events", report_id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("event: status"));
    assert!(text.contains("event: complete"));

    let (status, _) = send(
        &app,
        Request::builder()
            .method("DELETE")
            .uri(format!("/v1/reports/{}", report_id))
            .header(OWNER_HEADER, "alice")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, get(&format!("/v1/reports/{}", report_id))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_invalid_report_config_is_bad_request() {
    let (_, app) = app();
    let (status, _) = send(
        &app,
        post_json(
            "/v1/reports/generate",
            json!({
                "title": "Backwards",
                "dateRange": { "startDate": "2024-02-01", "endDate": "2024-01-01" },
                "format": "pdf"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_templates_include_builtins() {
    let (_, app) = app();
    let (status, body) = send(&app, get("/v1/reports/templates")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(!body.as_array().unwrap().is_empty());
}
