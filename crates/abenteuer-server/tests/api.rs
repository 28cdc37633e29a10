use abenteuer_config::{
    Catalog, Config, Generator, Moderation, Redaction, Reports, Retry, Scoring, Server, Weather,
};
use abenteuer_contracts::{contract_schema, API_VERSION};
use abenteuer_server::build_app;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use tower::util::ServiceExt;

fn nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos()
}

fn test_config() -> Config {
    Config {
        server: Server {
            listen_addr: "127.0.0.1:0".to_string(),
        },
        catalog: Catalog::default(),
        scoring: Scoring::default(),
        retry: Retry::default(),
        weather: Weather {
            provider: "none".to_string(),
            base_url: "http://127.0.0.1:9/v1/forecast".to_string(),
            latitude: 51.2277,
            longitude: 6.7735,
            timeout_ms: 1_000,
        },
        generator: Generator {
            provider: "offline".to_string(),
            base_url: "http://127.0.0.1:9/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "ABENTEUER_TEST_UNSET_KEY".to_string(),
            timeout_ms: 1_000,
            max_input_chars: 4_000,
        },
        moderation: Moderation {
            provider: "none".to_string(),
            base_url: "http://127.0.0.1:9/v1".to_string(),
            model: "omni-moderation-latest".to_string(),
            api_key_env: "ABENTEUER_TEST_UNSET_KEY".to_string(),
            timeout_ms: 1_000,
        },
        redaction: Redaction::default(),
        reports: Reports {
            sink: "jsonl".to_string(),
            jsonl_path: std::env::temp_dir()
                .join(format!("abenteuer-reports-{}.jsonl", nanos()))
                .to_string_lossy()
                .to_string(),
            sqlite_path: None,
        },
    }
}

fn test_config_sqlite(db_path: &str) -> Config {
    let mut cfg = test_config();
    cfg.reports.sink = "sqlite".to_string();
    cfg.reports.sqlite_path = Some(db_path.to_string());
    cfg
}

fn plan_body() -> Value {
    json!({
        "date": "2026-10-18",
        "criteria": {
            "age": {"value": 3, "unit": "years"},
            "available_minutes": 30
        }
    })
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn healthz_ok_with_request_id() {
    let app = build_app(test_config()).await.unwrap();
    let response = app.oneshot(get("/v1/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let request_id = response
        .headers()
        .get("x-request-id")
        .expect("x-request-id header")
        .to_str()
        .unwrap();
    assert_eq!(request_id.len(), 36);
}

#[tokio::test]
async fn contracts_lists_embedded_schemas() {
    let app = build_app(test_config()).await.unwrap();
    let (status, body) = send(&app, get("/v1/contracts")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["version"], API_VERSION);
    assert_eq!(body["contracts_set_sha256"].as_str().unwrap().len(), 64);
    let paths: Vec<&str> = body["schemas"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["path"].as_str().unwrap())
        .collect();
    assert!(paths.iter().any(|p| p.ends_with("activity_plan.schema.json")));
    assert!(paths.iter().any(|p| p.ends_with("plan_report.schema.json")));
}

#[tokio::test]
async fn activities_returns_seed_catalog() {
    let app = build_app(test_config()).await.unwrap();
    let (status, body) = send(&app, get("/v1/activities")).await;
    assert_eq!(status, StatusCode::OK);
    let activities = body["activities"].as_array().unwrap();
    assert_eq!(activities.len(), 14);
    assert!(activities.iter().any(|a| a["id"] == "kissen-burg"));
}

#[tokio::test]
async fn plans_returns_contract_valid_library_plan() {
    let app = build_app(test_config()).await.unwrap();
    let (status, body) = send(&app, post_json("/v1/plans", &plan_body())).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(body["plan"]["provenance"], "library");
    assert_eq!(body["plan_hash"].as_str().unwrap().len(), 64);
    assert_eq!(body["candidate"]["activity_id"], body["plan"]["activity_id"]);
    assert!(body["alternatives"].as_array().unwrap().len() <= 3);
    assert!(body["notices"].as_array().unwrap().is_empty());

    let schema: Value = serde_json::from_str(contract_schema("activity_plan.schema.json").unwrap()).unwrap();
    let validator = jsonschema::validator_for(&schema).unwrap();
    assert!(validator.is_valid(&body["plan"]));

    let (_, again) = send(&app, post_json("/v1/plans", &plan_body())).await;
    assert_eq!(again["plan_hash"], body["plan_hash"]);
}

#[tokio::test]
async fn plans_rejects_invalid_criteria() {
    let app = build_app(test_config()).await.unwrap();

    let mut zero_minutes = plan_body();
    zero_minutes["criteria"]["available_minutes"] = json!(0);
    let mut too_many_topics = plan_body();
    too_many_topics["criteria"]["topics"] = json!(["a", "b", "c", "d", "e", "f", "g", "h", "i"]);
    let mut unknown_field = plan_body();
    unknown_field["criteria"]["favourite_colour"] = json!("blue");
    let mut reversed_window = plan_body();
    reversed_window["time_window"] = json!({"start": "15:00:00", "end": "14:00:00"});

    for body in [zero_minutes, too_many_topics, unknown_field, reversed_window] {
        let (status, response) = send(&app, post_json("/v1/plans", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response["error"]["code"], "validation_error");
    }
}

#[tokio::test]
async fn weather_on_the_request_shapes_recommendations() {
    let app = build_app(test_config()).await.unwrap();
    let mut body = plan_body();
    body["weather"] = json!({"condition": "rainy", "temperature_c": 9.0, "precipitation": true});
    body["count"] = json!(3);

    let (status, response) = send(&app, post_json("/v1/recommendations", &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["weather"]["condition"], "rainy");
    let candidates = response["candidates"].as_array().unwrap();
    assert_eq!(candidates.len(), 3);
    let scores: Vec<f64> = candidates.iter().map(|c| c["score"].as_f64().unwrap()).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn recommendations_without_candidates_is_not_found() {
    let app = build_app(test_config()).await.unwrap();
    let body = json!({
        "date": "2026-10-18",
        "criteria": {
            "age": {"value": 6, "unit": "months"},
            "available_minutes": 20,
            "strict_age": true
        }
    });
    let (status, response) = send(&app, post_json("/v1/recommendations", &body)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(response["error"]["code"], "no_candidates");

    let (status, plan) = send(&app, post_json("/v1/plans", &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(plan["plan"]["provenance"], "fallback");
    assert_eq!(plan["notices"][0]["code"], "no_candidates");
}

#[tokio::test]
async fn plan_reports_round_trip_newest_first() {
    let app = build_app(test_config()).await.unwrap();
    let (_, plan) = send(&app, post_json("/v1/plans", &plan_body())).await;
    let hash = plan["plan_hash"].as_str().unwrap().to_string();

    let (status, created) = send(
        &app,
        post_json("/v1/plan-reports", &json!({"plan_hash": hash, "reason": "not_relevant"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let mut keys: Vec<&str> = created.as_object().unwrap().keys().map(String::as_str).collect();
    keys.sort();
    assert_eq!(keys, vec!["plan_hash", "reason", "timestamp_utc"]);

    let (status, _) = send(
        &app,
        post_json("/v1/plan-reports", &json!({"plan_hash": "f".repeat(64), "reason": "unsafe"})),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, listed) = send(&app, get("/v1/plan-reports?limit=10")).await;
    assert_eq!(status, StatusCode::OK);
    let reports = listed["reports"].as_array().unwrap();
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[0]["reason"], "unsafe");
    assert_eq!(reports[1]["plan_hash"], hash.as_str());

    let schema: Value = serde_json::from_str(contract_schema("plan_report.schema.json").unwrap()).unwrap();
    let validator = jsonschema::validator_for(&schema).unwrap();
    assert!(reports.iter().all(|r| validator.is_valid(r)));
}

#[tokio::test]
async fn plan_reports_reject_bad_input() {
    let app = build_app(test_config()).await.unwrap();
    for body in [
        json!({"plan_hash": "abc", "reason": "unsafe"}),
        json!({"plan_hash": "F".repeat(64), "reason": "unsafe"}),
        json!({"plan_hash": "a".repeat(64), "reason": "boring"}),
        json!({"plan_hash": "a".repeat(64), "reason": "unsafe", "email": "x@example.org"}),
    ] {
        let (status, response) = send(&app, post_json("/v1/plan-reports", &body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{body}");
        assert_eq!(response["error"]["code"], "validation_error");
    }
}

#[tokio::test]
async fn sqlite_report_sink_serves_recent_reports() {
    let db_path = std::env::temp_dir()
        .join(format!("abenteuer-reports-{}.sqlite", nanos()))
        .to_string_lossy()
        .to_string();
    let app = build_app(test_config_sqlite(&db_path)).await.unwrap();
    for reason in ["unsafe", "factually_wrong", "other"] {
        let (status, _) = send(
            &app,
            post_json("/v1/plan-reports", &json!({"plan_hash": "0".repeat(64), "reason": reason})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }
    let (status, listed) = send(&app, get("/v1/plan-reports?limit=2")).await;
    assert_eq!(status, StatusCode::OK);
    let reasons: Vec<&str> = listed["reports"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["reason"].as_str().unwrap())
        .collect();
    assert_eq!(reasons, vec!["other", "factually_wrong"]);
    let _ = std::fs::remove_file(&db_path);
}
