// SPDX-License-Identifier: Apache-2.0

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use fleetmon_model::TenantId;
use fleetmon_server::{build_router, ApiConfig, AppState, FakeSink, FakeStore};
use fleetmon_store::{DocumentStoreBackend, HttpBackend, RetryPolicy};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> (Router, AppState, Arc<FakeStore>, Arc<FakeSink>) {
    let store = Arc::new(FakeStore::new());
    let sink = Arc::new(FakeSink::new());
    let state = AppState::new(store.clone(), sink.clone());
    (build_router(state.clone()), state, store, sink)
}

async fn send(router: &Router, request: Request<Body>) -> (StatusCode, Value, Option<String>) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("infallible service");
    let status = response.status();
    let request_id = response
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::String(
            String::from_utf8_lossy(&bytes).into_owned(),
        ))
    };
    (status, body, request_id)
}

fn put_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).expect("request")
}

fn rule_body() -> Value {
    json!({
        "name": "High temperature",
        "enabled": true,
        "group_id": "chillers",
        "severity": "Critical",
        "calculation": "Average",
        "time_period_ms": 300000,
        "conditions": [
            {"field": "temperature", "operator": "GreaterThan", "value": 75}
        ]
    })
}

#[tokio::test]
async fn health_and_version_respond() {
    let (router, _, _, _) = app();
    let (status, _, _) = send(&router, get("/healthz")).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body, _) = send(&router, get("/v1/version")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["service"], "fleetmon-server");
}

#[tokio::test]
async fn rule_crud_round_trip() {
    let (router, _, _, _) = app();
    let (status, body, _) = send(
        &router,
        put_json("/v1/tenants/contoso/rules/high-temp", rule_body()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["id"], "high-temp");

    let (status, body, _) = send(&router, get("/v1/tenants/contoso/rules/high-temp")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["severity"], "Critical");

    let (status, body, _) = send(&router, get("/v1/tenants/contoso/rules")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let delete = Request::builder()
        .method("DELETE")
        .uri("/v1/tenants/contoso/rules/high-temp")
        .body(Body::empty())
        .expect("request");
    let (status, _, _) = send(&router, delete).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Soft delete: gone from the default listing, visible with the flag.
    let (_, body, _) = send(&router, get("/v1/tenants/contoso/rules")).await;
    assert_eq!(body["count"], 0);
    let (_, body, _) = send(
        &router,
        get("/v1/tenants/contoso/rules?include_deleted=true"),
    )
    .await;
    assert_eq!(body["count"], 1);
}

#[tokio::test]
async fn missing_rule_is_a_structured_404() {
    let (router, _, _, _) = app();
    let (status, body, request_id) =
        send(&router, get("/v1/tenants/contoso/rules/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    assert!(request_id.expect("request id").starts_with("req-"));
}

#[tokio::test]
async fn invalid_rule_body_is_a_400() {
    let (router, _, _, _) = app();
    let (status, body, _) = send(
        &router,
        put_json(
            "/v1/tenants/contoso/rules/empty",
            json!({
                "name": "Empty",
                "enabled": true,
                "group_id": "chillers",
                "severity": "Info",
                "calculation": "Instant"
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_failed");
}

#[tokio::test]
async fn invalid_tenant_segment_is_rejected() {
    let (router, _, _, _) = app();
    let (status, body, _) = send(&router, get("/v1/tenants/Not%20Valid/rules")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "body: {body}");
}

#[tokio::test]
async fn build_publishes_reference_data_and_updates_status() {
    let (router, _, _, sink) = app();
    send(
        &router,
        put_json("/v1/tenants/contoso/rules/high-temp", rule_body()),
    )
    .await;
    send(
        &router,
        put_json(
            "/v1/tenants/contoso/devicegroups/chillers",
            json!({
                "display_name": "Chillers",
                "conditions": [{"key": "Type", "operator": "EQ", "value": "chiller"}]
            }),
        ),
    )
    .await;
    send(
        &router,
        put_json(
            "/v1/tenants/contoso/devices/chiller-01",
            json!({"properties": {"Type": "chiller"}}),
        ),
    )
    .await;

    let build = Request::builder()
        .method("POST")
        .uri("/v1/tenants/contoso/referencedata/build")
        .body(Body::empty())
        .expect("request");
    let (status, body, _) = send(&router, build).await;
    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["rule_count"], 1);
    assert_eq!(body["mapping_row_count"], 1);

    let csv = sink.published("contoso", "devicegroups.csv").expect("csv");
    assert_eq!(csv, b"DeviceId,GroupId\nchiller-01,chillers\n");
    let rules: Value =
        serde_json::from_slice(&sink.published("contoso", "rules.json").expect("rules"))
            .expect("json");
    assert_eq!(
        rules[0]["__rulefilterjs"],
        "return (record.__aggregates.temperature.avg > 75) ? true : false;"
    );

    let (status, body, _) = send(&router, get("/v1/tenants/contoso/referencedata/status")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "succeeded");
    assert_eq!(body["manifest"]["rule_count"], 1);
}

#[tokio::test]
async fn build_with_unsupported_period_is_a_422() {
    let (router, _, _, _) = app();
    let mut body = rule_body();
    body["time_period_ms"] = json!(90_000);
    send(&router, put_json("/v1/tenants/contoso/rules/odd", body)).await;

    let build = Request::builder()
        .method("POST")
        .uri("/v1/tenants/contoso/referencedata/build")
        .body(Body::empty())
        .expect("request");
    let (status, body, _) = send(&router, build).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "body: {body}");
    assert_eq!(body["error"]["code"], "configuration_error");

    let (_, body, _) = send(&router, get("/v1/tenants/contoso/referencedata/status")).await;
    assert_eq!(body["state"], "failed");
}

#[tokio::test]
async fn failing_store_maps_to_dependency_failure() {
    let (router, _, store, _) = app();
    store.fail_all.store(true, Ordering::Relaxed);
    let (status, body, _) = send(&router, get("/v1/tenants/contoso/rules")).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"]["code"], "dependency_failure");
}

#[tokio::test]
async fn draining_service_rejects_mutations() {
    let (router, state, _, _) = app();
    state.accepting_requests.store(false, Ordering::Relaxed);
    let (status, body, _) = send(
        &router,
        put_json("/v1/tenants/contoso/rules/high-temp", rule_body()),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"]["code"], "not_ready");

    let (status, _, _) = send(&router, get("/readyz")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn configured_list_limits_apply_to_listings() {
    let store = Arc::new(FakeStore::new());
    let sink = Arc::new(FakeSink::new());
    let state = AppState::with_config(
        store,
        sink,
        ApiConfig {
            default_list_limit: 1,
            max_list_limit: 2,
            ..ApiConfig::default()
        },
    );
    let router = build_router(state);
    for id in ["a-rule", "b-rule", "c-rule"] {
        send(
            &router,
            put_json(&format!("/v1/tenants/contoso/rules/{id}"), rule_body()),
        )
        .await;
    }

    let (_, body, _) = send(&router, get("/v1/tenants/contoso/rules")).await;
    assert_eq!(body["count"], 1);

    let (status, body, _) = send(&router, get("/v1/tenants/contoso/rules?limit=3")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_query_parameter");

    let (_, body, _) = send(&router, get("/v1/tenants/contoso/rules?limit=2")).await;
    assert_eq!(body["count"], 2);
}

#[tokio::test]
async fn http_backend_reads_the_served_list_envelope() {
    let (router, _, _, _) = app();
    send(
        &router,
        put_json("/v1/tenants/contoso/rules/high-temp", rule_body()),
    )
    .await;

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve");
    });

    let backend = HttpBackend::new(
        format!("http://{addr}"),
        None,
        RetryPolicy {
            max_attempts: 4,
            base_backoff_ms: 50,
        },
        true,
    );
    let tenant = TenantId::parse("contoso").expect("tenant");
    let rules = backend.list_rules(&tenant).await.expect("list over http");
    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id.as_str(), "high-temp");

    let tenants = backend.list_tenants().await.expect("tenants over http");
    assert_eq!(tenants.len(), 1);
    assert_eq!(tenants[0].as_str(), "contoso");
}

#[tokio::test]
async fn request_id_header_is_propagated() {
    let (router, _, _, _) = app();
    let request = Request::builder()
        .uri("/v1/tenants/contoso/rules")
        .header("x-request-id", "req-fixed")
        .body(Body::empty())
        .expect("request");
    let (_, _, request_id) = send(&router, request).await;
    assert_eq!(request_id.as_deref(), Some("req-fixed"));
}
