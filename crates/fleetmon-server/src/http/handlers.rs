#![deny(clippy::redundant_clone)]

use crate::*;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use fleetmon_api::{
    parse_list_params, ApiError, ApiErrorCode, BuildState, BuildStatusResponse,
    DeviceGroupUpsertRequest, DeviceUpsertRequest, RuleUpsertRequest, VersionResponse,
};
use fleetmon_convert::{convert_tenant, ConvertOptions};
use fleetmon_model::{DeviceId, GroupId, RuleId, TenantId};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::Ordering;
use std::time::Instant;
use tracing::{error, info};

pub(crate) fn make_request_id(state: &AppState) -> String {
    let id = state.request_id_seed.fetch_add(1, Ordering::Relaxed);
    format!("req-{id:016x}")
}

pub(crate) fn propagated_request_id(headers: &HeaderMap, state: &AppState) -> String {
    if let Some(raw) = headers.get("x-request-id").and_then(|v| v.to_str().ok()) {
        let trimmed = raw.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    make_request_id(state)
}

pub(crate) fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(v) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-request-id", v);
    }
    response
}

pub(crate) fn api_error_response(err: ApiError, request_id: &str) -> Response {
    let status = StatusCode::from_u16(fleetmon_api::status_for_code(err.code))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = Json(json!({"error": err.with_request_id(request_id)}));
    with_request_id((status, body).into_response(), request_id)
}

fn parse_tenant(raw: &str) -> Result<TenantId, ApiError> {
    TenantId::parse(raw).map_err(|e| {
        ApiError::validation_failed(json!([{"field": "tenant", "reason": e.0, "value": raw}]))
    })
}

fn store_error(err: &fleetmon_store::StoreError) -> ApiError {
    ApiError::dependency(format!("document store failed: {err}"))
}

fn body_from<T: serde::de::DeserializeOwned>(raw: Value) -> Result<T, ApiError> {
    serde_json::from_value(raw)
        .map_err(|e| ApiError::validation_failed(json!([{"reason": e.to_string()}])))
}

/// Draining pods reject new mutations and builds with 503 so the load
/// balancer moves on while in-flight work finishes.
fn check_accepting(state: &AppState) -> Result<(), ApiError> {
    if state.accepting_requests.load(Ordering::Relaxed) {
        Ok(())
    } else {
        Err(ApiError::new(
            ApiErrorCode::NotReady,
            "service is draining",
            json!({}),
            "req-unknown",
        ))
    }
}

async fn finish(
    state: &AppState,
    route: &str,
    request_id: &str,
    started: Instant,
    response: Response,
) -> Response {
    state
        .metrics
        .observe_request(route, response.status(), started.elapsed())
        .await;
    with_request_id(response, request_id)
}

pub(crate) async fn healthz_handler() -> Response {
    (StatusCode::OK, "ok").into_response()
}

pub(crate) async fn readyz_handler(State(state): State<AppState>) -> Response {
    if state.ready.load(Ordering::Relaxed) && state.accepting_requests.load(Ordering::Relaxed) {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

pub(crate) async fn metrics_handler(State(state): State<AppState>) -> Response {
    let body = state.metrics.render_prometheus().await;
    (StatusCode::OK, body).into_response()
}

pub(crate) async fn version_handler(State(_state): State<AppState>) -> Response {
    Json(VersionResponse {
        service: CRATE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
    .into_response()
}

// Rules

pub(crate) async fn list_rules_handler(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = list_rules_inner(&state, &tenant, &query)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/rules", &request_id, started, response).await
}

async fn list_rules_inner(
    state: &AppState,
    tenant: &str,
    query: &BTreeMap<String, String>,
) -> Result<Response, ApiError> {
    let tenant = parse_tenant(tenant)?;
    let params = parse_list_params(query, state.api.default_list_limit, state.api.max_list_limit)?;
    let mut rules = state
        .store
        .list_rules(&tenant)
        .await
        .map_err(|e| store_error(&e))?;
    if !params.include_deleted {
        rules.retain(|r| !r.deleted);
    }
    rules.truncate(params.limit);
    Ok(Json(json!({"items": rules, "count": rules.len()})).into_response())
}

pub(crate) async fn get_rule_handler(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = get_rule_inner(&state, &tenant, &id)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/rules/:id", &request_id, started, response).await
}

async fn get_rule_inner(state: &AppState, tenant: &str, id: &str) -> Result<Response, ApiError> {
    let tenant = parse_tenant(tenant)?;
    let id = RuleId::parse(id)
        .map_err(|e| ApiError::validation_failed(json!([{"field": "id", "reason": e.0}])))?;
    match state
        .store
        .get_rule(&tenant, &id)
        .await
        .map_err(|e| store_error(&e))?
    {
        Some(rule) => Ok(Json(rule).into_response()),
        None => Err(ApiError::not_found("rule", id.as_str())),
    }
}

pub(crate) async fn put_rule_handler(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = put_rule_inner(&state, &tenant, &id, body)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/rules/:id", &request_id, started, response).await
}

async fn put_rule_inner(
    state: &AppState,
    tenant: &str,
    id: &str,
    body: Value,
) -> Result<Response, ApiError> {
    check_accepting(state)?;
    let tenant = parse_tenant(tenant)?;
    let id = RuleId::parse(id)
        .map_err(|e| ApiError::validation_failed(json!([{"field": "id", "reason": e.0}])))?;
    let request: RuleUpsertRequest = body_from(body)?;
    let rule = request.into_rule(id)?;
    state
        .store
        .upsert_rule(&tenant, rule.clone())
        .await
        .map_err(|e| store_error(&e))?;
    info!(tenant = tenant.as_str(), rule = rule.id.as_str(), "rule upserted");
    Ok(Json(rule).into_response())
}

pub(crate) async fn delete_rule_handler(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = delete_rule_inner(&state, &tenant, &id)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/rules/:id", &request_id, started, response).await
}

async fn delete_rule_inner(state: &AppState, tenant: &str, id: &str) -> Result<Response, ApiError> {
    check_accepting(state)?;
    let tenant = parse_tenant(tenant)?;
    let id = RuleId::parse(id)
        .map_err(|e| ApiError::validation_failed(json!([{"field": "id", "reason": e.0}])))?;
    let removed = state
        .store
        .delete_rule(&tenant, &id)
        .await
        .map_err(|e| store_error(&e))?;
    if removed {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::not_found("rule", id.as_str()))
    }
}

// Device groups

pub(crate) async fn list_device_groups_handler(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = list_device_groups_inner(&state, &tenant, &query)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/devicegroups", &request_id, started, response).await
}

async fn list_device_groups_inner(
    state: &AppState,
    tenant: &str,
    query: &BTreeMap<String, String>,
) -> Result<Response, ApiError> {
    let tenant = parse_tenant(tenant)?;
    let params = parse_list_params(query, state.api.default_list_limit, state.api.max_list_limit)?;
    let mut groups = state
        .store
        .list_device_groups(&tenant)
        .await
        .map_err(|e| store_error(&e))?;
    groups.truncate(params.limit);
    Ok(Json(json!({"items": groups, "count": groups.len()})).into_response())
}

pub(crate) async fn get_device_group_handler(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = get_device_group_inner(&state, &tenant, &id)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/devicegroups/:id", &request_id, started, response).await
}

async fn get_device_group_inner(
    state: &AppState,
    tenant: &str,
    id: &str,
) -> Result<Response, ApiError> {
    let tenant = parse_tenant(tenant)?;
    let id = GroupId::parse(id)
        .map_err(|e| ApiError::validation_failed(json!([{"field": "id", "reason": e.0}])))?;
    match state
        .store
        .get_device_group(&tenant, &id)
        .await
        .map_err(|e| store_error(&e))?
    {
        Some(group) => Ok(Json(group).into_response()),
        None => Err(ApiError::not_found("device group", id.as_str())),
    }
}

pub(crate) async fn put_device_group_handler(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = put_device_group_inner(&state, &tenant, &id, body)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/devicegroups/:id", &request_id, started, response).await
}

async fn put_device_group_inner(
    state: &AppState,
    tenant: &str,
    id: &str,
    body: Value,
) -> Result<Response, ApiError> {
    check_accepting(state)?;
    let tenant = parse_tenant(tenant)?;
    let id = GroupId::parse(id)
        .map_err(|e| ApiError::validation_failed(json!([{"field": "id", "reason": e.0}])))?;
    let request: DeviceGroupUpsertRequest = body_from(body)?;
    let group = request.into_group(id)?;
    state
        .store
        .upsert_device_group(&tenant, group.clone())
        .await
        .map_err(|e| store_error(&e))?;
    Ok(Json(group).into_response())
}

pub(crate) async fn delete_device_group_handler(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = delete_device_group_inner(&state, &tenant, &id)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/devicegroups/:id", &request_id, started, response).await
}

async fn delete_device_group_inner(
    state: &AppState,
    tenant: &str,
    id: &str,
) -> Result<Response, ApiError> {
    check_accepting(state)?;
    let tenant = parse_tenant(tenant)?;
    let id = GroupId::parse(id)
        .map_err(|e| ApiError::validation_failed(json!([{"field": "id", "reason": e.0}])))?;
    let removed = state
        .store
        .delete_device_group(&tenant, &id)
        .await
        .map_err(|e| store_error(&e))?;
    if removed {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::not_found("device group", id.as_str()))
    }
}

// Devices

pub(crate) async fn list_devices_handler(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = list_devices_inner(&state, &tenant, &query)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/devices", &request_id, started, response).await
}

async fn list_devices_inner(
    state: &AppState,
    tenant: &str,
    query: &BTreeMap<String, String>,
) -> Result<Response, ApiError> {
    let tenant = parse_tenant(tenant)?;
    let params = parse_list_params(query, state.api.default_list_limit, state.api.max_list_limit)?;
    let mut devices = state
        .store
        .list_devices(&tenant)
        .await
        .map_err(|e| store_error(&e))?;
    devices.truncate(params.limit);
    Ok(Json(json!({"items": devices, "count": devices.len()})).into_response())
}

pub(crate) async fn get_device_handler(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = get_device_inner(&state, &tenant, &id)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/devices/:id", &request_id, started, response).await
}

async fn get_device_inner(state: &AppState, tenant: &str, id: &str) -> Result<Response, ApiError> {
    let tenant = parse_tenant(tenant)?;
    let id = DeviceId::parse(id)
        .map_err(|e| ApiError::validation_failed(json!([{"field": "id", "reason": e.0}])))?;
    match state
        .store
        .get_device(&tenant, &id)
        .await
        .map_err(|e| store_error(&e))?
    {
        Some(device) => Ok(Json(device).into_response()),
        None => Err(ApiError::not_found("device", id.as_str())),
    }
}

pub(crate) async fn put_device_handler(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = put_device_inner(&state, &tenant, &id, body)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/devices/:id", &request_id, started, response).await
}

async fn put_device_inner(
    state: &AppState,
    tenant: &str,
    id: &str,
    body: Value,
) -> Result<Response, ApiError> {
    check_accepting(state)?;
    let tenant = parse_tenant(tenant)?;
    let id = DeviceId::parse(id)
        .map_err(|e| ApiError::validation_failed(json!([{"field": "id", "reason": e.0}])))?;
    let request: DeviceUpsertRequest = body_from(body)?;
    let device = request.into_device(id);
    state
        .store
        .upsert_device(&tenant, device.clone())
        .await
        .map_err(|e| store_error(&e))?;
    Ok(Json(device).into_response())
}

pub(crate) async fn delete_device_handler(
    State(state): State<AppState>,
    Path((tenant, id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = delete_device_inner(&state, &tenant, &id)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/devices/:id", &request_id, started, response).await
}

async fn delete_device_inner(
    state: &AppState,
    tenant: &str,
    id: &str,
) -> Result<Response, ApiError> {
    check_accepting(state)?;
    let tenant = parse_tenant(tenant)?;
    let id = DeviceId::parse(id)
        .map_err(|e| ApiError::validation_failed(json!([{"field": "id", "reason": e.0}])))?;
    let removed = state
        .store
        .delete_device(&tenant, &id)
        .await
        .map_err(|e| store_error(&e))?;
    if removed {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Err(ApiError::not_found("device", id.as_str()))
    }
}

// Reference-data builds

pub(crate) async fn build_handler(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = build_inner(&state, &tenant)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/referencedata/build", &request_id, started, response).await
}

async fn build_inner(state: &AppState, tenant: &str) -> Result<Response, ApiError> {
    check_accepting(state)?;
    let tenant = parse_tenant(tenant)?;
    state
        .set_build_state(&tenant, BuildState::Running, None, None)
        .await;
    match convert_tenant(
        state.store.as_ref(),
        state.sink.as_ref(),
        &ConvertOptions::new(tenant.clone()),
    )
    .await
    {
        Ok(result) => {
            state
                .set_build_state(
                    &tenant,
                    BuildState::Succeeded,
                    Some(result.manifest.clone()),
                    None,
                )
                .await;
            Ok(Json(result.manifest).into_response())
        }
        Err(err) => {
            error!(tenant = tenant.as_str(), error = %err, "reference data build failed");
            state
                .set_build_state(&tenant, BuildState::Failed, None, Some(err.to_string()))
                .await;
            if err.is_configuration() {
                Err(ApiError::configuration(err.to_string()))
            } else {
                Err(ApiError::dependency(err.to_string()))
            }
        }
    }
}

pub(crate) async fn build_status_handler(
    State(state): State<AppState>,
    Path(tenant): Path<String>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = build_status_inner(&state, &tenant)
        .await
        .unwrap_or_else(|e| api_error_response(e, &request_id));
    finish(&state, "/v1/tenants/:tenant/referencedata/status", &request_id, started, response).await
}

async fn build_status_inner(state: &AppState, tenant: &str) -> Result<Response, ApiError> {
    let tenant = parse_tenant(tenant)?;
    let status = state.build_status(&tenant).await.unwrap_or(BuildStatusResponse {
        tenant: tenant.as_str().to_string(),
        state: BuildState::Idle,
        manifest: None,
        error: None,
    });
    Ok(Json(status).into_response())
}

// Tenants

pub(crate) async fn list_tenants_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Response {
    let request_id = propagated_request_id(&headers, &state);
    let started = Instant::now();
    let response = match state.store.list_tenants().await {
        Ok(tenants) => {
            let names: Vec<&str> = tenants.iter().map(|t| t.as_str()).collect();
            Json(json!({"items": names, "count": names.len()})).into_response()
        }
        Err(err) => api_error_response(store_error(&err), &request_id),
    };
    finish(&state, "/v1/tenants", &request_id, started, response).await
}
