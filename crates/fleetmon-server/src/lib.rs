#![forbid(unsafe_code)]

//! HTTP service wiring: tenant-scoped document CRUD plus the on-demand
//! reference-data build endpoints, over pluggable store and sink backends.

use axum::error_handling::HandleErrorLayer;
use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use fleetmon_api::{BuildState, BuildStatusResponse};
use fleetmon_model::{BuildManifest, TenantId};
use fleetmon_store::{DocumentStoreBackend, ReferenceDataSink};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

mod config;
mod http;
mod store;

pub const CRATE_NAME: &str = "fleetmon-server";

pub use config::{validate_startup_config_contract, ApiConfig, CONFIG_SCHEMA_VERSION};
pub use store::fake::{FakeSink, FakeStore};

#[derive(Default)]
pub(crate) struct RequestMetrics {
    counts: Mutex<HashMap<(String, u16), u64>>,
    latency_ns: Mutex<HashMap<String, Vec<u64>>>,
}

impl RequestMetrics {
    pub(crate) async fn observe_request(&self, route: &str, status: StatusCode, latency: Duration) {
        let mut counts = self.counts.lock().await;
        *counts
            .entry((route.to_string(), status.as_u16()))
            .or_insert(0) += 1;
        drop(counts);
        let mut latency_map = self.latency_ns.lock().await;
        latency_map
            .entry(route.to_string())
            .or_insert_with(Vec::new)
            .push(latency.as_nanos() as u64);
    }

    pub(crate) async fn render_prometheus(&self) -> String {
        let mut out = String::new();
        out.push_str("# TYPE fleetmon_requests_total counter\n");
        let counts = self.counts.lock().await;
        let mut lines: Vec<String> = counts
            .iter()
            .map(|((route, status), count)| {
                format!("fleetmon_requests_total{{route=\"{route}\",status=\"{status}\"}} {count}")
            })
            .collect();
        lines.sort();
        for line in lines {
            out.push_str(&line);
            out.push('\n');
        }
        drop(counts);
        out.push_str("# TYPE fleetmon_request_latency_seconds summary\n");
        let latency = self.latency_ns.lock().await;
        let mut routes: Vec<&String> = latency.keys().collect();
        routes.sort();
        for route in routes {
            let samples = &latency[route];
            let sum_ns: u64 = samples.iter().sum();
            out.push_str(&format!(
                "fleetmon_request_latency_seconds_sum{{route=\"{route}\"}} {}\n",
                sum_ns as f64 / 1e9
            ));
            out.push_str(&format!(
                "fleetmon_request_latency_seconds_count{{route=\"{route}\"}} {}\n",
                samples.len()
            ));
        }
        out
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStoreBackend>,
    pub sink: Arc<dyn ReferenceDataSink>,
    pub api: ApiConfig,
    pub ready: Arc<AtomicBool>,
    pub accepting_requests: Arc<AtomicBool>,
    pub(crate) metrics: Arc<RequestMetrics>,
    pub(crate) request_id_seed: Arc<AtomicU64>,
    build_status: Arc<Mutex<HashMap<String, BuildStatusResponse>>>,
}

impl AppState {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStoreBackend>, sink: Arc<dyn ReferenceDataSink>) -> Self {
        Self::with_config(store, sink, ApiConfig::default())
    }

    #[must_use]
    pub fn with_config(
        store: Arc<dyn DocumentStoreBackend>,
        sink: Arc<dyn ReferenceDataSink>,
        api: ApiConfig,
    ) -> Self {
        Self {
            store,
            sink,
            api,
            ready: Arc::new(AtomicBool::new(true)),
            accepting_requests: Arc::new(AtomicBool::new(true)),
            metrics: Arc::new(RequestMetrics::default()),
            request_id_seed: Arc::new(AtomicU64::new(1)),
            build_status: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub(crate) async fn set_build_state(
        &self,
        tenant: &TenantId,
        state: BuildState,
        manifest: Option<BuildManifest>,
        error: Option<String>,
    ) {
        let mut statuses = self.build_status.lock().await;
        let entry = statuses
            .entry(tenant.as_str().to_string())
            .or_insert_with(|| BuildStatusResponse {
                tenant: tenant.as_str().to_string(),
                state: BuildState::Idle,
                manifest: None,
                error: None,
            });
        entry.state = state;
        // A failed run keeps the previous successful manifest visible.
        if manifest.is_some() {
            entry.manifest = manifest;
        }
        entry.error = error;
    }

    pub(crate) async fn build_status(&self, tenant: &TenantId) -> Option<BuildStatusResponse> {
        self.build_status.lock().await.get(tenant.as_str()).cloned()
    }
}

async fn middleware_error(err: tower::BoxError) -> (StatusCode, String) {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("middleware failure: {err}"),
        )
    }
}

pub fn build_router(state: AppState) -> Router {
    use axum::routing::post;
    Router::new()
        .route("/healthz", get(http::handlers::healthz_handler))
        .route("/readyz", get(http::handlers::readyz_handler))
        .route("/metrics", get(http::handlers::metrics_handler))
        .route("/v1/version", get(http::handlers::version_handler))
        .route("/v1/tenants", get(http::handlers::list_tenants_handler))
        .route(
            "/v1/tenants/:tenant/rules",
            get(http::handlers::list_rules_handler),
        )
        .route(
            "/v1/tenants/:tenant/rules/:id",
            get(http::handlers::get_rule_handler)
                .put(http::handlers::put_rule_handler)
                .delete(http::handlers::delete_rule_handler),
        )
        .route(
            "/v1/tenants/:tenant/devicegroups",
            get(http::handlers::list_device_groups_handler),
        )
        .route(
            "/v1/tenants/:tenant/devicegroups/:id",
            get(http::handlers::get_device_group_handler)
                .put(http::handlers::put_device_group_handler)
                .delete(http::handlers::delete_device_group_handler),
        )
        .route(
            "/v1/tenants/:tenant/devices",
            get(http::handlers::list_devices_handler),
        )
        .route(
            "/v1/tenants/:tenant/devices/:id",
            get(http::handlers::get_device_handler)
                .put(http::handlers::put_device_handler)
                .delete(http::handlers::delete_device_handler),
        )
        .route(
            "/v1/tenants/:tenant/referencedata/build",
            post(http::handlers::build_handler),
        )
        .route(
            "/v1/tenants/:tenant/referencedata/status",
            get(http::handlers::build_status_handler),
        )
        .layer(
            tower::ServiceBuilder::new()
                .layer(HandleErrorLayer::new(middleware_error))
                .layer(tower::timeout::TimeoutLayer::new(state.api.request_timeout)),
        )
        .layer(DefaultBodyLimit::max(state.api.max_body_bytes))
        .with_state(state)
}
