#![forbid(unsafe_code)]

use fleetmon_server::{
    build_router, validate_startup_config_contract, ApiConfig, AppState, CRATE_NAME,
};
use fleetmon_store::{
    DocumentStoreBackend, HttpBackend, LocalFsBackend, LocalFsSink, ReferenceDataSink, RetryPolicy,
    S3LikeSink,
};
use std::env;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn env_bool(name: &str, default: bool) -> bool {
    env::var(name)
        .ok()
        .and_then(|v| match v.as_str() {
            "1" | "true" | "TRUE" | "yes" | "YES" => Some(true),
            "0" | "false" | "FALSE" | "no" | "NO" => Some(false),
            _ => None,
        })
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

fn env_duration_ms(name: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_u64(name, default_ms))
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("register SIGTERM");
        let mut sigint = signal(SignalKind::interrupt()).expect("register SIGINT");
        tokio::select! {
            _ = sigterm.recv() => {}
            _ = sigint.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if env_bool("FLEETMON_LOG_JSON", true) {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn build_store(retry: RetryPolicy) -> Arc<dyn DocumentStoreBackend> {
    if let Ok(base_url) = env::var("FLEETMON_STORE_HTTP_BASE_URL") {
        Arc::new(HttpBackend::new(
            base_url,
            env::var("FLEETMON_STORE_HTTP_BEARER").ok(),
            retry,
            env_bool("FLEETMON_STORE_ALLOW_PRIVATE_HOSTS", false),
        ))
    } else {
        let root = PathBuf::from(
            env::var("FLEETMON_STORE_ROOT").unwrap_or_else(|_| "artifacts/store".to_string()),
        );
        Arc::new(LocalFsBackend::new(root))
    }
}

fn build_sink(retry: RetryPolicy) -> Arc<dyn ReferenceDataSink> {
    if let Ok(base_url) = env::var("FLEETMON_SINK_S3_BASE_URL") {
        Arc::new(S3LikeSink::new(
            base_url,
            env::var("FLEETMON_SINK_S3_BEARER").ok(),
            retry,
        ))
    } else {
        let root = PathBuf::from(
            env::var("FLEETMON_REFDATA_ROOT").unwrap_or_else(|_| "artifacts/refdata".to_string()),
        );
        Arc::new(LocalFsSink::new(root))
    }
}

/// Rebuilds reference data for every known tenant. Per-tenant failures are
/// logged and do not stop the sweep.
async fn rebuild_all_tenants(state: &AppState) {
    let tenants = match state.store.list_tenants().await {
        Ok(tenants) => tenants,
        Err(e) => {
            warn!(error = %e, "tenant discovery failed; skipping rebuild sweep");
            return;
        }
    };
    for tenant in tenants {
        let opts = fleetmon_convert::ConvertOptions::new(tenant.clone());
        match fleetmon_convert::convert_tenant(state.store.as_ref(), state.sink.as_ref(), &opts)
            .await
        {
            Ok(result) => info!(
                tenant = tenant.as_str(),
                rules = result.manifest.rule_count,
                rows = result.manifest.mapping_row_count,
                "scheduled rebuild complete"
            ),
            Err(e) => warn!(tenant = tenant.as_str(), error = %e, "scheduled rebuild failed"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), String> {
    init_tracing();

    let bind_addr = env::var("FLEETMON_BIND").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let rebuild_interval_ms = env_u64("FLEETMON_REBUILD_INTERVAL_MS", 300_000);
    let api_cfg = ApiConfig {
        max_body_bytes: env_usize("FLEETMON_MAX_BODY_BYTES", 256 * 1024),
        request_timeout: env_duration_ms("FLEETMON_REQUEST_TIMEOUT_MS", 10_000),
        default_list_limit: env_usize("FLEETMON_DEFAULT_LIST_LIMIT", 100),
        max_list_limit: env_usize("FLEETMON_MAX_LIST_LIMIT", 1000),
        rebuild_interval: if rebuild_interval_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(rebuild_interval_ms))
        },
        drain_grace: env_duration_ms("FLEETMON_SHUTDOWN_DRAIN_MS", 5000),
    };
    validate_startup_config_contract(&api_cfg)?;

    let retry = RetryPolicy {
        max_attempts: env_usize("FLEETMON_STORE_RETRY_ATTEMPTS", 4),
        base_backoff_ms: env_u64("FLEETMON_STORE_RETRY_BASE_MS", 120),
    };
    let store = build_store(retry.clone());
    let sink = build_sink(retry);
    info!(
        store = store.backend_tag(),
        sink = sink.sink_tag(),
        "{CRATE_NAME} starting"
    );

    let state = AppState::with_config(store, sink, api_cfg);
    let app = build_router(state.clone());

    if let Some(interval) = state.api.rebuild_interval {
        let bg_state = state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if !bg_state.accepting_requests.load(Ordering::Relaxed) {
                    break;
                }
                rebuild_all_tenants(&bg_state).await;
            }
        });
    }

    let addr: std::net::SocketAddr = bind_addr
        .parse()
        .map_err(|e| format!("invalid bind addr {bind_addr}: {e}"))?;
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4().map_err(|e| format!("socket v4 failed: {e}"))?
    } else {
        tokio::net::TcpSocket::new_v6().map_err(|e| format!("socket v6 failed: {e}"))?
    };
    socket
        .set_reuseaddr(true)
        .map_err(|e| format!("set_reuseaddr failed: {e}"))?;
    socket.bind(addr).map_err(|e| format!("bind failed: {e}"))?;
    let listener: TcpListener = socket
        .listen(1024)
        .map_err(|e| format!("listen failed: {e}"))?;
    info!("fleetmon-server listening on {bind_addr}");

    let accepting = state.accepting_requests.clone();
    let drain = state.api.drain_grace;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            wait_for_shutdown_signal().await;
            accepting.store(false, Ordering::Relaxed);
            tokio::time::sleep(drain).await;
        })
        .await
        .map_err(|e| {
            error!("server failed: {e}");
            format!("server failed: {e}")
        })
}
