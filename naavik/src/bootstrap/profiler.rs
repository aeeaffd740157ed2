//! `--enable_profiling` hook (spec.md §5 non-goal carve-out: "profiling
//! hooks" are an external concern; only the flag-gated presence is in
//! scope). Mirrors `internal/bootstrap/profiler.go`'s shape without a real
//! pprof backend.

use std::net::SocketAddr;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

async fn not_implemented() -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}

/// Spawns the profiler endpoint when `--enable_profiling` is set. `endpoint`
/// is `host:port` as configured by `--profiler_endpoint`; a bind failure is
/// logged and the hook is simply not started, since profiling is always
/// optional and must never block process startup.
pub fn maybe_start(enabled: bool, endpoint: &str, stop: CancellationToken) {
    if !enabled {
        return;
    }
    let addr: SocketAddr = match endpoint.parse() {
        Ok(addr) => addr,
        Err(err) => {
            tracing::warn!(endpoint, error = %err, "invalid profiler_endpoint, profiling hook not started");
            return;
        }
    };

    tokio::spawn(async move {
        let app = Router::new().route("/debug/pprof", get(not_implemented));
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(err) => {
                tracing::warn!(%addr, error = %err, "failed to bind profiler endpoint");
                return;
            }
        };
        tracing::info!(%addr, "profiler endpoint listening (stub, returns 501)");
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move { stop.cancelled().await })
            .await;
    });
}
