//! Process wiring and lifecycle (spec.md §5/§6, C16): builds every cache,
//! handler and controller, starts the HTTP API and the three main-cluster
//! controllers (secret, dependency, traffic-config), then waits for
//! SIGINT/SIGTERM and tears everything down gracefully.

pub mod profiler;

use std::sync::Arc;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Secret;
use kube::runtime::watcher;
use kube::{Api, Client};
use mesh_common::options::CliArgs;
use mesh_types::{Dependency, TrafficConfig};
use tokio_util::sync::CancellationToken;

use crate::cache::Caches;
use crate::clients::resolver_for;
use crate::controller::{Controller, ControllerConfig};
use crate::gate::NoOpReadOnlyGate;
use crate::handler::{DependencyHandler, SecretHandler, TrafficConfigHandler};
use crate::reconcile::enabled_reconcilers;
use crate::remotecluster::{RemoteClusterRegistry, Resolver};
use crate::util::Error;

const SECRET_CONTROLLER_NAME: &str = "secret-controller/main";
const DEPENDENCY_CONTROLLER_NAME: &str = "dependency-controller/main";
const TRAFFIC_CONFIG_CONTROLLER_NAME: &str = "trafficconfig-controller/main";

/// Applies `--config_path`'s YAML contents as environment-variable defaults
/// before `clap` parses the CLI, so the precedence order is flag > env > file
/// > built-in default. Called once, before [`CliArgs::parse`] (callers must
/// do the parse themselves; this only seeds `std::env`).
pub fn apply_config_file_defaults(config_path: &str) {
    let Ok(contents) = std::fs::read_to_string(config_path) else {
        return;
    };
    let Ok(serde_yaml::Value::Mapping(map)) = serde_yaml::from_str::<serde_yaml::Value>(&contents) else {
        tracing::warn!(config_path, "config file present but not a YAML mapping, ignoring");
        return;
    };
    for (key, value) in map {
        let (Some(key), Some(value)) = (key.as_str(), value.as_str().map(str::to_string).or_else(|| {
            serde_yaml::to_string(&value).ok().map(|s| s.trim().to_string())
        })) else {
            continue;
        };
        let env_key = key.to_uppercase();
        if std::env::var_os(&env_key).is_none() {
            // SAFETY: single-threaded startup path, before any other code reads env vars.
            unsafe { std::env::set_var(env_key, value) };
        }
    }
}

fn validate_state_checker(state_checker: &str) -> Result<(), Error> {
    match state_checker {
        "none" => Ok(()),
        other => Err(Error::InvalidStateChecker(other.to_string())),
    }
}

/// Runs the control plane to completion: wires every collaborator, starts
/// serving, and blocks until a shutdown signal arrives and every controller
/// has drained its in-flight work.
pub async fn run(args: CliArgs) -> Result<()> {
    validate_state_checker(&args.state_checker)?;
    let credential_resolver = resolver_for(&args.config_resolver)?;

    let caches = Arc::new(Caches::new());
    let clusters = Arc::new(RemoteClusterRegistry::new());
    let gate = Arc::new(NoOpReadOnlyGate);
    let reconcilers = enabled_reconcilers();

    let trafficconfig_handler = Arc::new(TrafficConfigHandler::new(
        caches.traffic_configs.clone(),
        caches.identity_dependencies.clone(),
        gate,
        reconcilers,
    ));
    let dependency_handler = Arc::new(DependencyHandler::new(
        caches.identity_dependencies.clone(),
        trafficconfig_handler.clone(),
    ));
    let resolver = Arc::new(Resolver::new(
        clusters.clone(),
        caches.clone(),
        credential_resolver,
        trafficconfig_handler.clone(),
    ));
    let secret_handler = Arc::new(SecretHandler::new(resolver));

    let main_client = Client::try_default()
        .await
        .context("failed to build in-cluster client for the main cluster")?;

    start_main_cluster_controllers(
        &main_client,
        &args,
        &caches,
        secret_handler,
        dependency_handler,
        trafficconfig_handler,
    );

    let stop = CancellationToken::new();
    profiler::maybe_start(args.enable_profiling, &args.profiler_endpoint, stop.clone());

    let port: u16 = std::env::var("MESH_TRAFFIC_PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8090);
    let router = axum::Router::new().nest("/api/v1", crate::api::build_router(caches.clone(), clusters));
    let addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP API on {addr}"))?;
    tracing::info!(%addr, "starting HTTP introspection API");

    let server_stop = stop.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_stop.cancelled().await })
            .await
    });

    spawn_readiness_signal(stop.clone());

    mesh_common::shutdown::shutdown_signal().await;
    tracing::info!("shutdown signal received, stopping HTTP API and controllers");
    stop.cancel();

    let _ = server.await;
    stop_all_controllers(&caches).await;
    tracing::info!("shutdown complete");
    Ok(())
}

fn start_main_cluster_controllers(
    client: &Client,
    args: &CliArgs,
    caches: &Arc<Caches>,
    secret_handler: Arc<SecretHandler>,
    dependency_handler: Arc<DependencyHandler>,
    trafficconfig_handler: Arc<TrafficConfigHandler>,
) {
    let concurrency = args.worker_concurrency;

    let secret_api: Api<Secret> = Api::namespaced(client.clone(), &args.cluster_registries_namespace);
    Controller::new(
        ControllerConfig {
            name: SECRET_CONTROLLER_NAME.to_string(),
            concurrency,
            api: secret_api,
            watcher_config: watcher::Config::default(),
            async_executor: None,
        },
        secret_handler,
        caches.controllers.clone(),
    )
    .start();

    let dependency_api: Api<Dependency> = Api::namespaced(client.clone(), &args.dependencies_namespace);
    Controller::new(
        ControllerConfig {
            name: DEPENDENCY_CONTROLLER_NAME.to_string(),
            concurrency,
            api: dependency_api,
            watcher_config: watcher::Config::default(),
            async_executor: None,
        },
        dependency_handler,
        caches.controllers.clone(),
    )
    .start();

    let traffic_config_api: Api<TrafficConfig> = Api::namespaced(client.clone(), &args.traffic_config_namespace);
    Controller::new(
        ControllerConfig {
            name: TRAFFIC_CONFIG_CONTROLLER_NAME.to_string(),
            concurrency,
            api: traffic_config_api,
            watcher_config: watcher::Config::default(),
            async_executor: None,
        },
        trafficconfig_handler,
        caches.controllers.clone(),
    )
    .start();
}

/// Writes the readiness file once the cache has warmed up, mirroring the
/// teacher's post-sync `signal_ready()` call so external health probes don't
/// pass traffic before watches have populated the caches.
fn spawn_readiness_signal(stop: CancellationToken) {
    tokio::spawn(async move {
        let interval = mesh_common::options::cache_refresh_interval();
        tokio::select! {
            _ = stop.cancelled() => {}
            _ = tokio::time::sleep(interval) => mesh_common::signal_ready(),
        }
    });
}

/// `StopAllControllers` (spec.md §5): cancels every registered controller's
/// stop channel and waits for each of its workers to finish the item it was
/// on, in arbitrary order across controllers.
async fn stop_all_controllers(caches: &Arc<Caches>) {
    for name in caches.controllers.list() {
        let Some(handle) = caches.controllers.deregister(&name) else {
            continue;
        };
        handle.stop.cancel();
        for worker_cancel in &handle.worker_cancels {
            worker_cancel.cancelled().await;
        }
    }
}
