//! Operation metrics demo
//!
//! Runs a simulated workload through an instrumented pipeline and serves the
//! resulting histogram on `/metrics`.

use axum::{extract::State, response::IntoResponse, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use op_metrics::config::Config;
use op_metrics::observability::exporter::init_metrics_recorder;
use op_metrics::registry::MetricRegistry;
use op_metrics::{
    with_name, ActionKind, Instrumentation, InvocationContext, Operation, OperationPipeline,
};
use rand::seq::SliceRandom;
use rand::Rng;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const TARGETS: [&str; 4] = ["people", "orders", "Invoices", ""];
const RELATIONS: [&str; 3] = ["favorite_colors", "addresses", "line_items"];
const CALLER_NAMES: [&str; 3] = ["checkout", "nightly_report", "profile_page"];

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "op_metrics=debug,op_metrics_demo=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting operation metrics demo");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        metric = %config.metric_name,
        bind_address = %config.bind_address,
        workload_interval_ms = config.workload_interval_ms,
        "Configuration loaded successfully"
    );

    // Register the histogram before the exporter so its buckets apply
    let registry = MetricRegistry::global();
    let instrumentation = Instrumentation::from_config(&config, registry)?;
    let metrics_handle = init_metrics_recorder(registry)?;

    let mut pipeline = OperationPipeline::new();
    instrumentation.install(&mut pipeline)?;
    let pipeline = Arc::new(pipeline);

    let shutdown = CancellationToken::new();
    let workload = tokio::spawn(run_workload(
        Arc::clone(&pipeline),
        Duration::from_millis(config.workload_interval_ms),
        shutdown.clone(),
    ));

    let app = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Serving metrics on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    shutdown.cancel();
    if let Err(e) = workload.await {
        error!("Workload task failed: {}", e);
    }

    info!("Operation metrics demo shutdown complete");

    Ok(())
}

/// Render the Prometheus exposition.
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

/// Run one simulated operation per tick until cancelled.
async fn run_workload(
    pipeline: Arc<OperationPipeline>,
    interval: Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                info!("Workload stopped");
                return;
            }
            _ = ticker.tick() => {
                let pipeline = Arc::clone(&pipeline);
                // Operations are synchronous; keep them off the async workers
                if let Err(e) = tokio::task::spawn_blocking(move || run_operation(&pipeline)).await {
                    error!("Simulated operation task failed: {}", e);
                }
            }
        }
    }
}

fn run_operation(pipeline: &OperationPipeline) {
    let mut rng = rand::thread_rng();

    let action = ActionKind::ALL
        .choose(&mut rng)
        .copied()
        .unwrap_or(ActionKind::Query);
    let target = TARGETS.choose(&mut rng).copied().unwrap_or_default();

    let context = if rng.gen_bool(0.3) {
        CALLER_NAMES
            .choose(&mut rng)
            .map_or_else(InvocationContext::background, |name| with_name(*name))
    } else {
        InvocationContext::background()
    };

    let mut operation = Operation::new(context, target);
    let joins: usize = rng.gen_range(0..=RELATIONS.len());
    for relation in RELATIONS.iter().take(joins) {
        operation = operation.with_join(*relation);
    }

    let work_time = Duration::from_micros(rng.gen_range(500..50_000));
    let fail = rng.gen_bool(0.1);

    pipeline.execute(action, &mut operation, |_| {
        std::thread::sleep(work_time);
        if fail {
            Err("simulated failure".into())
        } else {
            Ok(())
        }
    });

    if let Some(e) = operation.take_error() {
        debug!(action = %action, target = %target, error = %e, "Simulated operation failed");
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT) or an internal cancel.
async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
        () = shutdown.cancelled() => {}
    }
}
