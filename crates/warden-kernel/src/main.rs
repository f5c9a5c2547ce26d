//! `wardend` — the Warden control-plane daemon.
//!
//! Startup order: configuration, telemetry, durable store, services,
//! crash recovery, dispatch loop, ops HTTP. A store-init failure exits
//! with status 1 before any socket opens. SIGTERM drains the dispatch
//! loop, flushes the SSE goodbye, and exits 0.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use warden_config::WardenConfig;
use warden_dispatch::{CapabilityRegistry, DispatchLoop, HttpWorkerInvoker, SnapshotWriter};
use warden_events::EventBus;
use warden_governance::Governance;
use warden_limits::LimitsEngine;
use warden_memory::{EmbeddingProvider, HttpEmbeddingProvider, MemoryService};
use warden_ops::OpsState;
use warden_policy::ApproverMap;
use warden_protocol::{Verifier, WorkerClient};
use warden_storage::SurrealKvStore;
use warden_store::GovStore;

fn main() {
    // Config and validation come before the runtime: a bad environment
    // must die with exit 1, not a stack trace.
    let config = warden_config::load();
    if let Err(error) = warden_config::validate(&config) {
        eprintln!("wardend: invalid configuration: {error}");
        std::process::exit(1);
    }

    if let Err(error) = warden_telemetry::setup_logging(
        &warden_telemetry::LogConfig::new(
            std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into()),
        )
        .with_format(warden_telemetry::LogFormat::Compact),
    ) {
        eprintln!("wardend: telemetry setup failed: {error}");
        std::process::exit(1);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            error!(%error, "runtime construction failed");
            std::process::exit(1);
        },
    };

    match runtime.block_on(run(config)) {
        Ok(()) => {
            info!("wardend stopped cleanly");
        },
        Err(error) => {
            error!(%error, "wardend failed");
            std::process::exit(1);
        },
    }
}

async fn run(config: WardenConfig) -> anyhow::Result<()> {
    // Durable store; any failure here is the fatal exit-1 path.
    let kv = SurrealKvStore::open(&config.paths.data_dir)
        .with_context(|| format!("opening store at {}", config.paths.data_dir))?;
    let store = Arc::new(GovStore::open(Arc::new(kv)).context("initializing tables")?);
    info!(data_dir = %config.paths.data_dir, "store opened");

    let events = EventBus::new();
    let limits = LimitsEngine::new(Arc::clone(&store), config.limits.clone(), events.clone());
    let approvers = ApproverMap::new(config.approvers.clone());
    let governance = Arc::new(Governance::new(
        Arc::clone(&store),
        approvers,
        config.strict_policy,
    ));

    let embedder: Option<Arc<dyn EmbeddingProvider>> = if config.embeddings.enabled {
        let provider = HttpEmbeddingProvider::new(
            config.embeddings.url.clone(),
            config.embeddings.model.clone(),
            config.worker.provider_deadline,
        )
        .context("building embedding provider")?;
        Some(Arc::new(provider))
    } else {
        None
    };
    let memory = Arc::new(MemoryService::new(
        Arc::clone(&store),
        limits.clone(),
        embedder,
    ));

    let shutdown = CancellationToken::new();

    // The dispatch loop: recover claimed slots, then tick forever.
    let invoker = Arc::new(HttpWorkerInvoker::new(
        WorkerClient::new(config.worker.idle_timeout).context("building worker client")?,
    ));
    let snapshots = Arc::new(SnapshotWriter::new(
        config.paths.ipc_root.clone(),
        CapabilityRegistry::with_defaults(),
    ));
    let dispatch = Arc::new(DispatchLoop::new(
        Arc::clone(&governance),
        events.clone(),
        invoker,
        snapshots,
        config.dispatch.poll_interval,
    ));
    let recovered = dispatch.recover().await.context("dispatch recovery")?;
    if recovered > 0 {
        info!(recovered, "resumed claimed dispatches");
    }
    let loop_handle = {
        let dispatch = Arc::clone(&dispatch);
        let cancel = shutdown.clone();
        tokio::spawn(async move { dispatch.run(cancel).await })
    };

    // Ops HTTP.
    let verifier = Verifier::new(Arc::clone(&store), config.worker.hmac_ttl);
    let state = Arc::new(OpsState {
        governance,
        store,
        limits,
        memory,
        events,
        verifier,
        settings: config.http.clone(),
        sse_connections: dashmap::DashMap::new(),
        shutdown: shutdown.clone(),
    });
    let router = warden_ops::router(state);

    let addr: SocketAddr = config
        .http
        .bind_addr
        .parse()
        .context("parsing OPS_BIND_ADDR")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "ops surface listening");

    let server_shutdown = shutdown.clone();
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        wait_for_signal().await;
        info!("shutdown signal received, draining");
        server_shutdown.cancel();
    })
    .await
    .context("ops server failed")?;

    // The loop sees the same token and drains on its own.
    shutdown.cancel();
    let _ = loop_handle.await;
    Ok(())
}

/// Wait for SIGTERM or ctrl-c.
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(error) => {
                error!(%error, "sigterm handler unavailable, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
                return;
            },
        };
        tokio::select! {
            _ = term.recv() => {},
            _ = tokio::signal::ctrl_c() => {},
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
