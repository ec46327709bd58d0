use pitchlink::config::Config;
use pitchlink::domain::call::CallRole;
use pitchlink::domain::history::CallHistoryRepository;
use pitchlink::infrastructure::media::SimulatedCaptureDevices;
use pitchlink::infrastructure::protocols::webrtc::WebRtcConnectionFactory;
use pitchlink::infrastructure::signaling::WebSocketRelay;
use pitchlink::interface::api::{build_router, init_metrics, AppState, RelayHub};
use pitchlink::{CallOrchestrator, CallSettings, StartCall};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[cfg(all(feature = "postgres", not(feature = "memory")))]
use pitchlink::infrastructure::persistence::{create_pool, run_migrations, DatabaseConfig, PgCallHistoryRepository};
#[cfg(not(all(feature = "postgres", not(feature = "memory"))))]
use pitchlink::infrastructure::persistence::InMemoryCallHistoryRepository;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pitchlink=info,tower_http=info")),
        )
        .init();

    info!("Starting PitchLink call service");

    // Load configuration
    let config = Config::load()?;
    info!("Configuration loaded: {}", config.summary());

    // Initialize call history storage
    #[cfg(all(feature = "postgres", not(feature = "memory")))]
    let history: Arc<dyn CallHistoryRepository> = {
        info!("Initializing database connection...");

        let pool = create_pool(&DatabaseConfig::from(&config.database)).await?;
        info!("Database connection pool created");

        info!("Running database migrations...");
        run_migrations(&pool).await?;
        info!("Database migrations completed");

        Arc::new(PgCallHistoryRepository::new(pool))
    };

    #[cfg(not(all(feature = "postgres", not(feature = "memory"))))]
    let history: Arc<dyn CallHistoryRepository> = {
        info!("Using in-memory call history");
        Arc::new(InMemoryCallHistoryRepository::new())
    };

    // Initialize metrics exporter
    info!("Initializing Prometheus metrics exporter");
    let prometheus_handle = match init_metrics() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics exporter unavailable: {}", e);
            None
        }
    };

    // Start relay and history API server
    let relay_hub = Arc::new(RelayHub::new());
    let app = build_router(AppState { history: history.clone() }, relay_hub, prometheus_handle);
    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&address).await?;
    info!("API and relay server listening on {}", address);

    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Shutting down...");
            })
            .await
    });

    // Demo: one loopback call through the relay at `relay.url`
    if std::env::args().any(|arg| arg == "--demo") {
        if let Err(e) = demo_call(&config, history).await {
            warn!("Demo call failed: {}", e);
        }
    }

    server.await??;

    Ok(())
}

/// Demonstrate a call between two local participants
async fn demo_call(config: &Config, history: Arc<dyn CallHistoryRepository>) -> anyhow::Result<()> {
    info!("=== Call Lifecycle Demo (relay {}) ===", config.relay.url);

    let orchestrator = CallOrchestrator::new(
        Arc::new(SimulatedCaptureDevices::new()),
        Arc::new(WebRtcConnectionFactory::new()),
        Arc::new(WebSocketRelay::new(config.relay.url.as_str())),
        history.clone(),
        CallSettings::from(config),
    );

    let call_id = format!("demo-{}", uuid::Uuid::new_v4());
    let alice = orchestrator.start_call(StartCall::new(call_id.as_str(), "alice", "bob", CallRole::Caller));
    let bob = orchestrator.start_call(StartCall::new(call_id.as_str(), "bob", "alice", CallRole::Callee));
    info!("Call {} started: alice -> bob", call_id);

    let connected = tokio::time::timeout(
        Duration::from_secs(15),
        alice.wait_until(|view| view.is_connected || view.is_ended()),
    )
    .await;
    match connected {
        Ok(view) if view.is_connected => info!("Call connected"),
        Ok(view) => warn!("Call ended before connecting: {:?}", view.error),
        Err(_) => warn!("Call did not connect within 15s"),
    }

    info!("Video enabled: {}", alice.toggle_video());
    info!("Video enabled: {}", alice.toggle_video());

    let outcome = alice.end_call().await;
    info!("Alice's side ended as {}", outcome.status.as_str());
    let outcome = bob.ended().await;
    info!("Bob's side ended as {}", outcome.status.as_str());

    if let Some(id) = alice.view().history_record_id {
        if let Some(record) = history.get(id).await? {
            info!(
                "History record {}: {} -> {} {} ({:?}s)",
                record.id,
                record.caller_id,
                record.receiver_id,
                record.status.as_str(),
                record.duration_seconds()
            );
        }
    }

    info!("=== Demo Complete ===");
    Ok(())
}
