//! Voice Controller
//!
//! Stateful coordination engine for Muster voice calls and voice channels.
//!
//! # Servers
//!
//! The Voice Controller runs one server:
//! - HTTP server for health endpoints and metrics (default: 0.0.0.0:8081)
//!
//! Call operations enter through [`voice_controller::actors::CallControllerActorHandle`],
//! which the embedding signaling layer drives directly.
//!
//! # Architecture
//!
//! Uses an actor model hierarchy:
//! - `CallControllerActor` (singleton): Admits calls, supervises sessions
//! - `CallSessionActor` (per session): Owns the session state machine
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Initialize actor system (`CallControllerActorHandle`)
//! 4. Start health HTTP server (liveness, readiness, metrics)
//! 5. Wait for shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use voice_controller::actors::{ActorMetrics, CallControllerActorHandle};
use voice_controller::config::Config;
use voice_controller::directory::{StaticDirectory, TargetDirectory};
use voice_controller::history::{CallArchive, ARCHIVE_CAPACITY};
use voice_controller::observability::{health_router, init_metrics_recorder, HealthState};
use voice_controller::signal::SignalBus;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "voice_controller=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Voice Controller");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        instance_id = %config.instance_id,
        health_bind_address = %config.health_bind_address,
        max_sessions = config.max_sessions,
        pending_call_timeout_seconds = config.pending_call_timeout_seconds,
        ended_session_linger_seconds = config.ended_session_linger_seconds,
        history_page_limit = config.history_page_limit,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder
    // This must happen before any metrics are recorded
    info!("Initializing Prometheus metrics recorder...");
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    // Initialize health state
    let health_state = Arc::new(HealthState::new());

    // Initialize actor system
    info!("Initializing actor system...");
    let directory: Arc<dyn TargetDirectory> = Arc::new(StaticDirectory::new());
    let signal_bus = Arc::new(SignalBus::new());
    let archive = Arc::new(CallArchive::with_limits(
        ARCHIVE_CAPACITY,
        config.history_page_limit,
    ));
    let actor_metrics = ActorMetrics::new();

    let controller_handle = CallControllerActorHandle::new(
        &config,
        directory,
        Arc::clone(&signal_bus),
        Arc::clone(&archive),
        actor_metrics,
    );
    info!("Actor system initialized");

    // Create shutdown token as child of controller's token
    // This ensures all tasks are cancelled when the controller shuts down
    let shutdown_token = controller_handle.child_token();

    // Start health HTTP server (MUST succeed - fail startup if it doesn't)
    // This provides liveness/readiness probes and Prometheus /metrics endpoint
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let health_router = health_router(Arc::clone(&health_state));

    // Add /metrics endpoint served by Prometheus exporter
    let metrics_router = Router::new().route(
        "/metrics",
        axum::routing::get(move || {
            let handle = prometheus_handle.clone();
            async move { handle.render() }
        }),
    );

    let app = health_router
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http());

    // Bind listener BEFORE spawning to fail fast on bind errors
    let listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    // Spawn health server task
    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(listener, app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });
    info!(addr = %health_addr, "Health server started");

    // The controller actor is running and the health plane is up
    health_state.set_ready();

    // Wait for shutdown signal
    info!("Voice Controller running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    // Trigger graceful shutdown via cancellation token
    // This propagates to all child tokens (health server)
    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so load balancers stop routing
    health_state.set_not_ready();

    shutdown_token.cancel();

    // Give tasks time to shut down
    tokio::time::sleep(Duration::from_secs(2)).await;

    // Shutdown actor system (ends live calls, archives them)
    if let Err(e) = controller_handle.shutdown(Duration::from_secs(30)).await {
        warn!(error = %e, "Actor system shutdown error");
    }

    info!("Voice Controller shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
