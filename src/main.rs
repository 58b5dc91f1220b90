//! `mc-lookout` binary.
//!
//! Reads its configuration from the environment (see [`AgentConfig`]),
//! serves the HTTP front and keeps the agent connected until Ctrl+C.
//!
//! ```sh
//! MC_USERNAME=Scout MC_HOST=127.0.0.1 RUST_LOG=debug cargo run
//! ```

use std::sync::Arc;

use mc_lookout::{
    AgentConfig, ProcessSidecar, ProxyFront, ReadinessGate, ReconnectSupervisor, SessionConfig,
    ViewerLauncher, WebSocketConnector,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let config = AgentConfig::from_env()?;
    tracing::info!(
        username = %config.credentials.username,
        host = %config.credentials.host,
        port = config.credentials.port,
        viewer = config.viewer_enabled,
        "starting agent"
    );

    // ── HTTP front ──────────────────────────────────────────────────
    // A failed bind is the one fault that aborts startup.
    let gate = Arc::new(ReadinessGate::new());
    let listener = tokio::net::TcpListener::bind(config.http_addr()).await?;
    let front = ProxyFront::new(Arc::clone(&gate), config.viewer.bind)?;
    let server = tokio::spawn(mc_lookout::proxy::serve(listener, front, async {
        let _ = tokio::signal::ctrl_c().await;
    }));

    // ── Agent ───────────────────────────────────────────────────────
    let mut supervisor = ReconnectSupervisor::new(
        Arc::new(WebSocketConnector::new()),
        config.credentials.clone(),
        Arc::clone(&gate),
    )
    .with_reconnect_delay(config.reconnect_delay)
    .with_session_config(SessionConfig::default());

    if config.viewer_enabled {
        let sidecar = Arc::new(ProcessSidecar::new(config.viewer_command.clone()));
        let launcher = ViewerLauncher::new(sidecar, Arc::clone(&gate), config.viewer.clone())
            .with_settle_delay(config.settle_delay);
        supervisor = supervisor.with_launcher(Arc::new(launcher));
    }

    let agent = supervisor.spawn();

    // ── Shutdown ────────────────────────────────────────────────────
    match server.await {
        Ok(Ok(())) => tracing::info!("HTTP server stopped"),
        Ok(Err(e)) => tracing::error!("HTTP server failed: {e}"),
        Err(e) => tracing::error!("HTTP server task panicked: {e}"),
    }
    agent.abort();
    Ok(())
}
