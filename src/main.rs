use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trust_or_doubt::{
    api, cleanup,
    config::ServerConfig,
    llm,
    questions::{Blocklist, QuestionPipeline},
    state::AppState,
};

#[tokio::main]
async fn main() {
    // Load .env file if present (before any env var reads)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist, only log if it's a different issue
        if !matches!(e, dotenvy::Error::Io(_)) {
            eprintln!("Warning: Failed to load .env file: {}", e);
        }
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "trust_or_doubt=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Trust or Doubt server...");

    let config = ServerConfig::from_env();

    let blocklist = Arc::new(Blocklist::load(&config.blocklist_path).await);

    // Initialize LLM providers
    let llm_config = llm::LlmConfig::from_env();
    let llm_manager = match llm_config.build_manager() {
        Ok(manager) => {
            tracing::info!("LLM providers initialized successfully");
            Some(Arc::new(manager))
        }
        Err(e) => {
            tracing::warn!(
                "Failed to initialize LLM providers: {}. Generated questions will not be available.",
                e
            );
            None
        }
    };

    let pipeline =
        QuestionPipeline::from_config(&config, llm_manager, &llm_config, blocklist.clone());

    let addr = match config.socket_addr() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!("Invalid BIND_ADDR/PORT: {}", e);
            return;
        }
    };

    let state = Arc::new(AppState::new(config, Arc::new(pipeline), blocklist));

    // Periodic sweep of idle matches and stale sessions
    let sweeper = cleanup::spawn_sweeper(state.clone());

    let app = api::router(state.clone());

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            sweeper.abort();
            return;
        }
    };
    tracing::info!("Listening on http://{}", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!("Server error: {}", e);
    }

    sweeper.abort();
    tracing::info!("Shut down with {} live matches", state.registry.len().await);
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("Failed to install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }

    tracing::info!("Shutdown signal received");
}
