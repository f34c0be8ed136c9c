use diagram_colab::config::Config;
use diagram_colab::db::{DbDiagram, DiagramStore, MemoryStore};
use diagram_colab::services::session_reaper::spawn_session_reaper;
use diagram_colab::{create_app, AppState};
use std::panic;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() {
    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}, using defaults", e);
        Config::default()
    });

    // Initialize tracing
    let default_filter = format!(
        "diagram_colab={},tower_http=debug,axum::rejection=trace,info",
        config.log_level
    );
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .init();

    info!("Starting server...");

    // Initialize storage
    let store: Arc<dyn DiagramStore> = match &config.db_url {
        Some(db_url) => match DbDiagram::connect(db_url).await {
            Ok(db) => {
                info!("Database initialized successfully");
                Arc::new(db)
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Falling back to in-memory storage");
                Arc::new(MemoryStore::new())
            }
        },
        None => {
            warn!("No database URL configured - using in-memory storage");
            Arc::new(MemoryStore::new())
        }
    };

    let state = AppState::new(config, store);
    let config = state.config.clone();
    let hub = state.hub.clone();

    if let Some(idle_timeout) = config.session_idle_timeout() {
        spawn_session_reaper(hub.clone(), idle_timeout, config.session_reap_interval());
        info!("Idle sessions are ended after {:?}", idle_timeout);
    }

    let app = create_app(state);

    let listener = match tokio::net::TcpListener::bind(config.server_address()).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", config.server_address(), e);
            std::process::exit(1);
        }
    };

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at {}/ws/diagrams/{{diagram_id}}", config.websocket_base());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    let shutdown_hub = hub.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                return;
            }
            // Ending the sessions closes the sockets, which lets the server drain
            let ended = shutdown_hub.shutdown_all();
            info!("Shutdown requested, ended {} collaboration session(s)", ended);
        })
        .await;

    if let Err(e) = result {
        error!("Server error: {}", e);
    }
    info!("Server stopped");
}
