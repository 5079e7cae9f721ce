use std::time::Duration;

use tokio::net::TcpListener;

use fintra_server::config::{Config, generate_config_template};
use fintra_server::handlers::HandlerSet;
use fintra_server::{auth, routes, state, ws};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load config with layered precedence: defaults < TOML < env < CLI
    let config = Config::load()?;

    // Handle --generate-config: print template and exit
    if config.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Initialize tracing/logging
    if config.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "fintra_server=info".parse().unwrap()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .pretty()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "fintra_server=info".parse().unwrap()),
            )
            .init();
    }

    tracing::info!("Fintra gateway v{} starting", env!("CARGO_PKG_VERSION"));

    // Load or generate the JWT verification key (256-bit random, in data_dir)
    std::fs::create_dir_all(&config.data_dir)?;
    let jwt_secret = auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?;

    let limits = config.limits.clone().unwrap_or_default();
    let timeouts = config.timeouts.clone().unwrap_or_default();
    let queue = config.queue.clone().unwrap_or_default();

    // Build application state: registry, limiter and offline queue are
    // constructed here and injected, never ambient.
    let app_state = state::AppState::new(
        jwt_secret,
        limits.to_rate_limit_config(),
        queue.offline_capacity,
        HandlerSet::in_memory(),
    );

    // Background tasks: idle-connection reaper and limiter sweep
    ws::reaper::spawn(
        app_state.registry.clone(),
        Duration::from_secs(timeouts.reaper_interval_secs),
        Duration::from_secs(timeouts.idle_timeout_secs),
    );
    app_state.limiter.spawn_sweep();

    // Build router
    let app = routes::build_router(app_state);

    // Bind and serve
    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
