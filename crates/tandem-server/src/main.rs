mod cli;
mod config;

use anyhow::Result;
use clap::Parser;
use tandem_core::{AppConfig, AppState};
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("tandem=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let config = config::Config::load(&args.config)?;

    let db = tandem_db::create_pool(&config.database.url, config.database.max_connections).await?;
    tandem_db::run_migrations(&db).await?;

    let state = AppState::new(
        db,
        AppConfig {
            jwt_secret: config.auth.jwt_secret.clone(),
            jwt_expiry_seconds: config.auth.jwt_expiry_seconds,
            registration_enabled: config.auth.registration_enabled,
            database_url: config.database.url.clone(),
            worker_id: config.gateway.worker_id,
            typing_events_per_minute: config.gateway.typing_events_per_minute,
        },
    );

    let app = tandem_api::build_router()
        .merge(tandem_ws::gateway_router(&state.config))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!("listening on {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down (ctrl-c)...");
        })
        .await?;
    Ok(())
}
