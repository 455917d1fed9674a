use std::net::SocketAddr;

use axum::http::{header, HeaderValue, Method};
use clap::Parser;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use starlog::config::{Cli, Config};
use starlog::state::AppState;
use starlog::{db, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli);
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    let pool = db::create_pool(config.db_path())?;
    db::run_migrations(&pool)?;

    let state = AppState {
        db: pool,
        config: config.clone(),
    };

    let mut app = routes::api_router();

    // Credentialed CORS for a browser frontend; cookies require an exact
    // origin rather than a wildcard.
    if let Some(ref origin) = config.server.cors_origin {
        let origin: HeaderValue = origin.parse()?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                .allow_headers([header::CONTENT_TYPE])
                .allow_credentials(true),
        );
    }

    let app = app.layer(TraceLayer::new_for_http()).with_state(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
