//! Application entry point and server initialization

use dotenvy::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use site_catalog::config::Config;
use site_catalog::database::{init_db, AppState};
use site_catalog::route::create_app;

/// Loads `.env`, opens the database and serves until SIGINT or SIGTERM
///
/// # Environment Variables
///
/// - `PORT` - Server port number (default: 8080)
/// - `DATABASE_URL` - Path to database file (default: "catalog.db")
/// - `UNDO_WINDOW_SECS` - Bulk delete undo window (default: 8)
/// - `MAX_IDS_PER_REQUEST` - Largest id list one store lookup accepts (default: 500)
/// - `RELATION_BATCH_SIZE` - Chunk size of relation fetches (default: 100)
/// - `RUST_LOG` - Log filter (default: "site_catalog=debug,tower_http=debug")
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("site_catalog=debug,tower_http=debug")),
        )
        .init();

    let config = Config::from_env();
    let db = init_db(&config.database_url)?;
    let state = AppState::new(db, &config);

    let app = create_app(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;

    tracing::info!(
        %addr,
        database = %config.database_url,
        undo_window_secs = config.undo_window.as_secs(),
        max_ids_per_request = config.max_ids_per_request,
        batch_size = config.relation_batch_size,
        "server listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on Ctrl+C, or SIGTERM on Unix
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(%err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(%err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received, stopping server");
}
