//! # Accord API Server
//!
//! Account service: signup, email verification, login, API keys,
//! subscriptions, administration and account deletion.
//!
//! ## Usage
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/accord JWT_SECRET=... cargo run -p accord-api
//! ```
//!
//! Set `LOG_FORMAT=json` for JSON logs and `RUST_LOG` to change the filter.

use accord_api::{
    app::{build_router, AppState},
    config::Config,
};
use accord_shared::{
    db::{
        migrations::{get_migration_status, run_migrations},
        pool::{close_pool, create_pool, DatabaseConfig as PoolConfig},
    },
    email::{EmailSender, HttpEmailSender, LogEmailSender},
};
use std::sync::Arc;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_LOG_FILTER: &str = "accord_api=debug,accord_shared=debug,tower_http=debug";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    tracing::info!("Accord API Server v{} starting...", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;

    let pool = create_pool(PoolConfig {
        max_connections: config.database.max_connections,
        ..PoolConfig::from_url(config.database.url.clone())
    })
    .await?;

    run_migrations(&pool).await?;
    let migrations = get_migration_status(&pool).await?;
    tracing::info!(
        applied = migrations.applied_migrations,
        latest = ?migrations.latest_version,
        "Database migrations applied"
    );

    let mailer: Arc<dyn EmailSender> = match config.email.provider() {
        Some((endpoint, api_key)) => {
            tracing::info!(endpoint, "Sending email through HTTP provider");
            Arc::new(HttpEmailSender::new(endpoint, api_key, config.email.from.clone())?)
        }
        None => {
            tracing::warn!("EMAIL_API_URL or EMAIL_API_KEY not set, emails will only be logged");
            Arc::new(LogEmailSender::new(config.email.from.clone()))
        }
    };

    let bind_address = config.bind_address();
    tracing::info!(
        transactions = ?config.database.transactions,
        production = config.api.production,
        "Configuration loaded"
    );

    let app = build_router(AppState::new(pool.clone(), config, mailer));

    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    close_pool(pool).await;
    tracing::info!("Server stopped");

    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let json = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
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

    tracing::info!("Shutdown signal received, draining connections...");
}
