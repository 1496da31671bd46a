use anyhow::Result;
use chrono::Utc;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("lobby=info,tower_http=debug")),
        )
        .init();

    let args = cli::Args::parse();
    let mut config = config::Config::load(&args.config)?;
    if let Some(bind) = args.bind {
        config.server.bind_address = bind;
    }

    ensure_data_dirs(&config);

    let db = lobby_db::create_pool(&config.database.url, config.database.max_connections).await?;
    lobby_db::run_migrations(&db).await?;

    // Anything still flagged online is a leftover from an unclean shutdown.
    let swept = lobby_db::users::mark_all_offline(&db, Utc::now()).await?;
    if swept > 0 {
        tracing::info!("reset stale online flags for {swept} users");
    }

    let state = lobby_core::AppState::new(
        db.clone(),
        lobby_core::AppConfig {
            jwt_secret: config.auth.jwt_secret.clone(),
            jwt_expiry_seconds: config.auth.jwt_expiry_seconds,
        },
    );
    let shutdown_notify = state.shutdown.clone();

    let app = lobby_api::build_router()
        .merge(lobby_ws::gateway_router())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(
        server_name = %config.server.server_name,
        "listening on http://{}",
        config.server.bind_address
    );

    let shutdown_signal = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down (ctrl-c)...");
            }
            _ = shutdown_notify.notified() => {
                tracing::info!("Shutting down (requested)...");
            }
        }
    };

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    // Connected sessions are gone now; the persisted mirror must agree.
    if let Err(err) = lobby_db::users::mark_all_offline(&db, Utc::now()).await {
        tracing::warn!("failed to mark users offline during shutdown: {err}");
    }

    Ok(())
}

/// Ensure the sqlite database's parent directory exists before the pool opens.
fn ensure_data_dirs(config: &config::Config) {
    if let Some(db_path) = config
        .database
        .url
        .strip_prefix("sqlite://")
        .and_then(|s| s.split('?').next())
    {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
    }
}
