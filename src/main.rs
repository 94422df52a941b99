use anyhow::Context;
use packstock_api::{
    config::{self, AppConfig},
    db, events,
    handlers::app_router,
    AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = config::load_config().context("failed to load configuration")?;
    config::init_tracing(config.log_level(), config.log_json);
    info!(
        environment = %config.environment,
        addr = %config.server_addr(),
        "Starting packstock-api"
    );

    let db = Arc::new(
        db::establish_connection(&config)
            .await
            .context("failed to connect to database")?,
    );
    if config.auto_migrate {
        db::create_schema(&db)
            .await
            .context("failed to create schema")?;
        info!("Schema ensured");
    }

    let (event_sender, event_rx) = events::channel(1024);
    tokio::spawn(events::run_audit_writer(db.clone(), event_rx));

    let config = Arc::new(config);
    let state = AppState::new(db, config.clone(), event_sender);

    spawn_overdue_sweep(&state, &config);

    let app = app_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(TimeoutLayer::new(Duration::from_secs(30)));

    let listener = tokio::net::TcpListener::bind(config.server_addr())
        .await
        .context("failed to bind listener")?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Shut down cleanly");
    Ok(())
}

/// Periodic Active -> Overdue reconciliation. Disabled when the configured
/// interval is zero.
fn spawn_overdue_sweep(state: &AppState, config: &AppConfig) {
    let interval_secs = config.overdue_sweep_interval_secs;
    if interval_secs == 0 {
        info!("Overdue sweep disabled");
        return;
    }

    let loans = state.loan_service().clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let today = chrono::Utc::now().date_naive();
            match loans.sweep_overdue(today).await {
                Ok(0) => {}
                Ok(flipped) => info!(flipped, "Overdue sweep completed"),
                Err(e) => error!("Overdue sweep failed: {}", e),
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install shutdown handler: {}", e);
        return;
    }
    info!("Shutdown signal received");
}
