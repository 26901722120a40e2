use dotenvy::dotenv;
use tracing::info;

use comics_payments::infra::{
    app::create_app,
    config::AppConfig,
    reconciliation_worker::{SweepSettings, run_reconciliation_loop},
    setup::{init_app_state, init_tracing},
};
use std::net::SocketAddr;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = AppConfig::from_env();
    init_tracing(&config.log_file)?;

    let sweep_settings = SweepSettings {
        interval: config.reconcile_interval,
        stale_after: config.reconcile_stale_after,
        batch_size: config.reconcile_batch_size,
        concurrency: config.reconcile_concurrency,
        archive_after: config.archive_after,
    };

    let app_state = init_app_state(config).await?;

    let bind_addr = app_state.config.bind_addr;

    let app = create_app(app_state.clone());

    // Spawn the reconciliation sweeper (after tracing is initialized)
    let reconciliation = (*app_state.reconciliation).clone();
    let ledger = (*app_state.ledger).clone();
    tokio::spawn(async move {
        run_reconciliation_loop(reconciliation, ledger, sweep_settings).await;
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Payments backend listening at {}", &listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
