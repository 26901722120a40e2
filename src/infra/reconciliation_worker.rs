use std::time::Duration;

use tokio::time::interval;
use tracing::{error, info};

use crate::application::use_cases::{ledger::LedgerUseCases, reconciliation::ReconciliationUseCases};

const ARCHIVE_INTERVAL_SECS: u64 = 3_600;

pub struct SweepSettings {
    pub interval: Duration,
    pub stale_after: chrono::Duration,
    pub batch_size: i64,
    pub concurrency: usize,
    pub archive_after: chrono::Duration,
}

/// Background sweeper: finishes intents whose notification never arrived or could not
/// be applied, and archives old terminal intents.
pub async fn run_reconciliation_loop(
    reconciliation: ReconciliationUseCases,
    ledger: LedgerUseCases,
    settings: SweepSettings,
) {
    let mut sweep_ticker = interval(settings.interval);
    let mut archive_ticker = interval(Duration::from_secs(ARCHIVE_INTERVAL_SECS));

    info!(
        "Reconciliation worker started (sweeping every {}s, max {} concurrent)",
        settings.interval.as_secs(),
        settings.concurrency
    );

    loop {
        tokio::select! {
            _ = sweep_ticker.tick() => {
                sweep(&reconciliation, &settings).await;
            }
            _ = archive_ticker.tick() => {
                if let Err(e) = ledger.archive_terminal(settings.archive_after).await {
                    error!(error = %e, "Failed to archive terminal payment intents");
                }
            }
        }
    }
}

async fn sweep(reconciliation: &ReconciliationUseCases, settings: &SweepSettings) {
    match reconciliation
        .reconcile_stale(settings.stale_after, settings.batch_size, settings.concurrency)
        .await
    {
        Ok(report) if report.examined > 0 => {
            info!(
                examined = report.examined,
                advanced = report.advanced,
                unchanged = report.unchanged,
                failed = report.failed,
                "Reconciliation sweep finished"
            );
        }
        Ok(_) => {}
        Err(e) => error!(error = %e, "Failed to list stale payment intents"),
    }
}
