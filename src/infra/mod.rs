use crate::{adapters::persistence::PostgresPersistence, infra::db::init_db};

pub mod alerts;
pub mod app;
pub mod config;
pub mod db;
pub mod dummy_gateway;
pub mod error;
pub mod gateway_client;
pub mod reconciliation_worker;
pub mod setup;
pub mod webhook_signature;

pub async fn postgres_persistence(
    database_url: &str,
    run_migrations: bool,
) -> anyhow::Result<PostgresPersistence> {
    let pool = init_db(database_url, run_migrations).await?;
    let persistence = PostgresPersistence::new(pool);
    Ok(persistence)
}
