use std::sync::Arc;

use crate::{
    application::use_cases::{
        balance::BalanceUseCases, cart::CartUseCases, ledger::LedgerUseCases,
        reconciliation::ReconciliationUseCases, subscription::SubscriptionUseCases,
    },
    infra::{config::AppConfig, dummy_gateway::DummyGateway},
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub ledger: Arc<LedgerUseCases>,
    pub balances: Arc<BalanceUseCases>,
    pub subscriptions: Arc<SubscriptionUseCases>,
    pub cart: Arc<CartUseCases>,
    pub reconciliation: Arc<ReconciliationUseCases>,
    /// Present only when the dummy provider serves payments; enables the settle route.
    pub dummy_gateway: Option<Arc<DummyGateway>>,
}
