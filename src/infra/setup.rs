use crate::{
    adapters::http::app_state::AppState,
    application::{
        ports::{
            alerts::OperatorAlertPort,
            payment_gateway::{GatewayProvider, PaymentGatewayPort},
        },
        use_cases::{
            balance::{BalanceRepoTrait, BalanceUseCases},
            cart::{CartRepoTrait, CartUseCases},
            ledger::{LedgerUseCases, PaymentIntentRepoTrait},
            reconciliation::{PaymentSettings, ReconciliationUseCases},
            subscription::{SubscriptionRepoTrait, SubscriptionUseCases},
        },
    },
    infra::{
        alerts::TracingAlertSink,
        config::AppConfig,
        dummy_gateway::DummyGateway,
        error::InfraError,
        gateway_client::{GatewayClient, GatewayClientConfig},
        postgres_persistence,
    },
};
use std::fs::File;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub async fn init_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let postgres_arc =
        Arc::new(postgres_persistence(&config.database_url, config.run_migrations).await?);

    let intent_repo_arc = postgres_arc.clone() as Arc<dyn PaymentIntentRepoTrait>;
    let balance_repo_arc = postgres_arc.clone() as Arc<dyn BalanceRepoTrait>;
    let subscription_repo_arc = postgres_arc.clone() as Arc<dyn SubscriptionRepoTrait>;
    let cart_repo_arc = postgres_arc.clone() as Arc<dyn CartRepoTrait>;

    let (gateway, dummy_gateway): (Arc<dyn PaymentGatewayPort>, Option<Arc<DummyGateway>>) =
        match config.gateway_provider {
            GatewayProvider::Http => {
                let client = GatewayClient::new(GatewayClientConfig {
                    api_url: config.gateway_api_url.clone(),
                    shop_id: config.gateway_shop_id.clone(),
                    secret_key: config.gateway_secret_key.clone(),
                    webhook_secret: config.gateway_webhook_secret.clone(),
                    request_timeout: config.gateway_timeout,
                })
                .map_err(InfraError::HttpClient)?;
                (Arc::new(client) as Arc<dyn PaymentGatewayPort>, None)
            }
            GatewayProvider::Dummy => {
                tracing::warn!(
                    scenario = %config.dummy_scenario,
                    "Using the dummy payment gateway, no real money moves"
                );
                let dummy = Arc::new(DummyGateway::new(
                    config.gateway_webhook_secret.clone(),
                    config.dummy_scenario,
                    config.app_origin.as_str().trim_end_matches('/'),
                ));
                (dummy.clone() as Arc<dyn PaymentGatewayPort>, Some(dummy))
            }
        };
    let alerts = Arc::new(TracingAlertSink) as Arc<dyn OperatorAlertPort>;

    let ledger = LedgerUseCases::new(intent_repo_arc);
    let balances = BalanceUseCases::new(balance_repo_arc);
    let subscriptions = SubscriptionUseCases::new(
        subscription_repo_arc,
        balances.clone(),
        Arc::new(config.subscription_plans.clone()),
    );
    let cart = CartUseCases::new(cart_repo_arc);
    let reconciliation = ReconciliationUseCases::new(
        ledger.clone(),
        balances.clone(),
        subscriptions.clone(),
        gateway,
        alerts,
        PaymentSettings {
            currency: config.currency.clone(),
            max_amount: config.max_topup_amount,
            return_url: config.return_url(),
            retry: config.retry,
        },
    );

    Ok(AppState {
        config: Arc::new(config),
        ledger: Arc::new(ledger),
        balances: Arc::new(balances),
        subscriptions: Arc::new(subscriptions),
        cart: Arc::new(cart),
        reconciliation: Arc::new(reconciliation),
        dummy_gateway,
    })
}

pub fn init_tracing(log_file: &str) -> Result<(), InfraError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "comics_payments=debug,tower_http=debug".into());

    // Console (pretty logs)
    let console_layer = fmt::layer().with_target(false).with_level(true).pretty();

    // File (structured JSON logs)
    let file = File::create(log_file).map_err(|source| InfraError::LogFile {
        path: log_file.to_string(),
        source,
    })?;
    let json_layer = fmt::layer()
        .json()
        .with_writer(file)
        .with_current_span(true)
        .with_span_list(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .try_init()
        .ok();

    Ok(())
}
