//! Use case wiring over in-memory mocks, and `AppState` for HTTP-level tests.

use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use secrecy::SecretString;
use url::Url;
use uuid::Uuid;

use crate::{
    adapters::http::app_state::AppState,
    application::{
        jwt,
        ports::payment_gateway::GatewayProvider,
        retry::RetryPolicy,
        use_cases::{
            balance::BalanceUseCases,
            cart::CartUseCases,
            ledger::LedgerUseCases,
            reconciliation::{PaymentSettings, ReconciliationUseCases},
            subscription::SubscriptionUseCases,
        },
    },
    domain::entities::payment_scenario::PaymentScenario,
    infra::{config::AppConfig, dummy_gateway::DummyGateway},
    test_utils::{
        InMemoryBalanceRepo, InMemoryCartRepo, InMemoryPaymentIntentRepo,
        InMemorySubscriptionRepo, RecordingAlertSink, test_catalog,
    },
};

pub const TEST_JWT_SECRET: &str = "test-jwt-secret";
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test";
pub const TEST_MAX_AMOUNT: i64 = 1_000_000_00;

// ============================================================================
// PaymentsHarness
// ============================================================================

/// All payment use cases wired over in-memory stores and the dummy gateway.
/// The mocks stay reachable for arranging failures and inspecting state.
pub struct PaymentsHarness {
    pub intents: Arc<InMemoryPaymentIntentRepo>,
    pub balance_repo: Arc<InMemoryBalanceRepo>,
    pub subscription_repo: Arc<InMemorySubscriptionRepo>,
    pub cart_repo: Arc<InMemoryCartRepo>,
    pub gateway: Arc<DummyGateway>,
    pub alerts: Arc<RecordingAlertSink>,
    pub ledger: LedgerUseCases,
    pub balances: BalanceUseCases,
    pub subscriptions: SubscriptionUseCases,
    pub cart: CartUseCases,
    pub reconciliation: ReconciliationUseCases,
}

impl PaymentsHarness {
    pub fn new() -> Self {
        Self::with_scenario(PaymentScenario::AwaitConfirmation)
    }

    pub fn with_scenario(scenario: PaymentScenario) -> Self {
        let intents = Arc::new(InMemoryPaymentIntentRepo::new());
        let balance_repo = Arc::new(InMemoryBalanceRepo::new());
        let subscription_repo = Arc::new(InMemorySubscriptionRepo::new());
        let cart_repo = Arc::new(InMemoryCartRepo::new());
        let gateway = Arc::new(DummyGateway::new(
            SecretString::new(TEST_WEBHOOK_SECRET.to_string().into()),
            scenario,
            "http://localhost:3000",
        ));
        let alerts = Arc::new(RecordingAlertSink::new());

        let ledger = LedgerUseCases::new(intents.clone());
        let balances = BalanceUseCases::new(balance_repo.clone());
        let subscriptions = SubscriptionUseCases::new(
            subscription_repo.clone(),
            balances.clone(),
            Arc::new(test_catalog()),
        );
        let cart = CartUseCases::new(cart_repo.clone());
        let reconciliation = ReconciliationUseCases::new(
            ledger.clone(),
            balances.clone(),
            subscriptions.clone(),
            gateway.clone(),
            alerts.clone(),
            PaymentSettings {
                currency: "RUB".to_string(),
                max_amount: TEST_MAX_AMOUNT,
                return_url: "http://localhost:3000/balance".to_string(),
                retry: RetryPolicy::immediate(3),
            },
        );

        Self {
            intents,
            balance_repo,
            subscription_repo,
            cart_repo,
            gateway,
            alerts,
            ledger,
            balances,
            subscriptions,
            cart,
            reconciliation,
        }
    }
}

impl Default for PaymentsHarness {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// TestAppStateBuilder
// ============================================================================

/// Config with test secrets and the dummy provider.
pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        run_migrations: false,
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        cors_origin: HeaderValue::from_static("http://localhost:3000"),
        app_origin: Url::parse("http://localhost:3000").unwrap(),
        jwt_secret: SecretString::new(TEST_JWT_SECRET.to_string().into()),
        currency: "RUB".to_string(),
        max_topup_amount: TEST_MAX_AMOUNT,
        subscription_plans: test_catalog(),
        gateway_provider: GatewayProvider::Dummy,
        gateway_api_url: Url::parse("http://localhost:9999/v3/").unwrap(),
        gateway_shop_id: String::new(),
        gateway_secret_key: SecretString::new(String::new().into()),
        gateway_webhook_secret: SecretString::new(TEST_WEBHOOK_SECRET.to_string().into()),
        gateway_timeout: Duration::from_secs(1),
        dummy_scenario: PaymentScenario::AwaitConfirmation,
        retry: RetryPolicy::immediate(3),
        reconcile_interval: Duration::from_secs(60),
        reconcile_stale_after: chrono::Duration::minutes(5),
        reconcile_batch_size: 10,
        reconcile_concurrency: 2,
        archive_after: chrono::Duration::days(90),
        log_file: "test.log".to_string(),
    }
}

/// Access token for `user_id`, signed with the test secret.
pub fn access_token_for(user_id: Uuid) -> String {
    jwt::issue(
        user_id,
        &SecretString::new(TEST_JWT_SECRET.to_string().into()),
        chrono::Duration::minutes(15),
    )
    .unwrap()
}

/// `Authorization` header value for `user_id`.
pub fn bearer_for(user_id: Uuid) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", access_token_for(user_id))).unwrap()
}

/// Builder for creating `AppState` over a `PaymentsHarness`.
///
/// # Example
///
/// ```ignore
/// let (app_state, harness) = TestAppStateBuilder::new()
///     .with_scenario(PaymentScenario::Succeed)
///     .build();
/// ```
pub struct TestAppStateBuilder {
    scenario: PaymentScenario,
    dummy_routes: bool,
}

impl Default for TestAppStateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestAppStateBuilder {
    pub fn new() -> Self {
        Self {
            scenario: PaymentScenario::AwaitConfirmation,
            dummy_routes: true,
        }
    }

    pub fn with_scenario(mut self, scenario: PaymentScenario) -> Self {
        self.scenario = scenario;
        self
    }

    /// Builds state as if a real provider were configured.
    pub fn without_dummy_routes(mut self) -> Self {
        self.dummy_routes = false;
        self
    }

    pub fn build(self) -> (AppState, PaymentsHarness) {
        let harness = PaymentsHarness::with_scenario(self.scenario);
        let app_state = AppState {
            config: Arc::new(test_config()),
            ledger: Arc::new(harness.ledger.clone()),
            balances: Arc::new(harness.balances.clone()),
            subscriptions: Arc::new(harness.subscriptions.clone()),
            cart: Arc::new(harness.cart.clone()),
            reconciliation: Arc::new(harness.reconciliation.clone()),
            dummy_gateway: self.dummy_routes.then(|| harness.gateway.clone()),
        };
        (app_state, harness)
    }
}
