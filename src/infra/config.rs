use std::net::SocketAddr;
use std::time::Duration;

use axum::http::HeaderValue;
use env_helpers::{get_env, get_env_default};
use secrecy::SecretString;
use url::Url;

use crate::{
    application::{
        ports::payment_gateway::GatewayProvider, retry::RetryPolicy,
        use_cases::subscription::PlanCatalog,
    },
    domain::entities::payment_scenario::PaymentScenario,
};

pub struct AppConfig {
    pub database_url: String,
    /// Apply embedded migrations on startup.
    pub run_migrations: bool,
    pub bind_addr: SocketAddr,
    pub cors_origin: HeaderValue,
    /// Frontend origin; users come back to `{app_origin}/balance` after paying.
    pub app_origin: Url,
    /// HS256 key shared with the auth service that issues access tokens.
    pub jwt_secret: SecretString,
    /// The single currency accepted for payments (ISO 4217).
    pub currency: String,
    /// Largest single top-up in minor units.
    pub max_topup_amount: i64,
    pub subscription_plans: PlanCatalog,

    pub gateway_provider: GatewayProvider,
    pub gateway_api_url: Url,
    pub gateway_shop_id: String,
    pub gateway_secret_key: SecretString,
    /// Shared secret for `X-Payment-Signature` on incoming notifications.
    pub gateway_webhook_secret: SecretString,
    pub gateway_timeout: Duration,
    /// Only used by the dummy provider.
    pub dummy_scenario: PaymentScenario,
    pub retry: RetryPolicy,

    pub reconcile_interval: Duration,
    /// Non-terminal intents untouched for this long are picked up by the sweeper.
    pub reconcile_stale_after: chrono::Duration,
    pub reconcile_batch_size: i64,
    pub reconcile_concurrency: usize,
    /// Terminal intents older than this get `archived_at` stamped.
    pub archive_after: chrono::Duration,

    pub log_file: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url: String = get_env("DATABASE_URL");
        let run_migrations: bool = get_env_default("RUN_MIGRATIONS", true);
        let bind_addr: SocketAddr = get_env_default("BIND_ADDR", "127.0.0.1:3001".parse().unwrap());
        let cors_origin: HeaderValue =
            get_env_default("CORS_ORIGIN", String::from("http://localhost:3000"))
                .parse()
                .expect("CORS_ORIGIN must be a valid header value");
        let app_origin: Url = get_env("APP_ORIGIN");
        let jwt_secret = SecretString::new(get_env::<String>("JWT_SECRET").into());

        let currency: String = get_env_default("CURRENCY", "RUB".to_string()).to_ascii_uppercase();
        let max_topup_amount: i64 = get_env_default("MAX_TOPUP_AMOUNT", 10_000_000);
        let subscription_plans = PlanCatalog::parse(&get_env_default(
            "SUBSCRIPTION_PLANS",
            "basic:29900,premium:59900".to_string(),
        ))
        .expect("SUBSCRIPTION_PLANS must be a list of code:price pairs");

        let gateway_provider: GatewayProvider =
            get_env_default("GATEWAY_PROVIDER", "dummy".to_string())
                .parse()
                .expect("GATEWAY_PROVIDER must be 'http' or 'dummy'");
        let gateway_api_url: Url =
            get_env_default("GATEWAY_API_URL", "https://api.yookassa.ru/v3/".to_string())
                .parse()
                .expect("GATEWAY_API_URL must be a valid URL");
        let gateway_shop_id: String = get_env_default("GATEWAY_SHOP_ID", String::new());
        let gateway_secret_key =
            SecretString::new(get_env_default("GATEWAY_SECRET_KEY", String::new()).into());
        let gateway_webhook_secret =
            SecretString::new(get_env::<String>("GATEWAY_WEBHOOK_SECRET").into());
        let gateway_timeout_secs: u64 = get_env_default("GATEWAY_TIMEOUT_SECS", 10);
        let dummy_scenario: PaymentScenario =
            get_env_default("DUMMY_SCENARIO", "await_confirmation".to_string())
                .parse()
                .expect("DUMMY_SCENARIO must be a known payment scenario");

        let retry = RetryPolicy {
            max_attempts: get_env_default("RETRY_MAX_ATTEMPTS", 3),
            base_delay: Duration::from_millis(get_env_default("RETRY_BASE_DELAY_MS", 200)),
            max_delay: Duration::from_millis(get_env_default("RETRY_MAX_DELAY_MS", 5_000)),
        };

        let reconcile_interval_secs: u64 = get_env_default("RECONCILE_INTERVAL_SECS", 60);
        let reconcile_stale_after_secs: i64 = get_env_default("RECONCILE_STALE_AFTER_SECS", 300);
        let reconcile_batch_size: i64 = get_env_default("RECONCILE_BATCH_SIZE", 100);
        let reconcile_concurrency: usize = get_env_default("RECONCILE_CONCURRENCY", 8);
        let archive_after_days: i64 = get_env_default("ARCHIVE_AFTER_DAYS", 90);

        let log_file: String = get_env_default("LOG_FILE", "app.log".to_string());

        Self {
            database_url,
            run_migrations,
            bind_addr,
            cors_origin,
            app_origin,
            jwt_secret,
            currency,
            max_topup_amount,
            subscription_plans,
            gateway_provider,
            gateway_api_url,
            gateway_shop_id,
            gateway_secret_key,
            gateway_webhook_secret,
            gateway_timeout: Duration::from_secs(gateway_timeout_secs),
            dummy_scenario,
            retry,
            reconcile_interval: Duration::from_secs(reconcile_interval_secs),
            reconcile_stale_after: chrono::Duration::seconds(reconcile_stale_after_secs),
            reconcile_batch_size,
            reconcile_concurrency,
            archive_after: chrono::Duration::days(archive_after_days),
            log_file,
        }
    }

    /// Where the provider sends the user after confirming a payment.
    pub fn return_url(&self) -> String {
        format!("{}/balance", self.app_origin.as_str().trim_end_matches('/'))
    }
}
