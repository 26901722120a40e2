//! Test data factories for creating valid test fixtures.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    application::use_cases::{ledger::NewPaymentIntent, subscription::PlanCatalog},
    domain::entities::payment_purpose::PaymentPurpose,
};

/// A top-up request in the test currency.
pub fn new_top_up(user_id: Uuid, amount: i64, idempotency_key: &str) -> NewPaymentIntent {
    NewPaymentIntent {
        user_id,
        amount,
        currency: "RUB".to_string(),
        purpose: PaymentPurpose::TopUp,
        plan_id: None,
        duration_months: None,
        idempotency_key: idempotency_key.to_string(),
    }
}

/// `basic` at 299.00 and `premium` at 599.00 per month.
pub fn test_catalog() -> PlanCatalog {
    PlanCatalog::new(HashMap::from([
        ("basic".to_string(), 29_900),
        ("premium".to_string(), 59_900),
    ]))
}
