pub mod balance;
pub mod cart;
pub mod payment_intent;
pub mod payment_intent_status;
pub mod payment_purpose;
pub mod payment_scenario;
pub mod subscription;
