pub mod alerts;
pub mod payment_gateway;
