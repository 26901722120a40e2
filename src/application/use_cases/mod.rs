pub mod balance;
pub mod cart;
pub mod ledger;
pub mod reconciliation;
pub mod subscription;
