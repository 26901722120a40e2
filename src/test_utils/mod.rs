//! Test utilities.
//!
//! This module provides:
//! - Test data factories for creating valid test fixtures
//! - In-memory repository implementations for mocking persistence
//! - Builders wiring use cases and `AppState` over those mocks

mod app_state_builder;
mod factories;
mod payment_mocks;

pub use app_state_builder::*;
pub use factories::*;
pub use payment_mocks::*;
