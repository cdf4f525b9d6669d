//! Shared types, models and the FIFO planner for the material ledger
//!
//! This crate holds everything that does not need storage: domain models,
//! input validation and the pure FIFO cost-layer planner. The backend and
//! the WASM preview both build on it.

pub mod fifo;
pub mod models;
pub mod types;
pub mod validation;

pub use models::*;
pub use types::*;
pub use validation::*;
