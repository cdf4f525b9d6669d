//! HTTP handlers for the material ledger

pub mod batch;
pub mod fifo;
pub mod health;
pub mod inventory;
pub mod monitoring;

pub use batch::*;
pub use fifo::*;
pub use health::*;
pub use inventory::*;
pub use monitoring::*;
