//! Domain models for the material ledger

mod adjustment;
mod allocation;
mod catalog;
mod entry;
mod inventory;
mod monitoring;
mod remision;

pub use adjustment::*;
pub use allocation::*;
pub use catalog::*;
pub use entry::*;
pub use inventory::*;
pub use monitoring::*;
pub use remision::*;
