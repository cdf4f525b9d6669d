//! Business logic services for the material ledger

pub mod batch;
pub mod fifo;
pub mod ledger;
pub mod monitoring;

pub use batch::BatchInventoryService;
pub use fifo::FifoAllocationService;
pub use ledger::InventoryLedgerService;
pub use monitoring::InventoryMonitoringService;
