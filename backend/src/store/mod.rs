//! Ledger persistence
//!
//! The ledger (entries, allocations and adjustments) is the source of
//! truth; inventory balances and daily logs are derived from it. A
//! [`LedgerStore`] owns the atomic units the services need: an allocation
//! commit either lands completely (allocation rows, lot decrements, cost
//! write-back, balance recomputation unless deferred) or not at all.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::fifo::FifoPlan;
use shared::{
    DailyInventoryLog, DailyTotals, FifoAllocationRequest, LedgerBalance, LedgerEvent,
    LedgerQuery, Material, MaterialAdjustment, MaterialConsumptionAllocation, MaterialEntry,
    MaterialInventory, MaterialPrice, NewMaterial, NewMaterialAdjustment, NewMaterialEntry,
    NewMaterialPrice, NewPlant, NewRemision, Plant, Remision, RemisionMaterial, StockKey,
    TableStats,
};
use uuid::Uuid;

use crate::error::AppResult;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Storage tables tracked for maintenance
pub const LEDGER_TABLES: &[&str] = &[
    "plants",
    "materials",
    "material_entries",
    "material_prices",
    "material_consumption_allocations",
    "material_adjustments",
    "material_inventory",
    "remisiones",
    "remision_materiales",
    "daily_inventory_log",
];

/// Activity events older than this are dropped on vacuum; the update
/// frequency monitor never looks further back
pub const EVENT_RETENTION_DAYS: i64 = 7;

/// Everything needed to persist one planned allocation
#[derive(Debug, Clone)]
pub struct AllocationCommit {
    pub request: FifoAllocationRequest,
    pub plan: FifoPlan,
    pub performed_by: Uuid,
    /// Rebuild the stock position's balance in the same unit. Off inside an
    /// aggregated pass, which recomputes each position once at the end.
    pub recompute: bool,
}

/// A planned write-off
#[derive(Debug, Clone)]
pub struct AdjustmentCommit {
    pub input: NewMaterialAdjustment,
    pub adjustment_date: NaiveDate,
    pub plan: FifoPlan,
    pub performed_by: Uuid,
}

/// Persistence operations for the material ledger
#[async_trait]
pub trait LedgerStore: Send + Sync {
    // Catalog
    async fn upsert_plant(&self, input: NewPlant) -> AppResult<Plant>;
    async fn upsert_material(&self, input: NewMaterial) -> AppResult<Material>;
    async fn plant_exists(&self, plant_id: Uuid) -> AppResult<bool>;
    async fn material_exists(&self, material_id: Uuid) -> AppResult<bool>;

    /// Create a lot with its entry number, sequence and before/after
    /// snapshots, then recompute the stock position.
    async fn insert_entry(
        &self,
        input: NewMaterialEntry,
        entry_date: NaiveDate,
        entered_by: Uuid,
    ) -> AppResult<MaterialEntry>;

    /// Lots with stock left, oldest first by `(entry_date, sequence)`.
    /// `as_of` excludes lots received after that date.
    async fn open_layers(
        &self,
        key: StockKey,
        as_of: Option<NaiveDate>,
    ) -> AppResult<Vec<MaterialEntry>>;

    /// Entries of a plant, newest first by `(entry_date, sequence)`
    async fn list_entries(&self, query: &LedgerQuery) -> AppResult<Vec<MaterialEntry>>;

    async fn insert_price(&self, input: NewMaterialPrice) -> AppResult<MaterialPrice>;
    async fn prices_for(&self, key: StockKey) -> AppResult<Vec<MaterialPrice>>;

    // Remisiones
    async fn insert_remision(&self, input: NewRemision) -> AppResult<Remision>;
    async fn get_remision(&self, remision_id: Uuid) -> AppResult<Option<Remision>>;
    async fn get_remision_material(
        &self,
        remision_material_id: Uuid,
    ) -> AppResult<Option<RemisionMaterial>>;

    // Allocations
    async fn allocations_for(
        &self,
        remision_material_id: Uuid,
    ) -> AppResult<Vec<MaterialConsumptionAllocation>>;

    /// Persist a plan atomically.
    ///
    /// Fails with `TriggersDisabled` during a bulk import,
    /// `AlreadyAllocated` when the remision material already has rows and
    /// `VersionConflict` when a lot changed since the plan was computed.
    async fn commit_allocation(
        &self,
        commit: AllocationCommit,
    ) -> AppResult<Vec<MaterialConsumptionAllocation>>;

    // Adjustments
    /// Number the adjustment per plant per day, decrement the planned lots
    /// with version checks and recompute the position, atomically.
    /// `VersionConflict` when a lot changed since the plan was computed.
    async fn commit_adjustment(&self, commit: AdjustmentCommit) -> AppResult<MaterialAdjustment>;
    /// Adjustments of a plant, newest first
    async fn list_adjustments(&self, query: &LedgerQuery) -> AppResult<Vec<MaterialAdjustment>>;

    // Inventory
    async fn inventory(&self, key: StockKey) -> AppResult<Option<MaterialInventory>>;
    async fn list_inventory(&self, plant_id: Option<Uuid>) -> AppResult<Vec<MaterialInventory>>;
    async fn set_thresholds(
        &self,
        key: StockKey,
        minimum: Decimal,
        maximum: Option<Decimal>,
    ) -> AppResult<MaterialInventory>;
    /// Rebuild the materialized balance of one position from the ledger
    async fn recompute_inventory(&self, key: StockKey) -> AppResult<MaterialInventory>;
    /// Received/consumed/adjusted totals straight from the ledger, every position
    async fn ledger_balances(&self) -> AppResult<Vec<LedgerBalance>>;

    // Daily log
    /// Kilograms received, consumed and adjusted at a plant on a day
    async fn daily_totals(&self, plant_id: Uuid, date: NaiveDate) -> AppResult<DailyTotals>;
    async fn get_daily_log(
        &self,
        plant_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Option<DailyInventoryLog>>;
    async fn save_daily_log(&self, log: DailyInventoryLog) -> AppResult<DailyInventoryLog>;

    // Batch mode
    async fn triggers_enabled(&self) -> AppResult<bool>;
    /// Set the trigger flag and return its previous value
    async fn set_triggers_enabled(&self, enabled: bool) -> AppResult<bool>;

    // Monitoring
    async fn count_unallocated_remision_materials(&self) -> AppResult<i64>;
    async fn ledger_events_since(&self, since: DateTime<Utc>) -> AppResult<Vec<LedgerEvent>>;
    async fn table_stats(&self) -> AppResult<Vec<TableStats>>;
    /// Reclaim dead rows in every ledger table and drop activity events
    /// older than the monitoring window
    async fn vacuum(&self) -> AppResult<()>;
}
