//! Ledger store double that delegates to the in-memory store and injects
//! storage faults

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use material_ledger_backend::store::{AdjustmentCommit, AllocationCommit};
use material_ledger_backend::{AppError, AppResult, InMemoryLedgerStore, LedgerStore};
use rust_decimal::Decimal;
use shared::{
    DailyInventoryLog, DailyTotals, LedgerBalance, LedgerEvent, LedgerQuery, Material,
    MaterialAdjustment, MaterialConsumptionAllocation, MaterialEntry, MaterialInventory,
    MaterialPrice, NewMaterial, NewMaterialEntry, NewMaterialPrice, NewPlant, NewRemision, Plant,
    Remision, RemisionMaterial, StockKey, TableStats,
};
use uuid::Uuid;

#[derive(Default)]
pub struct FaultyStore {
    inner: InMemoryLedgerStore,
    /// Every call fails as if the database were unreachable
    unreachable: bool,
    /// Batch mode is switched back on right before this allocation commit
    /// (1-based), as a concurrent import would
    disable_triggers_before_commit: Option<usize>,
    commits: AtomicUsize,
}

impl FaultyStore {
    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub fn disabling_triggers_before_commit(commit: usize) -> Self {
        Self {
            disable_triggers_before_commit: Some(commit),
            ..Self::default()
        }
    }

    /// Allocation commits attempted so far
    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    fn reach(&self) -> AppResult<&InMemoryLedgerStore> {
        if self.unreachable {
            return Err(AppError::Persistence("connection refused".to_string()));
        }
        Ok(&self.inner)
    }
}

#[async_trait]
impl LedgerStore for FaultyStore {
    async fn upsert_plant(&self, input: NewPlant) -> AppResult<Plant> {
        self.reach()?.upsert_plant(input).await
    }

    async fn upsert_material(&self, input: NewMaterial) -> AppResult<Material> {
        self.reach()?.upsert_material(input).await
    }

    async fn plant_exists(&self, plant_id: Uuid) -> AppResult<bool> {
        self.reach()?.plant_exists(plant_id).await
    }

    async fn material_exists(&self, material_id: Uuid) -> AppResult<bool> {
        self.reach()?.material_exists(material_id).await
    }

    async fn insert_entry(
        &self,
        input: NewMaterialEntry,
        entry_date: NaiveDate,
        entered_by: Uuid,
    ) -> AppResult<MaterialEntry> {
        self.reach()?.insert_entry(input, entry_date, entered_by).await
    }

    async fn open_layers(
        &self,
        key: StockKey,
        as_of: Option<NaiveDate>,
    ) -> AppResult<Vec<MaterialEntry>> {
        self.reach()?.open_layers(key, as_of).await
    }

    async fn list_entries(&self, query: &LedgerQuery) -> AppResult<Vec<MaterialEntry>> {
        self.reach()?.list_entries(query).await
    }

    async fn insert_price(&self, input: NewMaterialPrice) -> AppResult<MaterialPrice> {
        self.reach()?.insert_price(input).await
    }

    async fn prices_for(&self, key: StockKey) -> AppResult<Vec<MaterialPrice>> {
        self.reach()?.prices_for(key).await
    }

    async fn insert_remision(&self, input: NewRemision) -> AppResult<Remision> {
        self.reach()?.insert_remision(input).await
    }

    async fn get_remision(&self, remision_id: Uuid) -> AppResult<Option<Remision>> {
        self.reach()?.get_remision(remision_id).await
    }

    async fn get_remision_material(
        &self,
        remision_material_id: Uuid,
    ) -> AppResult<Option<RemisionMaterial>> {
        self.reach()?.get_remision_material(remision_material_id).await
    }

    async fn allocations_for(
        &self,
        remision_material_id: Uuid,
    ) -> AppResult<Vec<MaterialConsumptionAllocation>> {
        self.reach()?.allocations_for(remision_material_id).await
    }

    async fn commit_allocation(
        &self,
        commit: AllocationCommit,
    ) -> AppResult<Vec<MaterialConsumptionAllocation>> {
        let inner = self.reach()?;
        let attempt = self.commits.fetch_add(1, Ordering::SeqCst) + 1;
        if self.disable_triggers_before_commit == Some(attempt) {
            inner.set_triggers_enabled(false).await?;
        }
        inner.commit_allocation(commit).await
    }

    async fn commit_adjustment(&self, commit: AdjustmentCommit) -> AppResult<MaterialAdjustment> {
        self.reach()?.commit_adjustment(commit).await
    }

    async fn list_adjustments(&self, query: &LedgerQuery) -> AppResult<Vec<MaterialAdjustment>> {
        self.reach()?.list_adjustments(query).await
    }

    async fn inventory(&self, key: StockKey) -> AppResult<Option<MaterialInventory>> {
        self.reach()?.inventory(key).await
    }

    async fn list_inventory(&self, plant_id: Option<Uuid>) -> AppResult<Vec<MaterialInventory>> {
        self.reach()?.list_inventory(plant_id).await
    }

    async fn set_thresholds(
        &self,
        key: StockKey,
        minimum: Decimal,
        maximum: Option<Decimal>,
    ) -> AppResult<MaterialInventory> {
        self.reach()?.set_thresholds(key, minimum, maximum).await
    }

    async fn recompute_inventory(&self, key: StockKey) -> AppResult<MaterialInventory> {
        self.reach()?.recompute_inventory(key).await
    }

    async fn ledger_balances(&self) -> AppResult<Vec<LedgerBalance>> {
        self.reach()?.ledger_balances().await
    }

    async fn daily_totals(&self, plant_id: Uuid, date: NaiveDate) -> AppResult<DailyTotals> {
        self.reach()?.daily_totals(plant_id, date).await
    }

    async fn get_daily_log(
        &self,
        plant_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<Option<DailyInventoryLog>> {
        self.reach()?.get_daily_log(plant_id, date).await
    }

    async fn save_daily_log(&self, log: DailyInventoryLog) -> AppResult<DailyInventoryLog> {
        self.reach()?.save_daily_log(log).await
    }

    async fn triggers_enabled(&self) -> AppResult<bool> {
        self.reach()?.triggers_enabled().await
    }

    async fn set_triggers_enabled(&self, enabled: bool) -> AppResult<bool> {
        self.reach()?.set_triggers_enabled(enabled).await
    }

    async fn count_unallocated_remision_materials(&self) -> AppResult<i64> {
        self.reach()?.count_unallocated_remision_materials().await
    }

    async fn ledger_events_since(&self, since: DateTime<Utc>) -> AppResult<Vec<LedgerEvent>> {
        self.reach()?.ledger_events_since(since).await
    }

    async fn table_stats(&self) -> AppResult<Vec<TableStats>> {
        self.reach()?.table_stats().await
    }

    async fn vacuum(&self) -> AppResult<()> {
        self.reach()?.vacuum().await
    }
}
