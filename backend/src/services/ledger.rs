//! Ledger operations: catalog, material entries, adjustments, remisiones,
//! balances and the daily inventory log

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use shared::{
    validate_code, validate_id, validate_ledger_query, validate_new_adjustment,
    validate_new_entry, validate_new_remision, validate_stock_thresholds, validate_unit_price,
    DailyInventoryLog, LedgerQuery, Material, MaterialAdjustment, MaterialEntry,
    MaterialInventory, MaterialPrice, NewMaterial, NewMaterialAdjustment, NewMaterialEntry,
    NewMaterialPrice, NewPlant, NewRemision, Plant, RecordedRemision, StockKey, StockStatus,
};
use uuid::Uuid;

use crate::config::FifoConfig;
use crate::error::{AppError, AppResult};
use crate::services::FifoAllocationService;
use crate::store::{AdjustmentCommit, LedgerStore};

/// Service for recording ledger activity and reading balances
#[derive(Clone)]
pub struct InventoryLedgerService {
    store: Arc<dyn LedgerStore>,
    fifo: FifoAllocationService,
}

impl InventoryLedgerService {
    /// Create a new InventoryLedgerService instance
    pub fn new(store: Arc<dyn LedgerStore>, fifo_config: FifoConfig) -> Self {
        let fifo = FifoAllocationService::new(store.clone(), fifo_config);
        Self { store, fifo }
    }

    pub async fn register_plant(&self, input: NewPlant) -> AppResult<Plant> {
        validate_code(&input.code).map_err(|m| AppError::invalid_field(("code", m)))?;
        if input.name.trim().is_empty() {
            return Err(AppError::validation(
                "name",
                "Plant name is required",
                "El nombre de la planta es obligatorio",
            ));
        }
        self.store.upsert_plant(input).await
    }

    pub async fn register_material(&self, input: NewMaterial) -> AppResult<Material> {
        validate_code(&input.material_code)
            .map_err(|m| AppError::invalid_field(("material_code", m)))?;
        if input.material_name.trim().is_empty() {
            return Err(AppError::validation(
                "material_name",
                "Material name is required",
                "El nombre del material es obligatorio",
            ));
        }
        self.store.upsert_material(input).await
    }

    /// Record a received lot. The entry number is generated per plant per day.
    pub async fn record_material_entry(
        &self,
        input: NewMaterialEntry,
        performed_by: Uuid,
    ) -> AppResult<MaterialEntry> {
        validate_new_entry(&input).map_err(AppError::invalid_field)?;
        self.ensure_position(StockKey::new(input.plant_id, input.material_id))
            .await?;

        let entry_date = input.entry_date.unwrap_or_else(|| Utc::now().date_naive());
        let entry = self
            .store
            .insert_entry(input, entry_date, performed_by)
            .await?;

        tracing::info!(
            entry_number = %entry.entry_number,
            plant_id = %entry.plant_id,
            material_id = %entry.material_id,
            quantity_kg = %entry.quantity_received_kg,
            "Material entry recorded"
        );
        Ok(entry)
    }

    /// Write stock off a position outside any remision.
    ///
    /// The quantity leaves the oldest open lots first and is valued at their
    /// prices, so lots keep summing to the balance. Adjusting more than is in
    /// stock on the adjustment date is rejected.
    pub async fn record_material_adjustment(
        &self,
        input: NewMaterialAdjustment,
        performed_by: Uuid,
    ) -> AppResult<MaterialAdjustment> {
        validate_new_adjustment(&input).map_err(AppError::invalid_field)?;
        let key = StockKey::new(input.plant_id, input.material_id);
        self.ensure_position(key).await?;

        let adjustment_date = input
            .adjustment_date
            .unwrap_or_else(|| Utc::now().date_naive());
        let max_attempts = self.fifo.max_attempts();
        for attempt in 1..=max_attempts {
            let plan = self
                .fifo
                .plan_draw(key, adjustment_date, input.quantity_adjusted_kg)
                .await?;
            let commit = AdjustmentCommit {
                input: input.clone(),
                adjustment_date,
                plan,
                performed_by,
            };

            match self.store.commit_adjustment(commit).await {
                Ok(adjustment) => {
                    tracing::info!(
                        adjustment_number = %adjustment.adjustment_number,
                        plant_id = %adjustment.plant_id,
                        material_id = %adjustment.material_id,
                        adjustment_type = %adjustment.adjustment_type,
                        quantity_kg = %adjustment.quantity_adjusted_kg,
                        total_cost = %adjustment.total_cost,
                        "Material adjustment recorded"
                    );
                    return Ok(adjustment);
                }
                Err(AppError::VersionConflict { entry_id }) => {
                    tracing::warn!(%entry_id, attempt, "Lot changed during adjustment, re-planning");
                    tokio::time::sleep(Duration::from_millis(2 * u64::from(attempt))).await;
                }
                Err(err) => return Err(err),
            }
        }

        tracing::error!(
            plant_id = %key.plant_id,
            material_id = %key.material_id,
            attempts = max_attempts,
            "Adjustment gave up after repeated conflicts"
        );
        Err(AppError::ConcurrencyConflict {
            attempts: max_attempts,
        })
    }

    /// Entries of a plant, newest first
    pub async fn list_material_entries(&self, query: LedgerQuery) -> AppResult<Vec<MaterialEntry>> {
        self.check_query(&query).await?;
        self.store.list_entries(&query).await
    }

    /// Adjustments of a plant, newest first
    pub async fn list_material_adjustments(
        &self,
        query: LedgerQuery,
    ) -> AppResult<Vec<MaterialAdjustment>> {
        self.check_query(&query).await?;
        self.store.list_adjustments(&query).await
    }

    /// Record a remision with its material rows.
    ///
    /// Rows are allocated right away unless a bulk import has batch mode on,
    /// in which case they wait for the reconciler.
    pub async fn record_remision(
        &self,
        input: NewRemision,
        performed_by: Uuid,
    ) -> AppResult<RecordedRemision> {
        validate_new_remision(&input).map_err(AppError::invalid_field)?;
        if !self.store.plant_exists(input.plant_id).await? {
            return Err(AppError::NotFound("Plant".to_string()));
        }
        for material in &input.materials {
            if !self.store.material_exists(material.material_id).await? {
                return Err(AppError::NotFound(format!(
                    "Material {}",
                    material.material_id
                )));
            }
        }

        let remision = self.store.insert_remision(input).await?;
        tracing::info!(
            remision_id = %remision.id,
            remision_number = %remision.remision_number,
            rows = remision.materials.len(),
            "Remision recorded"
        );

        let allocation = if self.store.triggers_enabled().await? {
            Some(
                self.fifo
                    .auto_allocate_remision(remision.id, performed_by)
                    .await?,
            )
        } else {
            tracing::debug!(remision_id = %remision.id, "Batch mode active, allocation deferred");
            None
        };

        // Re-read so the response carries the cost write-back
        let remision = self
            .store
            .get_remision(remision.id)
            .await?
            .ok_or_else(|| AppError::Internal("Remision vanished after insert".to_string()))?;

        Ok(RecordedRemision {
            remision,
            allocation,
        })
    }

    /// Balances of a plant, lowest stock first
    pub async fn current_inventory(
        &self,
        plant_id: Uuid,
        low_stock_only: bool,
    ) -> AppResult<Vec<MaterialInventory>> {
        validate_id(plant_id).map_err(|m| AppError::invalid_field(("plant_id", m)))?;
        let rows = self.store.list_inventory(Some(plant_id)).await?;
        Ok(if low_stock_only {
            rows.into_iter()
                .filter(|row| row.stock_status == StockStatus::Low)
                .collect()
        } else {
            rows
        })
    }

    pub async fn set_stock_thresholds(
        &self,
        plant_id: Uuid,
        material_id: Uuid,
        minimum: Decimal,
        maximum: Option<Decimal>,
    ) -> AppResult<MaterialInventory> {
        validate_stock_thresholds(minimum, maximum)
            .map_err(|m| AppError::invalid_field(("minimum_stock", m)))?;
        let key = StockKey::new(plant_id, material_id);
        self.ensure_position(key).await?;
        self.store.set_thresholds(key, minimum, maximum).await
    }

    pub async fn record_material_price(&self, input: NewMaterialPrice) -> AppResult<MaterialPrice> {
        validate_unit_price(input.price_per_unit)
            .map_err(|m| AppError::invalid_field(("price_per_unit", m)))?;
        if input.end_date.is_some_and(|end| end < input.effective_date) {
            return Err(AppError::validation(
                "end_date",
                "End date cannot precede the effective date",
                "La fecha final no puede ser anterior a la fecha de vigencia",
            ));
        }
        self.ensure_position(StockKey::new(input.plant_id, input.material_id))
            .await?;
        self.store.insert_price(input).await
    }

    /// Stored log for the day, or a fresh unsaved rollup when none exists
    pub async fn get_daily_log(&self, plant_id: Uuid, date: NaiveDate) -> AppResult<DailyInventoryLog> {
        if let Some(log) = self.store.get_daily_log(plant_id, date).await? {
            return Ok(log);
        }
        self.compute_daily_log(plant_id, date, None).await
    }

    /// Recompute the day's totals from the ledger, keeping any closing data
    pub async fn rebuild_daily_log(
        &self,
        plant_id: Uuid,
        date: NaiveDate,
    ) -> AppResult<DailyInventoryLog> {
        let existing = self.store.get_daily_log(plant_id, date).await?;
        let log = self.compute_daily_log(plant_id, date, existing).await?;
        self.store.save_daily_log(log).await
    }

    /// Close a day. Closing an already closed day is a conflict.
    pub async fn close_daily_log(
        &self,
        plant_id: Uuid,
        date: NaiveDate,
        closed_by: Uuid,
        notes: Option<String>,
    ) -> AppResult<DailyInventoryLog> {
        let existing = self.store.get_daily_log(plant_id, date).await?;
        if existing.as_ref().is_some_and(|log| log.is_closed) {
            return Err(AppError::Conflict {
                resource: "daily_inventory_log".to_string(),
                message: format!("Inventory day {} is already closed", date),
                message_es: format!("El día de inventario {} ya está cerrado", date),
            });
        }

        let mut log = self.compute_daily_log(plant_id, date, existing).await?;
        let now = Utc::now();
        log.is_closed = true;
        log.closed_by = Some(closed_by);
        log.closed_at = Some(now);
        if notes.is_some() {
            log.daily_notes = notes;
        }
        log.updated_at = now;

        tracing::info!(%plant_id, %date, "Inventory day closed");
        self.store.save_daily_log(log).await
    }

    /// Full rebuild of one materialized balance from the ledger
    pub async fn recompute_inventory(
        &self,
        plant_id: Uuid,
        material_id: Uuid,
    ) -> AppResult<MaterialInventory> {
        let key = StockKey::new(plant_id, material_id);
        self.ensure_position(key).await?;
        let before = self.store.inventory(key).await?;
        let row = self.store.recompute_inventory(key).await?;

        if let Some(before) = before.filter(|b| b.current_stock != row.current_stock) {
            tracing::warn!(
                %plant_id,
                %material_id,
                materialized = %before.current_stock,
                ledger = %row.current_stock,
                "Corrected drifted inventory balance"
            );
        }
        Ok(row)
    }

    async fn compute_daily_log(
        &self,
        plant_id: Uuid,
        date: NaiveDate,
        existing: Option<DailyInventoryLog>,
    ) -> AppResult<DailyInventoryLog> {
        if !self.store.plant_exists(plant_id).await? {
            return Err(AppError::NotFound("Plant".to_string()));
        }
        let totals = self.store.daily_totals(plant_id, date).await?;
        let now = Utc::now();

        Ok(match existing {
            Some(log) => DailyInventoryLog {
                total_entries: totals.received_kg,
                total_adjustments: totals.adjusted_kg,
                total_consumption: totals.consumed_kg,
                updated_at: now,
                ..log
            },
            None => DailyInventoryLog {
                plant_id,
                log_date: date,
                total_entries: totals.received_kg,
                total_adjustments: totals.adjusted_kg,
                total_consumption: totals.consumed_kg,
                is_closed: false,
                closed_by: None,
                closed_at: None,
                daily_notes: None,
                updated_at: now,
            },
        })
    }

    async fn check_query(&self, query: &LedgerQuery) -> AppResult<()> {
        validate_ledger_query(query).map_err(AppError::invalid_field)?;
        if !self.store.plant_exists(query.plant_id).await? {
            return Err(AppError::NotFound("Plant".to_string()));
        }
        Ok(())
    }

    async fn ensure_position(&self, key: StockKey) -> AppResult<()> {
        if !self.store.plant_exists(key.plant_id).await? {
            return Err(AppError::NotFound("Plant".to_string()));
        }
        if !self.store.material_exists(key.material_id).await? {
            return Err(AppError::NotFound("Material".to_string()));
        }
        Ok(())
    }
}
