//! FIFO material cost allocation engine
//!
//! Consumes the oldest open lots of a plant+material first and prices each
//! draw at its lot's unit price. Planning is pure (`shared::fifo`); this
//! service wraps it with existence checks, idempotent replay and the
//! optimistic-concurrency retry loop around the store's atomic commit.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::fifo::{
    checked_sum, layer_value, plan_fifo_allocation, round_cost, FifoPlan, OpenLayer,
};
use shared::{
    effective_price, validate_allocation_request, validate_id, AllocationLine,
    AutoAllocateResult, FifoAllocationRequest, FifoAllocationResult, InventoryValuation,
    MaterialConsumptionAllocation, RemisionAllocationError, RemisionAllocationSummary, StockKey,
    ValuationLayer,
};
use uuid::Uuid;

use crate::config::FifoConfig;
use crate::error::{AppError, AppResult};
use crate::store::{AllocationCommit, LedgerStore};

/// FIFO allocation service over a ledger store
#[derive(Clone)]
pub struct FifoAllocationService {
    store: Arc<dyn LedgerStore>,
    config: FifoConfig,
}

impl FifoAllocationService {
    /// Create a new FifoAllocationService instance
    pub fn new(store: Arc<dyn LedgerStore>, config: FifoConfig) -> Self {
        Self { store, config }
    }

    /// Allocate consumption for one remision material row.
    ///
    /// Rejects the whole request when stock cannot cover it. Calling again
    /// for an allocated row returns the stored breakdown when the quantity
    /// matches.
    pub async fn allocate_fifo_consumption(
        &self,
        request: FifoAllocationRequest,
        performed_by: Uuid,
    ) -> AppResult<FifoAllocationResult> {
        self.allocate(request, performed_by, true).await
    }

    /// Allocate a row inside an aggregated pass. The balance of the stock
    /// position is left for the caller to recompute once per position.
    pub(crate) async fn allocate_deferred(
        &self,
        request: FifoAllocationRequest,
        performed_by: Uuid,
    ) -> AppResult<FifoAllocationResult> {
        self.allocate(request, performed_by, false).await
    }

    async fn allocate(
        &self,
        request: FifoAllocationRequest,
        performed_by: Uuid,
        recompute: bool,
    ) -> AppResult<FifoAllocationResult> {
        validate_allocation_request(&request).map_err(AppError::invalid_field)?;

        if !self.store.triggers_enabled().await? {
            return Err(AppError::TriggersDisabled);
        }

        if !self.store.plant_exists(request.plant_id).await? {
            return Err(AppError::NotFound("Plant".to_string()));
        }
        if !self.store.material_exists(request.material_id).await? {
            return Err(AppError::NotFound("Material".to_string()));
        }

        let remision_material = self
            .store
            .get_remision_material(request.remision_material_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Remision material".to_string()))?;

        if remision_material.remision_id != request.remision_id {
            return Err(AppError::validation(
                "remision_material_id",
                "Remision material does not belong to the remision",
                "El material de remisión no pertenece a la remisión",
            ));
        }
        if remision_material.material_id != request.material_id {
            return Err(AppError::validation(
                "material_id",
                "Material does not match the remision material row",
                "El material no coincide con el renglón de la remisión",
            ));
        }

        let remision = self
            .store
            .get_remision(request.remision_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Remision".to_string()))?;
        if remision.plant_id != request.plant_id {
            return Err(AppError::validation(
                "plant_id",
                "Plant does not match the remision",
                "La planta no coincide con la remisión",
            ));
        }

        if let Some(result) = self.replay(&request).await? {
            return Ok(result);
        }

        let key = request.stock_key();
        let max_attempts = self.max_attempts();
        for attempt in 1..=max_attempts {
            let plan = self
                .plan_draw(key, request.consumption_date, request.quantity_to_consume)
                .await?;

            let commit = AllocationCommit {
                request: request.clone(),
                plan: plan.clone(),
                performed_by,
                recompute,
            };

            match self.store.commit_allocation(commit).await {
                Ok(rows) => {
                    tracing::info!(
                        plant_id = %key.plant_id,
                        material_id = %key.material_id,
                        remision_material_id = %request.remision_material_id,
                        lots = rows.len(),
                        total_cost = %plan.total_cost,
                        attempt,
                        "FIFO allocation committed"
                    );

                    let allocations = rows
                        .iter()
                        .zip(plan.draws.iter())
                        .map(|(row, draw)| AllocationLine {
                            remaining_after: Some(draw.remaining_after),
                            ..AllocationLine::from(row)
                        })
                        .collect();

                    return Ok(FifoAllocationResult {
                        total_cost: plan.total_cost,
                        allocations,
                    });
                }
                Err(AppError::VersionConflict { entry_id }) => {
                    tracing::warn!(
                        remision_material_id = %request.remision_material_id,
                        %entry_id,
                        attempt,
                        "Lot changed during allocation, re-planning"
                    );
                    tokio::time::sleep(Duration::from_millis(2 * u64::from(attempt))).await;
                }
                Err(AppError::AlreadyAllocated { .. }) => {
                    // Lost a race against the same row; replay what won
                    return match self.replay(&request).await? {
                        Some(result) => Ok(result),
                        None => Err(AppError::AlreadyAllocated {
                            remision_material_id: request.remision_material_id,
                        }),
                    };
                }
                Err(err) => return Err(err),
            }
        }

        tracing::error!(
            remision_material_id = %request.remision_material_id,
            attempts = max_attempts,
            "FIFO allocation gave up after repeated conflicts"
        );
        Err(AppError::ConcurrencyConflict {
            attempts: max_attempts,
        })
    }

    /// Commit attempts before a racing writer turns into a conflict error
    pub(crate) fn max_attempts(&self) -> u32 {
        self.config.max_conflict_retries.max(1)
    }

    /// Plan a FIFO draw of `quantity` kg against the lots open on `as_of`.
    ///
    /// Lots recorded without a unit price are costed at the price list entry
    /// in force on that date.
    pub(crate) async fn plan_draw(
        &self,
        key: StockKey,
        as_of: NaiveDate,
        quantity: Decimal,
    ) -> AppResult<FifoPlan> {
        let entries = self.store.open_layers(key, Some(as_of)).await?;

        let fallback_price = if entries.iter().any(|e| e.unit_price.is_none()) {
            let prices = self.store.prices_for(key).await?;
            let price = effective_price(&prices, as_of).unwrap_or(Decimal::ZERO);
            if price.is_zero() {
                tracing::warn!(
                    plant_id = %key.plant_id,
                    material_id = %key.material_id,
                    "Unpriced lots with no price list entry; costing them at zero"
                );
            }
            price
        } else {
            Decimal::ZERO
        };

        let layers: Vec<OpenLayer> = entries
            .iter()
            .map(|entry| OpenLayer::from_entry(entry, fallback_price))
            .collect();

        let plan = plan_fifo_allocation(&layers, quantity, self.config.max_lots_per_run)?;
        for draw in &plan.draws {
            tracing::debug!(
                entry_number = %draw.entry_number,
                quantity_kg = %draw.quantity_kg,
                unit_price = %draw.unit_price,
                "Drawing from lot"
            );
        }
        Ok(plan)
    }

    /// Stored breakdown when the row is already allocated with the same quantity
    async fn replay(
        &self,
        request: &FifoAllocationRequest,
    ) -> AppResult<Option<FifoAllocationResult>> {
        let existing = self
            .store
            .allocations_for(request.remision_material_id)
            .await?;
        if existing.is_empty() {
            return Ok(None);
        }

        let allocated: Decimal = existing.iter().map(|a| a.quantity_consumed_kg).sum();
        if allocated != request.quantity_to_consume {
            return Err(AppError::AlreadyAllocated {
                remision_material_id: request.remision_material_id,
            });
        }

        tracing::debug!(
            remision_material_id = %request.remision_material_id,
            "Allocation already recorded, returning stored breakdown"
        );
        Ok(Some(breakdown(&existing)))
    }

    /// Stored FIFO cost breakdown of a remision material row; zero when unallocated
    pub async fn get_fifo_cost_for_remision_material(
        &self,
        remision_material_id: Uuid,
    ) -> AppResult<FifoAllocationResult> {
        validate_id(remision_material_id)
            .map_err(|m| AppError::invalid_field(("remision_material_id", m)))?;

        let existing = self.store.allocations_for(remision_material_id).await?;
        if existing.is_empty() {
            return Ok(FifoAllocationResult::empty());
        }
        Ok(breakdown(&existing))
    }

    /// Value the open layers of a stock position at their own unit prices
    pub async fn calculate_inventory_valuation(
        &self,
        material_id: Uuid,
        plant_id: Uuid,
    ) -> AppResult<InventoryValuation> {
        validate_id(material_id).map_err(|m| AppError::invalid_field(("material_id", m)))?;
        validate_id(plant_id).map_err(|m| AppError::invalid_field(("plant_id", m)))?;

        let key = StockKey::new(plant_id, material_id);
        let entries = self.store.open_layers(key, None).await?;
        let prices = self.store.prices_for(key).await?;
        let today = chrono::Utc::now().date_naive();
        let fallback_price = effective_price(&prices, today).unwrap_or(Decimal::ZERO);

        let layers = entries
            .iter()
            .map(|entry| {
                let unit_price = entry.unit_price.unwrap_or(fallback_price);
                Ok(ValuationLayer {
                    entry_id: entry.id,
                    entry_number: entry.entry_number.clone(),
                    remaining_quantity_kg: entry.remaining_quantity_kg,
                    unit_price,
                    layer_value: layer_value(entry.remaining_quantity_kg, unit_price)
                        .map_err(|_| valuation_overflow())?,
                })
            })
            .collect::<AppResult<Vec<ValuationLayer>>>()?;

        let total_value =
            checked_sum(layers.iter().map(|l| l.layer_value)).map_err(|_| valuation_overflow())?;

        Ok(InventoryValuation {
            plant_id,
            material_id,
            total_value,
            layers,
        })
    }

    /// Allocate every material row of a remision, collecting per-row errors
    pub async fn auto_allocate_remision(
        &self,
        remision_id: Uuid,
        performed_by: Uuid,
    ) -> AppResult<AutoAllocateResult> {
        let remision = self
            .store
            .get_remision(remision_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Remision".to_string()))?;

        let mut errors = Vec::new();
        let mut allocation_results = Vec::new();

        for material in remision
            .materials
            .iter()
            .filter(|m| m.cantidad_real > Decimal::ZERO)
        {
            let request = FifoAllocationRequest {
                remision_id: remision.id,
                remision_material_id: material.id,
                material_id: material.material_id,
                plant_id: remision.plant_id,
                quantity_to_consume: material.cantidad_real,
                consumption_date: remision.fecha,
            };

            match self.allocate_fifo_consumption(request, performed_by).await {
                Ok(result) => allocation_results.push(RemisionAllocationSummary {
                    remision_material_id: material.id,
                    material_id: material.material_id,
                    total_cost: result.total_cost,
                }),
                Err(err) => {
                    tracing::warn!(
                        remision_id = %remision.id,
                        remision_material_id = %material.id,
                        error = %err,
                        "Remision material left unallocated"
                    );
                    errors.push(RemisionAllocationError {
                        remision_material_id: material.id,
                        material_id: material.material_id,
                        error: err.to_string(),
                    });
                }
            }
        }

        Ok(AutoAllocateResult {
            success: errors.is_empty(),
            allocations_created: allocation_results.len(),
            errors,
            allocation_results,
        })
    }
}

fn valuation_overflow() -> AppError {
    AppError::Internal("Inventory value exceeds the representable range".to_string())
}

fn breakdown(rows: &[MaterialConsumptionAllocation]) -> FifoAllocationResult {
    FifoAllocationResult {
        total_cost: round_cost(rows.iter().map(|a| a.total_cost).sum()),
        allocations: rows.iter().map(AllocationLine::from).collect(),
    }
}
