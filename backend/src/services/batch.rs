//! Batch inventory reconciler for bulk remision imports
//!
//! A bulk import runs in batch mode: per-row allocation is switched off
//! while remisiones are inserted, then one aggregated pass allocates the
//! pending rows in delivery order and recomputes each touched stock
//! position once.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use shared::{BatchInventoryResult, FifoAllocationRequest, InventoryChange, StockKey};
use uuid::Uuid;

use crate::config::FifoConfig;
use crate::error::{AppError, AppResult};
use crate::services::FifoAllocationService;
use crate::store::LedgerStore;

/// Batch reconciliation service
#[derive(Clone)]
pub struct BatchInventoryService {
    store: Arc<dyn LedgerStore>,
    fifo: FifoAllocationService,
}

/// A remision material row waiting for the aggregated pass
#[derive(Debug)]
struct PendingRow {
    fecha: NaiveDate,
    remision_number: String,
    line_number: i32,
    request: FifoAllocationRequest,
}

/// Per stock position accumulator
#[derive(Debug)]
struct GroupTotals {
    key: StockKey,
    inventory_before: Decimal,
    total_consumption: Decimal,
    rows_committed: usize,
}

/// A pass that stopped early, with the positions it had already changed
#[derive(Debug)]
struct PassAborted {
    error: AppError,
    changes: Vec<InventoryChange>,
}

impl From<AppError> for PassAborted {
    fn from(error: AppError) -> Self {
        Self {
            error,
            changes: Vec::new(),
        }
    }
}

/// Re-enables triggers if batch mode is abandoned without reaching
/// [`BatchInventoryService::process_bulk_import`], e.g. on panic or
/// cancellation of the surrounding future.
struct BatchModeGuard {
    store: Arc<dyn LedgerStore>,
    armed: bool,
}

impl BatchModeGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for BatchModeGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let store = self.store.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(err) = store.set_triggers_enabled(true).await {
                        tracing::error!(
                            alert = "trigger_state",
                            error = %err,
                            "Failed to re-enable inventory triggers after an abandoned import"
                        );
                    }
                });
            }
            Err(_) => tracing::error!(
                alert = "trigger_state",
                "Batch mode abandoned outside a runtime; triggers remain disabled"
            ),
        }
    }
}

impl BatchInventoryService {
    /// Create a new BatchInventoryService instance
    pub fn new(store: Arc<dyn LedgerStore>, fifo_config: FifoConfig) -> Self {
        let fifo = FifoAllocationService::new(store.clone(), fifo_config);
        Self { store, fifo }
    }

    /// Enter batch mode. Rejected when a bulk import is already running.
    pub async fn disable_triggers(&self) -> AppResult<()> {
        let was_enabled = self.store.set_triggers_enabled(false).await?;
        if !was_enabled {
            tracing::warn!("Batch mode requested while already active");
            return Err(AppError::Conflict {
                resource: "batch_mode".to_string(),
                message: "A bulk import is already in progress".to_string(),
                message_es: "Ya hay una importación masiva en curso".to_string(),
            });
        }
        tracing::info!("Inventory triggers disabled for bulk import");
        Ok(())
    }

    /// Leave batch mode.
    ///
    /// Failure here silently breaks all later per-row accounting, so it is
    /// reported as `TriggerState` and logged as an operational alert.
    pub async fn enable_triggers(&self) -> AppResult<()> {
        match self.store.set_triggers_enabled(true).await {
            Ok(was_enabled) => {
                if was_enabled {
                    tracing::debug!("Inventory triggers were already enabled");
                } else {
                    tracing::info!("Inventory triggers re-enabled");
                }
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    alert = "trigger_state",
                    error = %err,
                    "Failed to re-enable inventory triggers; per-row accounting is off"
                );
                Err(AppError::TriggerState(err.to_string()))
            }
        }
    }

    /// Leave batch mode and reconcile the given remisiones in one pass.
    ///
    /// Always returns a structured result. A pass that fails before
    /// committing anything reports `materials_updated = 0`; one aborted
    /// midway reports the positions it had already changed.
    pub async fn process_bulk_import(
        &self,
        remision_ids: &[Uuid],
        performed_by: Uuid,
    ) -> BatchInventoryResult {
        if let Err(err) = self.enable_triggers().await {
            return BatchInventoryResult::failed(err.to_string());
        }

        match self.reconcile(remision_ids, performed_by).await {
            Ok(changes) => {
                tracing::info!(
                    remisiones = remision_ids.len(),
                    materials_updated = changes.len(),
                    "Bulk import reconciled"
                );
                BatchInventoryResult::completed(changes)
            }
            Err(PassAborted { error, changes }) => {
                tracing::error!(
                    error = %error,
                    materials_updated = changes.len(),
                    "Bulk import reconciliation failed"
                );
                BatchInventoryResult::aborted(changes, error.to_string())
            }
        }
    }

    /// Run the whole protocol around a caller-supplied insert step that
    /// returns the ids of the remisiones it stored.
    ///
    /// Triggers are re-enabled whatever the insert step does.
    pub async fn run_bulk_import<F, Fut>(
        &self,
        performed_by: Uuid,
        insert: F,
    ) -> AppResult<BatchInventoryResult>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = AppResult<Vec<Uuid>>>,
    {
        self.disable_triggers().await?;
        let guard = BatchModeGuard {
            store: self.store.clone(),
            armed: true,
        };

        let inserted = insert().await;
        guard.disarm();

        match inserted {
            Ok(remision_ids) => Ok(self.process_bulk_import(&remision_ids, performed_by).await),
            Err(err) => {
                tracing::error!(error = %err, "Bulk import insert step failed");
                self.enable_triggers().await?;
                Ok(BatchInventoryResult::failed(err.to_string()))
            }
        }
    }

    /// The aggregated pass over exactly the given remisiones
    async fn reconcile(
        &self,
        remision_ids: &[Uuid],
        performed_by: Uuid,
    ) -> Result<Vec<InventoryChange>, PassAborted> {
        let mut seen = HashSet::new();
        let mut pending = Vec::new();

        for remision_id in remision_ids.iter().filter(|id| seen.insert(**id)) {
            let remision = self
                .store
                .get_remision(*remision_id)
                .await?
                .ok_or_else(|| AppError::NotFound(format!("Remision {}", remision_id)))?;

            for material in remision
                .materials
                .iter()
                .filter(|m| m.cantidad_real > Decimal::ZERO && !m.is_allocated())
            {
                pending.push(PendingRow {
                    fecha: remision.fecha,
                    remision_number: remision.remision_number.clone(),
                    line_number: material.line_number,
                    request: FifoAllocationRequest {
                        remision_id: remision.id,
                        remision_material_id: material.id,
                        material_id: material.material_id,
                        plant_id: remision.plant_id,
                        quantity_to_consume: material.cantidad_real,
                        consumption_date: remision.fecha,
                    },
                });
            }
        }

        pending.sort_by(|a, b| {
            (a.fecha, &a.remision_number, a.line_number).cmp(&(
                b.fecha,
                &b.remision_number,
                b.line_number,
            ))
        });

        // Groups keep the order in which the pass first reaches them
        let mut groups: Vec<GroupTotals> = Vec::new();
        let mut group_index: HashMap<StockKey, usize> = HashMap::new();
        for row in &pending {
            let key = row.request.stock_key();
            if group_index.contains_key(&key) {
                continue;
            }
            let inventory_before = self
                .store
                .inventory(key)
                .await?
                .map_or(Decimal::ZERO, |inv| inv.current_stock);
            group_index.insert(key, groups.len());
            groups.push(GroupTotals {
                key,
                inventory_before,
                total_consumption: Decimal::ZERO,
                rows_committed: 0,
            });
        }

        for row in pending {
            let key = row.request.stock_key();
            let remision_material_id = row.request.remision_material_id;

            match self
                .fifo
                .allocate_deferred(row.request, performed_by)
                .await
            {
                Ok(result) => {
                    if let Some(&index) = group_index.get(&key) {
                        groups[index].total_consumption += result.total_quantity();
                        groups[index].rows_committed += 1;
                    }
                }
                Err(err) if aborts_pass(&err) => {
                    // Rows already committed stay; their positions still need
                    // their single recompute
                    let touched: Vec<GroupTotals> =
                        groups.into_iter().filter(|g| g.rows_committed > 0).collect();
                    let (changes, _) = self.recompute_groups(touched).await;
                    return Err(PassAborted {
                        error: err,
                        changes,
                    });
                }
                Err(err) => {
                    tracing::warn!(
                        %remision_material_id,
                        plant_id = %key.plant_id,
                        material_id = %key.material_id,
                        error = %err,
                        "Row left pending by bulk reconciliation"
                    );
                }
            }
        }

        match self.recompute_groups(groups).await {
            (changes, None) => Ok(changes),
            (changes, Some(error)) => Err(PassAborted { error, changes }),
        }
    }

    /// Recompute each position once. Stops at the first failure and returns
    /// the changes recorded before it.
    async fn recompute_groups(
        &self,
        groups: Vec<GroupTotals>,
    ) -> (Vec<InventoryChange>, Option<AppError>) {
        let mut changes = Vec::with_capacity(groups.len());
        for group in groups {
            match self.store.recompute_inventory(group.key).await {
                Ok(inventory) => changes.push(InventoryChange {
                    material_id: group.key.material_id,
                    plant_id: group.key.plant_id,
                    total_consumption: group.total_consumption,
                    inventory_before: group.inventory_before,
                    inventory_after: inventory.current_stock,
                }),
                Err(err) => {
                    tracing::error!(
                        alert = "inventory_drift",
                        plant_id = %group.key.plant_id,
                        material_id = %group.key.material_id,
                        error = %err,
                        "Balance recompute failed after bulk allocation"
                    );
                    return (changes, Some(err));
                }
            }
        }
        (changes, None)
    }
}

/// Storage-level failures abort the pass; row-level rejections leave the
/// row pending exactly as a sequential allocation would.
fn aborts_pass(err: &AppError) -> bool {
    matches!(
        err,
        AppError::TriggersDisabled
            | AppError::Persistence(_)
            | AppError::DatabaseError(_)
            | AppError::Internal(_)
            | AppError::InternalError(_)
            | AppError::ConcurrencyConflict { .. }
    )
}
