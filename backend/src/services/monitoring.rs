//! Inventory health monitor
//!
//! Read-only views derived on demand from the ledger. Every query fails
//! soft: errors are logged and an empty list is returned so a dashboard
//! never breaks on a monitoring read.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use shared::{
    HealthMetric, HealthStatus, MaterialUpdateFrequency, StockKey, StockStatus, TableMaintenance,
};

use crate::config::MonitoringConfig;
use crate::error::AppResult;
use crate::store::{LedgerStore, EVENT_RETENTION_DAYS};

/// Health monitoring service
#[derive(Clone)]
pub struct InventoryMonitoringService {
    store: Arc<dyn LedgerStore>,
    config: MonitoringConfig,
}

impl InventoryMonitoringService {
    /// Create a new InventoryMonitoringService instance
    pub fn new(store: Arc<dyn LedgerStore>, config: MonitoringConfig) -> Self {
        Self { store, config }
    }

    /// Fixed set of health metrics for the whole ledger
    pub async fn system_health(&self) -> Vec<HealthMetric> {
        self.system_health_at(Utc::now()).await
    }

    pub async fn system_health_at(&self, now: DateTime<Utc>) -> Vec<HealthMetric> {
        match self.collect_health(now).await {
            Ok(metrics) => metrics,
            Err(err) => {
                tracing::error!(error = %err, "System health query failed");
                Vec::new()
            }
        }
    }

    /// Ledger mutation counts per stock position, busiest first
    pub async fn material_update_frequency(&self) -> Vec<MaterialUpdateFrequency> {
        self.material_update_frequency_at(Utc::now()).await
    }

    pub async fn material_update_frequency_at(
        &self,
        now: DateTime<Utc>,
    ) -> Vec<MaterialUpdateFrequency> {
        match self.collect_frequency(now).await {
            Ok(rows) => rows,
            Err(err) => {
                tracing::error!(error = %err, "Update frequency query failed");
                Vec::new()
            }
        }
    }

    /// Dead-row report per ledger table
    pub async fn maintenance_check(&self) -> Vec<TableMaintenance> {
        match self.store.table_stats().await {
            Ok(stats) => {
                let threshold = Decimal::from(self.config.dead_row_threshold_pct);
                stats
                    .into_iter()
                    .map(|table| {
                        let ratio = table.dead_row_ratio_pct();
                        TableMaintenance {
                            table_name: table.table_name,
                            live_rows: table.live_rows,
                            dead_rows: table.dead_rows,
                            dead_row_ratio_pct: ratio,
                            needs_vacuum: ratio > threshold,
                        }
                    })
                    .collect()
            }
            Err(err) => {
                tracing::error!(error = %err, "Maintenance check failed");
                Vec::new()
            }
        }
    }

    /// Reclaim dead rows, then report the tables again
    pub async fn compact_storage(&self) -> AppResult<Vec<TableMaintenance>> {
        self.store.vacuum().await?;
        tracing::info!("Ledger storage compacted");
        Ok(self.maintenance_check().await)
    }

    async fn collect_health(&self, now: DateTime<Utc>) -> AppResult<Vec<HealthMetric>> {
        let inventory = self.store.list_inventory(None).await?;
        let balances = self.store.ledger_balances().await?;
        let unallocated = self.store.count_unallocated_remision_materials().await?;
        let events = self.store.ledger_events_since(now - Duration::hours(24)).await?;
        let tables = self.store.table_stats().await?;
        let triggers_enabled = self.store.triggers_enabled().await?;

        let mut metrics = Vec::with_capacity(8);

        metrics.push(HealthMetric::new(
            "tracked_materials",
            inventory.len() as i64,
            HealthStatus::Info,
            format!("{} plant/material positions tracked", inventory.len()),
        ));

        let low = inventory
            .iter()
            .filter(|row| row.stock_status == StockStatus::Low)
            .count() as i64;
        metrics.push(if low == 0 {
            HealthMetric::new("low_stock_materials", low, HealthStatus::Ok, "No materials below minimum stock")
        } else {
            HealthMetric::new(
                "low_stock_materials",
                low,
                HealthStatus::Warning,
                format!("{} materials below minimum stock", low),
            )
        });

        let negative = inventory
            .iter()
            .filter(|row| row.current_stock < Decimal::ZERO)
            .count() as i64;
        metrics.push(if negative == 0 {
            HealthMetric::new("negative_stock_materials", negative, HealthStatus::Ok, "No negative balances")
        } else {
            HealthMetric::new(
                "negative_stock_materials",
                negative,
                HealthStatus::High,
                format!("{} materials with negative stock", negative),
            )
        });

        let drift = count_drift(&inventory, &balances);
        metrics.push(if drift == 0 {
            HealthMetric::new(
                "inventory_drift",
                drift,
                HealthStatus::Ok,
                "Materialized balances match the ledger",
            )
        } else {
            HealthMetric::new(
                "inventory_drift",
                drift,
                HealthStatus::High,
                format!("{} balances differ from the ledger; recompute them", drift),
            )
        });

        metrics.push(if unallocated == 0 {
            HealthMetric::new(
                "unallocated_remision_materials",
                unallocated,
                HealthStatus::Ok,
                "Every remision material has a FIFO cost",
            )
        } else {
            HealthMetric::new(
                "unallocated_remision_materials",
                unallocated,
                HealthStatus::Caution,
                format!("{} remision materials awaiting FIFO allocation", unallocated),
            )
        });

        let mut per_key: HashMap<StockKey, i64> = HashMap::new();
        for event in &events {
            *per_key.entry(event.stock_key()).or_default() += 1;
        }
        let busiest = per_key.values().copied().max().unwrap_or(0);
        let total_updates = events.len() as i64;
        metrics.push(if total_updates == 0 {
            HealthMetric::new(
                "ledger_updates_24h",
                total_updates,
                HealthStatus::Low,
                "No ledger activity in the last 24 hours",
            )
        } else if busiest > self.config.runaway_update_threshold {
            HealthMetric::new(
                "ledger_updates_24h",
                total_updates,
                HealthStatus::High,
                format!(
                    "A single material was updated {} times in 24 hours; check for a runaway loop",
                    busiest
                ),
            )
        } else {
            HealthMetric::new(
                "ledger_updates_24h",
                total_updates,
                HealthStatus::Ok,
                format!("{} ledger updates in the last 24 hours", total_updates),
            )
        });

        let max_ratio = tables
            .iter()
            .map(|t| t.dead_row_ratio_pct())
            .max()
            .unwrap_or(Decimal::ZERO);
        metrics.push(
            if max_ratio <= Decimal::from(self.config.dead_row_threshold_pct) {
                HealthMetric::new(
                    "max_dead_row_ratio_pct",
                    max_ratio,
                    HealthStatus::Ok,
                    "Storage bloat within limits",
                )
            } else {
                HealthMetric::new(
                    "max_dead_row_ratio_pct",
                    max_ratio,
                    HealthStatus::Caution,
                    format!("Dead rows at {}%; compaction recommended", max_ratio),
                )
            },
        );

        metrics.push(if triggers_enabled {
            HealthMetric::new("triggers_enabled", 1, HealthStatus::Ok, "Per-row inventory accounting active")
        } else {
            HealthMetric::new(
                "triggers_enabled",
                0,
                HealthStatus::Warning,
                "Inventory triggers disabled; a bulk import is running or did not finish",
            )
        });

        Ok(metrics)
    }

    async fn collect_frequency(&self, now: DateTime<Utc>) -> AppResult<Vec<MaterialUpdateFrequency>> {
        let day_ago = now - Duration::hours(24);
        let events = self
            .store
            .ledger_events_since(now - Duration::days(EVENT_RETENTION_DAYS))
            .await?;

        let mut by_key: HashMap<StockKey, MaterialUpdateFrequency> = HashMap::new();
        for event in events.iter().filter(|e| e.occurred_at <= now) {
            let key = event.stock_key();
            let row = by_key.entry(key).or_insert_with(|| MaterialUpdateFrequency {
                material_id: key.material_id,
                plant_id: key.plant_id,
                updates_last_24h: 0,
                updates_last_7d: 0,
                last_update_at: None,
            });
            row.updates_last_7d += 1;
            if event.occurred_at >= day_ago {
                row.updates_last_24h += 1;
            }
            row.last_update_at = row.last_update_at.max(Some(event.occurred_at));
        }

        let mut rows: Vec<MaterialUpdateFrequency> = by_key.into_values().collect();
        rows.sort_by(|a, b| {
            b.updates_last_24h
                .cmp(&a.updates_last_24h)
                .then_with(|| b.updates_last_7d.cmp(&a.updates_last_7d))
                .then_with(|| (a.plant_id, a.material_id).cmp(&(b.plant_id, b.material_id)))
        });
        Ok(rows)
    }
}

/// Positions whose materialized stock differs from the ledger, including
/// ledger positions that never got a balance row
fn count_drift(
    inventory: &[shared::MaterialInventory],
    balances: &[shared::LedgerBalance],
) -> i64 {
    let ledger: HashMap<StockKey, Decimal> = balances
        .iter()
        .map(|b| (b.stock_key(), b.current_stock()))
        .collect();
    let materialized: HashMap<StockKey, Decimal> = inventory
        .iter()
        .map(|row| (row.stock_key(), row.current_stock))
        .collect();

    let mismatched = materialized
        .iter()
        .filter(|(key, stock)| ledger.get(*key).copied().unwrap_or(Decimal::ZERO) != **stock)
        .count();
    let missing = ledger
        .iter()
        .filter(|(key, stock)| !materialized.contains_key(*key) && !stock.is_zero())
        .count();

    (mismatched + missing) as i64
}
