//! Materialized inventory balances, daily rollups and batch results

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::StockKey;

/// Stock level classification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StockStatus {
    Low,
    Ok,
    Excess,
}

impl StockStatus {
    /// LOW under the minimum, EXCESS over a configured maximum, OK otherwise
    pub fn classify(current: Decimal, minimum: Decimal, maximum: Option<Decimal>) -> Self {
        if current < minimum {
            StockStatus::Low
        } else if maximum.is_some_and(|max| current > max) {
            StockStatus::Excess
        } else {
            StockStatus::Ok
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StockStatus::Low => "LOW",
            StockStatus::Ok => "OK",
            StockStatus::Excess => "EXCESS",
        }
    }
}

impl std::str::FromStr for StockStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "LOW" => Ok(StockStatus::Low),
            "OK" => Ok(StockStatus::Ok),
            "EXCESS" => Ok(StockStatus::Excess),
            other => Err(format!("unknown stock status: {}", other)),
        }
    }
}

impl std::fmt::Display for StockStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current balance of a stock position.
///
/// Derived data: `current_stock` always equals received minus consumed
/// minus adjusted for the plant and material, and can be rebuilt from the
/// ledger at any time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterialInventory {
    pub plant_id: Uuid,
    pub material_id: Uuid,
    pub current_stock: Decimal,
    pub minimum_stock: Decimal,
    pub maximum_stock: Option<Decimal>,
    pub stock_status: StockStatus,
    pub last_entry_date: Option<NaiveDate>,
    pub last_consumption_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl MaterialInventory {
    pub fn empty(key: StockKey, now: DateTime<Utc>) -> Self {
        Self {
            plant_id: key.plant_id,
            material_id: key.material_id,
            current_stock: Decimal::ZERO,
            minimum_stock: Decimal::ZERO,
            maximum_stock: None,
            stock_status: StockStatus::Ok,
            last_entry_date: None,
            last_consumption_date: None,
            updated_at: now,
        }
    }

    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.plant_id, self.material_id)
    }

    /// Replace the balance with a fresh recomputation and reclassify
    pub fn apply_balance(&mut self, balance: &LedgerBalance, now: DateTime<Utc>) {
        self.current_stock = balance.current_stock();
        self.last_entry_date = balance.last_entry_date;
        self.last_consumption_date = balance.last_consumption_date;
        self.stock_status =
            StockStatus::classify(self.current_stock, self.minimum_stock, self.maximum_stock);
        self.updated_at = now;
    }
}

/// Ledger totals for one stock position, the source of truth for inventory
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LedgerBalance {
    pub plant_id: Uuid,
    pub material_id: Uuid,
    pub total_received_kg: Decimal,
    pub total_consumed_kg: Decimal,
    /// Written off by adjustments
    pub total_adjusted_kg: Decimal,
    pub last_entry_date: Option<NaiveDate>,
    pub last_consumption_date: Option<NaiveDate>,
}

impl LedgerBalance {
    pub fn zero(key: StockKey) -> Self {
        Self {
            plant_id: key.plant_id,
            material_id: key.material_id,
            total_received_kg: Decimal::ZERO,
            total_consumed_kg: Decimal::ZERO,
            total_adjusted_kg: Decimal::ZERO,
            last_entry_date: None,
            last_consumption_date: None,
        }
    }

    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.plant_id, self.material_id)
    }

    pub fn current_stock(&self) -> Decimal {
        self.total_received_kg - self.total_consumed_kg - self.total_adjusted_kg
    }
}

/// Kilograms moved at a plant on one day
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct DailyTotals {
    pub received_kg: Decimal,
    pub consumed_kg: Decimal,
    pub adjusted_kg: Decimal,
}

/// Per plant per day rollup of ledger activity
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DailyInventoryLog {
    pub plant_id: Uuid,
    pub log_date: NaiveDate,
    /// Kilograms received
    pub total_entries: Decimal,
    /// Kilograms written off by adjustments dated this day
    pub total_adjustments: Decimal,
    /// Kilograms allocated with this consumption date
    pub total_consumption: Decimal,
    pub is_closed: bool,
    pub closed_by: Option<Uuid>,
    pub closed_at: Option<DateTime<Utc>>,
    pub daily_notes: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Before/after snapshot of one stock position touched by a bulk import
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryChange {
    pub material_id: Uuid,
    pub plant_id: Uuid,
    pub total_consumption: Decimal,
    pub inventory_before: Decimal,
    pub inventory_after: Decimal,
}

/// Structured outcome of a bulk import reconciliation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchInventoryResult {
    pub success: bool,
    pub materials_updated: usize,
    pub inventory_changes: Vec<InventoryChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BatchInventoryResult {
    pub fn completed(inventory_changes: Vec<InventoryChange>) -> Self {
        Self {
            success: true,
            materials_updated: inventory_changes.len(),
            inventory_changes,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self::aborted(Vec::new(), error)
    }

    /// A pass that stopped early after changing the given positions
    pub fn aborted(inventory_changes: Vec<InventoryChange>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            materials_updated: inventory_changes.len(),
            inventory_changes,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stock_status_classification() {
        let min = Decimal::from(100);
        let max = Some(Decimal::from(1000));

        assert_eq!(StockStatus::classify(Decimal::from(50), min, max), StockStatus::Low);
        assert_eq!(StockStatus::classify(Decimal::from(100), min, max), StockStatus::Ok);
        assert_eq!(StockStatus::classify(Decimal::from(1000), min, max), StockStatus::Ok);
        assert_eq!(StockStatus::classify(Decimal::from(1001), min, max), StockStatus::Excess);
        assert_eq!(StockStatus::classify(Decimal::from(5000), min, None), StockStatus::Ok);
    }

    #[test]
    fn test_stock_status_serialization() {
        let json = serde_json::to_string(&StockStatus::Excess).unwrap();
        assert_eq!(json, "\"EXCESS\"");
        assert_eq!("LOW".parse::<StockStatus>(), Ok(StockStatus::Low));
        assert!("low".parse::<StockStatus>().is_err());
    }

    #[test]
    fn test_batch_result_failed_reports_nothing_updated() {
        let result = BatchInventoryResult::failed("boom");
        assert!(!result.success);
        assert_eq!(result.materials_updated, 0);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_batch_result_aborted_keeps_committed_changes() {
        let change = InventoryChange {
            material_id: Uuid::new_v4(),
            plant_id: Uuid::new_v4(),
            total_consumption: Decimal::from(100),
            inventory_before: Decimal::from(1000),
            inventory_after: Decimal::from(900),
        };
        let result = BatchInventoryResult::aborted(vec![change.clone()], "storage down");

        assert!(!result.success);
        assert_eq!(result.materials_updated, 1);
        assert_eq!(result.inventory_changes, vec![change]);
    }
}
