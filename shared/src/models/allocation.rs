//! FIFO consumption allocations and their cost breakdowns

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::StockKey;

/// Request to consume material for one remision material row
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FifoAllocationRequest {
    pub remision_id: Uuid,
    pub remision_material_id: Uuid,
    pub material_id: Uuid,
    pub plant_id: Uuid,
    pub quantity_to_consume: Decimal,
    pub consumption_date: NaiveDate,
}

impl FifoAllocationRequest {
    pub fn stock_key(&self) -> StockKey {
        StockKey::new(self.plant_id, self.material_id)
    }
}

/// One append-only allocation row: quantity drawn from one lot
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MaterialConsumptionAllocation {
    pub id: Uuid,
    pub remision_id: Uuid,
    pub remision_material_id: Uuid,
    pub entry_id: Uuid,
    /// Copied from the lot for reporting
    pub entry_number: String,
    pub material_id: Uuid,
    pub plant_id: Uuid,
    pub quantity_consumed_kg: Decimal,
    pub unit_price: Decimal,
    pub total_cost: Decimal,
    pub consumption_date: NaiveDate,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Cost breakdown line returned to callers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationLine {
    pub entry_id: Uuid,
    pub entry_number: String,
    pub quantity_consumed: Decimal,
    pub unit_price: Decimal,
    pub cost: Decimal,
    /// Lot remaining after this draw; only known for a fresh allocation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_after: Option<Decimal>,
}

impl From<&MaterialConsumptionAllocation> for AllocationLine {
    fn from(allocation: &MaterialConsumptionAllocation) -> Self {
        Self {
            entry_id: allocation.entry_id,
            entry_number: allocation.entry_number.clone(),
            quantity_consumed: allocation.quantity_consumed_kg,
            unit_price: allocation.unit_price,
            cost: allocation.total_cost,
            remaining_after: None,
        }
    }
}

/// Result of a FIFO allocation run
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FifoAllocationResult {
    pub total_cost: Decimal,
    pub allocations: Vec<AllocationLine>,
}

impl FifoAllocationResult {
    pub fn empty() -> Self {
        Self {
            total_cost: Decimal::ZERO,
            allocations: Vec::new(),
        }
    }

    pub fn total_quantity(&self) -> Decimal {
        self.allocations.iter().map(|a| a.quantity_consumed).sum()
    }
}

/// An open FIFO layer valued at its own unit price
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValuationLayer {
    pub entry_id: Uuid,
    pub entry_number: String,
    pub remaining_quantity_kg: Decimal,
    pub unit_price: Decimal,
    pub layer_value: Decimal,
}

/// Inventory valuation of a stock position by FIFO layers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryValuation {
    pub plant_id: Uuid,
    pub material_id: Uuid,
    pub total_value: Decimal,
    pub layers: Vec<ValuationLayer>,
}

/// Per-row failure while allocating a whole remision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemisionAllocationError {
    pub remision_material_id: Uuid,
    pub material_id: Uuid,
    pub error: String,
}

/// Per-row success while allocating a whole remision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemisionAllocationSummary {
    pub remision_material_id: Uuid,
    pub material_id: Uuid,
    pub total_cost: Decimal,
}

/// Outcome of allocating every material row of a remision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AutoAllocateResult {
    pub success: bool,
    pub allocations_created: usize,
    pub errors: Vec<RemisionAllocationError>,
    pub allocation_results: Vec<RemisionAllocationSummary>,
}
