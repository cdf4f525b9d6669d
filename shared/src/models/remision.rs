//! Remisiones (delivery tickets) and their material usage rows

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A delivery ticket recorded at a plant
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Remision {
    pub id: Uuid,
    pub remision_number: String,
    pub plant_id: Uuid,
    /// Delivery date; also the consumption date of its materials
    pub fecha: NaiveDate,
    pub materials: Vec<RemisionMaterial>,
    pub created_at: DateTime<Utc>,
}

/// Actual material usage of a remision
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemisionMaterial {
    pub id: Uuid,
    pub remision_id: Uuid,
    pub material_id: Uuid,
    /// Real quantity consumed, kg
    pub cantidad_real: Decimal,
    /// Insertion order inside the remision
    pub line_number: i32,
    pub unit_cost_weighted: Option<Decimal>,
    pub total_cost_fifo: Option<Decimal>,
    pub fifo_allocated_at: Option<DateTime<Utc>>,
}

impl RemisionMaterial {
    pub fn is_allocated(&self) -> bool {
        self.fifo_allocated_at.is_some()
    }
}

/// Input for recording a remision with its material rows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRemision {
    pub id: Option<Uuid>,
    pub remision_number: String,
    pub plant_id: Uuid,
    pub fecha: NaiveDate,
    pub materials: Vec<NewRemisionMaterial>,
}

/// Input for one material usage row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRemisionMaterial {
    pub id: Option<Uuid>,
    pub material_id: Uuid,
    pub cantidad_real: Decimal,
}

/// Cost write-back stored on a remision material after allocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RemisionMaterialCost {
    pub unit_cost_weighted: Decimal,
    pub total_cost_fifo: Decimal,
    pub fifo_allocated_at: DateTime<Utc>,
}

/// A recorded remision plus what happened to its rows on insert
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedRemision {
    pub remision: Remision,
    /// None when triggers were disabled and rows await the batch reconciler
    pub allocation: Option<super::AutoAllocateResult>,
}
