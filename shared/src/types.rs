//! Common types used across the ledger

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifies one stock position: a material held at a plant.
///
/// Every balance, lot scan and serialization lock in the ledger is keyed
/// by this pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StockKey {
    pub plant_id: Uuid,
    pub material_id: Uuid,
}

impl StockKey {
    pub fn new(plant_id: Uuid, material_id: Uuid) -> Self {
        Self {
            plant_id,
            material_id,
        }
    }
}

impl std::fmt::Display for StockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "plant={} material={}", self.plant_id, self.material_id)
    }
}
