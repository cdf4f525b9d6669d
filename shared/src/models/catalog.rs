//! Plants and materials referenced by the ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A concrete plant holding its own material stock
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plant {
    pub id: Uuid,
    /// Short operator-facing code (e.g., "P001")
    pub code: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// A raw material tracked in kilograms (cement, aggregates, additives...)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Material {
    pub id: Uuid,
    pub material_code: String,
    pub material_name: String,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for registering a plant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPlant {
    pub id: Option<Uuid>,
    pub code: String,
    pub name: String,
}

/// Input for registering a material
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMaterial {
    pub id: Option<Uuid>,
    pub material_code: String,
    pub material_name: String,
    pub category: Option<String>,
}
